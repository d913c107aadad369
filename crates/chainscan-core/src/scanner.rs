//! Service wiring: one worker pool, one registry, one store.

use std::sync::Arc;

use tracing::info;

use crate::config::ScannerConfig;
use crate::error::ScanError;
use crate::node::NodeConnector;
use crate::pool::WorkerPool;
use crate::registry::{BootstrapReport, SubscriptionRegistry};
use crate::store::ChainStore;

pub struct Scanner {
    pool: Arc<WorkerPool>,
    registry: SubscriptionRegistry,
}

impl Scanner {
    pub fn new(
        config: &ScannerConfig,
        store: Arc<dyn ChainStore>,
        connector: Arc<dyn NodeConnector>,
    ) -> Self {
        let pool = Arc::new(WorkerPool::new(config.pool.queue_capacity));
        let registry = SubscriptionRegistry::new(store, pool.clone(), connector, config.ingest);
        Self { pool, registry }
    }

    /// Start the pool and resume every persisted subscription.
    pub async fn start(&self) -> Result<BootstrapReport, ScanError> {
        self.pool.start();
        let report = self.registry.bootstrap().await?;
        info!(
            resumed = report.resumed.len(),
            failed = report.failed.len(),
            "scanner started"
        );
        Ok(report)
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Cancel every ingestion task and wait for them to finish.
    pub async fn shutdown(&self) {
        self.pool.stop().await;
        info!("scanner stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SubscriptionConfig;
    use crate::store::MemoryChainStore;
    use crate::testing::{sample_block, sample_client_config, wait_for_height, ScriptedConnector, ScriptedNode};

    #[tokio::test]
    async fn start_resumes_and_shutdown_stops() {
        let store = Arc::new(MemoryChainStore::new());
        let connector = Arc::new(ScriptedConnector::new());
        let node = Arc::new(ScriptedNode::new("g1"));
        connector.register("g1-node:12301", node.clone());

        store.create_chain("g1", "chain1", 1).await.unwrap();
        let profile = SubscriptionConfig::from_client("g1", "main", &sample_client_config("g1-node:12301"));
        store.upsert_subscription(&profile).await.unwrap();

        let scanner = Scanner::new(&ScannerConfig::default(), store.clone(), connector);
        let report = scanner.start().await.unwrap();
        assert_eq!(report.resumed, vec!["g1".to_string()]);
        assert_eq!(node.calls()[0].from_height, 0);

        node.push(sample_block(0, vec![]));
        wait_for_height(store.as_ref(), "g1", 0).await;

        scanner.shutdown().await;
        assert!(scanner.registry().active_chains().is_empty());
    }

    #[tokio::test]
    async fn start_with_nothing_persisted() {
        let scanner = Scanner::new(
            &ScannerConfig::default(),
            Arc::new(MemoryChainStore::new()),
            Arc::new(ScriptedConnector::new()),
        );
        let report = scanner.start().await.unwrap();
        assert!(report.resumed.is_empty() && report.failed.is_empty());
        scanner.shutdown().await;
    }
}
