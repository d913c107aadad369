//! Subscription registry: the per-chain lifecycle orchestrator.
//!
//! ```text
//! subscribe(client) ──► reserve gen_hash ──► fresh:  allocate shard, stream from 0, create chain
//!                                       └─► resume: shard from record, stream from max + 1
//!                   ──► submit listener + ingestion tasks ──► upsert subscription profile
//!
//! ingestion task ──(ChainExit over oneshot)──► listener ──► forget chain if generation matches
//! ```
//!
//! At most one registration exists per genesis hash. Each registration owns a
//! [`CancellationToken`] (a child of the pool token) and a generation number;
//! `unsubscribe` cancels the token, and a late exit report from an older
//! registration never removes a newer one. `subscribe` and `unsubscribe` of
//! the same genesis hash never interleave, so an unsubscribed chain's profile
//! is not written back by a subscribe that was still in flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ClientConfig, IngestOptions};
use crate::error::ScanError;
use crate::ingest::{ChainExit, IngestTask};
use crate::model::SubscriptionConfig;
use crate::node::{NodeClient, NodeConnector, SubscribeRequest};
use crate::pool::WorkerPool;
use crate::store::ChainStore;

/// What a successful `subscribe` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// The chain was already being ingested; nothing changed.
    AlreadyActive,
    /// First subscription of this chain; a new shard was assigned.
    Fresh { shard: u32 },
    /// A known chain picked up from its last stored block.
    Resumed { shard: u32, from_height: u64 },
}

/// Result of re-subscribing every persisted profile at startup.
#[derive(Debug, Default)]
pub struct BootstrapReport {
    pub resumed: Vec<String>,
    pub failed: Vec<(String, ScanError)>,
}

struct ActiveEntry {
    generation: u64,
    token: CancellationToken,
    /// `None` while the subscription is still being set up.
    shard: Option<u32>,
}

#[derive(Clone)]
pub struct SubscriptionRegistry {
    store: Arc<dyn ChainStore>,
    pool: Arc<WorkerPool>,
    connector: Arc<dyn NodeConnector>,
    options: IngestOptions,
    active: Arc<Mutex<HashMap<String, ActiveEntry>>>,
    /// Serialises fresh-chain shard allocation.
    shard_lock: Arc<tokio::sync::Mutex<()>>,
    /// Per genesis hash; held across subscribe and unsubscribe.
    membership: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
    generation: Arc<AtomicU64>,
}

impl SubscriptionRegistry {
    pub fn new(
        store: Arc<dyn ChainStore>,
        pool: Arc<WorkerPool>,
        connector: Arc<dyn NodeConnector>,
        options: IngestOptions,
    ) -> Self {
        Self {
            store,
            pool,
            connector,
            options,
            active: Arc::new(Mutex::new(HashMap::new())),
            shard_lock: Arc::new(tokio::sync::Mutex::new(())),
            membership: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Start ingesting the chain behind `client`. Idempotent per genesis hash.
    pub async fn subscribe(
        &self,
        client: Arc<dyn NodeClient>,
        chain_name: &str,
    ) -> Result<SubscribeOutcome, ScanError> {
        let gen_hash = client.genesis_hash();
        let membership = self.membership_lock(gen_hash);
        let _held = membership.lock().await;

        let outcome = self.register(client.clone()).await?;
        if outcome == SubscribeOutcome::AlreadyActive {
            return Ok(outcome);
        }

        let profile = SubscriptionConfig::from_client(gen_hash, chain_name, client.config());
        if let Err(e) = self.store.upsert_subscription(&profile).await {
            error!(gen_hash = %gen_hash, error = %e, "failed to persist subscription");
            self.forget(gen_hash);
            return Err(e);
        }
        info!(gen_hash = %gen_hash, chain = chain_name, ?outcome, "chain subscribed");
        Ok(outcome)
    }

    /// Validate `config`, connect to the node, then [`subscribe`](Self::subscribe).
    pub async fn subscribe_with_config(
        &self,
        config: &ClientConfig,
        chain_name: &str,
    ) -> Result<SubscribeOutcome, ScanError> {
        config.validate()?;
        let client = self.connector.connect(config).await?;
        self.subscribe(client, chain_name).await
    }

    /// Stop ingesting `gen_hash` and delete its persisted profile.
    ///
    /// Returns `true` if the chain was active. The in-flight task is
    /// cancelled; a block that is mid-write still commits or rolls back whole.
    pub async fn unsubscribe(&self, gen_hash: &str) -> Result<bool, ScanError> {
        let membership = self.membership_lock(gen_hash);
        let _held = membership.lock().await;

        let was_active = self.forget(gen_hash);
        self.store.delete_subscription(gen_hash).await?;
        info!(gen_hash, was_active, "chain unsubscribed");
        Ok(was_active)
    }

    /// Resume every persisted subscription, concurrently, on the pool.
    pub async fn bootstrap(&self) -> Result<BootstrapReport, ScanError> {
        let profiles = self.store.list_subscriptions().await?;
        info!(count = profiles.len(), "bootstrapping subscriptions");

        let mut pending = Vec::with_capacity(profiles.len());
        for profile in profiles {
            let (tx, rx) = oneshot::channel();
            let registry = self.clone();
            let gen_hash = profile.gen_hash.clone();
            self.pool
                .submit(move |_token| async move {
                    let result = registry.resume_profile(&profile).await;
                    let _ = tx.send(result.clone());
                    result.map(|_| ())
                })
                .await?;
            pending.push((gen_hash, rx));
        }

        let mut report = BootstrapReport::default();
        for (gen_hash, rx) in pending {
            let result = rx.await.unwrap_or(Err(ScanError::PoolCancelled));
            match result {
                Ok(outcome) => {
                    debug!(gen_hash = %gen_hash, ?outcome, "subscription resumed");
                    report.resumed.push(gen_hash);
                }
                Err(e) => {
                    warn!(gen_hash = %gen_hash, error = %e, "failed to resume subscription");
                    report.failed.push((gen_hash, e));
                }
            }
        }
        Ok(report)
    }

    /// Genesis hashes with a live registration, sorted.
    pub fn active_chains(&self) -> Vec<String> {
        let mut chains: Vec<String> = lock(&self.active).keys().cloned().collect();
        chains.sort();
        chains
    }

    pub fn is_active(&self, gen_hash: &str) -> bool {
        lock(&self.active).contains_key(gen_hash)
    }

    /// Shard of an active chain, once its setup has finished.
    pub fn active_shard(&self, gen_hash: &str) -> Option<u32> {
        lock(&self.active).get(gen_hash).and_then(|e| e.shard)
    }

    // ─── Internals ────────────────────────────────────────────────────────────

    fn membership_lock(&self, gen_hash: &str) -> Arc<tokio::sync::Mutex<()>> {
        lock(&self.membership).entry(gen_hash.to_string()).or_default().clone()
    }

    async fn resume_profile(&self, profile: &SubscriptionConfig) -> Result<SubscribeOutcome, ScanError> {
        if self.store.get_chain(&profile.gen_hash).await?.is_none() {
            return Err(ScanError::UnknownChain(profile.gen_hash.clone()));
        }
        let config = profile.to_client_config();
        config.validate()?;
        let client = self.connector.connect(&config).await?;
        if client.genesis_hash() != profile.gen_hash {
            return Err(ScanError::GenesisMismatch {
                expected: profile.gen_hash.clone(),
                actual: client.genesis_hash().to_string(),
            });
        }
        self.register(client).await
    }

    /// Reserve the genesis hash, open the stream, and hand the chain to the pool.
    async fn register(&self, client: Arc<dyn NodeClient>) -> Result<SubscribeOutcome, ScanError> {
        let gen_hash = client.genesis_hash().to_string();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let token = self.pool.child_token();
        {
            let mut active = lock(&self.active);
            if active.contains_key(&gen_hash) {
                debug!(gen_hash = %gen_hash, "chain already active");
                return Ok(SubscribeOutcome::AlreadyActive);
            }
            active.insert(
                gen_hash.clone(),
                ActiveEntry {
                    generation,
                    token: token.clone(),
                    shard: None,
                },
            );
        }

        match self.launch(client, &gen_hash, generation, token).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.forget_generation(&gen_hash, generation);
                Err(e)
            }
        }
    }

    async fn launch(
        &self,
        client: Arc<dyn NodeClient>,
        gen_hash: &str,
        generation: u64,
        token: CancellationToken,
    ) -> Result<SubscribeOutcome, ScanError> {
        let request = |from_height| SubscribeRequest {
            from_height,
            to_height: None,
            include_rw_set: self.options.include_rw_set,
            header_only: self.options.header_only,
        };

        let (shard, next_height, stream, outcome) = match self.store.get_chain(gen_hash).await? {
            None => {
                let _guard = self.shard_lock.lock().await;
                let shard = self.store.allocate_next_shard().await?;
                let stream = client.subscribe_blocks(request(0)).await?;
                // The shard must be durable before the first block is consumed.
                self.store
                    .create_chain(gen_hash, &client.config().chain_id, shard)
                    .await?;
                (shard, 0, stream, SubscribeOutcome::Fresh { shard })
            }
            Some(chain) => {
                let from_height = self
                    .store
                    .max_stored_height(gen_hash)
                    .await?
                    .map_or(0, |h| h + 1);
                let stream = client.subscribe_blocks(request(from_height)).await?;
                let outcome = SubscribeOutcome::Resumed {
                    shard: chain.shard,
                    from_height,
                };
                (chain.shard, from_height, stream, outcome)
            }
        };

        let (exit_tx, exit_rx) = oneshot::channel();
        let listener = self.clone();
        let listen_hash = gen_hash.to_string();
        self.pool
            .submit(move |_token| async move {
                listener.listen(&listen_hash, generation, exit_rx).await;
                Ok(())
            })
            .await?;

        let task = IngestTask {
            gen_hash: gen_hash.to_string(),
            shard,
            next_height,
            stream,
            store: self.store.clone(),
        };
        let chain_token = token.clone();
        if let Err(e) = self
            .pool
            .submit(move |_token| task.run_and_report(chain_token, generation, exit_tx))
            .await
        {
            token.cancel();
            return Err(e);
        }

        if let Some(entry) = lock(&self.active).get_mut(gen_hash) {
            if entry.generation == generation {
                entry.shard = Some(shard);
            }
        }
        Ok(outcome)
    }

    /// Wait for the ingestion task's exit report and drop its registration.
    async fn listen(&self, gen_hash: &str, generation: u64, exit: oneshot::Receiver<ChainExit>) {
        match exit.await {
            Ok(ChainExit { generation, error: Some(e) }) => {
                warn!(gen_hash, error = %e, "chain subscription terminated");
                self.forget_generation(gen_hash, generation);
            }
            Ok(ChainExit { generation, error: None }) => {
                debug!(gen_hash, "chain ingestion stopped");
                self.forget_generation(gen_hash, generation);
            }
            Err(_) => {
                // Ingestion task dropped unrun.
                debug!(gen_hash, "ingestion task never reported");
                self.forget_generation(gen_hash, generation);
            }
        }
    }

    /// Remove and cancel any registration of `gen_hash`.
    fn forget(&self, gen_hash: &str) -> bool {
        match lock(&self.active).remove(gen_hash) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove the registration only if it is still the one numbered `generation`.
    fn forget_generation(&self, gen_hash: &str, generation: u64) {
        let mut active = lock(&self.active);
        if active.get(gen_hash).is_some_and(|e| e.generation == generation) {
            if let Some(entry) = active.remove(gen_hash) {
                entry.token.cancel();
            }
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::model::{AggregateCounters, ChainInfo, NormalizedBlock};
    use crate::store::MemoryChainStore;
    use crate::testing::{
        eventually, sample_block, sample_client_config, sample_deploy_tx, sample_tx,
        wait_for_height, ScriptedConnector, ScriptedNode,
    };

    struct Harness {
        store: Arc<MemoryChainStore>,
        pool: Arc<WorkerPool>,
        connector: Arc<ScriptedConnector>,
        registry: SubscriptionRegistry,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryChainStore::new());
        let pool = Arc::new(WorkerPool::default());
        pool.start();
        let connector = Arc::new(ScriptedConnector::new());
        let registry = SubscriptionRegistry::new(
            store.clone(),
            pool.clone(),
            connector.clone(),
            IngestOptions::default(),
        );
        Harness { store, pool, connector, registry }
    }

    #[tokio::test]
    async fn fresh_chain_ingests_first_block() {
        let h = harness();
        let node = Arc::new(ScriptedNode::new("g1"));

        let outcome = h.registry.subscribe(node.clone(), "main").await.unwrap();
        assert_eq!(outcome, SubscribeOutcome::Fresh { shard: 1 });
        assert_eq!(node.calls()[0].from_height, 0);
        assert_eq!(h.store.shard_number("g1").await.unwrap(), Some(1));

        node.push(sample_block(0, vec![sample_tx("t1"), sample_deploy_tx("t2", "asset")]));
        wait_for_height(h.store.as_ref(), "g1", 0).await;

        assert_eq!(h.store.row_counts(1), (1, 1, 2, 2, 1));
        assert_eq!(
            h.store.get_counters("g1").await.unwrap(),
            Some(AggregateCounters { block_count: 1, tx_count: 2 })
        );
        assert!(h.store.get_subscription("g1").await.unwrap().is_some());
        assert_eq!(h.registry.active_shard("g1"), Some(1));
        h.pool.stop().await;
    }

    #[tokio::test]
    async fn second_subscribe_is_a_no_op() {
        let h = harness();
        let node = Arc::new(ScriptedNode::new("g1"));

        h.registry.subscribe(node.clone(), "main").await.unwrap();
        let again = h.registry.subscribe(node.clone(), "main").await.unwrap();

        assert_eq!(again, SubscribeOutcome::AlreadyActive);
        assert_eq!(h.registry.active_chains(), vec!["g1".to_string()]);
        assert_eq!(node.calls().len(), 1);
        assert_eq!(h.store.list_chains().await.unwrap().len(), 1);
        h.pool.stop().await;
    }

    #[tokio::test]
    async fn distinct_chains_get_increasing_shards() {
        let h = harness();
        let mut shards = Vec::new();
        for gen in ["g1", "g2", "g3"] {
            let node = Arc::new(ScriptedNode::new(gen));
            match h.registry.subscribe(node, gen).await.unwrap() {
                SubscribeOutcome::Fresh { shard } => shards.push(shard),
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(shards, vec![1, 2, 3]);
        h.pool.stop().await;
    }

    #[tokio::test]
    async fn concurrent_fresh_subscriptions_never_share_a_shard() {
        let h = harness();
        let mut handles = Vec::new();
        for i in 0..8 {
            let registry = h.registry.clone();
            handles.push(tokio::spawn(async move {
                let node = Arc::new(ScriptedNode::new(&format!("g{i}")));
                registry.subscribe(node, "c").await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let mut shards: Vec<u32> = h
            .store
            .list_chains()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.shard)
            .collect();
        shards.dedup();
        assert_eq!(shards, (1..=8).collect::<Vec<_>>());
        h.pool.stop().await;
    }

    #[tokio::test]
    async fn closed_stream_frees_the_chain_for_resubscribe() {
        let h = harness();
        let node = Arc::new(ScriptedNode::new("g1"));
        h.registry.subscribe(node.clone(), "main").await.unwrap();
        node.push(sample_block(0, vec![]));
        node.push(sample_block(1, vec![]));
        wait_for_height(h.store.as_ref(), "g1", 1).await;

        node.close();
        eventually("chain removed", || !h.registry.is_active("g1")).await;

        let outcome = h.registry.subscribe(node.clone(), "main").await.unwrap();
        assert_eq!(outcome, SubscribeOutcome::Resumed { shard: 1, from_height: 2 });
        assert_eq!(node.calls()[1].from_height, 2);
        h.pool.stop().await;
    }

    #[tokio::test]
    async fn storage_failure_terminates_only_that_chain() {
        let h = harness();
        let bad = Arc::new(ScriptedNode::new("g1"));
        let good = Arc::new(ScriptedNode::new("g2"));
        h.registry.subscribe(bad.clone(), "a").await.unwrap();
        h.registry.subscribe(good.clone(), "b").await.unwrap();

        h.store.fail_contract_writes(true);
        bad.push(sample_block(0, vec![sample_deploy_tx("d1", "asset")]));
        eventually("failed chain removed", || !h.registry.is_active("g1")).await;

        good.push(sample_block(0, vec![sample_tx("t1")]));
        wait_for_height(h.store.as_ref(), "g2", 0).await;
        assert!(h.registry.is_active("g2"));
        assert_eq!(h.store.max_stored_height("g1").await.unwrap(), None);
        // The profile survives so a restart resumes the chain.
        assert!(h.store.get_subscription("g1").await.unwrap().is_some());
        h.pool.stop().await;
    }

    #[tokio::test]
    async fn height_gap_terminates_the_chain() {
        let h = harness();
        let node = Arc::new(ScriptedNode::new("g1"));
        h.registry.subscribe(node.clone(), "main").await.unwrap();
        node.push(sample_block(0, vec![]));
        node.push(sample_block(5, vec![]));
        eventually("chain removed", || !h.registry.is_active("g1")).await;
        assert_eq!(h.store.max_stored_height("g1").await.unwrap(), Some(0));
        h.pool.stop().await;
    }

    #[tokio::test]
    async fn unsubscribe_interrupts_ingestion() {
        let h = harness();
        let node = Arc::new(ScriptedNode::new("g1"));
        h.registry.subscribe(node.clone(), "main").await.unwrap();
        node.push(sample_block(0, vec![]));
        wait_for_height(h.store.as_ref(), "g1", 0).await;

        assert!(h.registry.unsubscribe("g1").await.unwrap());
        assert!(!h.registry.is_active("g1"));
        assert!(h.store.get_subscription("g1").await.unwrap().is_none());

        // The task drops its stream once cancelled.
        eventually("stream dropped", || !node.push(sample_block(1, vec![]))).await;
        assert_eq!(h.store.max_stored_height("g1").await.unwrap(), Some(0));
        assert!(!h.registry.unsubscribe("g1").await.unwrap());
        h.pool.stop().await;
    }

    #[tokio::test]
    async fn failed_stream_open_releases_reservation() {
        let h = harness();
        let node = Arc::new(ScriptedNode::new("g1"));
        node.fail_subscribe(ScanError::Connection("refused".into()));

        let err = h.registry.subscribe(node.clone(), "main").await.unwrap_err();
        assert_eq!(err, ScanError::Connection("refused".into()));
        assert!(!h.registry.is_active("g1"));
        assert!(h.store.get_chain("g1").await.unwrap().is_none());
        h.pool.stop().await;
    }

    #[tokio::test]
    async fn subscribe_with_config_rejects_invalid_config() {
        let h = harness();
        let mut config = sample_client_config("n:1");
        config.chain_id.clear();
        let err = h.registry.subscribe_with_config(&config, "main").await.unwrap_err();
        assert!(matches!(err, ScanError::Configuration(_)));

        let config = sample_client_config("unknown:1");
        let err = h.registry.subscribe_with_config(&config, "main").await.unwrap_err();
        assert!(matches!(err, ScanError::Connection(_)));
        h.pool.stop().await;
    }

    #[tokio::test]
    async fn bootstrap_resumes_after_last_stored_height() {
        let h = harness();
        let addr = "g1-node:12301";
        let node = Arc::new(ScriptedNode::new("g1"));
        h.connector.register(addr, node.clone());

        // State left behind by a previous run: shard 1, heights 0..=9.
        h.store.create_chain("g1", "chain1", 1).await.unwrap();
        for height in 0..10 {
            let rows = crate::normalizer::normalize(&sample_block(height, vec![])).unwrap();
            h.store.store_block(&rows, "g1", 1).await.unwrap();
        }
        let profile = SubscriptionConfig::from_client("g1", "main", &sample_client_config(addr));
        h.store.upsert_subscription(&profile).await.unwrap();

        let report = h.registry.bootstrap().await.unwrap();
        assert_eq!(report.resumed, vec!["g1".to_string()]);
        assert!(report.failed.is_empty());
        assert_eq!(node.calls()[0].from_height, 10);

        node.push(sample_block(10, vec![]));
        wait_for_height(h.store.as_ref(), "g1", 10).await;
        h.pool.stop().await;
    }

    #[tokio::test]
    async fn bootstrap_reports_unusable_profiles() {
        let h = harness();
        let impostor = Arc::new(ScriptedNode::new("other"));
        h.connector.register("g2-node:1", impostor);
        h.store.create_chain("g2", "chain1", 1).await.unwrap();

        let profiles = [
            SubscriptionConfig::from_client("g1", "a", &sample_client_config("g1-node:1")),
            SubscriptionConfig::from_client("g2", "b", &sample_client_config("g2-node:1")),
        ];
        for p in &profiles {
            h.store.upsert_subscription(p).await.unwrap();
        }

        let report = h.registry.bootstrap().await.unwrap();
        assert!(report.resumed.is_empty());
        assert_eq!(report.failed.len(), 2);
        assert!(matches!(report.failed[0].1, ScanError::UnknownChain(_)));
        assert!(matches!(report.failed[1].1, ScanError::GenesisMismatch { .. }));
        assert!(h.registry.active_chains().is_empty());
        h.pool.stop().await;
    }

    #[tokio::test]
    async fn pool_stop_ends_every_chain() {
        let h = harness();
        for gen in ["g1", "g2"] {
            h.registry.subscribe(Arc::new(ScriptedNode::new(gen)), gen).await.unwrap();
        }
        h.pool.stop().await;
        assert!(h.registry.active_chains().is_empty());
        assert_eq!(h.pool.active_workers(), 0);
    }

    #[tokio::test]
    async fn stop_of_an_idle_pool_forgets_queued_chains() {
        let store = Arc::new(MemoryChainStore::new());
        // Never started: listener and ingestion tasks stay queued.
        let pool = Arc::new(WorkerPool::default());
        let registry = SubscriptionRegistry::new(
            store.clone(),
            pool.clone(),
            Arc::new(ScriptedConnector::new()),
            IngestOptions::default(),
        );
        registry.subscribe(Arc::new(ScriptedNode::new("g1")), "main").await.unwrap();
        assert!(registry.is_active("g1"));

        pool.stop().await;
        assert!(registry.active_chains().is_empty());
        assert!(store.get_subscription("g1").await.unwrap().is_some());
    }

    /// Delays every profile write so a concurrent unsubscribe can overlap it.
    struct SlowProfiles(Arc<MemoryChainStore>);

    #[async_trait::async_trait]
    impl ChainStore for SlowProfiles {
        async fn get_chain(&self, gen_hash: &str) -> Result<Option<ChainInfo>, ScanError> {
            self.0.get_chain(gen_hash).await
        }
        async fn allocate_next_shard(&self) -> Result<u32, ScanError> {
            self.0.allocate_next_shard().await
        }
        async fn create_chain(
            &self,
            gen_hash: &str,
            chain_id: &str,
            shard: u32,
        ) -> Result<ChainInfo, ScanError> {
            self.0.create_chain(gen_hash, chain_id, shard).await
        }
        async fn max_stored_height(&self, gen_hash: &str) -> Result<Option<u64>, ScanError> {
            self.0.max_stored_height(gen_hash).await
        }
        async fn get_counters(&self, gen_hash: &str) -> Result<Option<AggregateCounters>, ScanError> {
            self.0.get_counters(gen_hash).await
        }
        async fn store_block(
            &self,
            block: &NormalizedBlock,
            gen_hash: &str,
            shard: u32,
        ) -> Result<(), ScanError> {
            self.0.store_block(block, gen_hash, shard).await
        }
        async fn upsert_subscription(&self, sub: &SubscriptionConfig) -> Result<(), ScanError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.0.upsert_subscription(sub).await
        }
        async fn delete_subscription(&self, gen_hash: &str) -> Result<(), ScanError> {
            self.0.delete_subscription(gen_hash).await
        }
        async fn get_subscription(&self, gen_hash: &str) -> Result<Option<SubscriptionConfig>, ScanError> {
            self.0.get_subscription(gen_hash).await
        }
        async fn list_subscriptions(&self) -> Result<Vec<SubscriptionConfig>, ScanError> {
            self.0.list_subscriptions().await
        }
        async fn list_chains(&self) -> Result<Vec<ChainInfo>, ScanError> {
            self.0.list_chains().await
        }
    }

    #[tokio::test]
    async fn unsubscribe_during_subscribe_leaves_no_profile() {
        let memory = Arc::new(MemoryChainStore::new());
        let pool = Arc::new(WorkerPool::default());
        pool.start();
        let registry = SubscriptionRegistry::new(
            Arc::new(SlowProfiles(memory.clone())),
            pool.clone(),
            Arc::new(ScriptedConnector::new()),
            IngestOptions::default(),
        );

        let subscribing = {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry.subscribe(Arc::new(ScriptedNode::new("g1")), "main").await
            })
        };
        eventually("chain registered", || registry.is_active("g1")).await;
        assert!(memory.get_subscription("g1").await.unwrap().is_none());

        assert!(registry.unsubscribe("g1").await.unwrap());
        assert_eq!(
            subscribing.await.unwrap().unwrap(),
            SubscribeOutcome::Fresh { shard: 1 }
        );
        assert!(!registry.is_active("g1"));
        assert!(memory.get_subscription("g1").await.unwrap().is_none());
        assert!(memory.list_subscriptions().await.unwrap().is_empty());
        pool.stop().await;
    }
}
