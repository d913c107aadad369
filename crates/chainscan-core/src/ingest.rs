//! Per-chain ingestion task.
//!
//! Pulls raw blocks from a chain's stream strictly in order, normalizes each
//! one and writes it to the chain's shard. The first error ends the task; the
//! outcome is reported to the registry through a one-shot [`ChainExit`].

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::ScanError;
use crate::node::BlockStream;
use crate::normalizer::normalize;
use crate::store::ChainStore;

/// Terminal outcome of one ingestion task instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainExit {
    /// Registration the task belonged to.
    pub generation: u64,
    /// `None` when the task stopped because it was cancelled.
    pub error: Option<ScanError>,
}

pub struct IngestTask {
    pub gen_hash: String,
    pub shard: u32,
    /// Height the next block from the stream must have.
    pub next_height: u64,
    pub stream: BlockStream,
    pub store: Arc<dyn ChainStore>,
}

impl IngestTask {
    /// Consume the stream until it ends, fails, or `token` is cancelled.
    ///
    /// A block that is already being written when cancellation arrives is
    /// completed (or rolled back) by the store before the task returns.
    pub async fn run(mut self, token: CancellationToken) -> Result<(), ScanError> {
        info!(
            gen_hash = %self.gen_hash,
            shard = self.shard,
            from = self.next_height,
            "ingestion started"
        );
        loop {
            let item = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!(gen_hash = %self.gen_hash, height = self.next_height, "ingestion cancelled");
                    return Ok(());
                }
                item = self.stream.next() => item,
            };

            let raw = match item {
                Some(Ok(raw)) => raw,
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(ScanError::StreamClosed {
                        gen_hash: self.gen_hash.clone(),
                    })
                }
            };

            let rows = normalize(&raw)?;
            if rows.height() != self.next_height {
                return Err(ScanError::HeightGap {
                    gen_hash: self.gen_hash.clone(),
                    expected: self.next_height,
                    got: rows.height(),
                });
            }

            self.store.store_block(&rows, &self.gen_hash, self.shard).await?;
            debug!(
                gen_hash = %self.gen_hash,
                height = self.next_height,
                txs = rows.transactions.len(),
                "block stored"
            );
            self.next_height += 1;
        }
    }

    /// Run to completion and report the outcome on `exit`.
    pub async fn run_and_report(
        self,
        token: CancellationToken,
        generation: u64,
        exit: oneshot::Sender<ChainExit>,
    ) -> Result<(), ScanError> {
        let gen_hash = self.gen_hash.clone();
        let result = self.run(token).await;
        if let Err(e) = &result {
            error!(gen_hash = %gen_hash, error = %e, "ingestion failed");
        }
        // The listener may already be gone during shutdown.
        let _ = exit.send(ChainExit {
            generation,
            error: result.clone().err(),
        });
        result
    }
}
