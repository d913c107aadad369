//! Error types for the chainscan ingestion pipeline.

use thiserror::Error;

/// Errors that can occur while subscribing to chains and ingesting blocks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScanError {
    /// The node client configuration is invalid. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The node client could not be constructed or reached.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The node reported an error on an open block stream.
    #[error("Node error: {0}")]
    Node(String),

    /// The block stream of a chain ended.
    #[error("Block stream closed for chain {gen_hash}")]
    StreamClosed { gen_hash: String },

    /// The node delivered a block that does not directly follow the last stored one.
    #[error("Height gap on chain {gen_hash}: expected block {expected}, got {got}")]
    HeightGap {
        gen_hash: String,
        expected: u64,
        got: u64,
    },

    /// A raw block could not be turned into rows.
    #[error("Normalization error: {0}")]
    Normalization(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// No chain record exists for a genesis hash that was expected to be known.
    #[error("Unknown chain: {0}")]
    UnknownChain(String),

    /// The node reconnected for a persisted subscription reports another chain.
    #[error("Genesis hash mismatch: expected {expected}, node reports {actual}")]
    GenesisMismatch { expected: String, actual: String },

    /// The worker pool's shared lifetime was cancelled while submitting.
    #[error("Worker pool cancelled")]
    PoolCancelled,

    /// The worker pool has been stopped.
    #[error("Worker pool has been stopped")]
    PoolStopped,
}

impl ScanError {
    /// Returns `true` if the error is terminal for a single chain's ingestion
    /// task (as opposed to a subscribe-time failure returned to the caller).
    pub fn is_ingestion_failure(&self) -> bool {
        matches!(
            self,
            Self::Node(_)
                | Self::StreamClosed { .. }
                | Self::HeightGap { .. }
                | Self::Normalization(_)
                | Self::Storage(_)
        )
    }

    /// Returns `true` if the error comes from the worker pool lifecycle.
    pub fn is_pool_shutdown(&self) -> bool {
        matches!(self, Self::PoolCancelled | Self::PoolStopped)
    }
}
