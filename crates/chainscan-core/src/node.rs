//! Seams to the node-communication component.
//!
//! The core never talks to a ledger node directly. It consumes an ordered
//! stream of raw blocks from a [`NodeClient`] and builds clients from
//! persisted profiles through a [`NodeConnector`].

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;

use crate::config::ClientConfig;
use crate::error::ScanError;
use crate::raw::BlockInfo;

/// An ordered stream of raw blocks from one chain.
pub type BlockStream = Pin<Box<dyn Stream<Item = Result<BlockInfo, ScanError>> + Send>>;

/// Parameters of a block subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub from_height: u64,
    /// `None` keeps following new blocks.
    pub to_height: Option<u64>,
    pub include_rw_set: bool,
    pub header_only: bool,
}

impl SubscribeRequest {
    pub fn from_height(from_height: u64) -> Self {
        Self {
            from_height,
            to_height: None,
            include_rw_set: false,
            header_only: false,
        }
    }
}

/// A connected client for one chain.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Hex genesis hash of the chain this client is connected to.
    fn genesis_hash(&self) -> &str;

    /// The configuration the client was built from.
    fn config(&self) -> &ClientConfig;

    /// Open a block stream. Dropping the stream ends the subscription.
    async fn subscribe_blocks(&self, req: SubscribeRequest) -> Result<BlockStream, ScanError>;
}

/// Builds node clients from configuration.
#[async_trait]
pub trait NodeConnector: Send + Sync {
    /// Fails with [`ScanError::Connection`] when the node cannot be reached.
    async fn connect(&self, config: &ClientConfig) -> Result<Arc<dyn NodeClient>, ScanError>;
}
