//! chainscan-core: chain subscription lifecycle and block ingestion.
//!
//! # Architecture
//!
//! ```text
//! Scanner
//!   ├── WorkerPool            (bounded queue, tracked tasks, shared cancellation)
//!   └── SubscriptionRegistry  (one active subscription per genesis hash)
//!         ├── NodeClient      (ordered raw block stream, external)
//!         ├── IngestTask      (stream → normalize → store_block, per chain)
//!         │     └── normalizer (raw block → rows, all-or-nothing)
//!         └── ChainStore      (sharded tables, atomic block writes, counters)
//! ```

pub mod config;
pub mod error;
pub mod ingest;
pub mod model;
pub mod node;
pub mod normalizer;
pub mod pool;
pub mod raw;
pub mod registry;
pub mod scanner;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{ClientConfig, IngestOptions, LogConfig, NodeConnConfig, ScannerConfig};
pub use error::ScanError;
pub use ingest::{ChainExit, IngestTask};
pub use model::{
    AggregateCounters, BlockDetailsRow, BlockRow, ChainInfo, ContractRow, NormalizedBlock, Page,
    ShardTable, SubscriptionConfig, TransactionRow, TxDetailsRow,
};
pub use node::{BlockStream, NodeClient, NodeConnector, SubscribeRequest};
pub use normalizer::{normalize, DescriptorEncoding, NormalizeError};
pub use pool::WorkerPool;
pub use registry::{BootstrapReport, SubscribeOutcome, SubscriptionRegistry};
pub use scanner::Scanner;
pub use store::{ChainDatabase, ChainReader, ChainStore, MemoryChainStore, TxFilter};
