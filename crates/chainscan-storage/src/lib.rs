//! chainscan-storage: sharded block storage backends for ChainScan.
//!
//! Backends:
//! - [`MemoryChainStore`]: in-memory (dev/testing, no persistence)
//! - [`sqlite`]: SQLite via `sqlx` (embedded, single-file persistence)
//! - `postgres`: PostgreSQL via `sqlx` (shared deployments)
//!
//! Every backend lays a chain's rows out in its own numbered table set
//! (`block_NN`, `block_details_NN`, `transaction_NN`, `tx_details_NN`,
//! `contract_NN`) and writes each block in a single transaction.

use std::sync::Arc;

use chainscan_core::{ChainDatabase, ScanError};

#[cfg(any(feature = "sqlite", feature = "postgres"))]
mod binds;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
mod schema;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "memory")]
pub use chainscan_core::MemoryChainStore;

/// Open the backend named by `url`.
///
/// - `memory:`: a fresh [`MemoryChainStore`]
/// - `sqlite:<path>` or a bare file path: [`sqlite::SqliteStorage`]
/// - `postgres://...` / `postgresql://...`: `postgres::PostgresStorage`
pub async fn open(url: &str) -> Result<Arc<dyn ChainDatabase>, ScanError> {
    if url == "memory:" || url == "memory" {
        #[cfg(feature = "memory")]
        return Ok(Arc::new(MemoryChainStore::new()));
    }

    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        #[cfg(feature = "postgres")]
        return Ok(Arc::new(postgres::PostgresStorage::connect(url).await?));
        #[cfg(not(feature = "postgres"))]
        return Err(ScanError::Configuration(
            "postgres support not compiled in (enable the `postgres` feature)".into(),
        ));
    }

    #[cfg(feature = "sqlite")]
    return Ok(Arc::new(sqlite::SqliteStorage::open(url).await?));

    #[cfg(not(feature = "sqlite"))]
    Err(ScanError::Configuration(format!("no storage backend for {url}")))
}

#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub(crate) fn storage_err(e: impl std::fmt::Display) -> ScanError {
    ScanError::Storage(e.to_string())
}

/// Unix seconds, for `created_at` / `updated_at` columns.
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub(crate) fn lock<T>(m: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainscan_core::ChainStore;

    #[cfg(feature = "memory")]
    #[tokio::test]
    async fn memory_url_opens_an_empty_store() {
        let store = open("memory:").await.unwrap();
        assert!(store.list_chains().await.unwrap().is_empty());
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn sqlite_url_opens_a_database() {
        let store = open("sqlite::memory:").await.unwrap();
        assert_eq!(store.allocate_next_shard().await.unwrap(), 1);
    }
}
