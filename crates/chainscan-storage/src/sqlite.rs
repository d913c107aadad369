//! SQLite storage backend for ChainScan.
//!
//! One file holds the shared `chain_info` and `subscription` tables plus one
//! table set per chain shard (`block_01`, `tx_details_01`, ...). Shard tables
//! are created when the chain record is created.
//!
//! # Usage
//! ```rust,no_run
//! use chainscan_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./chainscan.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use chainscan_core::store::{latest_per_name, TxFilter, FIRST_SHARD};
use chainscan_core::{
    AggregateCounters, BlockDetailsRow, BlockRow, ChainInfo, ChainReader, ChainStore, ContractRow,
    NormalizedBlock, Page, ScanError, ShardTable, SubscriptionConfig, TransactionRow, TxDetailsRow,
};

use crate::binds::{
    bind_block, bind_block_details, bind_contract, bind_subscription, bind_transaction,
    bind_tx_details,
};
use crate::schema::{self, Dialect};
use crate::{lock, now, storage_err};

const DIALECT: Dialect = Dialect::Sqlite;

/// SQLite-backed [`ChainStore`] and [`ChainReader`].
pub struct SqliteStorage {
    pool: SqlitePool,
    /// Shards whose tables are known to exist.
    shards: Mutex<HashSet<u32>>,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./chainscan.db"`) or a full
    /// SQLite URL (`"sqlite:./chainscan.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, ScanError> {
        if path.contains(":memory:") {
            return Self::in_memory().await;
        }
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;
        let storage = Self::with_pool(pool);
        storage.init_schema().await?;
        info!(path, "sqlite storage opened");
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// All data is lost when the pool is dropped. Ideal for tests.
    pub async fn in_memory() -> Result<Self, ScanError> {
        // Every connection to `:memory:` is its own database, so keep exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;
        let storage = Self::with_pool(pool);
        storage.init_schema().await?;
        Ok(storage)
    }

    fn with_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            shards: Mutex::new(HashSet::new()),
        }
    }

    /// Create the shared tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), ScanError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        for stmt in schema::shared_ddl(DIALECT) {
            sqlx::query(&stmt)
                .execute(&self.pool)
                .await
                .map_err(storage_err)?;
        }
        Ok(())
    }

    /// Create the tables of `shard` unless already done by this instance.
    async fn ensure_shard(&self, shard: u32) -> Result<(), ScanError> {
        if lock(&self.shards).contains(&shard) {
            return Ok(());
        }
        for stmt in schema::shard_ddl(DIALECT, shard) {
            sqlx::query(&stmt)
                .execute(&self.pool)
                .await
                .map_err(storage_err)?;
        }
        lock(&self.shards).insert(shard);
        debug!(shard, "shard tables ready");
        Ok(())
    }

    async fn shard_of(&self, gen_hash: &str) -> Result<Option<u32>, ScanError> {
        let shard = self.shard_number(gen_hash).await?;
        if let Some(shard) = shard {
            self.ensure_shard(shard).await?;
        }
        Ok(shard)
    }
}

// ─── ChainStore impl ─────────────────────────────────────────────────────────

#[async_trait]
impl ChainStore for SqliteStorage {
    async fn get_chain(&self, gen_hash: &str) -> Result<Option<ChainInfo>, ScanError> {
        let row = sqlx::query(
            "SELECT gen_hash, chain_id, shard, block_count, tx_count
             FROM chain_info WHERE gen_hash = ?",
        )
        .bind(gen_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.as_ref().map(chain_info))
    }

    async fn allocate_next_shard(&self) -> Result<u32, ScanError> {
        let row = sqlx::query("SELECT MAX(shard) AS max_shard FROM chain_info")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;

        let max: Option<i64> = row.get("max_shard");
        Ok(max.map_or(FIRST_SHARD, |m| m as u32 + 1))
    }

    async fn create_chain(
        &self,
        gen_hash: &str,
        chain_id: &str,
        shard: u32,
    ) -> Result<ChainInfo, ScanError> {
        let ts = now();
        sqlx::query(
            "INSERT INTO chain_info (gen_hash, chain_id, shard, block_count, tx_count, created_at, updated_at)
             VALUES (?, ?, ?, 0, 0, ?, ?)",
        )
        .bind(gen_hash)
        .bind(chain_id)
        .bind(shard as i64)
        .bind(ts)
        .bind(ts)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        self.ensure_shard(shard).await?;
        info!(gen_hash, shard, "chain created");
        Ok(ChainInfo {
            gen_hash: gen_hash.to_string(),
            chain_id: chain_id.to_string(),
            shard,
            counters: AggregateCounters::default(),
        })
    }

    async fn max_stored_height(&self, gen_hash: &str) -> Result<Option<u64>, ScanError> {
        let Some(shard) = self.shard_of(gen_hash).await? else {
            return Ok(None);
        };
        let row = sqlx::query(&format!(
            "SELECT MAX(block_height) AS max_height FROM {}",
            ShardTable::Block.table_name(shard)
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;

        let max: Option<i64> = row.get("max_height");
        Ok(max.map(|h| h as u64))
    }

    async fn get_counters(&self, gen_hash: &str) -> Result<Option<AggregateCounters>, ScanError> {
        Ok(self.get_chain(gen_hash).await?.map(|c| c.counters))
    }

    async fn store_block(
        &self,
        block: &NormalizedBlock,
        gen_hash: &str,
        shard: u32,
    ) -> Result<(), ScanError> {
        self.ensure_shard(shard).await?;
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        // Counter update first: the write lock is held before any row goes in.
        let bumped = sqlx::query(
            "UPDATE chain_info
             SET block_count = block_count + 1, tx_count = tx_count + ?, updated_at = ?
             WHERE gen_hash = ?",
        )
        .bind(block.tx_row_count() as i64)
        .bind(now())
        .bind(gen_hash)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;
        if bumped.rows_affected() == 0 {
            return Err(ScanError::UnknownChain(gen_hash.to_string()));
        }

        let b = &block.block;
        let insert_block = schema::insert_sql(DIALECT, ShardTable::Block, shard);
        bind_block!(sqlx::query(&insert_block), b)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

        let details = schema::insert_sql(DIALECT, ShardTable::BlockDetails, shard);
        bind_block_details!(sqlx::query(&details), &block.details)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

        let insert_tx = schema::insert_sql(DIALECT, ShardTable::Transaction, shard);
        for t in &block.transactions {
            bind_transaction!(sqlx::query(&insert_tx), t)
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
        }

        let insert_details = schema::insert_sql(DIALECT, ShardTable::TxDetails, shard);
        for t in &block.tx_details {
            bind_tx_details!(sqlx::query(&insert_details), t)
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
        }

        let insert_contract = schema::insert_sql(DIALECT, ShardTable::Contract, shard);
        for c in &block.contracts {
            bind_contract!(sqlx::query(&insert_contract), c)
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
        }

        tx.commit().await.map_err(storage_err)?;
        debug!(
            gen_hash,
            shard,
            height = b.block_height,
            txs = block.transactions.len(),
            "block stored"
        );
        Ok(())
    }

    async fn upsert_subscription(&self, sub: &SubscriptionConfig) -> Result<(), ScanError> {
        let upsert = schema::upsert_subscription_sql(DIALECT);
        bind_subscription!(sqlx::query(&upsert), sub)
            .bind(now())
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        debug!(gen_hash = %sub.gen_hash, "subscription saved");
        Ok(())
    }

    async fn delete_subscription(&self, gen_hash: &str) -> Result<(), ScanError> {
        sqlx::query("DELETE FROM subscription WHERE gen_hash = ?")
            .bind(gen_hash)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn get_subscription(&self, gen_hash: &str) -> Result<Option<SubscriptionConfig>, ScanError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscription WHERE gen_hash = ?",
            schema::SUBSCRIPTION_COLUMNS
        ))
        .bind(gen_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.as_ref().map(subscription))
    }

    async fn list_subscriptions(&self) -> Result<Vec<SubscriptionConfig>, ScanError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM subscription ORDER BY gen_hash",
            schema::SUBSCRIPTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.iter().map(subscription).collect())
    }

    async fn list_chains(&self) -> Result<Vec<ChainInfo>, ScanError> {
        let rows = sqlx::query(
            "SELECT gen_hash, chain_id, shard, block_count, tx_count
             FROM chain_info ORDER BY shard",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.iter().map(chain_info).collect())
    }
}

// ─── ChainReader impl ────────────────────────────────────────────────────────

#[async_trait]
impl ChainReader for SqliteStorage {
    async fn list_blocks(&self, gen_hash: &str, page: Page) -> Result<Vec<BlockRow>, ScanError> {
        let Some(shard) = self.shard_of(gen_hash).await? else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query(&format!(
            "SELECT {} FROM {} ORDER BY block_height DESC LIMIT ? OFFSET ?",
            schema::column_list(ShardTable::Block),
            ShardTable::Block.table_name(shard)
        ))
        .bind(page.limit as i64)
        .bind(page.offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.iter().map(block_row).collect())
    }

    async fn block_by_height(&self, gen_hash: &str, height: u64) -> Result<Option<BlockRow>, ScanError> {
        let Some(shard) = self.shard_of(gen_hash).await? else {
            return Ok(None);
        };
        let row = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE block_height = ?",
            schema::column_list(ShardTable::Block),
            ShardTable::Block.table_name(shard)
        ))
        .bind(height as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.as_ref().map(block_row))
    }

    async fn block_details(
        &self,
        gen_hash: &str,
        block_hash: &str,
    ) -> Result<Option<BlockDetailsRow>, ScanError> {
        let Some(shard) = self.shard_of(gen_hash).await? else {
            return Ok(None);
        };
        let row = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE block_hash = ?",
            schema::column_list(ShardTable::BlockDetails),
            ShardTable::BlockDetails.table_name(shard)
        ))
        .bind(block_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.as_ref().map(block_details_row))
    }

    async fn list_transactions(
        &self,
        gen_hash: &str,
        filter: &TxFilter,
        page: Page,
    ) -> Result<Vec<TransactionRow>, ScanError> {
        let Some(shard) = self.shard_of(gen_hash).await? else {
            return Ok(Vec::new());
        };
        let mut sql = format!(
            "SELECT {} FROM {} WHERE 1 = 1",
            schema::column_list(ShardTable::Transaction),
            ShardTable::Transaction.table_name(shard)
        );
        if filter.block_height.is_some() {
            sql.push_str(" AND block_height = ?");
        }
        if filter.contract_name.is_some() {
            sql.push_str(" AND contract_name = ?");
        }
        sql.push_str(" ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        if let Some(height) = filter.block_height {
            query = query.bind(height as i64);
        }
        if let Some(name) = &filter.contract_name {
            query = query.bind(name);
        }
        let rows = query
            .bind(page.limit as i64)
            .bind(page.offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(rows.iter().map(transaction_row).collect())
    }

    async fn transaction(&self, gen_hash: &str, tx_id: &str) -> Result<Option<TransactionRow>, ScanError> {
        let Some(shard) = self.shard_of(gen_hash).await? else {
            return Ok(None);
        };
        let row = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE tx_id = ?",
            schema::column_list(ShardTable::Transaction),
            ShardTable::Transaction.table_name(shard)
        ))
        .bind(tx_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.as_ref().map(transaction_row))
    }

    async fn tx_details(&self, gen_hash: &str, tx_id: &str) -> Result<Option<TxDetailsRow>, ScanError> {
        let Some(shard) = self.shard_of(gen_hash).await? else {
            return Ok(None);
        };
        let row = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE tx_id = ?",
            schema::column_list(ShardTable::TxDetails),
            ShardTable::TxDetails.table_name(shard)
        ))
        .bind(tx_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.as_ref().map(tx_details_row))
    }

    async fn latest_contract(&self, gen_hash: &str, name: &str) -> Result<Option<ContractRow>, ScanError> {
        let Some(shard) = self.shard_of(gen_hash).await? else {
            return Ok(None);
        };
        let rows = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE name = ?",
            schema::column_list(ShardTable::Contract),
            ShardTable::Contract.table_name(shard)
        ))
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(latest_per_name(rows.iter().map(contract_row)).into_iter().next())
    }

    async fn list_contracts(&self, gen_hash: &str, page: Page) -> Result<Vec<ContractRow>, ScanError> {
        let Some(shard) = self.shard_of(gen_hash).await? else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query(&schema::latest_contracts_sql(DIALECT, shard))
            .bind(page.limit as i64)
            .bind(page.offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(rows.iter().map(contract_row).collect())
    }
}

// ─── Row mapping ─────────────────────────────────────────────────────────────

fn blob(r: &SqliteRow, col: &str) -> Vec<u8> {
    r.get::<Option<Vec<u8>>, _>(col).unwrap_or_default()
}

fn chain_info(r: &SqliteRow) -> ChainInfo {
    ChainInfo {
        gen_hash: r.get("gen_hash"),
        chain_id: r.get("chain_id"),
        shard: r.get::<i64, _>("shard") as u32,
        counters: AggregateCounters {
            block_count: r.get::<i64, _>("block_count") as u64,
            tx_count: r.get::<i64, _>("tx_count") as u64,
        },
    }
}

fn subscription(r: &SqliteRow) -> SubscriptionConfig {
    SubscriptionConfig {
        gen_hash: r.get("gen_hash"),
        chain_name: r.get("chain_name"),
        chain_id: r.get("chain_id"),
        org_id: r.get("org_id"),
        node_addr: r.get("node_addr"),
        node_ca_cert_pem: r.get("node_ca_cert_pem"),
        node_tls_host_name: r.get("node_tls_host_name"),
        node_use_tls: r.get("node_use_tls"),
        sign_cert_pem: r.get("sign_cert_pem"),
        sign_key_pem: r.get("sign_key_pem"),
        tls_cert_pem: r.get("tls_cert_pem"),
        tls_key_pem: r.get("tls_key_pem"),
        archive_center_url: r.get("archive_center_url"),
    }
}

fn block_row(r: &SqliteRow) -> BlockRow {
    BlockRow {
        block_height: r.get::<i64, _>("block_height") as u64,
        block_hash: r.get("block_hash"),
        chain_id: r.get("chain_id"),
        pre_block_hash: r.get("pre_block_hash"),
        block_type: r.get("block_type"),
        block_version: r.get::<i64, _>("block_version") as u32,
        pre_conf_height: r.get::<i64, _>("pre_conf_height") as u64,
        tx_count: r.get::<i64, _>("tx_count") as u32,
        tx_root: r.get("tx_root"),
        dag_hash: r.get("dag_hash"),
        rw_set_root: r.get("rw_set_root"),
        block_timestamp: r.get("block_timestamp"),
        proposer_org_id: r.get("proposer_org_id"),
        consensus_args: r.get("consensus_args"),
    }
}

fn block_details_row(r: &SqliteRow) -> BlockDetailsRow {
    BlockDetailsRow {
        block_hash: r.get("block_hash"),
        proposer_bytes: blob(r, "proposer_bytes"),
        proposer_signature: r.get("proposer_signature"),
        dag: r.get("dag"),
    }
}

fn transaction_row(r: &SqliteRow) -> TransactionRow {
    TransactionRow {
        tx_id: r.get("tx_id"),
        block_height: r.get::<i64, _>("block_height") as u64,
        chain_id: r.get("chain_id"),
        contract_name: r.get("contract_name"),
        method: r.get("method"),
        tx_type: r.get("tx_type"),
        timestamp: r.get("timestamp"),
        expiration_time: r.get("expiration_time"),
        sequence: r.get::<i64, _>("sequence") as u64,
        gas_limit: r.get::<i64, _>("gas_limit") as u64,
        sender_org_id: r.get("sender_org_id"),
        tx_status_code: r.get("tx_status_code"),
    }
}

fn tx_details_row(r: &SqliteRow) -> TxDetailsRow {
    TxDetailsRow {
        tx_id: r.get("tx_id"),
        tx_parameters: blob(r, "tx_parameters"),
        sender_bytes: blob(r, "sender_bytes"),
        endorsers_bytes: blob(r, "endorsers_bytes"),
        tx_status_code: r.get("tx_status_code"),
        rw_set_hash: r.get("rw_set_hash"),
        tx_message: r.get("tx_message"),
        contract_result_code: r.get::<i64, _>("contract_result_code") as u32,
        contract_result: blob(r, "contract_result"),
        contract_result_message: r.get("contract_result_message"),
        gas_used: r.get::<i64, _>("gas_used") as u64,
        contract_event_bytes: blob(r, "contract_event_bytes"),
        tx_reads_bytes: blob(r, "tx_reads_bytes"),
        tx_writes_bytes: blob(r, "tx_writes_bytes"),
    }
}

fn contract_row(r: &SqliteRow) -> ContractRow {
    ContractRow {
        name: r.get("name"),
        version: r.get("version"),
        chain_id: r.get("chain_id"),
        runtime_type: r.get("runtime_type"),
        state: r.get("state"),
        creator_org_id: r.get("creator_org_id"),
        address: r.get("address"),
        tx_id: r.get("tx_id"),
        height: r.get::<i64, _>("height") as u64,
        tx_timestamp: r.get("tx_timestamp"),
        creator_bytes: blob(r, "creator_bytes"),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block(height: u64, tx_ids: &[&str], contracts: &[(&str, i64)]) -> NormalizedBlock {
        NormalizedBlock {
            block: BlockRow {
                block_height: height,
                block_hash: format!("{height:064x}"),
                chain_id: "chain1".into(),
                block_type: "NORMAL_BLOCK".into(),
                tx_count: tx_ids.len() as u32,
                block_timestamp: 1_700_000_000 + height as i64,
                ..BlockRow::default()
            },
            details: BlockDetailsRow {
                block_hash: format!("{height:064x}"),
                proposer_bytes: vec![1, 2, 3],
                proposer_signature: "AQID".into(),
                dag: r#"{"vec":[]}"#.into(),
            },
            transactions: tx_ids
                .iter()
                .map(|id| TransactionRow {
                    tx_id: id.to_string(),
                    block_height: height,
                    contract_name: "fact".into(),
                    timestamp: 1_700_000_000 + height as i64,
                    tx_status_code: "SUCCESS".into(),
                    ..TransactionRow::default()
                })
                .collect(),
            tx_details: tx_ids
                .iter()
                .map(|id| TxDetailsRow {
                    tx_id: id.to_string(),
                    tx_parameters: br#"[{"key":"k"}]"#.to_vec(),
                    ..TxDetailsRow::default()
                })
                .collect(),
            contracts: contracts
                .iter()
                .map(|(name, ts)| ContractRow {
                    name: name.to_string(),
                    version: format!("v{ts}"),
                    tx_timestamp: *ts,
                    height,
                    ..ContractRow::default()
                })
                .collect(),
        }
    }

    async fn store_with_chain() -> SqliteStorage {
        let store = SqliteStorage::in_memory().await.unwrap();
        store.create_chain("g1", "chain1", 1).await.unwrap();
        store
    }

    #[tokio::test]
    async fn shard_allocation_starts_at_one() {
        let store = SqliteStorage::in_memory().await.unwrap();
        assert_eq!(store.allocate_next_shard().await.unwrap(), 1);
        store.create_chain("g1", "chain1", 1).await.unwrap();
        store.create_chain("g2", "chain2", 2).await.unwrap();
        assert_eq!(store.allocate_next_shard().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn shard_column_is_unique() {
        let store = store_with_chain().await;
        let err = store.create_chain("g2", "chain2", 1).await.unwrap_err();
        assert!(matches!(err, ScanError::Storage(_)));
    }

    #[tokio::test]
    async fn get_chain_missing_returns_none() {
        let store = SqliteStorage::in_memory().await.unwrap();
        assert!(store.get_chain("nope").await.unwrap().is_none());
        assert_eq!(store.max_stored_height("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn store_block_writes_rows_and_counters() {
        let store = store_with_chain().await;
        assert_eq!(store.max_stored_height("g1").await.unwrap(), None);

        store
            .store_block(&sample_block(0, &["t1", "t2"], &[("asset", 10)]), "g1", 1)
            .await
            .unwrap();

        assert_eq!(store.max_stored_height("g1").await.unwrap(), Some(0));
        assert_eq!(
            store.get_counters("g1").await.unwrap(),
            Some(AggregateCounters { block_count: 1, tx_count: 2 })
        );

        let block = store.block_by_height("g1", 0).await.unwrap().unwrap();
        assert_eq!(block.tx_count, 2);
        let details = store.block_details("g1", &block.block_hash).await.unwrap().unwrap();
        assert_eq!(details.proposer_bytes, vec![1, 2, 3]);
        let td = store.tx_details("g1", "t2").await.unwrap().unwrap();
        assert_eq!(td.tx_parameters, br#"[{"key":"k"}]"#.to_vec());
        assert!(td.sender_bytes.is_empty());
        assert_eq!(store.latest_contract("g1", "asset").await.unwrap().unwrap().version, "v10");
    }

    #[tokio::test]
    async fn every_column_reads_back_as_written() {
        let store = store_with_chain().await;
        let block = NormalizedBlock {
            block: BlockRow {
                block_height: 0,
                block_hash: "aa".into(),
                chain_id: "chain1".into(),
                pre_block_hash: "99".into(),
                block_type: "CONFIG_BLOCK".into(),
                block_version: 2_030_100,
                pre_conf_height: 4,
                tx_count: 1,
                tx_root: "tr".into(),
                dag_hash: "dh".into(),
                rw_set_root: "rw".into(),
                block_timestamp: 1_700_000_000,
                proposer_org_id: "org1".into(),
                consensus_args: r#"{"ConsensusType":"TBFT"}"#.into(),
            },
            details: BlockDetailsRow {
                block_hash: "aa".into(),
                proposer_bytes: vec![7],
                proposer_signature: "c2ln".into(),
                dag: r#"{"vec":[{}]}"#.into(),
            },
            transactions: vec![TransactionRow {
                tx_id: "t1".into(),
                block_height: 0,
                chain_id: "chain1".into(),
                contract_name: "CONTRACT_MANAGE".into(),
                method: "INIT_CONTRACT".into(),
                tx_type: "INVOKE_CONTRACT".into(),
                timestamp: 1_700_000_001,
                expiration_time: 1_700_000_600,
                sequence: 3,
                gas_limit: 50_000,
                sender_org_id: "org2".into(),
                tx_status_code: "SUCCESS".into(),
            }],
            tx_details: vec![TxDetailsRow {
                tx_id: "t1".into(),
                tx_parameters: b"[]".to_vec(),
                sender_bytes: vec![1],
                endorsers_bytes: vec![2],
                tx_status_code: "SUCCESS".into(),
                rw_set_hash: "ab".into(),
                tx_message: "ok".into(),
                contract_result_code: 0,
                contract_result: vec![3, 4],
                contract_result_message: "deployed".into(),
                gas_used: 1_234,
                contract_event_bytes: vec![5],
                tx_reads_bytes: vec![6],
                tx_writes_bytes: vec![8],
            }],
            contracts: vec![ContractRow {
                name: "asset".into(),
                version: "1.0".into(),
                chain_id: "chain1".into(),
                runtime_type: "DOCKER_GO".into(),
                state: "NORMAL".into(),
                creator_org_id: "org2".into(),
                address: "0x12".into(),
                tx_id: "t1".into(),
                height: 0,
                tx_timestamp: 1_700_000_001,
                creator_bytes: vec![9],
            }],
        };
        store.store_block(&block, "g1", 1).await.unwrap();

        assert_eq!(store.block_by_height("g1", 0).await.unwrap(), Some(block.block.clone()));
        assert_eq!(store.block_details("g1", "aa").await.unwrap(), Some(block.details.clone()));
        assert_eq!(store.transaction("g1", "t1").await.unwrap(), Some(block.transactions[0].clone()));
        assert_eq!(store.tx_details("g1", "t1").await.unwrap(), Some(block.tx_details[0].clone()));
        assert_eq!(store.latest_contract("g1", "asset").await.unwrap(), Some(block.contracts[0].clone()));
    }

    #[tokio::test]
    async fn duplicate_tx_id_rolls_back_whole_block() {
        let store = store_with_chain().await;
        store.store_block(&sample_block(0, &["t1"], &[]), "g1", 1).await.unwrap();

        // Height 1 is new, but its second transaction collides with t1.
        let err = store
            .store_block(&sample_block(1, &["t9", "t1"], &[]), "g1", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Storage(_)));

        assert_eq!(store.max_stored_height("g1").await.unwrap(), Some(0));
        assert!(store.transaction("g1", "t9").await.unwrap().is_none());
        assert!(store.tx_details("g1", "t9").await.unwrap().is_none());
        assert_eq!(
            store.get_counters("g1").await.unwrap(),
            Some(AggregateCounters { block_count: 1, tx_count: 1 })
        );
    }

    #[tokio::test]
    async fn store_block_for_unknown_chain_fails() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let err = store
            .store_block(&sample_block(0, &[], &[]), "ghost", 7)
            .await
            .unwrap_err();
        assert_eq!(err, ScanError::UnknownChain("ghost".into()));
        assert_eq!(store.list_chains().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn lists_are_ordered_and_paged() {
        let store = store_with_chain().await;
        for h in 0..6 {
            let id = format!("t{h}");
            store.store_block(&sample_block(h, &[id.as_str()], &[]), "g1", 1).await.unwrap();
        }

        let blocks = store.list_blocks("g1", Page::new(0, 3)).await.unwrap();
        assert_eq!(blocks.iter().map(|b| b.block_height).collect::<Vec<_>>(), vec![5, 4, 3]);

        let txs = store
            .list_transactions("g1", &TxFilter::default(), Page::new(2, 2))
            .await
            .unwrap();
        assert_eq!(txs.iter().map(|t| t.tx_id.as_str()).collect::<Vec<_>>(), vec!["t3", "t2"]);

        let filter = TxFilter { block_height: Some(4), contract_name: Some("fact".into()) };
        let txs = store.list_transactions("g1", &filter, Page::default()).await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].tx_id, "t4");
    }

    #[tokio::test]
    async fn contract_list_keeps_latest_version_per_name() {
        let store = store_with_chain().await;
        store
            .store_block(&sample_block(0, &["a"], &[("asset", 10), ("vote", 12)]), "g1", 1)
            .await
            .unwrap();
        store
            .store_block(&sample_block(1, &["b"], &[("asset", 20)]), "g1", 1)
            .await
            .unwrap();

        let list = store.list_contracts("g1", Page::default()).await.unwrap();
        let names: Vec<_> = list.iter().map(|c| (c.name.as_str(), c.version.as_str())).collect();
        assert_eq!(names, vec![("asset", "v20"), ("vote", "v12")]);
    }

    #[tokio::test]
    async fn reader_on_unknown_chain_is_empty() {
        let store = SqliteStorage::in_memory().await.unwrap();
        assert!(store.list_blocks("nope", Page::default()).await.unwrap().is_empty());
        assert!(store.list_contracts("nope", Page::default()).await.unwrap().is_empty());
        assert!(store.transaction("nope", "t").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn subscription_upsert_roundtrip() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let mut sub = SubscriptionConfig {
            gen_hash: "g1".into(),
            chain_name: "main".into(),
            chain_id: "chain1".into(),
            node_addr: "127.0.0.1:12301".into(),
            node_use_tls: true,
            ..SubscriptionConfig::default()
        };
        store.upsert_subscription(&sub).await.unwrap();

        sub.node_addr = "127.0.0.1:12302".into();
        sub.archive_center_url = Some("http://archive".into());
        store.upsert_subscription(&sub).await.unwrap();

        let all = store.list_subscriptions().await.unwrap();
        assert_eq!(all, vec![sub.clone()]);

        store.delete_subscription("g1").await.unwrap();
        assert!(store.get_subscription("g1").await.unwrap().is_none());
    }
}
