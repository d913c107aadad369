//! Persistence seams and the in-memory backend.
//!
//! [`ChainStore`] is what ingestion needs: shard bookkeeping, the atomic
//! per-block write, and subscription profiles. [`ChainReader`] is the
//! read-only surface handed to query layers.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::ScanError;
use crate::model::{
    AggregateCounters, BlockDetailsRow, BlockRow, ChainInfo, ContractRow, NormalizedBlock, Page,
    SubscriptionConfig, TransactionRow, TxDetailsRow,
};

/// Shard number handed to the very first chain.
pub const FIRST_SHARD: u32 = 1;

/// Persistence used by the subscription registry and ingestion tasks.
#[async_trait]
pub trait ChainStore: Send + Sync {
    async fn get_chain(&self, gen_hash: &str) -> Result<Option<ChainInfo>, ScanError>;

    async fn shard_number(&self, gen_hash: &str) -> Result<Option<u32>, ScanError> {
        Ok(self.get_chain(gen_hash).await?.map(|c| c.shard))
    }

    /// One more than the highest shard assigned so far, or [`FIRST_SHARD`].
    async fn allocate_next_shard(&self) -> Result<u32, ScanError>;

    /// Persist a new chain record with zero counters. Fails if either the
    /// genesis hash or the shard is already taken.
    async fn create_chain(
        &self,
        gen_hash: &str,
        chain_id: &str,
        shard: u32,
    ) -> Result<ChainInfo, ScanError>;

    /// Highest stored block height of the chain, `None` when it has no blocks.
    async fn max_stored_height(&self, gen_hash: &str) -> Result<Option<u64>, ScanError>;

    async fn get_counters(&self, gen_hash: &str) -> Result<Option<AggregateCounters>, ScanError>;

    /// Write every row of `block` into `shard` and bump the chain's counters,
    /// as one atomic unit.
    async fn store_block(
        &self,
        block: &NormalizedBlock,
        gen_hash: &str,
        shard: u32,
    ) -> Result<(), ScanError>;

    async fn upsert_subscription(&self, sub: &SubscriptionConfig) -> Result<(), ScanError>;

    async fn delete_subscription(&self, gen_hash: &str) -> Result<(), ScanError>;

    async fn get_subscription(&self, gen_hash: &str) -> Result<Option<SubscriptionConfig>, ScanError>;

    async fn list_subscriptions(&self) -> Result<Vec<SubscriptionConfig>, ScanError>;

    /// All chain records, ordered by shard.
    async fn list_chains(&self) -> Result<Vec<ChainInfo>, ScanError>;
}

/// Optional filters for transaction lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxFilter {
    pub block_height: Option<u64>,
    pub contract_name: Option<String>,
}

impl TxFilter {
    pub fn matches(&self, tx: &TransactionRow) -> bool {
        self.block_height.map_or(true, |h| tx.block_height == h)
            && self
                .contract_name
                .as_deref()
                .map_or(true, |name| tx.contract_name == name)
    }
}

/// Read-only access to stored rows. Unknown chains yield empty results.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Blocks, highest first.
    async fn list_blocks(&self, gen_hash: &str, page: Page) -> Result<Vec<BlockRow>, ScanError>;

    async fn block_by_height(&self, gen_hash: &str, height: u64) -> Result<Option<BlockRow>, ScanError>;

    async fn block_details(
        &self,
        gen_hash: &str,
        block_hash: &str,
    ) -> Result<Option<BlockDetailsRow>, ScanError>;

    /// Transactions, newest timestamp first.
    async fn list_transactions(
        &self,
        gen_hash: &str,
        filter: &TxFilter,
        page: Page,
    ) -> Result<Vec<TransactionRow>, ScanError>;

    async fn transaction(&self, gen_hash: &str, tx_id: &str) -> Result<Option<TransactionRow>, ScanError>;

    async fn tx_details(&self, gen_hash: &str, tx_id: &str) -> Result<Option<TxDetailsRow>, ScanError>;

    /// Most recent version of a contract by deployment timestamp.
    async fn latest_contract(&self, gen_hash: &str, name: &str) -> Result<Option<ContractRow>, ScanError>;

    /// The latest version of every contract, newest first.
    async fn list_contracts(&self, gen_hash: &str, page: Page) -> Result<Vec<ContractRow>, ScanError>;
}

/// A backend that serves both ingestion and queries.
pub trait ChainDatabase: ChainStore + ChainReader {}

impl<T: ChainStore + ChainReader> ChainDatabase for T {}

/// Keep only the newest row per contract name, ordered newest first.
pub fn latest_per_name(rows: impl IntoIterator<Item = ContractRow>) -> Vec<ContractRow> {
    let mut latest: HashMap<String, ContractRow> = HashMap::new();
    for row in rows {
        match latest.get(&row.name) {
            Some(seen) if seen.tx_timestamp > row.tx_timestamp => {}
            _ => {
                latest.insert(row.name.clone(), row);
            }
        }
    }
    let mut out: Vec<ContractRow> = latest.into_values().collect();
    out.sort_by(|a, b| b.tx_timestamp.cmp(&a.tx_timestamp).then_with(|| a.name.cmp(&b.name)));
    out
}

// ─── In-memory backend ────────────────────────────────────────────────────────

/// Rows of one shard, in insertion order, plus the unique keys already taken.
#[derive(Debug, Default)]
struct ShardRows {
    blocks: Vec<BlockRow>,
    block_details: Vec<BlockDetailsRow>,
    transactions: Vec<TransactionRow>,
    tx_details: Vec<TxDetailsRow>,
    contracts: Vec<ContractRow>,
    heights: HashSet<u64>,
    block_hashes: HashSet<String>,
    tx_ids: HashSet<String>,
}

impl ShardRows {
    /// Enforces the same uniqueness the SQL backends declare.
    fn check_unique(&self, block: &NormalizedBlock) -> Result<(), ScanError> {
        if self.heights.contains(&block.block.block_height)
            || self.block_hashes.contains(&block.block.block_hash)
        {
            return Err(ScanError::Storage(format!(
                "duplicate block {} ({})",
                block.block.block_height, block.block.block_hash
            )));
        }
        let mut seen = HashSet::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            if self.tx_ids.contains(&tx.tx_id) || !seen.insert(tx.tx_id.as_str()) {
                return Err(ScanError::Storage(format!("duplicate transaction {}", tx.tx_id)));
            }
        }
        Ok(())
    }

    /// Only called once every check has passed.
    fn append(&mut self, block: &NormalizedBlock) {
        self.heights.insert(block.block.block_height);
        self.block_hashes.insert(block.block.block_hash.clone());
        self.tx_ids.extend(block.transactions.iter().map(|t| t.tx_id.clone()));
        self.blocks.push(block.block.clone());
        self.block_details.push(block.details.clone());
        self.transactions.extend(block.transactions.iter().cloned());
        self.tx_details.extend(block.tx_details.iter().cloned());
        self.contracts.extend(block.contracts.iter().cloned());
    }
}

#[derive(Default)]
struct MemoryState {
    chains: HashMap<String, ChainInfo>,
    subscriptions: HashMap<String, SubscriptionConfig>,
    shards: HashMap<u32, ShardRows>,
}

/// In-memory [`ChainStore`] + [`ChainReader`].
///
/// All data is lost when the process exits. [`fail_contract_writes`] makes
/// block writes that carry contract rows fail after validation, which is how
/// atomicity is exercised in tests.
///
/// [`fail_contract_writes`]: MemoryChainStore::fail_contract_writes
#[derive(Default)]
pub struct MemoryChainStore {
    state: Mutex<MemoryState>,
    fail_contracts: Mutex<bool>,
}

impl MemoryChainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make block writes that carry contract rows fail while `fail` is set.
    pub fn fail_contract_writes(&self, fail: bool) {
        *lock(&self.fail_contracts) = fail;
    }

    /// Number of rows in each table of `shard`:
    /// `(blocks, block_details, transactions, tx_details, contracts)`.
    pub fn row_counts(&self, shard: u32) -> (usize, usize, usize, usize, usize) {
        let state = lock(&self.state);
        state.shards.get(&shard).map_or((0, 0, 0, 0, 0), |s| {
            (
                s.blocks.len(),
                s.block_details.len(),
                s.transactions.len(),
                s.tx_details.len(),
                s.contracts.len(),
            )
        })
    }

    fn shard_rows<T>(&self, gen_hash: &str, f: impl FnOnce(&ShardRows) -> T) -> Option<T> {
        let state = lock(&self.state);
        let shard = state.chains.get(gen_hash)?.shard;
        state.shards.get(&shard).map(f)
    }
}

#[async_trait]
impl ChainStore for MemoryChainStore {
    async fn get_chain(&self, gen_hash: &str) -> Result<Option<ChainInfo>, ScanError> {
        Ok(lock(&self.state).chains.get(gen_hash).cloned())
    }

    async fn allocate_next_shard(&self) -> Result<u32, ScanError> {
        let state = lock(&self.state);
        Ok(state
            .chains
            .values()
            .map(|c| c.shard)
            .max()
            .map_or(FIRST_SHARD, |max| max + 1))
    }

    async fn create_chain(
        &self,
        gen_hash: &str,
        chain_id: &str,
        shard: u32,
    ) -> Result<ChainInfo, ScanError> {
        let mut state = lock(&self.state);
        if state.chains.contains_key(gen_hash) {
            return Err(ScanError::Storage(format!("chain {gen_hash} already exists")));
        }
        if state.chains.values().any(|c| c.shard == shard) {
            return Err(ScanError::Storage(format!("shard {shard} already assigned")));
        }
        let info = ChainInfo {
            gen_hash: gen_hash.to_string(),
            chain_id: chain_id.to_string(),
            shard,
            counters: AggregateCounters::default(),
        };
        state.chains.insert(gen_hash.to_string(), info.clone());
        state.shards.entry(shard).or_default();
        Ok(info)
    }

    async fn max_stored_height(&self, gen_hash: &str) -> Result<Option<u64>, ScanError> {
        Ok(self
            .shard_rows(gen_hash, |s| s.heights.iter().copied().max())
            .flatten())
    }

    async fn get_counters(&self, gen_hash: &str) -> Result<Option<AggregateCounters>, ScanError> {
        Ok(lock(&self.state).chains.get(gen_hash).map(|c| c.counters))
    }

    async fn store_block(
        &self,
        block: &NormalizedBlock,
        gen_hash: &str,
        shard: u32,
    ) -> Result<(), ScanError> {
        let fail_contracts = *lock(&self.fail_contracts);
        let mut state = lock(&self.state);

        let counters = state
            .chains
            .get(gen_hash)
            .map(|c| c.counters)
            .ok_or_else(|| ScanError::UnknownChain(gen_hash.to_string()))?;

        let rows = state.shards.entry(shard).or_default();
        rows.check_unique(block)?;
        if fail_contracts && !block.contracts.is_empty() {
            return Err(ScanError::Storage("contract insert failed".into()));
        }
        rows.append(block);

        if let Some(chain) = state.chains.get_mut(gen_hash) {
            chain.counters = counters.after(block);
        }
        Ok(())
    }

    async fn upsert_subscription(&self, sub: &SubscriptionConfig) -> Result<(), ScanError> {
        lock(&self.state)
            .subscriptions
            .insert(sub.gen_hash.clone(), sub.clone());
        Ok(())
    }

    async fn delete_subscription(&self, gen_hash: &str) -> Result<(), ScanError> {
        lock(&self.state).subscriptions.remove(gen_hash);
        Ok(())
    }

    async fn get_subscription(&self, gen_hash: &str) -> Result<Option<SubscriptionConfig>, ScanError> {
        Ok(lock(&self.state).subscriptions.get(gen_hash).cloned())
    }

    async fn list_subscriptions(&self) -> Result<Vec<SubscriptionConfig>, ScanError> {
        let mut subs: Vec<_> = lock(&self.state).subscriptions.values().cloned().collect();
        subs.sort_by(|a, b| a.gen_hash.cmp(&b.gen_hash));
        Ok(subs)
    }

    async fn list_chains(&self) -> Result<Vec<ChainInfo>, ScanError> {
        let mut chains: Vec<_> = lock(&self.state).chains.values().cloned().collect();
        chains.sort_by_key(|c| c.shard);
        Ok(chains)
    }
}

#[async_trait]
impl ChainReader for MemoryChainStore {
    async fn list_blocks(&self, gen_hash: &str, page: Page) -> Result<Vec<BlockRow>, ScanError> {
        Ok(self
            .shard_rows(gen_hash, |s| {
                let mut blocks = s.blocks.clone();
                blocks.sort_by(|a, b| b.block_height.cmp(&a.block_height));
                page.slice(blocks)
            })
            .unwrap_or_default())
    }

    async fn block_by_height(&self, gen_hash: &str, height: u64) -> Result<Option<BlockRow>, ScanError> {
        Ok(self
            .shard_rows(gen_hash, |s| {
                s.blocks.iter().find(|b| b.block_height == height).cloned()
            })
            .flatten())
    }

    async fn block_details(
        &self,
        gen_hash: &str,
        block_hash: &str,
    ) -> Result<Option<BlockDetailsRow>, ScanError> {
        Ok(self
            .shard_rows(gen_hash, |s| {
                s.block_details.iter().find(|d| d.block_hash == block_hash).cloned()
            })
            .flatten())
    }

    async fn list_transactions(
        &self,
        gen_hash: &str,
        filter: &TxFilter,
        page: Page,
    ) -> Result<Vec<TransactionRow>, ScanError> {
        Ok(self
            .shard_rows(gen_hash, |s| {
                // Newest insertion first among equal timestamps.
                let mut txs: Vec<_> = s
                    .transactions
                    .iter()
                    .rev()
                    .filter(|t| filter.matches(t))
                    .cloned()
                    .collect();
                txs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                page.slice(txs)
            })
            .unwrap_or_default())
    }

    async fn transaction(&self, gen_hash: &str, tx_id: &str) -> Result<Option<TransactionRow>, ScanError> {
        Ok(self
            .shard_rows(gen_hash, |s| s.transactions.iter().find(|t| t.tx_id == tx_id).cloned())
            .flatten())
    }

    async fn tx_details(&self, gen_hash: &str, tx_id: &str) -> Result<Option<TxDetailsRow>, ScanError> {
        Ok(self
            .shard_rows(gen_hash, |s| s.tx_details.iter().find(|t| t.tx_id == tx_id).cloned())
            .flatten())
    }

    async fn latest_contract(&self, gen_hash: &str, name: &str) -> Result<Option<ContractRow>, ScanError> {
        Ok(self
            .shard_rows(gen_hash, |s| {
                latest_per_name(s.contracts.iter().filter(|c| c.name == name).cloned())
                    .into_iter()
                    .next()
            })
            .flatten())
    }

    async fn list_contracts(&self, gen_hash: &str, page: Page) -> Result<Vec<ContractRow>, ScanError> {
        Ok(self
            .shard_rows(gen_hash, |s| page.slice(latest_per_name(s.contracts.iter().cloned())))
            .unwrap_or_default())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(height: u64, txs: &[&str], contracts: &[(&str, i64)]) -> NormalizedBlock {
        NormalizedBlock {
            block: BlockRow {
                block_height: height,
                block_hash: format!("h{height}"),
                tx_count: txs.len() as u32,
                ..BlockRow::default()
            },
            details: BlockDetailsRow {
                block_hash: format!("h{height}"),
                ..BlockDetailsRow::default()
            },
            transactions: txs
                .iter()
                .map(|id| TransactionRow {
                    tx_id: id.to_string(),
                    block_height: height,
                    timestamp: height as i64,
                    ..TransactionRow::default()
                })
                .collect(),
            tx_details: txs
                .iter()
                .map(|id| TxDetailsRow {
                    tx_id: id.to_string(),
                    ..TxDetailsRow::default()
                })
                .collect(),
            contracts: contracts
                .iter()
                .map(|(name, ts)| ContractRow {
                    name: name.to_string(),
                    tx_timestamp: *ts,
                    version: ts.to_string(),
                    ..ContractRow::default()
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn shards_start_at_one_and_increase() {
        let store = MemoryChainStore::new();
        assert_eq!(store.allocate_next_shard().await.unwrap(), FIRST_SHARD);
        store.create_chain("g1", "c1", 1).await.unwrap();
        assert_eq!(store.allocate_next_shard().await.unwrap(), 2);
        store.create_chain("g2", "c2", 2).await.unwrap();
        assert_eq!(store.allocate_next_shard().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn shard_cannot_be_assigned_twice() {
        let store = MemoryChainStore::new();
        store.create_chain("g1", "c1", 1).await.unwrap();
        assert!(store.create_chain("g2", "c2", 1).await.is_err());
        assert!(store.create_chain("g1", "c1", 2).await.is_err());
    }

    #[tokio::test]
    async fn max_height_is_none_until_first_block() {
        let store = MemoryChainStore::new();
        assert_eq!(store.max_stored_height("g1").await.unwrap(), None);
        store.create_chain("g1", "c1", 1).await.unwrap();
        assert_eq!(store.max_stored_height("g1").await.unwrap(), None);
        store.store_block(&block(0, &["a"], &[]), "g1", 1).await.unwrap();
        assert_eq!(store.max_stored_height("g1").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn store_block_updates_counters() {
        let store = MemoryChainStore::new();
        store.create_chain("g1", "c1", 1).await.unwrap();
        store.store_block(&block(0, &["a", "b"], &[("c", 1)]), "g1", 1).await.unwrap();
        store.store_block(&block(1, &["c"], &[]), "g1", 1).await.unwrap();
        assert_eq!(
            store.get_counters("g1").await.unwrap(),
            Some(AggregateCounters { block_count: 2, tx_count: 3 })
        );
        assert_eq!(store.row_counts(1), (2, 2, 3, 3, 1));
    }

    #[tokio::test]
    async fn failed_write_leaves_nothing_behind() {
        let store = MemoryChainStore::new();
        store.create_chain("g1", "c1", 1).await.unwrap();
        store.store_block(&block(0, &["a"], &[]), "g1", 1).await.unwrap();

        store.fail_contract_writes(true);
        let err = store
            .store_block(&block(1, &["b", "c"], &[("asset", 5)]), "g1", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Storage(_)));
        assert_eq!(store.row_counts(1), (1, 1, 1, 1, 0));
        assert_eq!(
            store.get_counters("g1").await.unwrap(),
            Some(AggregateCounters { block_count: 1, tx_count: 1 })
        );
        assert_eq!(store.max_stored_height("g1").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn rejected_block_can_be_written_again() {
        let store = MemoryChainStore::new();
        store.create_chain("g1", "c1", 1).await.unwrap();
        let deploy = block(0, &["a", "b"], &[("asset", 5)]);

        store.fail_contract_writes(true);
        assert!(store.store_block(&deploy, "g1", 1).await.is_err());
        store.fail_contract_writes(false);

        store.store_block(&deploy, "g1", 1).await.unwrap();
        assert_eq!(store.row_counts(1), (1, 1, 2, 2, 1));
        assert!(store.store_block(&deploy, "g1", 1).await.is_err());
        assert_eq!(store.row_counts(1), (1, 1, 2, 2, 1));
    }

    #[tokio::test]
    async fn duplicate_tx_id_rejects_the_block() {
        let store = MemoryChainStore::new();
        store.create_chain("g1", "c1", 1).await.unwrap();
        store.store_block(&block(0, &["a"], &[]), "g1", 1).await.unwrap();
        assert!(store.store_block(&block(1, &["a"], &[]), "g1", 1).await.is_err());
        assert_eq!(store.row_counts(1), (1, 1, 1, 1, 0));
    }

    #[tokio::test]
    async fn store_block_for_unknown_chain_fails() {
        let store = MemoryChainStore::new();
        let err = store.store_block(&block(0, &[], &[]), "nope", 1).await.unwrap_err();
        assert_eq!(err, ScanError::UnknownChain("nope".into()));
    }

    #[tokio::test]
    async fn reader_orders_and_pages() {
        let store = MemoryChainStore::new();
        store.create_chain("g1", "c1", 1).await.unwrap();
        for h in 0..5 {
            let id = format!("t{h}");
            store.store_block(&block(h, &[id.as_str()], &[]), "g1", 1).await.unwrap();
        }

        let blocks = store.list_blocks("g1", Page::new(1, 2)).await.unwrap();
        assert_eq!(blocks.iter().map(|b| b.block_height).collect::<Vec<_>>(), vec![3, 2]);

        let txs = store
            .list_transactions("g1", &TxFilter::default(), Page::new(0, 10))
            .await
            .unwrap();
        assert_eq!(txs[0].tx_id, "t4");

        let at_two = TxFilter { block_height: Some(2), ..TxFilter::default() };
        let txs = store.list_transactions("g1", &at_two, Page::default()).await.unwrap();
        assert_eq!(txs.len(), 1);

        assert!(store.block_by_height("g1", 3).await.unwrap().is_some());
        assert!(store.block_details("g1", "h3").await.unwrap().is_some());
        assert!(store.tx_details("g1", "t1").await.unwrap().is_some());
        assert!(store.list_blocks("unknown", Page::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn contracts_report_latest_version_per_name() {
        let store = MemoryChainStore::new();
        store.create_chain("g1", "c1", 1).await.unwrap();
        store.store_block(&block(0, &["a"], &[("asset", 10), ("vote", 11)]), "g1", 1).await.unwrap();
        store.store_block(&block(1, &["b"], &[("asset", 20)]), "g1", 1).await.unwrap();

        let latest = store.latest_contract("g1", "asset").await.unwrap().unwrap();
        assert_eq!(latest.version, "20");

        let all = store.list_contracts("g1", Page::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "asset");
        assert_eq!(all[1].name, "vote");
    }

    #[tokio::test]
    async fn subscriptions_upsert_and_delete() {
        let store = MemoryChainStore::new();
        let mut sub = SubscriptionConfig {
            gen_hash: "g1".into(),
            chain_id: "c1".into(),
            ..SubscriptionConfig::default()
        };
        store.upsert_subscription(&sub).await.unwrap();
        sub.node_addr = "n:1".into();
        store.upsert_subscription(&sub).await.unwrap();

        let subs = store.list_subscriptions().await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].node_addr, "n:1");

        store.delete_subscription("g1").await.unwrap();
        assert!(store.get_subscription("g1").await.unwrap().is_none());
    }
}
