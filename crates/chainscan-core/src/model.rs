//! Relational rows produced by the normalizer and persisted per chain shard.
//!
//! Every chain owns one set of shard tables (`block_NN`, `block_details_NN`,
//! `transaction_NN`, `tx_details_NN`, `contract_NN`). The shared tables
//! (`chain_info`, `subscription`) are keyed by genesis hash.

use serde::{Deserialize, Serialize};

use crate::config::{ClientConfig, NodeConnConfig};

// ─── Shard tables ─────────────────────────────────────────────────────────────

/// The per-shard table families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShardTable {
    Block,
    BlockDetails,
    Transaction,
    TxDetails,
    Contract,
}

impl ShardTable {
    pub const ALL: [ShardTable; 5] = [
        ShardTable::Block,
        ShardTable::BlockDetails,
        ShardTable::Transaction,
        ShardTable::TxDetails,
        ShardTable::Contract,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::BlockDetails => "block_details",
            Self::Transaction => "transaction",
            Self::TxDetails => "tx_details",
            Self::Contract => "contract",
        }
    }

    /// Physical table name for `shard`, e.g. `tx_details_03`.
    pub fn table_name(&self, shard: u32) -> String {
        format!("{}_{:02}", self.prefix(), shard)
    }
}

// ─── Block rows ───────────────────────────────────────────────────────────────

/// Narrow, list-queryable block row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRow {
    pub block_height: u64,
    pub block_hash: String,
    pub chain_id: String,
    pub pre_block_hash: String,
    pub block_type: String,
    pub block_version: u32,
    pub pre_conf_height: u64,
    pub tx_count: u32,
    pub tx_root: String,
    pub dag_hash: String,
    pub rw_set_root: String,
    pub block_timestamp: i64,
    /// Empty when the block has no proposer (genesis).
    pub proposer_org_id: String,
    pub consensus_args: String,
}

/// Wide block payload, keyed by block hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDetailsRow {
    pub block_hash: String,
    /// Binary-encoded proposer identity.
    pub proposer_bytes: Vec<u8>,
    /// Base64 of the block signature.
    pub proposer_signature: String,
    /// JSON of the block DAG.
    pub dag: String,
}

// ─── Transaction rows ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRow {
    pub tx_id: String,
    pub block_height: u64,
    pub chain_id: String,
    pub contract_name: String,
    pub method: String,
    pub tx_type: String,
    pub timestamp: i64,
    pub expiration_time: i64,
    pub sequence: u64,
    pub gas_limit: u64,
    pub sender_org_id: String,
    pub tx_status_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxDetailsRow {
    pub tx_id: String,
    /// JSON of the payload parameters; empty when there are none.
    pub tx_parameters: Vec<u8>,
    /// Binary-encoded sender endorsement entry.
    pub sender_bytes: Vec<u8>,
    /// JSON of the endorser list; empty when there are none.
    pub endorsers_bytes: Vec<u8>,
    pub tx_status_code: String,
    pub rw_set_hash: String,
    pub tx_message: String,
    pub contract_result_code: u32,
    pub contract_result: Vec<u8>,
    pub contract_result_message: String,
    pub gas_used: u64,
    /// JSON of the emitted events; empty when there are none.
    pub contract_event_bytes: Vec<u8>,
    pub tx_reads_bytes: Vec<u8>,
    pub tx_writes_bytes: Vec<u8>,
}

// ─── Contract rows ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractRow {
    pub name: String,
    pub version: String,
    pub chain_id: String,
    pub runtime_type: String,
    pub state: String,
    pub creator_org_id: String,
    pub address: String,
    pub tx_id: String,
    pub height: u64,
    pub tx_timestamp: i64,
    pub creator_bytes: Vec<u8>,
}

/// All rows produced from one raw block. Written as a single atomic unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedBlock {
    pub block: BlockRow,
    pub details: BlockDetailsRow,
    pub transactions: Vec<TransactionRow>,
    pub tx_details: Vec<TxDetailsRow>,
    pub contracts: Vec<ContractRow>,
}

impl NormalizedBlock {
    pub fn height(&self) -> u64 {
        self.block.block_height
    }

    /// Number of transaction rows this block contributes to the aggregate counter.
    pub fn tx_row_count(&self) -> u64 {
        self.transactions.len() as u64
    }
}

// ─── Chain bookkeeping ────────────────────────────────────────────────────────

/// Running totals of stored rows for one chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateCounters {
    pub block_count: u64,
    pub tx_count: u64,
}

impl AggregateCounters {
    /// Counters after storing `block`.
    pub fn after(&self, block: &NormalizedBlock) -> Self {
        Self {
            block_count: self.block_count + 1,
            tx_count: self.tx_count + block.tx_row_count(),
        }
    }
}

/// Persisted record of a chain: its identity, shard, and counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainInfo {
    pub gen_hash: String,
    pub chain_id: String,
    pub shard: u32,
    pub counters: AggregateCounters,
}

/// Persisted reconnection profile for one chain, keyed by genesis hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionConfig {
    pub gen_hash: String,
    pub chain_name: String,
    pub chain_id: String,
    pub org_id: String,
    pub node_addr: String,
    pub node_ca_cert_pem: String,
    pub node_tls_host_name: String,
    pub node_use_tls: bool,
    pub sign_cert_pem: String,
    pub sign_key_pem: String,
    pub tls_cert_pem: String,
    pub tls_key_pem: String,
    pub archive_center_url: Option<String>,
}

impl SubscriptionConfig {
    /// Capture the reconnection profile of `client`. Only the first node is kept.
    pub fn from_client(gen_hash: &str, chain_name: &str, client: &ClientConfig) -> Self {
        let node = client.nodes.first().cloned().unwrap_or_default();
        Self {
            gen_hash: gen_hash.to_string(),
            chain_name: chain_name.to_string(),
            chain_id: client.chain_id.clone(),
            org_id: client.org_id.clone(),
            node_addr: node.addr,
            node_ca_cert_pem: node.ca_cert_pem,
            node_tls_host_name: node.tls_host_name,
            node_use_tls: node.use_tls,
            sign_cert_pem: client.sign_cert_pem.clone(),
            sign_key_pem: client.sign_key_pem.clone(),
            tls_cert_pem: client.tls_cert_pem.clone(),
            tls_key_pem: client.tls_key_pem.clone(),
            archive_center_url: client.archive_center_url.clone(),
        }
    }

    /// Rebuild a client configuration from the persisted profile.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            chain_id: self.chain_id.clone(),
            org_id: self.org_id.clone(),
            sign_cert_pem: self.sign_cert_pem.clone(),
            sign_key_pem: self.sign_key_pem.clone(),
            tls_cert_pem: self.tls_cert_pem.clone(),
            tls_key_pem: self.tls_key_pem.clone(),
            archive_center_url: self.archive_center_url.clone(),
            nodes: vec![NodeConnConfig {
                addr: self.node_addr.clone(),
                use_tls: self.node_use_tls,
                ca_cert_pem: self.node_ca_cert_pem.clone(),
                tls_host_name: self.node_tls_host_name.clone(),
                ..NodeConnConfig::default()
            }],
            ..ClientConfig::default()
        }
    }
}

// ─── Paging ───────────────────────────────────────────────────────────────────

/// Offset/limit window for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

impl Page {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    /// Apply the window to an already ordered iterator.
    pub fn slice<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset as usize)
            .take(self.limit as usize)
            .collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self { offset: 0, limit: 10 }
    }
}
