//! Raw block model as delivered by the node component.
//!
//! These are the ledger's wire messages. They derive `prost::Message` for the
//! binary form (identities are stored in that form, contract descriptors are
//! decoded from it first) and `serde` for the textual form used by the
//! JSON-serialised detail columns.

use prost::{Enumeration, Message};
use serde::{Deserialize, Serialize};

/// Name of the system contract that deploys, upgrades and freezes user contracts.
pub const CONTRACT_MANAGE: &str = "CONTRACT_MANAGE";

// ─── Block ────────────────────────────────────────────────────────────────────

/// A block together with the read/write sets of its transactions.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockInfo {
    #[prost(message, optional, tag = "1")]
    pub block: Option<Block>,
    /// Present only when the stream was opened with `include_rw_set`.
    #[prost(message, repeated, tag = "2")]
    pub rwset_list: Vec<TxRwSet>,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Block {
    #[prost(message, optional, tag = "1")]
    pub header: Option<BlockHeader>,
    #[prost(message, optional, tag = "2")]
    pub dag: Option<Dag>,
    #[prost(message, repeated, tag = "3")]
    pub txs: Vec<Transaction>,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockHeader {
    #[prost(uint32, tag = "1")]
    pub block_version: u32,
    #[prost(enumeration = "BlockType", tag = "2")]
    pub block_type: i32,
    #[prost(string, tag = "3")]
    pub chain_id: String,
    #[prost(uint64, tag = "4")]
    pub block_height: u64,
    #[prost(bytes = "vec", tag = "5")]
    pub block_hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "6")]
    pub pre_block_hash: Vec<u8>,
    #[prost(uint64, tag = "7")]
    pub pre_conf_height: u64,
    #[prost(int64, tag = "8")]
    pub block_timestamp: i64,
    #[prost(uint32, tag = "9")]
    pub tx_count: u32,
    #[prost(bytes = "vec", tag = "10")]
    pub tx_root: Vec<u8>,
    #[prost(bytes = "vec", tag = "11")]
    pub dag_hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "12")]
    pub rw_set_root: Vec<u8>,
    #[prost(bytes = "vec", tag = "13")]
    pub consensus_args: Vec<u8>,
    /// Absent on the genesis block.
    #[prost(message, optional, tag = "14")]
    pub proposer: Option<Member>,
    #[prost(bytes = "vec", tag = "15")]
    pub signature: Vec<u8>,
}

/// Execution ordering of the block's transactions.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Dag {
    #[prost(message, repeated, tag = "1")]
    pub vec: Vec<DagNeighbors>,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct DagNeighbors {
    #[prost(uint32, repeated, tag = "1")]
    pub neighbors: Vec<u32>,
}

// ─── Identity ─────────────────────────────────────────────────────────────────

/// A serialized organisation member (certificate, public key, ...).
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Member {
    #[prost(string, tag = "1")]
    pub org_id: String,
    #[prost(enumeration = "MemberType", tag = "2")]
    pub member_type: i32,
    #[prost(bytes = "vec", tag = "3")]
    pub member_info: Vec<u8>,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct EndorsementEntry {
    #[prost(message, optional, tag = "1")]
    pub signer: Option<Member>,
    #[prost(bytes = "vec", tag = "2")]
    pub signature: Vec<u8>,
}

// ─── Transaction ──────────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Transaction {
    #[prost(message, optional, tag = "1")]
    pub payload: Option<Payload>,
    #[prost(message, optional, tag = "2")]
    pub sender: Option<EndorsementEntry>,
    #[prost(message, repeated, tag = "3")]
    pub endorsers: Vec<EndorsementEntry>,
    #[prost(message, optional, tag = "4")]
    pub result: Option<TxResult>,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Payload {
    #[prost(string, tag = "1")]
    pub chain_id: String,
    #[prost(enumeration = "TxType", tag = "2")]
    pub tx_type: i32,
    #[prost(string, tag = "3")]
    pub tx_id: String,
    #[prost(int64, tag = "4")]
    pub timestamp: i64,
    #[prost(int64, tag = "5")]
    pub expiration_time: i64,
    #[prost(string, tag = "6")]
    pub contract_name: String,
    #[prost(string, tag = "7")]
    pub method: String,
    #[prost(message, repeated, tag = "8")]
    pub parameters: Vec<KeyValuePair>,
    #[prost(uint64, tag = "9")]
    pub sequence: u64,
    #[prost(message, optional, tag = "10")]
    pub limit: Option<Limit>,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyValuePair {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Limit {
    #[prost(uint64, tag = "1")]
    pub gas_limit: u64,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct TxResult {
    #[prost(enumeration = "TxStatusCode", tag = "1")]
    pub code: i32,
    #[prost(message, optional, tag = "2")]
    pub contract_result: Option<ContractResult>,
    #[prost(bytes = "vec", tag = "3")]
    pub rw_set_hash: Vec<u8>,
    #[prost(string, tag = "4")]
    pub message: String,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractResult {
    /// Contract-execution status; zero means success.
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub result: Vec<u8>,
    #[prost(string, tag = "3")]
    pub message: String,
    #[prost(uint64, tag = "4")]
    pub gas_used: u64,
    #[prost(message, repeated, tag = "5")]
    pub contract_event: Vec<ContractEvent>,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractEvent {
    #[prost(string, tag = "1")]
    pub topic: String,
    #[prost(string, tag = "2")]
    pub tx_id: String,
    #[prost(string, tag = "3")]
    pub contract_name: String,
    #[prost(string, tag = "4")]
    pub contract_version: String,
    #[prost(string, repeated, tag = "5")]
    pub event_data: Vec<String>,
}

// ─── Read/write sets ──────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct TxRwSet {
    #[prost(string, tag = "1")]
    pub tx_id: String,
    #[prost(message, repeated, tag = "2")]
    pub tx_reads: Vec<TxRead>,
    #[prost(message, repeated, tag = "3")]
    pub tx_writes: Vec<TxWrite>,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct TxRead {
    #[prost(bytes = "vec", tag = "1")]
    pub key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
    #[prost(string, tag = "3")]
    pub contract_name: String,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct TxWrite {
    #[prost(bytes = "vec", tag = "1")]
    pub key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
    #[prost(string, tag = "3")]
    pub contract_name: String,
}

// ─── Contract descriptor ──────────────────────────────────────────────────────

/// Descriptor returned by the contract-management system contract.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Contract {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub version: String,
    #[prost(enumeration = "RuntimeType", tag = "3")]
    pub runtime_type: i32,
    #[prost(enumeration = "ContractStatus", tag = "4")]
    pub status: i32,
    #[prost(message, optional, tag = "5")]
    pub creator: Option<Member>,
    #[prost(string, tag = "6")]
    pub address: String,
}

// ─── Enumerations ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum BlockType {
    NormalBlock = 0,
    ConfigBlock = 1,
    ContractMgrBlock = 2,
    HasCoinbase = 4,
}

impl BlockType {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            Self::NormalBlock => "NORMAL_BLOCK",
            Self::ConfigBlock => "CONFIG_BLOCK",
            Self::ContractMgrBlock => "CONTRACT_MGR_BLOCK",
            Self::HasCoinbase => "HAS_COINBASE",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum TxType {
    InvokeContract = 0,
    QueryContract = 1,
    Subscribe = 2,
    Archive = 3,
}

impl TxType {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            Self::InvokeContract => "INVOKE_CONTRACT",
            Self::QueryContract => "QUERY_CONTRACT",
            Self::Subscribe => "SUBSCRIBE",
            Self::Archive => "ARCHIVE",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum TxStatusCode {
    Success = 0,
    Timeout = 1,
    InvalidParameter = 2,
    NoPermission = 3,
    ContractFail = 4,
    InternalError = 5,
    InvalidContractTransactionType = 10,
    InvalidContractParameterContractName = 11,
    InvalidContractParameterMethod = 12,
    GasLimitNotSet = 48,
    GasBalanceNotEnough = 49,
}

impl TxStatusCode {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Timeout => "TIMEOUT",
            Self::InvalidParameter => "INVALID_PARAMETER",
            Self::NoPermission => "NO_PERMISSION",
            Self::ContractFail => "CONTRACT_FAIL",
            Self::InternalError => "INTERNAL_ERROR",
            Self::InvalidContractTransactionType => "INVALID_CONTRACT_TRANSACTION_TYPE",
            Self::InvalidContractParameterContractName => {
                "INVALID_CONTRACT_PARAMETER_CONTRACT_NAME"
            }
            Self::InvalidContractParameterMethod => "INVALID_CONTRACT_PARAMETER_METHOD",
            Self::GasLimitNotSet => "GAS_LIMIT_NOT_SET",
            Self::GasBalanceNotEnough => "GAS_BALANCE_NOT_ENOUGH",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum ContractStatus {
    Normal = 0,
    Frozen = 1,
    Revoked = 2,
}

impl ContractStatus {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Frozen => "FROZEN",
            Self::Revoked => "REVOKED",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum RuntimeType {
    Invalid = 0,
    Native = 1,
    Wasmer = 2,
    Wxvm = 3,
    Gasm = 4,
    Evm = 5,
    DockerGo = 6,
    Java = 7,
    Go = 8,
}

impl RuntimeType {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            Self::Invalid => "INVALID",
            Self::Native => "NATIVE",
            Self::Wasmer => "WASMER",
            Self::Wxvm => "WXVM",
            Self::Gasm => "GASM",
            Self::Evm => "EVM",
            Self::DockerGo => "DOCKER_GO",
            Self::Java => "JAVA",
            Self::Go => "GO",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum MemberType {
    Cert = 0,
    CertHash = 1,
    PublicKey = 2,
    Did = 3,
    Alias = 4,
    Addr = 5,
}

/// Upper-snake name of an enumeration value, or the bare number when the
/// node sent a value this build does not know.
pub(crate) fn enum_name<E>(value: i32, name: fn(&E) -> &'static str) -> String
where
    E: TryFrom<i32>,
{
    match E::try_from(value) {
        Ok(known) => name(&known).to_string(),
        Err(_) => value.to_string(),
    }
}
