//! Block normalizer: turns one raw block into the rows of one shard write.
//!
//! Normalization is all-or-nothing. Any field that cannot be serialised, or a
//! contract descriptor that cannot be decoded, fails the whole block so that a
//! partially normalized block is never handed to storage.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use prost::Message;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::error::ScanError;
use crate::model::{
    BlockDetailsRow, BlockRow, ContractRow, NormalizedBlock, TransactionRow, TxDetailsRow,
};
use crate::raw::{
    enum_name, BlockHeader, BlockInfo, BlockType, Contract, ContractStatus, RuntimeType,
    Transaction, TxRwSet, TxStatusCode, TxType, CONTRACT_MANAGE,
};

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("block has no header")]
    MissingHeader,

    #[error("transaction #{index} has no payload")]
    MissingPayload { index: usize },

    #[error("failed to serialize {field}: {source}")]
    Serialize {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("undecodable contract descriptor in tx {tx_id} (binary: {binary}; text: {text})")]
    ContractDescriptor {
        tx_id: String,
        binary: String,
        text: String,
    },
}

impl From<NormalizeError> for ScanError {
    fn from(e: NormalizeError) -> Self {
        ScanError::Normalization(e.to_string())
    }
}

/// Which encoding a contract descriptor was successfully decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorEncoding {
    Binary,
    Text,
}

impl DescriptorEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Text => "text",
        }
    }
}

/// Decode a contract descriptor, binary form first, then JSON text.
pub fn decode_contract_descriptor(
    tx_id: &str,
    bytes: &[u8],
) -> Result<(Contract, DescriptorEncoding), NormalizeError> {
    let binary = match Contract::decode(bytes) {
        Ok(contract) => return Ok((contract, DescriptorEncoding::Binary)),
        Err(e) => e,
    };
    match serde_json::from_slice::<Contract>(bytes) {
        Ok(contract) => Ok((contract, DescriptorEncoding::Text)),
        Err(text) => Err(NormalizeError::ContractDescriptor {
            tx_id: tx_id.to_string(),
            binary: binary.to_string(),
            text: text.to_string(),
        }),
    }
}

/// Normalize a raw block into rows.
pub fn normalize(info: &BlockInfo) -> Result<NormalizedBlock, NormalizeError> {
    let block = info.block.as_ref().ok_or(NormalizeError::MissingHeader)?;
    let header = block.header.as_ref().ok_or(NormalizeError::MissingHeader)?;

    let mut row = block_row(header);
    let mut details = BlockDetailsRow {
        block_hash: row.block_hash.clone(),
        dag: to_json("dag", &block.dag.clone().unwrap_or_default())?,
        ..BlockDetailsRow::default()
    };

    // The genesis block carries no proposer.
    if let Some(proposer) = &header.proposer {
        row.proposer_org_id = proposer.org_id.clone();
        details.proposer_bytes = proposer.encode_to_vec();
        details.proposer_signature = BASE64.encode(&header.signature);
    }

    let mut out = NormalizedBlock {
        block: row,
        details,
        transactions: Vec::with_capacity(block.txs.len()),
        tx_details: Vec::with_capacity(block.txs.len()),
        contracts: Vec::new(),
    };

    for (index, tx) in block.txs.iter().enumerate() {
        let rw_set = info
            .rwset_list
            .iter()
            .find(|set| tx.payload.as_ref().is_some_and(|p| p.tx_id == set.tx_id));
        let (tx_row, details_row, contract) = normalize_tx(index, tx, header, rw_set)?;
        out.transactions.push(tx_row);
        out.tx_details.push(details_row);
        out.contracts.extend(contract);
    }

    debug!(
        height = out.block.block_height,
        txs = out.transactions.len(),
        contracts = out.contracts.len(),
        "block normalized"
    );
    Ok(out)
}

fn block_row(header: &BlockHeader) -> BlockRow {
    BlockRow {
        block_height: header.block_height,
        block_hash: hex::encode(&header.block_hash),
        chain_id: header.chain_id.clone(),
        pre_block_hash: hex::encode(&header.pre_block_hash),
        block_type: enum_name(header.block_type, BlockType::as_str_name),
        block_version: header.block_version,
        pre_conf_height: header.pre_conf_height,
        tx_count: header.tx_count,
        tx_root: hex::encode(&header.tx_root),
        dag_hash: hex::encode(&header.dag_hash),
        rw_set_root: hex::encode(&header.rw_set_root),
        block_timestamp: header.block_timestamp,
        proposer_org_id: String::new(),
        consensus_args: hex::encode(&header.consensus_args),
    }
}

fn normalize_tx(
    index: usize,
    tx: &Transaction,
    header: &BlockHeader,
    rw_set: Option<&TxRwSet>,
) -> Result<(TransactionRow, TxDetailsRow, Option<ContractRow>), NormalizeError> {
    let payload = tx
        .payload
        .as_ref()
        .ok_or(NormalizeError::MissingPayload { index })?;

    let mut row = TransactionRow {
        tx_id: payload.tx_id.clone(),
        block_height: header.block_height,
        chain_id: header.chain_id.clone(),
        contract_name: payload.contract_name.clone(),
        method: payload.method.clone(),
        tx_type: enum_name(payload.tx_type, TxType::as_str_name),
        timestamp: payload.timestamp,
        expiration_time: payload.expiration_time,
        sequence: payload.sequence,
        gas_limit: payload.limit.as_ref().map_or(0, |l| l.gas_limit),
        ..TransactionRow::default()
    };
    let mut details = TxDetailsRow {
        tx_id: payload.tx_id.clone(),
        ..TxDetailsRow::default()
    };
    let mut contract = None;

    if let Some(result) = &tx.result {
        let status = enum_name(result.code, TxStatusCode::as_str_name);
        row.tx_status_code = status.clone();
        details.tx_status_code = status;
        details.rw_set_hash = hex::encode(&result.rw_set_hash);
        details.tx_message = result.message.clone();

        if let Some(cr) = &result.contract_result {
            details.contract_result_code = cr.code;
            details.contract_result = cr.result.clone();
            details.contract_result_message = cr.message.clone();
            details.gas_used = cr.gas_used;
            if !cr.contract_event.is_empty() {
                details.contract_event_bytes = to_json_bytes("contract events", &cr.contract_event)?;
            }

            // Every management result must decode; only successful ones become rows.
            if payload.contract_name == CONTRACT_MANAGE {
                let (descriptor, encoding) = decode_contract_descriptor(&payload.tx_id, &cr.result)?;
                let succeeded = result.code == TxStatusCode::Success as i32 && cr.code == 0;
                debug!(
                    tx_id = %payload.tx_id,
                    contract = %descriptor.name,
                    encoding = encoding.as_str(),
                    succeeded,
                    "contract descriptor decoded"
                );
                if succeeded {
                    contract = Some(contract_row(&descriptor, payload.tx_id.clone(), payload.timestamp, header));
                }
            }
        }
    }

    if !payload.parameters.is_empty() {
        details.tx_parameters = to_json_bytes("parameters", &payload.parameters)?;
    }

    if let Some(sender) = &tx.sender {
        if let Some(signer) = &sender.signer {
            row.sender_org_id = signer.org_id.clone();
            details.sender_bytes = sender.encode_to_vec();
        }
    }

    if !tx.endorsers.is_empty() {
        details.endorsers_bytes = to_json_bytes("endorsers", &tx.endorsers)?;
    }

    if let Some(set) = rw_set {
        if !set.tx_reads.is_empty() {
            details.tx_reads_bytes = to_json_bytes("tx reads", &set.tx_reads)?;
        }
        if !set.tx_writes.is_empty() {
            details.tx_writes_bytes = to_json_bytes("tx writes", &set.tx_writes)?;
        }
    }

    Ok((row, details, contract))
}

fn contract_row(descriptor: &Contract, tx_id: String, tx_timestamp: i64, header: &BlockHeader) -> ContractRow {
    let (creator_org_id, creator_bytes) = descriptor
        .creator
        .as_ref()
        .map(|c| (c.org_id.clone(), c.encode_to_vec()))
        .unwrap_or_default();
    ContractRow {
        name: descriptor.name.clone(),
        version: descriptor.version.clone(),
        chain_id: header.chain_id.clone(),
        runtime_type: enum_name(descriptor.runtime_type, RuntimeType::as_str_name),
        state: enum_name(descriptor.status, ContractStatus::as_str_name),
        creator_org_id,
        address: descriptor.address.clone(),
        tx_id,
        height: header.block_height,
        tx_timestamp,
        creator_bytes,
    }
}

fn to_json<T: Serialize + ?Sized>(field: &'static str, value: &T) -> Result<String, NormalizeError> {
    serde_json::to_string(value).map_err(|source| NormalizeError::Serialize { field, source })
}

fn to_json_bytes<T: Serialize + ?Sized>(field: &'static str, value: &T) -> Result<Vec<u8>, NormalizeError> {
    serde_json::to_vec(value).map_err(|source| NormalizeError::Serialize { field, source })
}
