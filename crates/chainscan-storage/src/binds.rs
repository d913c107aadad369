//! Row binders shared by the SQL backends.
//!
//! Each macro appends one `.bind(..)` per column, in the order `schema`
//! declares them, to a `sqlx::query(..)` of any dialect. Unsigned values are
//! stored as `i64`.

macro_rules! bind_block {
    ($query:expr, $row:expr) => {{
        let b: &chainscan_core::BlockRow = $row;
        $query
            .bind(b.block_height as i64)
            .bind(&b.block_hash)
            .bind(&b.chain_id)
            .bind(&b.pre_block_hash)
            .bind(&b.block_type)
            .bind(b.block_version as i64)
            .bind(b.pre_conf_height as i64)
            .bind(b.tx_count as i64)
            .bind(&b.tx_root)
            .bind(&b.dag_hash)
            .bind(&b.rw_set_root)
            .bind(b.block_timestamp)
            .bind(&b.proposer_org_id)
            .bind(&b.consensus_args)
    }};
}

macro_rules! bind_block_details {
    ($query:expr, $row:expr) => {{
        let d: &chainscan_core::BlockDetailsRow = $row;
        $query
            .bind(&d.block_hash)
            .bind(&d.proposer_bytes)
            .bind(&d.proposer_signature)
            .bind(&d.dag)
    }};
}

macro_rules! bind_transaction {
    ($query:expr, $row:expr) => {{
        let t: &chainscan_core::TransactionRow = $row;
        $query
            .bind(&t.tx_id)
            .bind(t.block_height as i64)
            .bind(&t.chain_id)
            .bind(&t.contract_name)
            .bind(&t.method)
            .bind(&t.tx_type)
            .bind(t.timestamp)
            .bind(t.expiration_time)
            .bind(t.sequence as i64)
            .bind(t.gas_limit as i64)
            .bind(&t.sender_org_id)
            .bind(&t.tx_status_code)
    }};
}

macro_rules! bind_tx_details {
    ($query:expr, $row:expr) => {{
        let t: &chainscan_core::TxDetailsRow = $row;
        $query
            .bind(&t.tx_id)
            .bind(&t.tx_parameters)
            .bind(&t.sender_bytes)
            .bind(&t.endorsers_bytes)
            .bind(&t.tx_status_code)
            .bind(&t.rw_set_hash)
            .bind(&t.tx_message)
            .bind(t.contract_result_code as i64)
            .bind(&t.contract_result)
            .bind(&t.contract_result_message)
            .bind(t.gas_used as i64)
            .bind(&t.contract_event_bytes)
            .bind(&t.tx_reads_bytes)
            .bind(&t.tx_writes_bytes)
    }};
}

macro_rules! bind_contract {
    ($query:expr, $row:expr) => {{
        let c: &chainscan_core::ContractRow = $row;
        $query
            .bind(&c.name)
            .bind(&c.version)
            .bind(&c.chain_id)
            .bind(&c.runtime_type)
            .bind(&c.state)
            .bind(&c.creator_org_id)
            .bind(&c.address)
            .bind(&c.tx_id)
            .bind(c.height as i64)
            .bind(c.tx_timestamp)
            .bind(&c.creator_bytes)
    }};
}

/// Binds every `SUBSCRIPTION_COLUMNS` value; `updated_at` is left to the caller.
macro_rules! bind_subscription {
    ($query:expr, $row:expr) => {{
        let s: &chainscan_core::SubscriptionConfig = $row;
        $query
            .bind(&s.gen_hash)
            .bind(&s.chain_name)
            .bind(&s.chain_id)
            .bind(&s.org_id)
            .bind(&s.node_addr)
            .bind(&s.node_ca_cert_pem)
            .bind(&s.node_tls_host_name)
            .bind(s.node_use_tls)
            .bind(&s.sign_cert_pem)
            .bind(&s.sign_key_pem)
            .bind(&s.tls_cert_pem)
            .bind(&s.tls_key_pem)
            .bind(&s.archive_center_url)
    }};
}

pub(crate) use {
    bind_block, bind_block_details, bind_contract, bind_subscription, bind_transaction,
    bind_tx_details,
};
