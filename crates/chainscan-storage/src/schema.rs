//! Table layout shared by the SQL backends.
//!
//! Column lists are declared once and rendered per dialect, so the SQLite
//! and PostgreSQL schemas, inserts and selects cannot drift apart.

use chainscan_core::ShardTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dialect {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Text,
    Int,
    Blob,
}

impl Dialect {
    fn sql_type(&self, kind: Kind) -> &'static str {
        match (self, kind) {
            (_, Kind::Text) => "TEXT",
            (Self::Sqlite, Kind::Int) => "INTEGER",
            (Self::Postgres, Kind::Int) => "BIGINT",
            (Self::Sqlite, Kind::Blob) => "BLOB",
            (Self::Postgres, Kind::Blob) => "BYTEA",
        }
    }

    fn id_column(&self) -> &'static str {
        match self {
            Self::Sqlite => "id INTEGER PRIMARY KEY AUTOINCREMENT",
            Self::Postgres => "id BIGSERIAL PRIMARY KEY",
        }
    }

    /// Bind placeholder number `n` (1-based).
    pub(crate) fn param(&self, n: usize) -> String {
        match self {
            Self::Sqlite => "?".to_string(),
            Self::Postgres => format!("${n}"),
        }
    }

    fn params(&self, count: usize) -> String {
        (1..=count).map(|n| self.param(n)).collect::<Vec<_>>().join(", ")
    }
}

// ─── Shard tables ─────────────────────────────────────────────────────────────

const BLOCK: &[(&str, Kind)] = &[
    ("block_height", Kind::Int),
    ("block_hash", Kind::Text),
    ("chain_id", Kind::Text),
    ("pre_block_hash", Kind::Text),
    ("block_type", Kind::Text),
    ("block_version", Kind::Int),
    ("pre_conf_height", Kind::Int),
    ("tx_count", Kind::Int),
    ("tx_root", Kind::Text),
    ("dag_hash", Kind::Text),
    ("rw_set_root", Kind::Text),
    ("block_timestamp", Kind::Int),
    ("proposer_org_id", Kind::Text),
    ("consensus_args", Kind::Text),
];

const BLOCK_DETAILS: &[(&str, Kind)] = &[
    ("block_hash", Kind::Text),
    ("proposer_bytes", Kind::Blob),
    ("proposer_signature", Kind::Text),
    ("dag", Kind::Text),
];

const TRANSACTION: &[(&str, Kind)] = &[
    ("tx_id", Kind::Text),
    ("block_height", Kind::Int),
    ("chain_id", Kind::Text),
    ("contract_name", Kind::Text),
    ("method", Kind::Text),
    ("tx_type", Kind::Text),
    ("timestamp", Kind::Int),
    ("expiration_time", Kind::Int),
    ("sequence", Kind::Int),
    ("gas_limit", Kind::Int),
    ("sender_org_id", Kind::Text),
    ("tx_status_code", Kind::Text),
];

const TX_DETAILS: &[(&str, Kind)] = &[
    ("tx_id", Kind::Text),
    ("tx_parameters", Kind::Blob),
    ("sender_bytes", Kind::Blob),
    ("endorsers_bytes", Kind::Blob),
    ("tx_status_code", Kind::Text),
    ("rw_set_hash", Kind::Text),
    ("tx_message", Kind::Text),
    ("contract_result_code", Kind::Int),
    ("contract_result", Kind::Blob),
    ("contract_result_message", Kind::Text),
    ("gas_used", Kind::Int),
    ("contract_event_bytes", Kind::Blob),
    ("tx_reads_bytes", Kind::Blob),
    ("tx_writes_bytes", Kind::Blob),
];

const CONTRACT: &[(&str, Kind)] = &[
    ("name", Kind::Text),
    ("version", Kind::Text),
    ("chain_id", Kind::Text),
    ("runtime_type", Kind::Text),
    ("state", Kind::Text),
    ("creator_org_id", Kind::Text),
    ("address", Kind::Text),
    ("tx_id", Kind::Text),
    ("height", Kind::Int),
    ("tx_timestamp", Kind::Int),
    ("creator_bytes", Kind::Blob),
];

fn columns(table: ShardTable) -> &'static [(&'static str, Kind)] {
    match table {
        ShardTable::Block => BLOCK,
        ShardTable::BlockDetails => BLOCK_DETAILS,
        ShardTable::Transaction => TRANSACTION,
        ShardTable::TxDetails => TX_DETAILS,
        ShardTable::Contract => CONTRACT,
    }
}

/// Unique and secondary indexes of each shard table: `(suffix, columns, unique)`.
fn indexes(table: ShardTable) -> &'static [(&'static str, &'static str, bool)] {
    match table {
        ShardTable::Block => &[
            ("height", "block_height", true),
            ("hash", "block_hash", true),
            ("ts", "block_timestamp", false),
        ],
        ShardTable::BlockDetails => &[("hash", "block_hash", true)],
        ShardTable::Transaction => &[
            ("tx_id", "tx_id", true),
            ("height", "block_height", false),
            ("contract", "contract_name", false),
            ("ts", "timestamp", false),
        ],
        ShardTable::TxDetails => &[("tx_id", "tx_id", true)],
        ShardTable::Contract => &[("name", "name", false), ("ts", "tx_timestamp", false)],
    }
}

/// `CREATE TABLE` + `CREATE INDEX` statements for every table of `shard`.
pub(crate) fn shard_ddl(dialect: Dialect, shard: u32) -> Vec<String> {
    let mut stmts = Vec::new();
    for table in ShardTable::ALL {
        let name = table.table_name(shard);
        let cols: Vec<String> = columns(table)
            .iter()
            .map(|(col, kind)| {
                // Blobs are nullable: an empty blob may come back as NULL.
                let null = if *kind == Kind::Blob { "" } else { " NOT NULL" };
                format!("{col} {}{null}", dialect.sql_type(*kind))
            })
            .collect();
        stmts.push(format!(
            "CREATE TABLE IF NOT EXISTS {name} ({}, {})",
            dialect.id_column(),
            cols.join(", ")
        ));
        for (suffix, cols, unique) in indexes(table) {
            let unique = if *unique { "UNIQUE " } else { "" };
            stmts.push(format!(
                "CREATE {unique}INDEX IF NOT EXISTS idx_{name}_{suffix} ON {name} ({cols})"
            ));
        }
    }
    stmts
}

/// `INSERT INTO <table>_NN (...) VALUES (...)`.
pub(crate) fn insert_sql(dialect: Dialect, table: ShardTable, shard: u32) -> String {
    let cols = columns(table);
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.table_name(shard),
        column_list(table),
        dialect.params(cols.len())
    )
}

/// Comma-separated column names, in declaration order.
pub(crate) fn column_list(table: ShardTable) -> String {
    columns(table)
        .iter()
        .map(|(col, _)| *col)
        .collect::<Vec<_>>()
        .join(", ")
}

// ─── Shared tables ────────────────────────────────────────────────────────────

pub(crate) fn shared_ddl(dialect: Dialect) -> Vec<String> {
    let int = dialect.sql_type(Kind::Int);
    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS chain_info (
                gen_hash    TEXT PRIMARY KEY,
                chain_id    TEXT NOT NULL,
                shard       {int} NOT NULL UNIQUE,
                block_count {int} NOT NULL DEFAULT 0,
                tx_count    {int} NOT NULL DEFAULT 0,
                created_at  {int} NOT NULL,
                updated_at  {int} NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS subscription (
                gen_hash           TEXT PRIMARY KEY,
                chain_name         TEXT NOT NULL,
                chain_id           TEXT NOT NULL,
                org_id             TEXT NOT NULL,
                node_addr          TEXT NOT NULL,
                node_ca_cert_pem   TEXT NOT NULL,
                node_tls_host_name TEXT NOT NULL,
                node_use_tls       BOOLEAN NOT NULL,
                sign_cert_pem      TEXT NOT NULL,
                sign_key_pem       TEXT NOT NULL,
                tls_cert_pem       TEXT NOT NULL,
                tls_key_pem        TEXT NOT NULL,
                archive_center_url TEXT,
                updated_at         {int} NOT NULL
            )"
        ),
    ]
}

pub(crate) const SUBSCRIPTION_COLUMNS: &str = "gen_hash, chain_name, chain_id, org_id, node_addr, \
    node_ca_cert_pem, node_tls_host_name, node_use_tls, sign_cert_pem, sign_key_pem, \
    tls_cert_pem, tls_key_pem, archive_center_url";

/// Insert-or-replace of a subscription profile; `updated_at` is the 14th parameter.
pub(crate) fn upsert_subscription_sql(dialect: Dialect) -> String {
    let updates = SUBSCRIPTION_COLUMNS
        .split(", ")
        .skip(1)
        .chain(std::iter::once("updated_at"))
        .map(|col| format!("{col} = excluded.{col}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO subscription ({SUBSCRIPTION_COLUMNS}, updated_at) VALUES ({})
         ON CONFLICT (gen_hash) DO UPDATE SET {updates}",
        dialect.params(14)
    )
}

/// Newest row per contract name, newest first. Takes limit and offset.
pub(crate) fn latest_contracts_sql(dialect: Dialect, shard: u32) -> String {
    let table = ShardTable::Contract.table_name(shard);
    format!(
        "SELECT {cols} FROM {table} c
         WHERE c.id = (
             SELECT c2.id FROM {table} c2 WHERE c2.name = c.name
             ORDER BY c2.tx_timestamp DESC, c2.id DESC LIMIT 1
         )
         ORDER BY c.tx_timestamp DESC, c.name ASC
         LIMIT {} OFFSET {}",
        dialect.param(1),
        dialect.param(2),
        cols = column_list(ShardTable::Contract),
    )
}
