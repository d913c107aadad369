//! Node client and scanner configuration.

use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Hash algorithms accepted for public-key (certificate-less) clients.
pub const SUPPORTED_HASH_ALGORITHMS: [&str; 3] = ["SHA256", "SHA3_256", "SM3"];

/// Connection settings for one ledger node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConnConfig {
    /// `host:port` of the node's RPC endpoint.
    pub addr: String,
    #[serde(default = "default_conn_count")]
    pub conn_count: u32,
    #[serde(default)]
    pub use_tls: bool,
    /// PEM of the CA that signed the node's TLS certificate.
    #[serde(default)]
    pub ca_cert_pem: String,
    #[serde(default)]
    pub tls_host_name: String,
}

fn default_conn_count() -> u32 { 10 }
fn default_max_message_size() -> u32 { 512 }

impl Default for NodeConnConfig {
    fn default() -> Self {
        Self {
            addr: String::new(),
            conn_count: default_conn_count(),
            use_tls: false,
            ca_cert_pem: String::new(),
            tls_host_name: String::new(),
        }
    }
}

/// Everything needed to build a client for one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub chain_id: String,
    #[serde(default)]
    pub org_id: String,
    pub sign_key_pem: String,
    /// Empty for public-key mode.
    #[serde(default)]
    pub sign_cert_pem: String,
    /// Only consulted in public-key mode.
    #[serde(default)]
    pub hash_algorithm: String,
    #[serde(default)]
    pub tls_key_pem: String,
    #[serde(default)]
    pub tls_cert_pem: String,
    pub nodes: Vec<NodeConnConfig>,
    /// Max RPC receive size, in MiB.
    #[serde(default = "default_max_message_size")]
    pub max_receive_message_size: u32,
    /// Max RPC send size, in MiB.
    #[serde(default = "default_max_message_size")]
    pub max_send_message_size: u32,
    /// Archive service queried before the node for pruned history.
    #[serde(default)]
    pub archive_center_url: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            chain_id: String::new(),
            org_id: String::new(),
            sign_key_pem: String::new(),
            sign_cert_pem: String::new(),
            hash_algorithm: String::new(),
            tls_key_pem: String::new(),
            tls_cert_pem: String::new(),
            nodes: Vec::new(),
            max_receive_message_size: default_max_message_size(),
            max_send_message_size: default_max_message_size(),
            archive_center_url: None,
        }
    }
}

impl ClientConfig {
    /// `true` when no sign certificate is configured.
    pub fn is_public_key_mode(&self) -> bool {
        self.sign_cert_pem.is_empty()
    }

    /// Check the configuration before any connection is attempted.
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.chain_id.is_empty() {
            return Err(config_err("the chain id cannot be empty"));
        }
        if self.sign_key_pem.is_empty() {
            return Err(config_err("the sign key cannot be empty"));
        }
        if self.is_public_key_mode() {
            let known = SUPPORTED_HASH_ALGORITHMS
                .iter()
                .any(|algo| algo.eq_ignore_ascii_case(&self.hash_algorithm));
            if !known {
                return Err(config_err(format!(
                    "unknown hash algorithm '{}'",
                    self.hash_algorithm
                )));
            }
        }
        if self.nodes.is_empty() {
            return Err(config_err("at least one node must be configured"));
        }
        for node in &self.nodes {
            if node.use_tls {
                if node.ca_cert_pem.is_empty() {
                    return Err(config_err("the tls ca cert cannot be empty"));
                }
                if node.tls_host_name.is_empty() {
                    return Err(config_err("the tls host name cannot be empty"));
                }
            }
            if node.addr.is_empty() {
                return Err(config_err("the node address cannot be empty"));
            }
        }
        Ok(())
    }
}

fn config_err(msg: impl Into<String>) -> ScanError {
    ScanError::Configuration(msg.into())
}

// ─── Scanner ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Capacity of the pending-task queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize { 256 }

impl Default for PoolConfig {
    fn default() -> Self {
        Self { queue_capacity: default_queue_capacity() }
    }
}

/// Flags passed to every block subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOptions {
    #[serde(default)]
    pub include_rw_set: bool,
    #[serde(default)]
    pub header_only: bool,
}

/// Logging settings, applied by the binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Per-target overrides, e.g. `"chainscan_core::registry=debug"`.
    #[serde(default)]
    pub components: Vec<String>,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            components: Vec::new(),
            json: false,
        }
    }
}

/// Top-level scanner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// `sqlite:...` or `postgres://...`.
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub ingest: IngestOptions,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_database_url() -> String { "sqlite:./chainscan.db".to_string() }

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool: PoolConfig::default(),
            ingest: IngestOptions::default(),
            log: LogConfig::default(),
        }
    }
}
