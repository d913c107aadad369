//! chainscan CLI: inspect persisted chains and manage subscriptions.
//!
//! Usage:
//! ```bash
//! chainscan info
//! chainscan --config chainscan.yaml chains
//! chainscan blocks --chain <gen_hash> --limit 20
//! chainscan txs --chain <gen_hash> --contract fact
//! chainscan unsubscribe --chain <gen_hash>
//! ```
//!
//! The CLI reads the store directly and never talks to a node.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;

use chainscan_core::{ChainDatabase, ChainReader, ChainStore, Page, ScannerConfig, TxFilter};

mod telemetry;

#[derive(Parser)]
#[command(
    name = "chainscan",
    about = "ChainMaker block ingestion: ChainScan CLI",
    long_about = "
ChainScan CLI: inspect the chains, blocks, transactions and contracts that the
scanner has ingested, and manage persisted subscriptions.

ENVIRONMENT VARIABLES:
  CHAINSCAN_DATABASE_URL   Overrides `database_url` from the config file
  RUST_LOG                 Overrides the configured log filter
",
    version
)]
struct Cli {
    /// YAML config file (default: built-in defaults)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Storage URL: `sqlite:<path>`, `postgres://...` or `memory:`
    #[arg(long, global = true, env = "CHAINSCAN_DATABASE_URL")]
    database_url: Option<String>,

    /// Print rows as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the effective configuration
    Info,

    /// List every chain with its shard and counters
    Chains,

    /// List persisted subscription profiles (keys are redacted)
    Subscriptions,

    /// List blocks of a chain, newest first
    Blocks {
        /// Genesis block hash of the chain
        #[arg(long)]
        chain: String,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = 10)]
        limit: u64,
    },

    /// List transactions of a chain, newest first
    Txs {
        #[arg(long)]
        chain: String,
        /// Only transactions of this block height
        #[arg(long)]
        height: Option<u64>,
        /// Only transactions invoking this contract
        #[arg(long)]
        contract: Option<String>,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = 10)]
        limit: u64,
    },

    /// List the latest version of every contract on a chain
    Contracts {
        #[arg(long)]
        chain: String,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = 10)]
        limit: u64,
    },

    /// Delete a persisted subscription so the next start skips the chain
    Unsubscribe {
        #[arg(long)]
        chain: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ScannerConfig::default(),
    };
    if let Some(url) = &cli.database_url {
        config.database_url = url.clone();
    }
    telemetry::init_tracing(&config.log);

    match cli.command {
        Commands::Info => cmd_info(&config),
        command => run(command, &config, Output { json: cli.json }).await,
    }
}

async fn run(command: Commands, config: &ScannerConfig, out: Output) -> Result<()> {
    let store = chainscan_storage::open(&config.database_url)
        .await
        .with_context(|| format!("opening {}", config.database_url))?;
    debug!(url = %config.database_url, "store opened");

    match command {
        Commands::Info => cmd_info(config),
        Commands::Chains => cmd_chains(store.as_ref(), out).await,
        Commands::Subscriptions => cmd_subscriptions(store.as_ref(), out).await,
        Commands::Blocks { chain, offset, limit } => {
            let rows = store.list_blocks(&chain, Page::new(offset, limit)).await?;
            out.rows(&rows, |b| {
                format!(
                    "{:>10}  {}  txs={:<4} ts={}",
                    b.block_height, b.block_hash, b.tx_count, b.block_timestamp
                )
            })
        }
        Commands::Txs { chain, height, contract, offset, limit } => {
            let filter = TxFilter { block_height: height, contract_name: contract };
            let rows = store
                .list_transactions(&chain, &filter, Page::new(offset, limit))
                .await?;
            out.rows(&rows, |t| {
                format!(
                    "{}  height={:<8} {}.{}  {}",
                    t.tx_id, t.block_height, t.contract_name, t.method, t.tx_status_code
                )
            })
        }
        Commands::Contracts { chain, offset, limit } => {
            let rows = store.list_contracts(&chain, Page::new(offset, limit)).await?;
            out.rows(&rows, |c| {
                format!(
                    "{:<24} v{:<10} {:<12} {}  height={}",
                    c.name, c.version, c.runtime_type, c.state, c.height
                )
            })
        }
        Commands::Unsubscribe { chain } => cmd_unsubscribe(store.as_ref(), &chain).await,
    }
}

fn load_config(path: &Path) -> Result<ScannerConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    parse_config(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn parse_config(text: &str) -> Result<ScannerConfig> {
    let config: ScannerConfig = serde_yaml::from_str(text)?;
    if config.pool.queue_capacity == 0 {
        bail!("pool.queue_capacity must be at least 1");
    }
    Ok(config)
}

fn cmd_info(config: &ScannerConfig) -> Result<()> {
    println!("ChainScan v{}", env!("CARGO_PKG_VERSION"));
    println!("  Database:             {}", config.database_url);
    println!("  Worker queue:         {} tasks", config.pool.queue_capacity);
    println!("  Include rw-sets:      {}", config.ingest.include_rw_set);
    println!("  Header only:          {}", config.ingest.header_only);
    println!("  Log level:            {}", telemetry::directives(&config.log));
    println!("  Storage backends:     memory, SQLite, PostgreSQL");
    Ok(())
}

async fn cmd_chains(store: &dyn ChainDatabase, out: Output) -> Result<()> {
    let chains = store.list_chains().await?;
    out.rows(&chains, |c| {
        format!(
            "shard {:02}  {}  chain={}  blocks={}  txs={}",
            c.shard, c.gen_hash, c.chain_id, c.counters.block_count, c.counters.tx_count
        )
    })
}

async fn cmd_subscriptions(store: &dyn ChainDatabase, out: Output) -> Result<()> {
    let mut subs = store.list_subscriptions().await?;
    for sub in &mut subs {
        for secret in [&mut sub.sign_key_pem, &mut sub.tls_key_pem] {
            if !secret.is_empty() {
                *secret = "<redacted>".into();
            }
        }
    }
    out.rows(&subs, |s| {
        format!(
            "{}  name={}  chain={}  node={}{}",
            s.gen_hash,
            s.chain_name,
            s.chain_id,
            s.node_addr,
            if s.node_use_tls { " (tls)" } else { "" }
        )
    })
}

async fn cmd_unsubscribe(store: &dyn ChainDatabase, gen_hash: &str) -> Result<()> {
    if store.get_subscription(gen_hash).await?.is_none() {
        bail!("no subscription for {gen_hash}");
    }
    store.delete_subscription(gen_hash).await?;
    println!("Removed subscription {gen_hash}; stored blocks are kept.");
    Ok(())
}

#[derive(Clone, Copy)]
struct Output {
    json: bool,
}

impl Output {
    fn rows<T: Serialize>(&self, rows: &[T], text: impl Fn(&T) -> String) -> Result<()> {
        if rows.is_empty() && !self.json {
            println!("(none)");
        }
        for row in rows {
            if self.json {
                println!("{}", serde_json::to_string(row)?);
            } else {
                println!("{}", text(row));
            }
        }
        Ok(())
    }
}
