use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};

use crate::upstream::ChainScope;

/// Resolved, validated settings for the `run` command. Fixed for the life of
/// the process.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub symbol: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub db_path: PathBuf,
    pub base_url: String,
    pub scope: ChainScope,
    pub once: bool,
}

impl IngestConfig {
    pub fn from_cli(cli: &crate::run::RunConfig) -> Result<Self> {
        let symbol = cli.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            bail!("Symbol must not be empty. Pass --symbol or set CHAIN_INGEST_SYMBOL.");
        }
        if cli.interval_secs == 0 {
            bail!("Poll interval must be at least 1 second.");
        }
        if cli.timeout_secs == 0 {
            bail!("Request timeout must be at least 1 second.");
        }
        if !(cli.base_url.starts_with("http://") || cli.base_url.starts_with("https://")) {
            bail!("Invalid base URL '{}': expected http(s)://", cli.base_url);
        }

        Ok(IngestConfig {
            symbol,
            interval: Duration::from_secs(cli.interval_secs),
            timeout: Duration::from_secs(cli.timeout_secs),
            db_path: cli.db.clone().unwrap_or_else(default_db_path),
            base_url: cli.base_url.clone(),
            scope: cli.scope,
            once: cli.once,
        })
    }
}

/// `~/.chain-ingest/chain.db`, falling back to the working directory.
pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chain-ingest")
        .join("chain.db")
}
