pub mod config;
pub mod scheduler;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use crate::store::Store;
use crate::upstream::{ChainScope, NseClient};

use config::IngestConfig;
use scheduler::Poller;

/// CLI-facing config struct (before validation).
pub struct RunConfig {
    pub symbol: String,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub db: Option<PathBuf>,
    pub base_url: String,
    pub scope: ChainScope,
    pub once: bool,
}

/// Entry point for the `run` command.
///
/// Returns only on failure (or after one cycle with `--once`). Errors are
/// fatal by design: the process exits and a supervisor restarts it with a
/// fresh upstream session.
pub fn run(cli_config: &RunConfig) -> Result<()> {
    let config = IngestConfig::from_cli(cli_config)?;

    info!(
        symbol = %config.symbol,
        interval_secs = config.interval.as_secs(),
        timeout_secs = config.timeout.as_secs(),
        db = %config.db_path.display(),
        scope = ?config.scope,
        once = config.once,
        "starting option-chain ingester"
    );

    let store = Store::open(&config.db_path)?;
    let client = NseClient::new(&config.symbol, &config.base_url, config.timeout)
        .context("creating HTTP client")?;
    let mut poller = Poller::new(client, store, config.interval, config.scope);

    let rt = tokio::runtime::Runtime::new().context("creating tokio runtime")?;
    rt.block_on(async {
        if config.once {
            poller.poll_once().await?;
            info!("single pass complete, exiting");
            Ok(())
        } else {
            poller.run().await
        }
    })
    .with_context(|| format!("ingesting option chain for {}", config.symbol))
}
