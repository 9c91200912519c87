use clap::{Parser, Subcommand};
use std::path::PathBuf;

use chain_ingest::upstream::ChainScope;
use chain_ingest::upstream::nse::DEFAULT_BASE_URL;

/// Option-chain ingester — polls the upstream chain for one symbol and
/// stores instruments and point-in-time snapshots in SQLite.
#[derive(Parser)]
#[command(name = "chain-ingest", version, about)]
pub struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Poll the option chain for one symbol until a fetch fails
    Run {
        /// Instrument symbol to track (e.g. NIFTY, BANKNIFTY, RELIANCE)
        #[arg(long, env = "CHAIN_INGEST_SYMBOL")]
        symbol: String,

        /// Seconds between the start of consecutive polls
        #[arg(long, default_value = "90")]
        interval_secs: u64,

        /// Per-request timeout in seconds
        #[arg(long, default_value = "20")]
        timeout_secs: u64,

        /// SQLite database path (default: ~/.chain-ingest/chain.db)
        #[arg(long, env = "CHAIN_INGEST_DB")]
        db: Option<PathBuf>,

        /// Which payload section to store: nearest expiry or every expiry
        #[arg(long, value_enum, default_value = "filtered")]
        scope: ChainScope,

        /// Upstream base URL
        #[arg(long, env = "CHAIN_INGEST_BASE_URL", default_value = DEFAULT_BASE_URL)]
        base_url: String,

        /// Run one cycle then exit (for external cron)
        #[arg(long)]
        once: bool,
    },

    /// Print stored state for a symbol as JSON
    Show {
        /// Instrument symbol
        #[arg(long, env = "CHAIN_INGEST_SYMBOL")]
        symbol: String,

        /// SQLite database path (default: ~/.chain-ingest/chain.db)
        #[arg(long, env = "CHAIN_INGEST_DB")]
        db: Option<PathBuf>,
    },
}
