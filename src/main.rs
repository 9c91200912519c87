use clap::Parser;

use chain_ingest::run::config::default_db_path;
use chain_ingest::{logging, query, run};

mod cli;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        cli::Command::Run {
            symbol,
            interval_secs,
            timeout_secs,
            db,
            scope,
            base_url,
            once,
        } => run::run(&run::RunConfig {
            symbol,
            interval_secs,
            timeout_secs,
            db,
            base_url,
            scope,
            once,
        }),
        cli::Command::Show { symbol, db } => {
            query::run(&symbol, &db.unwrap_or_else(default_db_path))
        }
    }
}
