use std::path::Path;

use anyhow::{Context, Result, bail};
use serde_json::json;

use crate::store::Store;

/// Entry point for the `show` command.
/// Prints the stored state for one symbol as a single JSON object. Read-only.
pub fn run(symbol: &str, db_path: &Path) -> Result<()> {
    if !db_path.exists() {
        bail!("No database at {}. Run `chain-ingest run` first.", db_path.display());
    }
    let store = Store::open_read_only(db_path)?;
    let report = report(&store, &symbol.trim().to_uppercase())?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Index record, totals, and the latest quote of every instrument expiring
/// on the current upcoming expiry.
pub fn report(store: &Store, symbol: &str) -> Result<serde_json::Value> {
    let Some(index) = store.get_index(symbol).context("reading index record")? else {
        bail!("No data stored for symbol '{symbol}'.");
    };

    let mut chain = Vec::new();
    for instrument in store.instruments(symbol)? {
        if instrument.expiry_date != index.upcoming_expiry_date {
            continue;
        }
        let latest = store.latest_snapshot(instrument.id)?;
        chain.push(json!({
            "strike_price": instrument.strike_price,
            "option_type": instrument.option_type,
            "latest": latest,
        }));
    }

    Ok(json!({
        "index": index,
        "instrument_count": store.count_instruments(symbol)?,
        "snapshot_count": store.count_snapshots(symbol)?,
        "chain": chain,
    }))
}
