use std::collections::HashSet;

use tracing::{debug, info};

use crate::differ::Decision;
use crate::error::{IngestError, Result};
use crate::store::{IndexRecord, InstrumentKey, Store};
use crate::upstream::{ChainPayload, ChainRow, ChainScope, OptionType};

/// Writes produced by one reconciliation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub rows: usize,
    pub instruments_created: usize,
    pub snapshots_written: usize,
}

/// Map `payload` into the entity graph for `symbol`.
///
/// The index record is written first, then every present side of every row.
/// Writes are individually atomic but the payload as a whole is not: an
/// interruption leaves the index already pointing at the new timestamp with
/// only part of the snapshots stored.
pub fn reconcile(
    store: &Store,
    symbol: &str,
    payload: &ChainPayload,
    decision: Decision,
    scope: ChainScope,
) -> Result<ReconcileSummary> {
    let create = match decision {
        Decision::Skip => return Ok(ReconcileSummary::default()),
        Decision::CreateIndex => true,
        Decision::Reconcile => false,
    };

    // Validate everything needed before the first write.
    let rows = payload.rows(scope)?;
    check_unique_sides(rows)?;
    let index = IndexRecord {
        symbol: symbol.to_string(),
        underlying_value: payload.records.underlying_value,
        upcoming_expiry_date: payload.upcoming_expiry()?.to_string(),
        last_updated_time: payload.timestamp().to_string(),
    };

    if create {
        info!(symbol, timestamp = %index.last_updated_time, "creating index record");
        store.create_index(&index)?;
    } else {
        debug!(symbol, timestamp = %index.last_updated_time, "updating index record");
        store.update_index(&index)?;
    }

    let mut summary = ReconcileSummary {
        rows: rows.len(),
        ..Default::default()
    };
    for row in rows {
        for option_type in OptionType::BOTH {
            write_side(store, symbol, row, option_type, payload.timestamp(), &mut summary)?;
        }
    }

    Ok(summary)
}

/// A contract may appear at most once per payload; otherwise one poll would
/// append two snapshots for the same instrument and timestamp.
fn check_unique_sides(rows: &[ChainRow]) -> Result<()> {
    let mut seen = HashSet::new();
    for row in rows {
        for option_type in OptionType::BOTH {
            if row.side(option_type).is_none() {
                continue;
            }
            if !seen.insert((row.strike_price, row.expiry_date.as_str(), option_type)) {
                return Err(IngestError::Format(format!(
                    "duplicate {option_type} at strike {} expiring {}",
                    row.strike_price, row.expiry_date
                )));
            }
        }
    }
    Ok(())
}

fn write_side(
    store: &Store,
    symbol: &str,
    row: &ChainRow,
    option_type: OptionType,
    timestamp: &str,
    summary: &mut ReconcileSummary,
) -> Result<()> {
    let Some(quote) = row.side(option_type) else {
        return Ok(());
    };

    let key = InstrumentKey {
        underlying: symbol.to_string(),
        strike_price: row.strike_price,
        expiry_date: row.expiry_date.clone(),
        option_type,
    };
    let (instrument, created) = store.get_or_create_instrument(&key)?;
    if created {
        debug!(
            symbol,
            strike = row.strike_price,
            expiry = %row.expiry_date,
            side = %option_type,
            id = instrument.id,
            "created instrument"
        );
        summary.instruments_created += 1;
    }

    store.insert_snapshot(instrument.id, quote, timestamp)?;
    summary.snapshots_written += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::differ::should_reconcile;

    fn side(last_price: f64) -> String {
        format!(
            r#"{{"change": 1.5, "changeinOpenInterest": 20, "impliedVolatility": 12.1,
                 "lastPrice": {last_price}, "openInterest": 900, "pChange": 0.4,
                 "pchangeinOpenInterest": 2.2, "underlyingValue": 100}}"#
        )
    }

    fn payload(timestamp: &str, rows: &str) -> ChainPayload {
        let body = format!(
            r#"{{"records": {{"timestamp": "{timestamp}", "underlyingValue": 100,
                 "expiryDates": ["E1", "E2"], "data": []}},
                 "filtered": {{"data": [{rows}]}}}}"#
        );
        ChainPayload::parse(&body).unwrap()
    }

    fn both_sides(strike: i64) -> String {
        format!(
            r#"{{"strikePrice": {strike}, "expiryDate": "E1", "CE": {}, "PE": {}}}"#,
            side(10.0),
            side(20.0)
        )
    }

    fn poll(store: &Store, p: &ChainPayload) -> ReconcileSummary {
        let d = should_reconcile(store, "NIFTY", p).unwrap();
        reconcile(store, "NIFTY", p, d, ChainScope::Filtered).unwrap()
    }

    #[test]
    fn test_first_poll_creates_graph() {
        let store = Store::open_in_memory().unwrap();
        let summary = poll(&store, &payload("T1", &both_sides(18000)));

        assert_eq!(
            summary,
            ReconcileSummary {
                rows: 1,
                instruments_created: 2,
                snapshots_written: 2
            }
        );
        let index = store.get_index("NIFTY").unwrap().unwrap();
        assert_eq!(index.underlying_value, 100.0);
        assert_eq!(index.upcoming_expiry_date, "E1");
        assert_eq!(index.last_updated_time, "T1");

        let instruments = store.instruments("NIFTY").unwrap();
        assert_eq!(instruments.len(), 2);
        assert!(instruments.iter().all(|i| i.strike_price == 18000 && i.expiry_date == "E1"));
    }

    #[test]
    fn test_skip_writes_nothing() {
        let store = Store::open_in_memory().unwrap();
        let p = payload("T1", &both_sides(18000));
        poll(&store, &p);

        let summary = poll(&store, &p);
        assert_eq!(summary, ReconcileSummary::default());
        assert_eq!(store.count_instruments("NIFTY").unwrap(), 2);
        assert_eq!(store.count_snapshots("NIFTY").unwrap(), 2);
    }

    #[test]
    fn test_new_timestamp_appends_snapshots_only() {
        let store = Store::open_in_memory().unwrap();
        poll(&store, &payload("T1", &both_sides(18000)));

        let summary = poll(&store, &payload("T2", &both_sides(18000)));
        assert_eq!(summary.instruments_created, 0);
        assert_eq!(summary.snapshots_written, 2);
        assert_eq!(store.get_index("NIFTY").unwrap().unwrap().last_updated_time, "T2");
        assert_eq!(store.count_instruments("NIFTY").unwrap(), 2);
        assert_eq!(store.count_snapshots("NIFTY").unwrap(), 4);

        for inst in store.instruments("NIFTY").unwrap() {
            let times: Vec<String> = store
                .snapshots(inst.id)
                .unwrap()
                .into_iter()
                .map(|s| s.last_updated_time)
                .collect();
            assert_eq!(times, vec!["T1", "T2"]);
        }
    }

    #[test]
    fn test_absent_put_side_is_skipped() {
        let store = Store::open_in_memory().unwrap();
        let row = format!(r#"{{"strikePrice": 18100, "expiryDate": "E1", "CE": {}}}"#, side(5.0));
        let summary = poll(&store, &payload("T1", &row));

        assert_eq!(summary.snapshots_written, 1);
        let instruments = store.instruments("NIFTY").unwrap();
        assert_eq!(instruments.len(), 1);
        assert_eq!(instruments[0].option_type, OptionType::Call);
    }

    #[test]
    fn test_snapshot_carries_side_fields() {
        let store = Store::open_in_memory().unwrap();
        poll(&store, &payload("T1", &both_sides(18000)));

        let put = store
            .find_instrument(&InstrumentKey {
                underlying: "NIFTY".into(),
                strike_price: 18000,
                expiry_date: "E1".into(),
                option_type: OptionType::Put,
            })
            .unwrap()
            .unwrap();
        let snap = store.latest_snapshot(put.id).unwrap().unwrap();
        assert_eq!(snap.last_price, 20.0);
        assert_eq!(snap.change_in_open_interest, 20.0);
        assert_eq!(snap.p_change_in_open_interest, 2.2);
        assert_eq!(snap.last_updated_time, "T1");
    }

    #[test]
    fn test_format_error_leaves_store_untouched() {
        let store = Store::open_in_memory().unwrap();
        let body = r#"{"records": {"timestamp": "T1", "underlyingValue": 1,
                       "expiryDates": []}, "filtered": {"data": []}}"#;
        let p = ChainPayload::parse(body).unwrap();

        let err = reconcile(&store, "NIFTY", &p, Decision::CreateIndex, ChainScope::Filtered);
        assert!(err.is_err());
        assert!(store.get_index("NIFTY").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_contract_rejected_before_writes() {
        let store = Store::open_in_memory().unwrap();
        let rows = format!("{}, {}", both_sides(18000), both_sides(18000));
        let p = payload("T1", &rows);

        let err = reconcile(&store, "NIFTY", &p, Decision::CreateIndex, ChainScope::Filtered)
            .unwrap_err();
        assert!(matches!(err, IngestError::Format(_)));
        assert!(store.get_index("NIFTY").unwrap().is_none());
        assert_eq!(store.count_snapshots("NIFTY").unwrap(), 0);
    }

    #[test]
    fn test_split_sides_of_one_strike_are_accepted() {
        let store = Store::open_in_memory().unwrap();
        let rows = format!(
            r#"{{"strikePrice": 18000, "expiryDate": "E1", "CE": {}}},
               {{"strikePrice": 18000, "expiryDate": "E1", "PE": {}}},
               {{"strikePrice": 18000, "expiryDate": "E2", "CE": {}}}"#,
            side(1.0),
            side(2.0),
            side(3.0)
        );
        let summary = poll(&store, &payload("T1", &rows));
        assert_eq!(summary.instruments_created, 3);
        assert_eq!(summary.snapshots_written, 3);
    }

    #[test]
    fn test_all_scope_reads_records_data() {
        let store = Store::open_in_memory().unwrap();
        let body = format!(
            r#"{{"records": {{"timestamp": "T1", "underlyingValue": 100, "expiryDates": ["E1", "E2"],
                 "data": [{}, {{"strikePrice": 18000, "expiryDate": "E2", "PE": {}}}]}}}}"#,
            both_sides(18000),
            side(3.0)
        );
        let p = ChainPayload::parse(&body).unwrap();
        let summary =
            reconcile(&store, "NIFTY", &p, Decision::CreateIndex, ChainScope::All).unwrap();

        assert_eq!(summary.rows, 2);
        assert_eq!(summary.instruments_created, 3);
        assert_eq!(store.get_index("NIFTY").unwrap().unwrap().upcoming_expiry_date, "E1");
    }
}
