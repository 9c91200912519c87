pub mod models;

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};

use crate::error::{IngestError, Result};
use crate::upstream::{ContractQuote, OptionType};

pub use models::{IndexRecord, Instrument, InstrumentKey, Snapshot};

/// How long a writer waits on a lock held by another ingester process.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// SQLite-backed option-chain store.
///
/// Several ingesters (one per symbol) may share a database file. The only
/// cross-process contention point is instrument creation, which relies on the
/// `options` unique constraint rather than on a read-then-insert.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("creating db directory")?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("opening sqlite at {}", path.display()))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::init(conn).with_context(|| format!("initializing {}", path.display()))
    }

    /// Open an existing database without write access. The schema is not
    /// created or migrated, so a file that was never ingested into fails on
    /// the first query.
    pub fn open_read_only(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .with_context(|| format!("opening sqlite read-only at {}", path.display()))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Store { conn })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::init(conn)?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrate(&conn)?;
        Ok(Store { conn })
    }

    // ── Index records ───────────────────────────────────────────────

    pub fn get_index(&self, symbol: &str) -> Result<Option<IndexRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT symbol, underlying_value, upcoming_expiry_date, last_updated_time
                 FROM option_indices WHERE symbol = ?1",
                [symbol],
                |row| {
                    Ok(IndexRecord {
                        symbol: row.get(0)?,
                        underlying_value: row.get(1)?,
                        upcoming_expiry_date: row.get(2)?,
                        last_updated_time: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Create the index record. If an overlapping instance created it first,
    /// its fields are overwritten rather than failing.
    pub fn create_index(&self, record: &IndexRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO option_indices (symbol, underlying_value, upcoming_expiry_date, last_updated_time)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(symbol) DO UPDATE SET
                underlying_value = excluded.underlying_value,
                upcoming_expiry_date = excluded.upcoming_expiry_date,
                last_updated_time = excluded.last_updated_time",
            params![
                record.symbol,
                record.underlying_value,
                record.upcoming_expiry_date,
                record.last_updated_time
            ],
        )?;
        Ok(())
    }

    pub fn update_index(&self, record: &IndexRecord) -> Result<()> {
        let n = self.conn.execute(
            "UPDATE option_indices
             SET underlying_value = ?2, upcoming_expiry_date = ?3, last_updated_time = ?4
             WHERE symbol = ?1",
            params![
                record.symbol,
                record.underlying_value,
                record.upcoming_expiry_date,
                record.last_updated_time
            ],
        )?;
        if n == 0 {
            return Err(IngestError::Persistence(rusqlite::Error::QueryReturnedNoRows));
        }
        Ok(())
    }

    // ── Instruments ─────────────────────────────────────────────────

    /// Return the instrument for `key`, creating it if absent.
    ///
    /// The boolean is true when this call created the row. A concurrent
    /// creator losing the race on the unique key simply reads the winner's row.
    pub fn get_or_create_instrument(&self, key: &InstrumentKey) -> Result<(Instrument, bool)> {
        let inserted = self.conn.execute(
            "INSERT INTO options (underlying, strike_price, expiry_date, option_type)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(underlying, strike_price, expiry_date, option_type) DO NOTHING",
            params![
                key.underlying,
                key.strike_price,
                key.expiry_date,
                key.option_type.as_str()
            ],
        )?;

        let instrument = self
            .find_instrument(key)?
            .ok_or(IngestError::Persistence(rusqlite::Error::QueryReturnedNoRows))?;
        Ok((instrument, inserted == 1))
    }

    pub fn find_instrument(&self, key: &InstrumentKey) -> Result<Option<Instrument>> {
        let instrument = self
            .conn
            .query_row(
                "SELECT id, underlying, strike_price, expiry_date, option_type FROM options
                 WHERE underlying = ?1 AND strike_price = ?2 AND expiry_date = ?3 AND option_type = ?4",
                params![
                    key.underlying,
                    key.strike_price,
                    key.expiry_date,
                    key.option_type.as_str()
                ],
                instrument_from_row,
            )
            .optional()?;
        Ok(instrument)
    }

    pub fn instruments(&self, underlying: &str) -> Result<Vec<Instrument>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, underlying, strike_price, expiry_date, option_type FROM options
             WHERE underlying = ?1 ORDER BY expiry_date, strike_price, option_type",
        )?;
        let rows = stmt
            .query_map([underlying], instrument_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn count_instruments(&self, underlying: &str) -> Result<u64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM options WHERE underlying = ?1",
            [underlying],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    // ── Snapshots ───────────────────────────────────────────────────

    /// Append a snapshot for `instrument_id`. Returns the new row id.
    pub fn insert_snapshot(
        &self,
        instrument_id: i64,
        quote: &ContractQuote,
        last_updated_time: &str,
    ) -> Result<i64> {
        let created_at = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO option_chain_data (
                option_id, change, change_in_open_interest, implied_volatility, last_price,
                open_interest, p_change, p_change_in_open_interest, underlying_value,
                last_updated_time, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                instrument_id,
                quote.change,
                quote.change_in_open_interest,
                quote.implied_volatility,
                quote.last_price,
                quote.open_interest,
                quote.p_change,
                quote.p_change_in_open_interest,
                quote.underlying_value,
                last_updated_time,
                created_at
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All snapshots of one instrument, oldest first.
    pub fn snapshots(&self, instrument_id: i64) -> Result<Vec<Snapshot>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM option_chain_data WHERE option_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt
            .query_map([instrument_id], snapshot_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn latest_snapshot(&self, instrument_id: i64) -> Result<Option<Snapshot>> {
        let snapshot = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM option_chain_data
                     WHERE option_id = ?1 ORDER BY id DESC LIMIT 1"
                ),
                [instrument_id],
                snapshot_from_row,
            )
            .optional()?;
        Ok(snapshot)
    }

    pub fn count_snapshots(&self, underlying: &str) -> Result<u64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM option_chain_data d
             JOIN options o ON o.id = d.option_id
             WHERE o.underlying = ?1",
            [underlying],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }
}

const SNAPSHOT_COLUMNS: &str = "id, option_id, change, change_in_open_interest, implied_volatility, \
     last_price, open_interest, p_change, p_change_in_open_interest, underlying_value, \
     last_updated_time, created_at";

fn instrument_from_row(row: &Row<'_>) -> rusqlite::Result<Instrument> {
    let raw_type: String = row.get(4)?;
    let option_type = OptionType::parse(&raw_type).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown option type `{raw_type}`").into(),
        )
    })?;
    Ok(Instrument {
        id: row.get(0)?,
        underlying: row.get(1)?,
        strike_price: row.get(2)?,
        expiry_date: row.get(3)?,
        option_type,
    })
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<Snapshot> {
    Ok(Snapshot {
        id: row.get(0)?,
        instrument_id: row.get(1)?,
        change: row.get(2)?,
        change_in_open_interest: row.get(3)?,
        implied_volatility: row.get(4)?,
        last_price: row.get(5)?,
        open_interest: row.get(6)?,
        p_change: row.get(7)?,
        p_change_in_open_interest: row.get(8)?,
        underlying_value: row.get(9)?,
        last_updated_time: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS option_indices (
            symbol                TEXT PRIMARY KEY,
            underlying_value      REAL NOT NULL,
            upcoming_expiry_date  TEXT NOT NULL,
            last_updated_time     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS options (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            underlying    TEXT NOT NULL,
            strike_price  INTEGER NOT NULL,
            expiry_date   TEXT NOT NULL,
            option_type   TEXT NOT NULL CHECK (option_type IN ('CALL', 'PUT')),
            UNIQUE(underlying, strike_price, expiry_date, option_type)
        );

        CREATE TABLE IF NOT EXISTS option_chain_data (
            id                         INTEGER PRIMARY KEY AUTOINCREMENT,
            option_id                  INTEGER NOT NULL REFERENCES options(id),
            change                     REAL NOT NULL,
            change_in_open_interest    REAL NOT NULL,
            implied_volatility         REAL NOT NULL,
            last_price                 REAL NOT NULL,
            open_interest              REAL NOT NULL,
            p_change                   REAL NOT NULL,
            p_change_in_open_interest  REAL NOT NULL,
            underlying_value           REAL NOT NULL,
            last_updated_time          TEXT NOT NULL,
            created_at                 TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chain_data_option ON option_chain_data(option_id);
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(strike: i64, option_type: OptionType) -> InstrumentKey {
        InstrumentKey {
            underlying: "NIFTY".into(),
            strike_price: strike,
            expiry_date: "E1".into(),
            option_type,
        }
    }

    fn quote(last_price: f64) -> ContractQuote {
        ContractQuote {
            change: 0.5,
            change_in_open_interest: 10.0,
            implied_volatility: 14.2,
            last_price,
            open_interest: 1000.0,
            p_change: 0.3,
            p_change_in_open_interest: 1.0,
            underlying_value: 18010.0,
        }
    }

    #[test]
    fn test_index_create_then_update() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_index("NIFTY").unwrap().is_none());

        let mut record = IndexRecord {
            symbol: "NIFTY".into(),
            underlying_value: 100.0,
            upcoming_expiry_date: "E1".into(),
            last_updated_time: "T1".into(),
        };
        store.create_index(&record).unwrap();
        assert_eq!(store.get_index("NIFTY").unwrap().as_ref(), Some(&record));

        record.last_updated_time = "T2".into();
        record.underlying_value = 101.5;
        store.update_index(&record).unwrap();
        assert_eq!(store.get_index("NIFTY").unwrap(), Some(record));
    }

    #[test]
    fn test_update_missing_index_fails() {
        let store = Store::open_in_memory().unwrap();
        let record = IndexRecord {
            symbol: "BANKNIFTY".into(),
            underlying_value: 1.0,
            upcoming_expiry_date: "E1".into(),
            last_updated_time: "T1".into(),
        };
        assert!(matches!(
            store.update_index(&record),
            Err(IngestError::Persistence(_))
        ));
    }

    #[test]
    fn test_get_or_create_instrument_is_idempotent() {
        let store = Store::open_in_memory().unwrap();

        let (first, created) = store.get_or_create_instrument(&key(18000, OptionType::Call)).unwrap();
        assert!(created);
        let (again, created) = store.get_or_create_instrument(&key(18000, OptionType::Call)).unwrap();
        assert!(!created);
        assert_eq!(first, again);

        let (put, created) = store.get_or_create_instrument(&key(18000, OptionType::Put)).unwrap();
        assert!(created);
        assert_ne!(put.id, first.id);
        assert_eq!(store.count_instruments("NIFTY").unwrap(), 2);
        assert_eq!(store.count_instruments("BANKNIFTY").unwrap(), 0);
    }

    #[test]
    fn test_snapshots_append_in_order() {
        let store = Store::open_in_memory().unwrap();
        let (inst, _) = store.get_or_create_instrument(&key(18000, OptionType::Call)).unwrap();

        store.insert_snapshot(inst.id, &quote(10.0), "T1").unwrap();
        store.insert_snapshot(inst.id, &quote(12.0), "T2").unwrap();

        let snaps = store.snapshots(inst.id).unwrap();
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].last_updated_time, "T1");
        assert_eq!(snaps[1].last_price, 12.0);
        assert!(!snaps[1].created_at.is_empty());

        let latest = store.latest_snapshot(inst.id).unwrap().unwrap();
        assert_eq!(latest.last_updated_time, "T2");
        assert_eq!(store.count_snapshots("NIFTY").unwrap(), 2);
    }

    #[test]
    fn test_read_only_sees_data_and_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("chain.db");
        let record = IndexRecord {
            symbol: "NIFTY".into(),
            underlying_value: 100.0,
            upcoming_expiry_date: "E1".into(),
            last_updated_time: "T1".into(),
        };
        Store::open(&db).unwrap().create_index(&record).unwrap();

        let store = Store::open_read_only(&db).unwrap();
        assert_eq!(store.get_index("NIFTY").unwrap(), Some(record));
        assert!(store.get_or_create_instrument(&key(18000, OptionType::Call)).is_err());
        assert_eq!(store.count_instruments("NIFTY").unwrap(), 0);
    }

    #[test]
    fn test_read_only_does_not_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("missing").join("chain.db");
        assert!(Store::open_read_only(&db).is_err());
        assert!(!db.exists());
        assert!(!dir.path().join("missing").exists());
    }

    #[test]
    fn test_snapshot_requires_existing_instrument() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.insert_snapshot(999, &quote(1.0), "T1").is_err());
    }
}
