use serde::Serialize;

use crate::upstream::OptionType;

/// Per-symbol summary, mutated in place on every reconciled poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexRecord {
    pub symbol: String,
    pub underlying_value: f64,
    pub upcoming_expiry_date: String,
    pub last_updated_time: String,
}

/// Natural key of an option contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstrumentKey {
    pub underlying: String,
    pub strike_price: i64,
    pub expiry_date: String,
    pub option_type: OptionType,
}

/// A stored option contract. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instrument {
    pub id: i64,
    pub underlying: String,
    pub strike_price: i64,
    pub expiry_date: String,
    pub option_type: OptionType,
}

/// One point-in-time quote for an instrument. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub id: i64,
    pub instrument_id: i64,
    pub change: f64,
    pub change_in_open_interest: f64,
    pub implied_volatility: f64,
    pub last_price: f64,
    pub open_interest: f64,
    pub p_change: f64,
    pub p_change_in_open_interest: f64,
    pub underlying_value: f64,
    /// Upstream timestamp of the poll that produced this snapshot.
    pub last_updated_time: String,
    /// Local capture time (RFC 3339, UTC).
    pub created_at: String,
}
