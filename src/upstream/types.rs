use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

// ── Symbol classification ───────────────────────────────────────────

/// Symbols served by the index option-chain endpoint. Everything else is
/// treated as an equity.
pub const INDEX_SYMBOLS: &[&str] = &["NIFTY", "BANKNIFTY", "FINNIFTY"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Index,
    Equity,
}

impl SymbolKind {
    pub fn classify(symbol: &str) -> Self {
        if INDEX_SYMBOLS.contains(&symbol) {
            SymbolKind::Index
        } else {
            SymbolKind::Equity
        }
    }
}

// ── Option side ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub const BOTH: [OptionType; 2] = [OptionType::Call, OptionType::Put];

    /// Stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionType::Call => "CALL",
            OptionType::Put => "PUT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CALL" | "CE" => Some(OptionType::Call),
            "PUT" | "PE" => Some(OptionType::Put),
            _ => None,
        }
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Which section of the payload to ingest ──────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ChainScope {
    /// `filtered.data`: rows for the nearest expiry only.
    #[default]
    Filtered,
    /// `records.data`: rows for every listed expiry.
    All,
}

// ── Upstream payload ────────────────────────────────────────────────

/// Raw option-chain document as returned by the upstream API.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainPayload {
    pub records: Records,
    #[serde(default)]
    pub filtered: Option<Section>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Records {
    /// Opaque freshness marker, compared by equality only.
    pub timestamp: String,
    #[serde(rename = "underlyingValue")]
    pub underlying_value: f64,
    /// Nearest expiry first.
    #[serde(rename = "expiryDates")]
    pub expiry_dates: Vec<String>,
    #[serde(default)]
    pub data: Vec<ChainRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Section {
    #[serde(default)]
    pub data: Vec<ChainRow>,
}

/// One strike/expiry row. Either side may be absent.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainRow {
    #[serde(rename = "strikePrice")]
    pub strike_price: i64,
    #[serde(rename = "expiryDate")]
    pub expiry_date: String,
    #[serde(rename = "CE", default)]
    pub call: Option<ContractQuote>,
    #[serde(rename = "PE", default)]
    pub put: Option<ContractQuote>,
}

impl ChainRow {
    pub fn side(&self, option_type: OptionType) -> Option<&ContractQuote> {
        match option_type {
            OptionType::Call => self.call.as_ref(),
            OptionType::Put => self.put.as_ref(),
        }
    }
}

/// Market fields for one side of a row.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContractQuote {
    pub change: f64,
    #[serde(rename = "changeinOpenInterest")]
    pub change_in_open_interest: f64,
    #[serde(rename = "impliedVolatility")]
    pub implied_volatility: f64,
    #[serde(rename = "lastPrice")]
    pub last_price: f64,
    #[serde(rename = "openInterest")]
    pub open_interest: f64,
    #[serde(rename = "pChange")]
    pub p_change: f64,
    #[serde(rename = "pchangeinOpenInterest")]
    pub p_change_in_open_interest: f64,
    #[serde(rename = "underlyingValue")]
    pub underlying_value: f64,
}

impl ChainPayload {
    pub fn timestamp(&self) -> &str {
        &self.records.timestamp
    }

    /// Earliest listed expiry.
    pub fn upcoming_expiry(&self) -> Result<&str> {
        self.records
            .expiry_dates
            .first()
            .map(String::as_str)
            .ok_or_else(|| IngestError::Format("records.expiryDates is empty".into()))
    }

    pub fn rows(&self, scope: ChainScope) -> Result<&[ChainRow]> {
        match scope {
            ChainScope::All => Ok(&self.records.data),
            ChainScope::Filtered => self
                .filtered
                .as_ref()
                .map(|s| s.data.as_slice())
                .ok_or_else(|| IngestError::Format("missing `filtered` section".into())),
        }
    }

    pub fn parse(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }
}
