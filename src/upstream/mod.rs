pub mod nse;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;

pub use nse::NseClient;
pub use types::{ChainPayload, ChainRow, ChainScope, ContractQuote, OptionType, SymbolKind};

/// A source of option-chain snapshots for exactly one instrument.
///
/// The live implementation is [`NseClient`]; tests substitute canned payloads.
#[async_trait]
pub trait ChainSource: Send {
    /// Symbol this source is bound to.
    fn symbol(&self) -> &str;

    /// Fetch the current chain snapshot.
    async fn fetch(&mut self) -> Result<ChainPayload>;
}
