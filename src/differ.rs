use crate::error::Result;
use crate::store::Store;
use crate::upstream::ChainPayload;

/// What to do with a freshly fetched payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// First poll ever for this symbol.
    CreateIndex,
    /// Upstream timestamp moved since the last reconciled poll.
    Reconcile,
    /// Upstream has not produced anything new.
    Skip,
}

/// Decide whether `payload` needs to be reconciled for `symbol`.
///
/// The stored and upstream timestamps are compared as opaque strings. Any
/// difference counts as new data, including a timestamp older than the stored
/// one: ordering is not checked.
pub fn should_reconcile(store: &Store, symbol: &str, payload: &ChainPayload) -> Result<Decision> {
    let decision = match store.get_index(symbol)? {
        None => Decision::CreateIndex,
        Some(index) if index.last_updated_time == payload.timestamp() => Decision::Skip,
        Some(_) => Decision::Reconcile,
    };
    Ok(decision)
}
