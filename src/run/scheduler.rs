use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::differ::{self, Decision};
use crate::error::Result;
use crate::reconcile::{self, ReconcileSummary};
use crate::store::Store;
use crate::upstream::{ChainScope, ChainSource};

/// Where the poller is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Fetching,
    Deciding,
    Reconciling,
    /// Absorbing: the loop has stopped on an error.
    Failed,
}

/// Result of one completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub decision: Decision,
    pub timestamp: String,
    pub summary: ReconcileSummary,
}

/// Sequential fetch → decide → reconcile loop for one instrument.
///
/// Cycles start `interval` apart, measured start to start. A cycle that
/// overruns the interval delays the next one; cycles never overlap.
pub struct Poller<S: ChainSource> {
    source: S,
    store: Store,
    interval: Duration,
    scope: ChainScope,
    state: PollState,
}

impl<S: ChainSource> Poller<S> {
    pub fn new(source: S, store: Store, interval: Duration, scope: ChainScope) -> Self {
        Poller {
            source,
            store,
            interval,
            scope,
            state: PollState::Idle,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Run a single cycle. Any error moves the poller to [`PollState::Failed`].
    pub async fn poll_once(&mut self) -> Result<CycleOutcome> {
        match self.cycle().await {
            Ok(outcome) => {
                self.state = PollState::Idle;
                Ok(outcome)
            }
            Err(e) => {
                error!(symbol = self.source.symbol(), state = ?self.state, "poll cycle failed: {e}");
                self.state = PollState::Failed;
                Err(e)
            }
        }
    }

    async fn cycle(&mut self) -> Result<CycleOutcome> {
        let symbol = self.source.symbol().to_string();

        self.state = PollState::Fetching;
        debug!(symbol = %symbol, "fetching option chain");
        let payload = self.source.fetch().await?;

        self.state = PollState::Deciding;
        let decision = differ::should_reconcile(&self.store, &symbol, &payload)?;

        self.state = PollState::Reconciling;
        let summary = reconcile::reconcile(&self.store, &symbol, &payload, decision, self.scope)?;

        match decision {
            Decision::Skip => info!(
                symbol = %symbol,
                timestamp = payload.timestamp(),
                "upstream unchanged, skipping"
            ),
            _ => info!(
                symbol = %symbol,
                timestamp = payload.timestamp(),
                rows = summary.rows,
                instruments_created = summary.instruments_created,
                snapshots_written = summary.snapshots_written,
                "reconciled option chain"
            ),
        }

        Ok(CycleOutcome {
            decision,
            timestamp: payload.timestamp().to_string(),
            summary,
        })
    }

    /// Poll forever. Returns only with the error that stopped the loop.
    pub async fn run(&mut self) -> Result<()> {
        self.run_cycles(None).await
    }

    /// Poll `max_cycles` times (or forever when `None`), stopping at the
    /// first failure.
    pub async fn run_cycles(&mut self, max_cycles: Option<u64>) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut completed = 0u64;
        while max_cycles.is_none_or(|max| completed < max) {
            ticker.tick().await;
            self.poll_once().await?;
            completed += 1;
        }
        Ok(())
    }
}
