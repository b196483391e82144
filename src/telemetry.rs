//! Tracing setup and sink counters.

use serde::Serialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs a fmt subscriber filtered by `RUST_LOG`, defaulting to `txsink=info`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing() -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "txsink=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

/// Point-in-time counters for one sink instance.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SinkMetrics {
    /// Records passed to `invoke`.
    pub records_received: u64,
    /// Records the transform rejected.
    pub transform_failures: u64,
    /// Commands inside committed transactions.
    pub commands_committed: u64,
    /// Successful transactions.
    pub commits: u64,
    /// Sum of rows the store reported for committed commands.
    pub rows_affected: u64,
    /// Commits started by a full batch.
    pub size_flushes: u64,
    /// Commits started by the flush timer.
    pub timer_flushes: u64,
    /// Commits started by a caller's `flush`.
    pub explicit_flushes: u64,
    /// Commits started by a checkpoint barrier.
    pub checkpoint_flushes: u64,
    /// Final commit on close.
    pub close_flushes: u64,
    /// Flushes that gave up after every retry.
    pub failed_flushes: u64,
    /// Commands buffered but not yet committed.
    pub pending: usize,
}

impl SinkMetrics {
    pub(crate) fn record_commit(
        &mut self,
        trigger: crate::types::FlushTrigger,
        commands: usize,
        rows: u64,
    ) {
        use crate::types::FlushTrigger;

        self.commits += 1;
        self.commands_committed += commands as u64;
        self.rows_affected += rows;
        match trigger {
            FlushTrigger::Size => self.size_flushes += 1,
            FlushTrigger::Timer => self.timer_flushes += 1,
            FlushTrigger::Explicit => self.explicit_flushes += 1,
            FlushTrigger::Close => self.close_flushes += 1,
            FlushTrigger::Checkpoint => self.checkpoint_flushes += 1,
            FlushTrigger::Immediate => {}
        }
    }
}
