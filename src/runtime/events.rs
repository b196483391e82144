//! Flush outcome events broadcast to subscribers.

use crate::types::{FlushTrigger, RowCount};

/// Emitted after every commit attempt that had something to commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// A batch was committed.
    Committed {
        /// What started the flush.
        trigger: FlushTrigger,
        /// Commands in the transaction.
        commands: usize,
        /// Sum of affected-row counts.
        rows: RowCount,
    },
    /// A batch failed and was rolled back.
    FlushFailed {
        /// What started the flush.
        trigger: FlushTrigger,
        /// Commands in the rolled-back transaction.
        commands: usize,
        /// Rendered error.
        reason: String,
    },
    /// The connection was released.
    Closed,
}
