//! Shared primitive counters and trigger kinds.

use serde::{Deserialize, Serialize};

/// Number of rows the store reported as affected.
pub type RowCount = u64;
/// Engine-assigned checkpoint identifier.
pub type CheckpointId = u64;
/// Zero-based index of a parallel sink instance.
pub type SubtaskIndex = u32;

/// What caused a flush to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlushTrigger {
    /// The pending count reached a multiple of the batch size.
    Size,
    /// The recurring flush interval elapsed.
    Timer,
    /// The caller asked for a flush.
    Explicit,
    /// A checkpoint barrier reached the sink.
    Checkpoint,
    /// The sink is closing.
    Close,
    /// Immediate mode; every record commits on its own.
    Immediate,
}
