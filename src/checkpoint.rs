//! Checkpoint settings the sink asks of its host engine.
//!
//! The sink never mutates engine state itself. [`crate::sink::TransactionalSink::new`]
//! hands back a [`CheckpointSettings`] and the caller applies it once through
//! [`CheckpointSettings::apply_to`].

use serde::{Deserialize, Serialize};

use crate::error::{SinkError, SinkResult};

/// Consistency guarantee requested for engine checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointingMode {
    /// Barriers are aligned; state reflects each record exactly once.
    ExactlyOnce,
    /// Barriers are not aligned; replay may duplicate records.
    AtLeastOnce,
}

/// What happens to externalized checkpoint data when a job is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalizedRetention {
    /// Keep the data so the job can be resumed manually.
    RetainOnCancellation,
    /// Delete the data on cancellation.
    DeleteOnCancellation,
}

/// Desired checkpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointSettings {
    /// Time between checkpoint triggers.
    pub interval_ms: u64,
    /// Consistency guarantee.
    pub mode: CheckpointingMode,
    /// Minimum gap between the end of one checkpoint and the next start.
    pub min_pause_between_ms: u64,
    /// A checkpoint running longer than this is aborted.
    pub timeout_ms: u64,
    /// Checkpoints allowed in flight at once.
    pub max_concurrent: u32,
    /// Cleanup policy for externalized checkpoints.
    pub retention: ExternalizedRetention,
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            mode: CheckpointingMode::ExactlyOnce,
            min_pause_between_ms: 500,
            timeout_ms: 60_000,
            max_concurrent: 1,
            retention: ExternalizedRetention::RetainOnCancellation,
        }
    }
}

impl CheckpointSettings {
    /// Rejects settings the sink's commit protocol cannot work with.
    pub fn validate(&self) -> SinkResult<()> {
        if self.interval_ms == 0 {
            return Err(SinkError::Config(
                "checkpoint interval must be positive".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(SinkError::Config(
                "checkpoint timeout must be positive".to_string(),
            ));
        }
        if self.max_concurrent != 1 {
            return Err(SinkError::Config(format!(
                "max concurrent checkpoints must be 1, got {}",
                self.max_concurrent
            )));
        }
        Ok(())
    }

    /// Pushes every setting onto `host`.
    pub fn apply_to<H: CheckpointHost + ?Sized>(&self, host: &mut H) {
        host.enable_checkpointing(self.interval_ms);
        host.set_mode(self.mode);
        host.set_min_pause_between(self.min_pause_between_ms);
        host.set_timeout(self.timeout_ms);
        host.set_max_concurrent(self.max_concurrent);
        host.set_externalized_retention(self.retention);
    }
}

/// Checkpoint setters exposed by the host streaming engine.
pub trait CheckpointHost {
    /// Turns checkpointing on with the given trigger interval.
    fn enable_checkpointing(&mut self, interval_ms: u64);
    /// Sets the consistency guarantee.
    fn set_mode(&mut self, mode: CheckpointingMode);
    /// Sets the minimum pause between checkpoints.
    fn set_min_pause_between(&mut self, pause_ms: u64);
    /// Sets the checkpoint timeout.
    fn set_timeout(&mut self, timeout_ms: u64);
    /// Sets how many checkpoints may run at once.
    fn set_max_concurrent(&mut self, max: u32);
    /// Sets what happens to externalized data on cancellation.
    fn set_externalized_retention(&mut self, retention: ExternalizedRetention);
}
