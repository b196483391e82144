//! Sink error taxonomy.

use thiserror::Error;

use crate::{command::TransformError, persist::StoreError};

/// Every failure the sink surfaces to its host.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Rejected configuration, at load time or at construction.
    #[error("invalid sink configuration: {0}")]
    Config(String),

    /// Fatal at `open`; the task cannot start.
    #[error("failed to connect to {url}: {source}")]
    Connection {
        /// Store address the connection was opened against.
        url: String,
        /// Driver failure.
        #[source]
        source: StoreError,
    },

    /// The record could not be turned into a write command.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// The store rejected a command or the commit itself.
    #[error("commit failed at `{command}`: {source}")]
    Commit {
        /// Rendered statement, or `COMMIT`.
        command: String,
        /// Driver failure.
        #[source]
        source: StoreError,
    },

    /// Operation called outside the state that allows it.
    #[error("illegal sink state: {0}")]
    IllegalState(String),

    /// An earlier flush failed and its batch is still buffered.
    #[error("sink is poisoned by an earlier flush failure: {reason}")]
    Poisoned {
        /// Message of the failure that poisoned the sink.
        reason: String,
    },

    /// The coordinator task stopped before answering.
    #[error("flush coordinator is gone")]
    ChannelClosed,

    /// A store call on the blocking pool panicked or was cancelled.
    #[error("blocking store task failed: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for SinkError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Join(value.to_string())
    }
}

/// Result alias used across the crate.
pub type SinkResult<T> = Result<T, SinkError>;
