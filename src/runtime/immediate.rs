use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use tracing::error;

use crate::{
    command::WriteCommand,
    error::SinkResult,
    persist::StoreConnection,
    telemetry::SinkMetrics,
    types::{FlushTrigger, RowCount},
};

use super::{SharedConnection, commit_batch, events::SinkEvent, release_connection};

/// Commits every command in its own transaction before returning.
///
/// Used when the batch size is 1. Nothing is buffered, so a slow store
/// backpressures the caller directly.
pub struct ImmediateWriter {
    conn: SharedConnection,
    metrics: SinkMetrics,
    events_tx: broadcast::Sender<SinkEvent>,
}

impl ImmediateWriter {
    /// Takes ownership of an open connection.
    pub fn new(conn: Box<dyn StoreConnection>, events_tx: broadcast::Sender<SinkEvent>) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            metrics: SinkMetrics::default(),
            events_tx,
        }
    }

    /// Runs `command` as a single transaction. A failure is rolled back and
    /// returned; the writer stays usable.
    pub async fn write(&mut self, command: WriteCommand) -> SinkResult<RowCount> {
        let (_, result) = commit_batch(&self.conn, vec![command]).await;
        match result {
            Ok(rows) => {
                self.metrics.record_commit(FlushTrigger::Immediate, 1, rows);
                let _ = self.events_tx.send(SinkEvent::Committed {
                    trigger: FlushTrigger::Immediate,
                    commands: 1,
                    rows,
                });
                Ok(rows)
            }
            Err(err) => {
                self.metrics.failed_flushes += 1;
                error!(%err, "immediate commit failed");
                let _ = self.events_tx.send(SinkEvent::FlushFailed {
                    trigger: FlushTrigger::Immediate,
                    commands: 1,
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Counters for this writer.
    pub fn metrics(&self) -> SinkMetrics {
        self.metrics.clone()
    }

    /// Releases the connection. Close errors are logged, not returned.
    pub async fn close(&self) {
        release_connection(&self.conn).await;
        let _ = self.events_tx.send(SinkEvent::Closed);
    }
}
