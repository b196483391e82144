//! Pipeline-facing sink: transform, route, commit.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::{
    checkpoint::CheckpointSettings,
    command::RecordTransform,
    config::SinkConfig,
    error::{SinkError, SinkResult},
    persist::{Connector, sqlite::SqliteConnector},
    runtime::{
        coordinator::{CoordinatorConfig, FlushHandle, spawn_coordinator},
        events::SinkEvent,
        immediate::ImmediateWriter,
    },
    telemetry::SinkMetrics,
    types::{CheckpointId, FlushTrigger, RowCount, SubtaskIndex},
};

const EVENT_CAPACITY: usize = 1024;

/// Identity of the parallel task a sink instance runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
    /// Operator name, used in log fields.
    pub task_name: String,
    /// Zero-based index of this instance.
    pub subtask_index: SubtaskIndex,
    /// Number of parallel instances.
    pub parallelism: u32,
}

impl TaskContext {
    /// Builds a context for subtask `subtask_index` of `parallelism`.
    pub fn new(
        task_name: impl Into<String>,
        subtask_index: SubtaskIndex,
        parallelism: u32,
    ) -> Self {
        Self {
            task_name: task_name.into(),
            subtask_index,
            parallelism,
        }
    }
}

impl Default for TaskContext {
    fn default() -> Self {
        Self::new("sink", 0, 1)
    }
}

/// Observable lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed, not opened yet.
    Uninitialized,
    /// Open and accepting records.
    Ready,
    /// Closed for good.
    Closed,
}

enum Dispatch {
    Immediate(ImmediateWriter),
    Buffered(FlushHandle),
}

enum SinkState {
    Uninitialized,
    Ready(Dispatch),
    Closed,
}

/// Buffered transactional write sink.
///
/// `open` → `invoke`* → `close`. With a batch size of 1 every record is
/// committed before `invoke` returns; otherwise commands are buffered and
/// committed when the batch fills, when the flush interval elapses, at a
/// checkpoint, or on close.
pub struct TransactionalSink<T> {
    config: SinkConfig,
    transform: Box<dyn RecordTransform<T>>,
    connector: Arc<dyn Connector>,
    state: SinkState,
    events_tx: broadcast::Sender<SinkEvent>,
    records_received: u64,
    transform_failures: u64,
}

impl<T> TransactionalSink<T> {
    /// Validates `config` and builds an unopened sink.
    ///
    /// The returned [`CheckpointSettings`] must be applied to the host engine
    /// by the caller, once.
    pub fn new<F, C>(
        config: SinkConfig,
        transform: F,
        connector: C,
    ) -> SinkResult<(Self, CheckpointSettings)>
    where
        F: RecordTransform<T> + 'static,
        C: Connector + 'static,
    {
        config.validate()?;
        let checkpoint = config.checkpoint.clone();
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let sink = Self {
            config,
            transform: Box::new(transform),
            connector: Arc::new(connector),
            state: SinkState::Uninitialized,
            events_tx,
            records_received: 0,
            transform_failures: 0,
        };
        Ok((sink, checkpoint))
    }

    /// Same as [`TransactionalSink::new`] with the SQLite connector.
    pub fn sqlite<F>(config: SinkConfig, transform: F) -> SinkResult<(Self, CheckpointSettings)>
    where
        F: RecordTransform<T> + 'static,
    {
        Self::new(config, transform, SqliteConnector)
    }

    /// Validated configuration this sink was built with.
    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    /// Current lifecycle phase.
    pub fn lifecycle(&self) -> Lifecycle {
        match self.state {
            SinkState::Uninitialized => Lifecycle::Uninitialized,
            SinkState::Ready(_) => Lifecycle::Ready,
            SinkState::Closed => Lifecycle::Closed,
        }
    }

    /// Commit and failure events. Available before `open`.
    pub fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.events_tx.subscribe()
    }

    /// Opens the connection and, in buffered mode, starts the flush timer.
    pub async fn open(&mut self, ctx: &TaskContext) -> SinkResult<()> {
        match self.state {
            SinkState::Uninitialized => {}
            SinkState::Ready(_) => {
                return Err(SinkError::IllegalState("sink is already open".to_string()));
            }
            SinkState::Closed => {
                return Err(SinkError::IllegalState("sink is closed".to_string()));
            }
        }

        let connector = Arc::clone(&self.connector);
        let params = self.config.connection.clone();
        let url = params.url.clone();
        let conn = tokio::task::spawn_blocking(move || connector.connect(&params))
            .await?
            .map_err(|source| {
                error!(
                    task = %ctx.task_name,
                    subtask = ctx.subtask_index,
                    %url,
                    %source,
                    "failed to connect"
                );
                SinkError::Connection { url, source }
            })?;

        let dispatch = if self.config.is_immediate() {
            Dispatch::Immediate(ImmediateWriter::new(conn, self.events_tx.clone()))
        } else {
            Dispatch::Buffered(spawn_coordinator(
                conn,
                CoordinatorConfig::from(&self.config),
                self.events_tx.clone(),
            ))
        };
        self.state = SinkState::Ready(dispatch);

        info!(
            task = %ctx.task_name,
            subtask = ctx.subtask_index,
            parallelism = ctx.parallelism,
            batch_size = self.config.batch_size,
            flush_interval_ms = self.config.flush_interval_ms,
            "transactional sink opened"
        );
        Ok(())
    }

    /// Transforms `record` and commits or buffers the resulting command.
    pub async fn invoke(&mut self, record: &T) -> SinkResult<()> {
        let dispatch = match &mut self.state {
            SinkState::Ready(dispatch) => dispatch,
            SinkState::Uninitialized => {
                return Err(SinkError::IllegalState("invoke before open".to_string()));
            }
            SinkState::Closed => {
                return Err(SinkError::IllegalState("invoke after close".to_string()));
            }
        };

        self.records_received += 1;
        let command = match self.transform.transform(record) {
            Ok(command) => command,
            Err(err) => {
                self.transform_failures += 1;
                error!(%err, "record could not be transformed");
                return Err(err.into());
            }
        };

        match dispatch {
            Dispatch::Immediate(writer) => writer.write(command).await.map(|_| ()),
            Dispatch::Buffered(handle) => handle.append(command).await,
        }
    }

    /// Commits everything buffered now.
    pub async fn flush(&mut self) -> SinkResult<RowCount> {
        self.flush_with(FlushTrigger::Explicit).await
    }

    /// Checkpoint hook: commits everything received before the barrier.
    pub async fn snapshot_state(&mut self, checkpoint_id: CheckpointId) -> SinkResult<()> {
        let rows = self.flush_with(FlushTrigger::Checkpoint).await?;
        debug!(checkpoint_id, rows, "buffer committed for checkpoint");
        Ok(())
    }

    async fn flush_with(&mut self, trigger: FlushTrigger) -> SinkResult<RowCount> {
        match &self.state {
            SinkState::Ready(Dispatch::Buffered(handle)) => handle.flush(trigger).await,
            SinkState::Ready(Dispatch::Immediate(_)) => Ok(0),
            SinkState::Uninitialized => {
                Err(SinkError::IllegalState("flush before open".to_string()))
            }
            SinkState::Closed => Err(SinkError::IllegalState("flush after close".to_string())),
        }
    }

    /// Counters so far. Zeroed outside the ready state, apart from the
    /// record counters kept by the sink itself.
    pub async fn metrics(&self) -> SinkResult<SinkMetrics> {
        let mut metrics = match &self.state {
            SinkState::Ready(Dispatch::Buffered(handle)) => handle.metrics().await?,
            SinkState::Ready(Dispatch::Immediate(writer)) => writer.metrics(),
            SinkState::Uninitialized | SinkState::Closed => SinkMetrics::default(),
        };
        metrics.records_received = self.records_received;
        metrics.transform_failures = self.transform_failures;
        Ok(metrics)
    }

    /// Stops the flush timer, commits the remaining buffer when
    /// `flush_on_close` is set, then releases the connection.
    ///
    /// The sink ends up closed even when the final flush fails; that failure
    /// is returned. Calling `close` again is a no-op.
    pub async fn close(&mut self) -> SinkResult<()> {
        let state = std::mem::replace(&mut self.state, SinkState::Closed);
        let result = match state {
            SinkState::Uninitialized => Ok(()),
            SinkState::Closed => {
                debug!("close called on a closed sink");
                Ok(())
            }
            SinkState::Ready(Dispatch::Immediate(writer)) => {
                writer.close().await;
                Ok(())
            }
            SinkState::Ready(Dispatch::Buffered(handle)) => {
                handle.shutdown(self.config.flush_on_close).await
            }
        };

        match &result {
            Ok(()) => info!(records = self.records_received, "transactional sink closed"),
            Err(err) => warn!(%err, "transactional sink closed with a failed final flush"),
        }
        result
    }
}
