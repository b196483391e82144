use std::time::Duration;

use tokio::{
    sync::{Mutex, broadcast, mpsc, oneshot},
    time::Instant,
};
use tracing::{debug, error, info, warn};

use crate::{
    buffer::BatchBuffer,
    command::WriteCommand,
    config::SinkConfig,
    error::{SinkError, SinkResult},
    persist::StoreConnection,
    telemetry::SinkMetrics,
    types::{FlushTrigger, RowCount},
};

use super::{SharedConnection, commit_batch, events::SinkEvent, release_connection};

/// Settings the coordinator task runs with.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Pending count at which a flush runs in the appending call.
    pub batch_size: usize,
    /// Time between recurring flush attempts, measured from the last flush.
    pub flush_interval: Duration,
    /// Extra commit attempts after a failure.
    pub max_retries: u32,
    /// Base delay between attempts; grows linearly per attempt.
    pub retry_delay: Duration,
    /// Capacity of the command channel.
    pub queue_bound: usize,
    /// Flush the buffer when the coordinator stops, including when every
    /// handle is dropped without a shutdown.
    pub flush_on_close: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            flush_interval: Duration::from_millis(1_000),
            max_retries: 0,
            retry_delay: Duration::from_millis(200),
            queue_bound: 256,
            flush_on_close: true,
        }
    }
}

impl From<&SinkConfig> for CoordinatorConfig {
    fn from(config: &SinkConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            flush_interval: config.flush_interval(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            queue_bound: config.command_queue_bound,
            flush_on_close: config.flush_on_close,
        }
    }
}

/// Handle to the single task that owns the batch buffer and the connection.
///
/// Appends, size-triggered flushes, timer-triggered flushes and explicit
/// flushes are all processed one at a time by that task, so two flushes never
/// overlap and a flush never races an append.
pub struct FlushHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<SinkEvent>,
}

impl Clone for FlushHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
        }
    }
}

enum Command {
    Append {
        command: WriteCommand,
        resp: oneshot::Sender<SinkResult<()>>,
    },
    Flush {
        trigger: FlushTrigger,
        resp: oneshot::Sender<SinkResult<RowCount>>,
    },
    Metrics {
        resp: oneshot::Sender<SinkMetrics>,
    },
    Shutdown {
        flush: bool,
        resp: oneshot::Sender<SinkResult<()>>,
    },
}

/// Starts the coordinator task. The recurring flush timer is armed right away.
pub fn spawn_coordinator(
    conn: Box<dyn StoreConnection>,
    config: CoordinatorConfig,
    events_tx: broadcast::Sender<SinkEvent>,
) -> FlushHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.queue_bound.max(1));

    let mut coordinator = Coordinator {
        conn: std::sync::Arc::new(Mutex::new(conn)),
        buffer: BatchBuffer::new(),
        deadline: Instant::now() + config.flush_interval,
        config,
        poisoned: None,
        metrics: SinkMetrics::default(),
        events_tx: events_tx.clone(),
    };

    tokio::spawn(async move {
        info!(
            batch_size = coordinator.config.batch_size,
            flush_interval_ms = coordinator.config.flush_interval.as_millis() as u64,
            "flush coordinator started"
        );

        loop {
            let deadline = coordinator.deadline;
            let timer_armed = coordinator.poisoned.is_none();

            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        // every handle dropped without a shutdown
                        let flush = coordinator.config.flush_on_close;
                        let _ = coordinator.shutdown(flush).await;
                        break;
                    };
                    if coordinator.handle(cmd).await {
                        break;
                    }
                }
                _ = tokio::time::sleep_until(deadline), if timer_armed => {
                    coordinator.on_timer().await;
                }
            }
        }

        info!("flush coordinator stopped");
    });

    FlushHandle { cmd_tx, events_tx }
}

impl FlushHandle {
    /// Commit and failure events from this coordinator.
    pub fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.events_tx.subscribe()
    }

    /// Buffers `command`; commits synchronously when it completes a batch.
    pub async fn append(&self, command: WriteCommand) -> SinkResult<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Append { command, resp: tx })
            .await
            .map_err(|_| SinkError::ChannelClosed)?;
        rx.await.map_err(|_| SinkError::ChannelClosed)?
    }

    /// Commits everything buffered. Also re-attempts a batch that failed earlier.
    pub async fn flush(&self, trigger: FlushTrigger) -> SinkResult<RowCount> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Flush { trigger, resp: tx })
            .await
            .map_err(|_| SinkError::ChannelClosed)?;
        rx.await.map_err(|_| SinkError::ChannelClosed)?
    }

    /// Counters plus the current pending count.
    pub async fn metrics(&self) -> SinkResult<SinkMetrics> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Metrics { resp: tx })
            .await
            .map_err(|_| SinkError::ChannelClosed)?;
        rx.await.map_err(|_| SinkError::ChannelClosed)
    }

    /// Stops the timer, optionally flushes, then releases the connection.
    pub async fn shutdown(&self, flush: bool) -> SinkResult<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { flush, resp: tx })
            .await
            .map_err(|_| SinkError::ChannelClosed)?;
        rx.await.map_err(|_| SinkError::ChannelClosed)?
    }
}

struct Coordinator {
    conn: SharedConnection,
    buffer: BatchBuffer,
    config: CoordinatorConfig,
    deadline: Instant,
    poisoned: Option<String>,
    metrics: SinkMetrics,
    events_tx: broadcast::Sender<SinkEvent>,
}

impl Coordinator {
    /// Returns true when the loop should stop.
    async fn handle(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Append { command, resp } => {
                let res = self.append(command).await;
                let _ = resp.send(res);
            }
            Command::Flush { trigger, resp } => {
                let res = self.flush(trigger).await;
                let _ = resp.send(res);
            }
            Command::Metrics { resp } => {
                let mut snapshot = self.metrics.clone();
                snapshot.pending = self.buffer.pending();
                let _ = resp.send(snapshot);
            }
            Command::Shutdown { flush, resp } => {
                let res = self.shutdown(flush).await;
                let _ = resp.send(res);
                return true;
            }
        }
        false
    }

    async fn append(&mut self, command: WriteCommand) -> SinkResult<()> {
        if let Some(reason) = &self.poisoned {
            return Err(SinkError::Poisoned {
                reason: reason.clone(),
            });
        }

        self.buffer.add(command);
        if self.buffer.is_size_due(self.config.batch_size) {
            self.flush(FlushTrigger::Size).await?;
        }
        Ok(())
    }

    async fn on_timer(&mut self) {
        if !self.buffer.is_empty() {
            debug!(pending = self.buffer.pending(), "flush interval elapsed");
            // failure is logged and poisons the coordinator; no caller to report to
            let _ = self.flush(FlushTrigger::Timer).await;
        }
        self.deadline = Instant::now() + self.config.flush_interval;
    }

    async fn flush(&mut self, trigger: FlushTrigger) -> SinkResult<RowCount> {
        if self.buffer.is_empty() {
            return Ok(0);
        }

        let batch = self.buffer.take();
        let commands = batch.len();
        let (batch, result) = self.commit_with_retry(batch).await;
        self.deadline = Instant::now() + self.config.flush_interval;

        match result {
            Ok(rows) => {
                self.metrics.record_commit(trigger, commands, rows);
                self.poisoned = None;
                debug!(?trigger, commands, rows, "batch committed");
                let _ = self.events_tx.send(SinkEvent::Committed {
                    trigger,
                    commands,
                    rows,
                });
                Ok(rows)
            }
            Err(err) => {
                self.buffer.restore(batch);
                self.metrics.failed_flushes += 1;
                error!(
                    ?trigger,
                    commands,
                    pending = self.buffer.pending(),
                    %err,
                    "flush failed, batch kept in buffer"
                );
                self.poisoned = Some(err.to_string());
                let _ = self.events_tx.send(SinkEvent::FlushFailed {
                    trigger,
                    commands,
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn commit_with_retry(
        &self,
        mut batch: Vec<WriteCommand>,
    ) -> (Vec<WriteCommand>, SinkResult<RowCount>) {
        let mut attempt = 0u32;
        loop {
            let (returned, result) = commit_batch(&self.conn, batch).await;
            match result {
                Err(err) if attempt < self.config.max_retries && !returned.is_empty() => {
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = self.config.max_retries,
                        %err,
                        "commit failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay * attempt).await;
                    batch = returned;
                }
                other => return (returned, other),
            }
        }
    }

    async fn shutdown(&mut self, flush: bool) -> SinkResult<()> {
        let result = if flush {
            self.flush(FlushTrigger::Close).await.map(|_| ())
        } else {
            if !self.buffer.is_empty() {
                warn!(pending = self.buffer.pending(), "closing with uncommitted commands");
            }
            Ok(())
        };

        release_connection(&self.conn).await;
        let _ = self.events_tx.send(SinkEvent::Closed);
        result
    }
}
