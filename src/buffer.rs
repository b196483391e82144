//! Pending write commands accumulated since the last flush.

use crate::command::WriteCommand;

/// Ordered commands plus the pending count used by the size trigger.
///
/// The pending count always equals the number of commands added since the
/// last reset; [`BatchBuffer::take`] resets it and [`BatchBuffer::restore`]
/// puts a failed batch back in front.
#[derive(Debug, Default)]
pub struct BatchBuffer {
    commands: Vec<WriteCommand>,
    pending: usize,
}

impl BatchBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `command` and returns the new pending count.
    pub fn add(&mut self, command: WriteCommand) -> usize {
        self.commands.push(command);
        self.pending += 1;
        self.pending
    }

    /// Number of commands waiting for a flush.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// True when nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.pending == 0
    }

    /// Buffered commands in append order.
    pub fn commands(&self) -> &[WriteCommand] {
        &self.commands
    }

    /// True when the size trigger should fire for `batch_size`.
    pub fn is_size_due(&self, batch_size: usize) -> bool {
        self.pending > 0 && batch_size > 0 && self.pending % batch_size == 0
    }

    /// Removes every command and resets the pending count.
    pub fn take(&mut self) -> Vec<WriteCommand> {
        self.pending = 0;
        std::mem::take(&mut self.commands)
    }

    /// Re-queues a batch that failed to commit ahead of anything added since.
    pub fn restore(&mut self, mut batch: Vec<WriteCommand>) {
        if batch.is_empty() {
            return;
        }
        batch.append(&mut self.commands);
        self.pending = batch.len();
        self.commands = batch;
    }
}
