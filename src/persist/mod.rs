//! Store connection seam and the transaction runner.

/// SQLite store.
pub mod sqlite;

use thiserror::Error;
use tracing::warn;

use crate::{
    command::WriteCommand,
    config::ConnectionParams,
    error::{SinkError, SinkResult},
    types::RowCount,
};

/// Failure reported by a store driver.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Error from the SQLite driver.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// The connection was used after `close`.
    #[error("connection is closed")]
    Closed,
    /// Any other driver failure.
    #[error("{0}")]
    Message(String),
}

/// Result alias for store calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Whether a connection can still run commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Usable.
    Open,
    /// Released; every call but `close` fails.
    Closed,
}

/// One long-lived, non-autocommit connection to the target store.
///
/// `execute` joins the current transaction, opening one when none is active.
/// Nothing becomes visible until `commit`.
pub trait StoreConnection: Send {
    /// Runs one command inside the current transaction and returns the rows
    /// it touched.
    fn execute(&mut self, command: &WriteCommand) -> StoreResult<usize>;
    /// Makes the current transaction durable. A no-op with none open.
    fn commit(&mut self) -> StoreResult<()>;
    /// Discards the current transaction. A no-op with none open.
    fn rollback(&mut self) -> StoreResult<()>;
    /// Releases the statement cache and the connection. Calling it twice is a no-op.
    fn close(&mut self) -> StoreResult<()>;
    /// Current state.
    fn state(&self) -> ConnectionState;
}

/// Opens connections for a sink instance.
pub trait Connector: Send + Sync {
    /// Opens a connection; called on the blocking pool.
    fn connect(&self, params: &ConnectionParams) -> StoreResult<Box<dyn StoreConnection>>;
}

/// Executes `commands` as one transaction and returns the summed row counts.
///
/// On any failure the transaction is rolled back before the error is
/// returned, so the connection is left clean for the next attempt.
pub fn run_transaction(
    conn: &mut dyn StoreConnection,
    commands: &[WriteCommand],
) -> SinkResult<RowCount> {
    if commands.is_empty() {
        return Ok(0);
    }

    let mut rows: RowCount = 0;
    for command in commands {
        match conn.execute(command) {
            Ok(n) => rows += n as RowCount,
            Err(source) => {
                rollback_quietly(conn);
                return Err(SinkError::Commit {
                    command: command.to_string(),
                    source,
                });
            }
        }
    }

    if let Err(source) = conn.commit() {
        rollback_quietly(conn);
        return Err(SinkError::Commit {
            command: "COMMIT".to_string(),
            source,
        });
    }
    Ok(rows)
}

fn rollback_quietly(conn: &mut dyn StoreConnection) {
    if let Err(err) = conn.rollback() {
        warn!(?err, "rollback after failed batch also failed");
    }
}
