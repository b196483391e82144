//! Flush coordination and commit execution.

/// Dual-trigger flush coordinator actor.
pub mod coordinator;
/// Event stream types emitted on commit and failure.
pub mod events;
/// Synchronous per-record commit path.
pub mod immediate;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::{
    command::WriteCommand,
    error::{SinkError, SinkResult},
    persist::{StoreConnection, run_transaction},
    types::RowCount,
};

/// Connection handle moved into blocking tasks.
pub type SharedConnection = Arc<Mutex<Box<dyn StoreConnection>>>;

/// Runs one transaction on the blocking pool and hands the batch back.
///
/// The batch always comes back, even when the store panics mid-transaction,
/// so a failed flush can put it back in the buffer. A panic is rolled back and
/// reported as [`SinkError::Join`].
pub(crate) async fn commit_batch(
    conn: &SharedConnection,
    batch: Vec<WriteCommand>,
) -> (Vec<WriteCommand>, SinkResult<RowCount>) {
    let conn = Arc::clone(conn);
    let pending = batch.len();
    let joined = tokio::task::spawn_blocking(move || {
        let mut conn = conn.blocking_lock();
        let attempt =
            panic::catch_unwind(AssertUnwindSafe(|| run_transaction(&mut **conn, &batch)));
        let result = match attempt {
            Ok(result) => result,
            Err(_) => {
                if let Err(err) = conn.rollback() {
                    warn!(?err, "rollback after panic failed");
                }
                Err(SinkError::Join("commit task panicked".to_string()))
            }
        };
        (batch, result)
    })
    .await;

    match joined {
        Ok(out) => out,
        // only reachable if the runtime cancels the blocking task
        Err(err) => {
            error!(pending, %err, "commit task lost its batch");
            (Vec::new(), Err(SinkError::from(err)))
        }
    }
}

/// Closes the connection; failures are logged and swallowed.
pub(crate) async fn release_connection(conn: &SharedConnection) {
    let conn = Arc::clone(conn);
    let joined = tokio::task::spawn_blocking(move || {
        let mut conn = conn.blocking_lock();
        conn.close()
    })
    .await;

    match joined {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(?err, "failed to close store connection"),
        Err(err) => warn!(?err, "close task failed"),
    }
}
