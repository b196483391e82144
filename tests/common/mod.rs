#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use txsink::{
    command::{ParamValue, TransformError, WriteCommand},
    config::{ConnectionParams, SinkConfig},
    persist::{ConnectionState, Connector, StoreConnection, StoreError, StoreResult},
};

pub fn insert_id(id: &i64) -> Result<WriteCommand, TransformError> {
    Ok(WriteCommand::new("INSERT INTO events(id) VALUES (?1)").bind(*id))
}

pub fn rendered(ids: impl IntoIterator<Item = i64>) -> Vec<String> {
    ids.into_iter()
        .map(|id| insert_id(&id).expect("transform").to_string())
        .collect()
}

const EVENTS_DDL: &str = "CREATE TABLE IF NOT EXISTS events (id INTEGER PRIMARY KEY);";

pub fn buffered(batch_size: usize, flush_interval_ms: u64) -> SinkConfig {
    SinkConfig {
        batch_size,
        flush_interval_ms,
        connection: ConnectionParams {
            init_sql: Some(EVENTS_DDL.to_string()),
            ..ConnectionParams::default()
        },
        ..SinkConfig::default()
    }
}

pub async fn recv_event(
    rx: &mut tokio::sync::broadcast::Receiver<txsink::runtime::events::SinkEvent>,
) -> txsink::runtime::events::SinkEvent {
    tokio::time::timeout(Duration::from_secs(30), rx.recv())
        .await
        .expect("event timeout")
        .expect("event")
}

#[derive(Debug, Default)]
pub struct StoreLog {
    pub committed: Vec<Vec<String>>,
    pub in_flight: Vec<String>,
    pub rollbacks: usize,
    pub closes: usize,
    pub commits_to_fail: usize,
    pub refuse_connect: bool,
    pub close_fails: bool,
    pub panics_remaining: usize,
}

/// In-memory stand-in for a transactional store.
///
/// Commands binding a negative integer are rejected at execute time.
#[derive(Clone, Default)]
pub struct ScriptedStore {
    log: Arc<Mutex<StoreLog>>,
}

impl ScriptedStore {
    pub fn failing_commits(n: usize) -> Self {
        let store = Self::default();
        store.log.lock().expect("lock").commits_to_fail = n;
        store
    }

    pub fn unreachable() -> Self {
        let store = Self::default();
        store.log.lock().expect("lock").refuse_connect = true;
        store
    }

    pub fn failing_close() -> Self {
        let store = Self::default();
        store.log.lock().expect("lock").close_fails = true;
        store
    }

    /// The next `n` executes panic instead of returning.
    pub fn panicking_executes(n: usize) -> Self {
        let store = Self::default();
        store.log.lock().expect("lock").panics_remaining = n;
        store
    }

    pub fn committed(&self) -> Vec<Vec<String>> {
        self.log.lock().expect("lock").committed.clone()
    }

    pub fn committed_flat(&self) -> Vec<String> {
        self.committed().into_iter().flatten().collect()
    }

    pub fn rollbacks(&self) -> usize {
        self.log.lock().expect("lock").rollbacks
    }

    pub fn closes(&self) -> usize {
        self.log.lock().expect("lock").closes
    }
}

impl Connector for ScriptedStore {
    fn connect(&self, _params: &ConnectionParams) -> StoreResult<Box<dyn StoreConnection>> {
        if self.log.lock().expect("lock").refuse_connect {
            return Err(StoreError::Message("connection refused".to_string()));
        }
        Ok(Box::new(ScriptedConnection {
            log: Arc::clone(&self.log),
            open: true,
        }))
    }
}

struct ScriptedConnection {
    log: Arc<Mutex<StoreLog>>,
    open: bool,
}

impl StoreConnection for ScriptedConnection {
    fn execute(&mut self, command: &WriteCommand) -> StoreResult<usize> {
        if !self.open {
            return Err(StoreError::Closed);
        }
        if command
            .params()
            .iter()
            .any(|p| matches!(p, ParamValue::Integer(v) if *v < 0))
        {
            return Err(StoreError::Message("constraint violation".to_string()));
        }
        let mut log = self.log.lock().expect("lock");
        if log.panics_remaining > 0 {
            log.panics_remaining -= 1;
            drop(log);
            panic!("store driver crashed");
        }
        log.in_flight.push(command.to_string());
        Ok(1)
    }

    fn commit(&mut self) -> StoreResult<()> {
        let mut log = self.log.lock().expect("lock");
        if log.commits_to_fail > 0 {
            log.commits_to_fail -= 1;
            return Err(StoreError::Message("commit rejected".to_string()));
        }
        let batch = std::mem::take(&mut log.in_flight);
        if !batch.is_empty() {
            log.committed.push(batch);
        }
        Ok(())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        let mut log = self.log.lock().expect("lock");
        log.in_flight.clear();
        log.rollbacks += 1;
        Ok(())
    }

    fn close(&mut self) -> StoreResult<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let mut log = self.log.lock().expect("lock");
        log.closes += 1;
        if log.close_fails {
            return Err(StoreError::Message("close failed".to_string()));
        }
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        if self.open {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }
}
