//! SQLite-backed connection resource.

use std::path::PathBuf;
use std::time::Duration;

use rusqlite::{
    Connection, OpenFlags, params_from_iter,
    types::{ToSql, ToSqlOutput, ValueRef},
};

use crate::{command::ParamValue, command::WriteCommand, config::ConnectionParams};

use super::{ConnectionState, Connector, StoreConnection, StoreError, StoreResult};

const MEMORY_URL: &str = "sqlite::memory:";
const FILE_PREFIX: &str = "sqlite://";

impl ToSql for ParamValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            ParamValue::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            ParamValue::Integer(v) => ToSqlOutput::Borrowed(ValueRef::Integer(*v)),
            ParamValue::Real(v) => ToSqlOutput::Borrowed(ValueRef::Real(*v)),
            ParamValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            ParamValue::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
        })
    }
}

/// SQLite implementation of [`StoreConnection`].
///
/// SQLite runs in autocommit mode until `BEGIN`; the first `execute` after a
/// commit opens the next transaction, so every write lands inside an explicit
/// transaction boundary.
pub struct SqliteConnection {
    conn: Option<Connection>,
}

impl SqliteConnection {
    /// Opens the database named by `params.url`.
    ///
    /// File databases get WAL mode and `synchronous=NORMAL`.
    pub fn open(params: &ConnectionParams) -> StoreResult<Self> {
        let conn = match resolve_path(&params.url)? {
            None => Connection::open_in_memory()?,
            Some(path) => {
                let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX;
                if params.create_if_missing {
                    flags |= OpenFlags::SQLITE_OPEN_CREATE;
                }
                let conn = Connection::open_with_flags(path, flags)?;
                conn.pragma_update(None, "journal_mode", "WAL")?;
                conn.pragma_update(None, "synchronous", "NORMAL")?;
                conn
            }
        };
        Self::init_connection(conn, params)
    }

    /// Private in-memory database with default parameters.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open(&ConnectionParams::default())
    }

    fn init_connection(conn: Connection, params: &ConnectionParams) -> StoreResult<Self> {
        conn.busy_timeout(Duration::from_millis(params.busy_timeout_ms))?;
        if let Some(sql) = params.init_sql.as_deref() {
            conn.execute_batch(sql)?;
        }
        Ok(Self { conn: Some(conn) })
    }

    fn connection(&self) -> StoreResult<&Connection> {
        self.conn.as_ref().ok_or(StoreError::Closed)
    }
}

impl StoreConnection for SqliteConnection {
    fn execute(&mut self, command: &WriteCommand) -> StoreResult<usize> {
        let conn = self.connection()?;
        if conn.is_autocommit() {
            conn.execute_batch("BEGIN")?;
        }
        let mut stmt = conn.prepare_cached(command.sql())?;
        let affected = stmt.execute(params_from_iter(command.params().iter()))?;
        Ok(affected)
    }

    fn commit(&mut self) -> StoreResult<()> {
        let conn = self.connection()?;
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        let conn = self.connection()?;
        // Some errors make SQLite roll back on its own.
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn close(&mut self) -> StoreResult<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        conn.flush_prepared_statement_cache();
        conn.close().map_err(|(_, err)| StoreError::Sqlite(err))
    }

    fn state(&self) -> ConnectionState {
        if self.conn.is_some() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }
}

/// Connects sink instances to SQLite.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

impl Connector for SqliteConnector {
    fn connect(&self, params: &ConnectionParams) -> StoreResult<Box<dyn StoreConnection>> {
        Ok(Box::new(SqliteConnection::open(params)?))
    }
}

fn resolve_path(url: &str) -> StoreResult<Option<PathBuf>> {
    if url == MEMORY_URL {
        return Ok(None);
    }
    match url.strip_prefix(FILE_PREFIX) {
        Some(path) if !path.is_empty() => Ok(Some(PathBuf::from(path))),
        _ => Err(StoreError::Message(format!("unsupported sqlite url: {url}"))),
    }
}
