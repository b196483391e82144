//! Buffered transactional write sink for streaming pipelines.
//!
//! Each record is turned into a [`command::WriteCommand`] by a
//! [`command::RecordTransform`] and committed to the target store either
//! immediately (batch size 1) or in batches. A batch is committed when it
//! fills, when the flush interval elapses, when a checkpoint barrier arrives,
//! or on close, always as one transaction.
//!
//! # Examples
//!
//! Buffered writes into SQLite:
//! ```no_run
//! use txsink::{
//!     command::{TransformError, WriteCommand},
//!     config::{ConnectionParams, SinkConfig},
//!     sink::{TaskContext, TransactionalSink},
//! };
//!
//! fn to_insert(reading: &(String, f64)) -> Result<WriteCommand, TransformError> {
//!     Ok(WriteCommand::new("INSERT INTO readings(sensor, value) VALUES (?1, ?2)")
//!         .bind(reading.0.as_str())
//!         .bind(reading.1))
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = SinkConfig {
//!     batch_size: 500,
//!     flush_interval_ms: 1_000,
//!     connection: ConnectionParams {
//!         url: "sqlite://readings.db".to_string(),
//!         init_sql: Some(
//!             "CREATE TABLE IF NOT EXISTS readings(sensor TEXT, value REAL);".to_string(),
//!         ),
//!         ..ConnectionParams::default()
//!     },
//!     ..SinkConfig::default()
//! };
//!
//! let (mut sink, _checkpoint) = TransactionalSink::sqlite(config, to_insert).expect("config");
//! sink.open(&TaskContext::default()).await.expect("open");
//! sink.invoke(&("s1".to_string(), 21.5)).await.expect("invoke");
//! sink.close().await.expect("close");
//! # }
//! ```
#![warn(missing_docs)]

/// Pending command buffer.
pub mod buffer;
/// Checkpoint settings handed to the host engine.
pub mod checkpoint;
/// Write commands and record transforms.
pub mod command;
/// Sink configuration and overrides.
pub mod config;
/// Error taxonomy.
pub mod error;
/// Store connection abstraction and SQLite implementation.
pub mod persist;
/// Flush coordinator, immediate writer and events.
pub mod runtime;
/// Sink façade and lifecycle.
pub mod sink;
/// Tracing setup and metrics.
pub mod telemetry;
/// Shared primitive types.
pub mod types;
