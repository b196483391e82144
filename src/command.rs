//! Write commands and the per-record transform that produces them.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single bound statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    /// SQL `NULL`.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for ParamValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "'{v}'"),
            Self::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// Immutable unit of work produced from one input record.
///
/// The statement text is passed through to the store untouched; parameters
/// are bound positionally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteCommand {
    sql: String,
    params: Vec<ParamValue>,
}

impl WriteCommand {
    /// Creates a command without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Creates a command with positional parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<ParamValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Appends one positional parameter.
    pub fn bind(mut self, value: impl Into<ParamValue>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Statement text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bound parameters in position order.
    pub fn params(&self) -> &[ParamValue] {
        &self.params
    }
}

impl fmt::Display for WriteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)?;
        if self.params.is_empty() {
            return Ok(());
        }
        f.write_str(" [")?;
        for (idx, param) in self.params.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str("]")
    }
}

/// A record could not be turned into a [`WriteCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("record transform failed: {reason}")]
pub struct TransformError {
    /// Human-readable cause.
    pub reason: String,
}

impl TransformError {
    /// Builds an error from any displayable reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Maps one pipeline record to one write command.
///
/// Implementations must be pure. Any closure of the shape
/// `Fn(&T) -> Result<WriteCommand, TransformError>` qualifies.
pub trait RecordTransform<T>: Send + Sync {
    /// Converts `record` into the command that persists it.
    fn transform(&self, record: &T) -> Result<WriteCommand, TransformError>;
}

impl<T, F> RecordTransform<T> for F
where
    F: Fn(&T) -> Result<WriteCommand, TransformError> + Send + Sync,
{
    fn transform(&self, record: &T) -> Result<WriteCommand, TransformError> {
        self(record)
    }
}
