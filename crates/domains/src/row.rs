//! # SQL values and rows
//!
//! Engine-neutral representation of bound parameters and fetched rows, so
//! the port traits do not leak any particular driver's types.

use crate::error::{DomainError, Result};
use serde::Serialize;

/// A single bound parameter or fetched column value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Integer(v.into())
    }
}

impl From<u64> for SqlValue {
    // Saturates; nothing we page through comes close to i64::MAX
    fn from(v: u64) -> Self {
        SqlValue::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Integer(v as i64)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

/// One fetched row: column names in select order with their values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlRow {
    columns: Vec<(String, SqlValue)>,
}

impl SqlRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder used by adapters and tests.
    pub fn with(mut self, name: &str, value: impl Into<SqlValue>) -> Self {
        self.push(name, value.into());
        self
    }

    pub fn push(&mut self, name: &str, value: SqlValue) {
        self.columns.push((name.to_string(), value));
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    fn require(&self, name: &str) -> Result<&SqlValue> {
        self.get(name)
            .ok_or_else(|| DomainError::Internal(format!("missing column {name}")))
    }

    pub fn i64(&self, name: &str) -> Result<i64> {
        match self.require(name)? {
            SqlValue::Integer(v) => Ok(*v),
            SqlValue::Null => Ok(0),
            other => Err(type_mismatch(name, "integer", other)),
        }
    }

    /// SQLite has no boolean type; anything non-zero is true.
    pub fn bool(&self, name: &str) -> Result<bool> {
        Ok(self.i64(name)? != 0)
    }

    /// Text column; NULL reads as the empty string.
    pub fn text(&self, name: &str) -> Result<String> {
        match self.require(name)? {
            SqlValue::Text(v) => Ok(v.clone()),
            SqlValue::Null => Ok(String::new()),
            SqlValue::Integer(v) => Ok(v.to_string()),
            other => Err(type_mismatch(name, "text", other)),
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

fn type_mismatch(name: &str, wanted: &str, got: &SqlValue) -> DomainError {
    DomainError::Internal(format!("column {name}: expected {wanted}, got {got:?}"))
}

/// Decodes a domain model out of an engine-neutral row.
pub trait FromSqlRow: Sized {
    fn from_row(row: &SqlRow) -> Result<Self>;
}
