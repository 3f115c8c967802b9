//! Table engine types and traits

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;

/// A single row of a table: a unique key and an opaque JSON value.
///
/// Field names are the record shape engines persist: `{"k": .., "v": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub k: String,
    pub v: Value,
}

impl Record {
    #[must_use]
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            k: key.into(),
            v: value,
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.k
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.v
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        self.v
    }
}

/// Schema of one table: its name and the column holding the unique index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub unique_index: String,
}

impl TableSchema {
    #[must_use]
    pub fn new(name: impl Into<String>, unique_index: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unique_index: unique_index.into(),
        }
    }
}

/// Errors that can occur in engine operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    /// The namespace was deleted; the handle is no longer usable
    Deleted(String),
    /// No table with this name in the opened namespace
    TableNotFound(String),
    /// The column is not the table's unique index
    IndexNotFound(String),
    /// Insert-only save hit an existing key
    UniqueViolation(String),
    /// A value could not be encoded or decoded
    Serialization(String),
    /// The namespace could not be opened
    Open(String),
    /// Underlying storage failure
    Io(String),
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deleted(namespace) => write!(f, "Namespace deleted: {namespace}"),
            Self::TableNotFound(table) => write!(f, "Table not found: {table}"),
            Self::IndexNotFound(index) => write!(f, "Index not found: {index}"),
            Self::UniqueViolation(key) => write!(f, "Unique constraint violation: {key}"),
            Self::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            Self::Open(msg) => write!(f, "Cannot open namespace: {msg}"),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for DbError {}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Trait for table-oriented storage engines
///
/// One value of an implementing type is one opened namespace. Tables are
/// addressed by name, rows by the value of the table's unique index column.
///
/// Callbacks passed to `each` and `some` run without any engine lock held,
/// so they may call back into the same engine.
pub trait Database: Send + Sync {
    /// Name of the namespace this handle was opened for
    fn namespace(&self) -> &str;

    /// Call `f` once for every record of `table`, in insertion order.
    fn each<F>(&self, table: &str, f: F) -> impl Future<Output = Result<(), DbError>> + Send
    where
        F: FnMut(&Record) + Send;

    /// Call `f` for records of `table` in insertion order until it returns
    /// `true`, and return the record it stopped at.
    fn some<F>(
        &self,
        table: &str,
        f: F,
    ) -> impl Future<Output = Result<Option<Record>, DbError>> + Send
    where
        F: FnMut(&Record) -> bool + Send;

    /// Remove all records of `table`. The table itself stays.
    fn clear(&self, table: &str) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Check whether a record with `key` in column `index` exists.
    fn has(
        &self,
        table: &str,
        index: &str,
        key: &str,
    ) -> impl Future<Output = Result<bool, DbError>> + Send;

    /// Read the record with `key` in column `index`.
    fn read(
        &self,
        table: &str,
        index: &str,
        key: &str,
    ) -> impl Future<Output = Result<Option<Record>, DbError>> + Send;

    /// Store `record`.
    ///
    /// - upsert: replaces an existing record with the same key; the record
    ///   moves to the end of the iteration order
    /// - insert-only: fails with `UniqueViolation` if the key exists
    fn save(
        &self,
        table: &str,
        record: Record,
        upsert: bool,
    ) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Number of records in `table`.
    fn size(&self, table: &str) -> impl Future<Output = Result<usize, DbError>> + Send;

    /// Remove the record with `key` in column `index`. Missing keys are not an error.
    fn delete(
        &self,
        table: &str,
        index: &str,
        key: &str,
    ) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Drop the whole namespace. Every later call on this handle fails
    /// with `Deleted`.
    fn delete_database(&self) -> impl Future<Output = Result<(), DbError>> + Send;
}
