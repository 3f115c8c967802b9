//! ClientStorage - namespaced key-value facade over a `Database`
//!
//! Every store talks to a single table `t` whose rows are `{k, v}` records:
//! `k` is the unique key, `v` the serialized value. All storage mechanics
//! belong to the engine; the facade only wraps and unwraps records.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Number, Value};
use tracing::{debug, trace};

use crate::db::{Database, DbError, MemDb, Record, TableSchema};

/// Namespace used when none (or an empty one) is given
pub const DEFAULT_NAMESPACE: &str = "_global";

/// Name of the single table of every store
pub const TABLE: &str = "t";

/// Unique index column of `TABLE`
pub const KEY_COLUMN: &str = "k";

/// The fixed schema every store opens its engine with
#[must_use]
pub fn storage_schema() -> Vec<TableSchema> {
    vec![TableSchema::new(TABLE, KEY_COLUMN)]
}

/// Pick the namespace to use for a requested one
#[must_use]
pub fn resolve_namespace(namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => ns.to_string(),
        _ => DEFAULT_NAMESPACE.to_string(),
    }
}

/// Structural equality of two JSON trees
///
/// Numbers compare by value, so `1946` equals `1946.0`.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

fn numbers_equal(x: &Number, y: &Number) -> bool {
    if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
        return x == y;
    }
    match (x.as_f64(), y.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Key-value store bound to one namespace
///
/// Cloning is cheap; clones share the engine handle. Stores opened for
/// the same namespace through `ClientStorage::new` share it as well.
///
/// # Example
///
/// ```
/// use clientstore::ClientStorage;
/// use serde_json::json;
///
/// # futures::executor::block_on(async {
/// let store = ClientStorage::new(Some("doc-example"));
/// store.set("answer", &json!(42)).await?;
/// assert_eq!(store.get::<i64>("answer").await?, Some(42));
/// store.delete_storage().await?;
/// # Ok::<(), clientstore::DbError>(())
/// # }).unwrap();
/// ```
pub struct ClientStorage<D: Database = MemDb> {
    db: Arc<D>,
}

impl<D: Database> Clone for ClientStorage<D> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

impl ClientStorage<MemDb> {
    /// Open a store on the process-wide in-memory engine
    #[must_use]
    pub fn new(namespace: Option<&str>) -> Self {
        let namespace = resolve_namespace(namespace);
        let db = MemDb::open(&namespace, &storage_schema());
        debug!(namespace = %namespace, "opened in-memory store");
        Self { db }
    }
}

impl<D: Database> ClientStorage<D> {
    /// Bind a store to an already opened engine handle
    ///
    /// The handle must have been opened with `storage_schema()`; the store
    /// takes its namespace from it.
    #[must_use]
    pub fn from_database(db: Arc<D>) -> Self {
        debug!(namespace = %db.namespace(), "bound store to database");
        Self { db }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        self.db.namespace()
    }

    #[must_use]
    pub fn database(&self) -> &Arc<D> {
        &self.db
    }

    /// Get the value stored under `key`
    ///
    /// # Errors
    /// Engine errors, or `Serialization` if the value does not decode as `T`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DbError> {
        trace!(namespace = %self.namespace(), key = %key, "get");
        match self.db.read(TABLE, KEY_COLUMN, key).await? {
            Some(record) => Ok(Some(serde_json::from_value(record.into_value())?)),
            None => Ok(None),
        }
    }

    /// Store `value` under `key`, replacing any previous value
    ///
    /// A unique-key violation reported by the engine means a concurrent
    /// write to the same key won; it is not an error for the caller.
    ///
    /// # Errors
    /// Engine errors, or `Serialization` if `value` cannot be serialized.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), DbError> {
        trace!(namespace = %self.namespace(), key = %key, "set");
        let record = Record::new(key, serde_json::to_value(value)?);
        match self.db.save(TABLE, record, true).await {
            Err(DbError::UniqueViolation(key)) => {
                debug!(namespace = %self.namespace(), key = %key, "lost concurrent write");
                Ok(())
            }
            other => other,
        }
    }

    /// Remove the value under `key`; a missing key is not an error
    ///
    /// # Errors
    /// Engine errors.
    pub async fn delete(&self, key: &str) -> Result<(), DbError> {
        trace!(namespace = %self.namespace(), key = %key, "delete");
        self.db.delete(TABLE, KEY_COLUMN, key).await
    }

    /// Check whether `key` is present
    ///
    /// # Errors
    /// Engine errors.
    pub async fn has(&self, key: &str) -> Result<bool, DbError> {
        self.db.has(TABLE, KEY_COLUMN, key).await
    }

    /// Check whether some stored value is structurally equal to `value`
    ///
    /// Values are compared with `values_equal`: field order in objects does
    /// not matter, every field and array element does, and integers equal
    /// floats of the same value.
    ///
    /// # Errors
    /// Engine errors, or `Serialization` if `value` cannot be serialized.
    pub async fn contains<T: Serialize + ?Sized>(&self, value: &T) -> Result<bool, DbError> {
        let needle = serde_json::to_value(value)?;
        let found = self
            .db
            .some(TABLE, |record| values_equal(&record.v, &needle))
            .await?;
        Ok(found.is_some())
    }

    /// Number of stored values
    ///
    /// # Errors
    /// Engine errors.
    pub async fn size(&self) -> Result<usize, DbError> {
        self.db.size(TABLE).await
    }

    /// Remove all values, keeping the namespace
    ///
    /// # Errors
    /// Engine errors.
    pub async fn clear(&self) -> Result<(), DbError> {
        debug!(namespace = %self.namespace(), "clear");
        self.db.clear(TABLE).await
    }

    /// Remove the whole namespace
    ///
    /// Other stores still bound to it fail with `DbError::Deleted`
    /// afterwards; opening the namespace again starts from scratch.
    ///
    /// # Errors
    /// Engine errors.
    pub async fn delete_storage(self) -> Result<(), DbError> {
        debug!(namespace = %self.namespace(), "delete storage");
        self.db.delete_database().await
    }

    /// Call `f` with every stored value, in engine order
    ///
    /// # Errors
    /// Engine errors, or `Serialization` for the first value that does not
    /// decode as `T`; `f` is not called for values after it.
    pub async fn each<T, F>(&self, mut f: F) -> Result<(), DbError>
    where
        T: DeserializeOwned,
        F: FnMut(T) + Send,
    {
        let mut failure: Option<DbError> = None;
        self.db
            .each(TABLE, |record| {
                if failure.is_some() {
                    return;
                }
                match serde_json::from_value::<T>(record.v.clone()) {
                    Ok(value) => f(value),
                    Err(e) => failure = Some(DbError::from(e)),
                }
            })
            .await?;
        failure.map_or(Ok(()), Err)
    }

    /// Call `f` with stored values, in engine order, until it returns `true`
    ///
    /// Returns the value `f` accepted, or `None` if it accepted none.
    ///
    /// # Errors
    /// Engine errors, or `Serialization` for the first value that does not
    /// decode as `T`.
    pub async fn some<T, F>(&self, mut f: F) -> Result<Option<T>, DbError>
    where
        T: DeserializeOwned + Send,
        F: FnMut(&T) -> bool + Send,
    {
        let mut failure: Option<DbError> = None;
        let mut matched: Option<T> = None;
        self.db
            .some(TABLE, |record| match serde_json::from_value::<T>(record.v.clone()) {
                Ok(value) => {
                    if f(&value) {
                        matched = Some(value);
                        true
                    } else {
                        false
                    }
                }
                Err(e) => {
                    failure = Some(DbError::from(e));
                    true
                }
            })
            .await?;
        match failure {
            Some(e) => Err(e),
            None => Ok(matched),
        }
    }
}
