//! In-memory implementation of `Database`

use super::types::{Database, DbError, Record, TableSchema};
use crate::registry::NamespaceRegistry;
use lazy_static::lazy_static;
use linked_hash_map::LinkedHashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

lazy_static! {
    static ref MEM_DATABASES: NamespaceRegistry<MemDb> = NamespaceRegistry::new();
}

struct MemTable {
    unique_index: String,
    rows: LinkedHashMap<String, Value>,
}

struct MemState {
    tables: HashMap<String, MemTable>,
    deleted: bool,
}

/// In-memory implementation of `Database`
///
/// Rows live in insertion-ordered hash maps, one per table. Handles
/// obtained through `MemDb::open` are shared process-wide per namespace.
pub struct MemDb {
    namespace: String,
    state: Mutex<MemState>,
}

impl MemDb {
    /// Create a standalone database, not registered anywhere
    #[must_use]
    pub fn new(namespace: &str, schema: &[TableSchema]) -> Self {
        let db = Self {
            namespace: namespace.to_string(),
            state: Mutex::new(MemState {
                tables: HashMap::new(),
                deleted: false,
            }),
        };
        db.ensure_tables(schema);
        db
    }

    /// Open the process-wide database for `namespace`, creating it on first use.
    ///
    /// Tables from `schema` missing in an already opened database are added.
    #[must_use]
    pub fn open(namespace: &str, schema: &[TableSchema]) -> Arc<MemDb> {
        let result = MEM_DATABASES.get_or_open(namespace, || {
            debug!(namespace = %namespace, "creating in-memory namespace");
            Ok::<_, std::convert::Infallible>(MemDb::new(namespace, schema))
        });
        let db = match result {
            Ok(db) => db,
            Err(never) => match never {},
        };
        db.ensure_tables(schema);
        db
    }

    /// Namespaces currently opened through `MemDb::open`
    #[must_use]
    pub fn namespaces() -> Vec<String> {
        MEM_DATABASES.namespaces()
    }

    fn ensure_tables(&self, schema: &[TableSchema]) {
        let mut state = self.state.lock();
        for table in schema {
            state
                .tables
                .entry(table.name.clone())
                .or_insert_with(|| MemTable {
                    unique_index: table.unique_index.clone(),
                    rows: LinkedHashMap::new(),
                });
        }
    }

    /// Run `op` on a live table, mapping the lookup failures to errors
    fn with_table<R>(
        &self,
        table: &str,
        op: impl FnOnce(&mut MemTable) -> Result<R, DbError>,
    ) -> Result<R, DbError> {
        let mut state = self.state.lock();
        if state.deleted {
            return Err(DbError::Deleted(self.namespace.clone()));
        }
        let table = state
            .tables
            .get_mut(table)
            .ok_or_else(|| DbError::TableNotFound(table.to_string()))?;
        op(table)
    }

    fn with_index<R>(
        &self,
        table: &str,
        index: &str,
        op: impl FnOnce(&mut LinkedHashMap<String, Value>) -> R,
    ) -> Result<R, DbError> {
        self.with_table(table, |t| {
            if t.unique_index != index {
                return Err(DbError::IndexNotFound(index.to_string()));
            }
            Ok(op(&mut t.rows))
        })
    }

    fn snapshot(&self, table: &str) -> Result<Vec<Record>, DbError> {
        self.with_table(table, |t| {
            Ok(t.rows
                .iter()
                .map(|(k, v)| Record::new(k.clone(), v.clone()))
                .collect())
        })
    }
}

impl Database for MemDb {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn each<F>(&self, table: &str, mut f: F) -> Result<(), DbError>
    where
        F: FnMut(&Record) + Send,
    {
        // Iterate a copy so callbacks can reenter the database
        for record in self.snapshot(table)? {
            f(&record);
        }
        Ok(())
    }

    async fn some<F>(&self, table: &str, mut f: F) -> Result<Option<Record>, DbError>
    where
        F: FnMut(&Record) -> bool + Send,
    {
        Ok(self.snapshot(table)?.into_iter().find(|record| f(record)))
    }

    async fn clear(&self, table: &str) -> Result<(), DbError> {
        self.with_table(table, |t| {
            t.rows.clear();
            Ok(())
        })
    }

    async fn has(&self, table: &str, index: &str, key: &str) -> Result<bool, DbError> {
        self.with_index(table, index, |rows| rows.contains_key(key))
    }

    async fn read(&self, table: &str, index: &str, key: &str) -> Result<Option<Record>, DbError> {
        self.with_index(table, index, |rows| {
            rows.get(key).map(|v| Record::new(key, v.clone()))
        })
    }

    async fn save(&self, table: &str, record: Record, upsert: bool) -> Result<(), DbError> {
        trace!(namespace = %self.namespace, table = %table, key = %record.k, upsert, "save");
        self.with_table(table, |t| {
            if !upsert && t.rows.contains_key(&record.k) {
                return Err(DbError::UniqueViolation(record.k));
            }
            // Replacing an existing key moves it to the back
            t.rows.insert(record.k, record.v);
            Ok(())
        })
    }

    async fn size(&self, table: &str) -> Result<usize, DbError> {
        self.with_table(table, |t| Ok(t.rows.len()))
    }

    async fn delete(&self, table: &str, index: &str, key: &str) -> Result<(), DbError> {
        self.with_index(table, index, |rows| {
            rows.remove(key);
        })
    }

    async fn delete_database(&self) -> Result<(), DbError> {
        {
            let mut state = self.state.lock();
            if state.deleted {
                return Err(DbError::Deleted(self.namespace.clone()));
            }
            // Unregister first: an open racing with us gets either a live
            // handle or a fresh namespace, never this one once it is deleted
            MEM_DATABASES.release(&self.namespace, self);
            state.deleted = true;
            state.tables.clear();
        }
        debug!(namespace = %self.namespace, "deleted in-memory namespace");
        Ok(())
    }
}
