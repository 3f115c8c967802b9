//! SQLite-backed implementation of `Database`
//!
//! Each namespace is one SQLite file `<dir>/<namespace>.sqlite3`; each table
//! of the schema is one SQL table with an autoincrement row id (iteration
//! order), the unique key column and a JSON text value column.

use clientstore::{Database, DbError, NamespaceRegistry, Record, TableSchema};
use lazy_static::lazy_static;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

lazy_static! {
    static ref SQLITE_DATABASES: NamespaceRegistry<SqliteDb> = NamespaceRegistry::new();
}

/// Map a rusqlite error to the engine error kind
fn sql_error(e: rusqlite::Error) -> DbError {
    DbError::Io(e.to_string())
}

/// Namespace and table names end up in file names and SQL identifiers
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// SQLite-backed table engine
///
/// The connection is dropped by `delete_database`; later calls fail with
/// `DbError::Deleted`.
pub struct SqliteDb {
    namespace: String,
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
    /// Table name to unique index column
    tables: Mutex<HashMap<String, String>>,
}

impl SqliteDb {
    /// Open the database file for `namespace` inside `dir`, creating it and
    /// the tables of `schema` if needed.
    ///
    /// Handles are shared process-wide per file path.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Open` if the namespace or a schema name is not
    /// usable, or if the file cannot be opened.
    pub fn open<P: AsRef<Path>>(
        dir: P,
        namespace: &str,
        schema: &[TableSchema],
    ) -> Result<Arc<SqliteDb>, DbError> {
        if !is_valid_name(namespace) {
            return Err(DbError::Open(format!("invalid namespace name: {namespace}")));
        }
        let path = dir.as_ref().join(format!("{namespace}.sqlite3"));
        let registry_key = path.to_string_lossy().to_string();

        let db = SQLITE_DATABASES.get_or_open(&registry_key, || {
            debug!(namespace = %namespace, path = %path.display(), "opening sqlite namespace");
            let conn = Connection::open(&path)
                .map_err(|e| DbError::Open(format!("{}: {e}", path.display())))?;
            Ok::<_, DbError>(SqliteDb {
                namespace: namespace.to_string(),
                path: path.clone(),
                conn: Mutex::new(Some(conn)),
                tables: Mutex::new(HashMap::new()),
            })
        })?;
        db.ensure_tables(schema)?;
        Ok(db)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_tables(&self, schema: &[TableSchema]) -> Result<(), DbError> {
        for table in schema {
            if !is_valid_identifier(&table.name) || !is_valid_identifier(&table.unique_index) {
                return Err(DbError::Open(format!(
                    "invalid table schema: {}({})",
                    table.name, table.unique_index
                )));
            }
            self.with_conn(|conn| {
                conn.execute(
                    &format!(
                        "CREATE TABLE IF NOT EXISTS \"{}\" (
                            seq INTEGER PRIMARY KEY AUTOINCREMENT,
                            \"{}\" TEXT NOT NULL UNIQUE,
                            v TEXT NOT NULL
                        )",
                        table.name, table.unique_index
                    ),
                    [],
                )
                .map_err(|e| DbError::Open(e.to_string()))
            })?;
            self.tables
                .lock()
                .insert(table.name.clone(), table.unique_index.clone());
        }
        Ok(())
    }

    /// Run `op` on the live connection
    fn with_conn<R>(
        &self,
        op: impl FnOnce(&Connection) -> Result<R, DbError>,
    ) -> Result<R, DbError> {
        let conn = self.conn.lock();
        match conn.as_ref() {
            Some(conn) => op(conn),
            None => Err(DbError::Deleted(self.namespace.clone())),
        }
    }

    /// Unique index column of `table`
    fn key_column(&self, table: &str) -> Result<String, DbError> {
        self.tables
            .lock()
            .get(table)
            .cloned()
            .ok_or_else(|| DbError::TableNotFound(table.to_string()))
    }

    fn check_index(&self, table: &str, index: &str) -> Result<String, DbError> {
        let column = self.key_column(table)?;
        if column != index {
            return Err(DbError::IndexNotFound(index.to_string()));
        }
        Ok(column)
    }

    fn snapshot(&self, table: &str) -> Result<Vec<Record>, DbError> {
        let column = self.key_column(table)?;
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT \"{column}\", v FROM \"{table}\" ORDER BY seq"))
                .map_err(sql_error)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(sql_error)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(sql_error)?;
            rows.into_iter()
                .map(|(k, v)| -> Result<Record, DbError> {
                    Ok(Record::new(k, serde_json::from_str(&v)?))
                })
                .collect()
        })
    }
}

impl Database for SqliteDb {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn each<F>(&self, table: &str, mut f: F) -> Result<(), DbError>
    where
        F: FnMut(&Record) + Send,
    {
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
        self.key_column(table)?;
        self.with_conn(|conn| {
            conn.execute(&format!("DELETE FROM \"{table}\""), [])
                .map_err(sql_error)?;
            Ok(())
        })
    }

    async fn has(&self, table: &str, index: &str, key: &str) -> Result<bool, DbError> {
        let column = self.check_index(table, index)?;
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT EXISTS(SELECT 1 FROM \"{table}\" WHERE \"{column}\" = ?)"),
                params![key],
                |row| row.get::<_, bool>(0),
            )
            .map_err(sql_error)
        })
    }

    async fn read(&self, table: &str, index: &str, key: &str) -> Result<Option<Record>, DbError> {
        let column = self.check_index(table, index)?;
        let text = self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT v FROM \"{table}\" WHERE \"{column}\" = ?"),
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(sql_error)
        })?;
        match text {
            Some(text) => Ok(Some(Record::new(key, serde_json::from_str(&text)?))),
            None => Ok(None),
        }
    }

    async fn save(&self, table: &str, record: Record, upsert: bool) -> Result<(), DbError> {
        trace!(namespace = %self.namespace, table = %table, key = %record.k, upsert, "save");
        let column = self.key_column(table)?;
        let value = serde_json::to_string(&record.v)?;
        // REPLACE deletes the old row, so the key gets a fresh seq
        let verb = if upsert { "INSERT OR REPLACE" } else { "INSERT" };
        self.with_conn(|conn| {
            match conn.execute(
                &format!("{verb} INTO \"{table}\" (\"{column}\", v) VALUES (?, ?)"),
                params![record.k, value],
            ) {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Err(DbError::UniqueViolation(record.k.clone()))
                }
                Err(e) => Err(sql_error(e)),
            }
        })
    }

    async fn size(&self, table: &str) -> Result<usize, DbError> {
        self.key_column(table)?;
        let count = self.with_conn(|conn| {
            conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| {
                row.get::<_, i64>(0)
            })
            .map_err(sql_error)
        })?;
        usize::try_from(count).map_err(|e| DbError::Io(e.to_string()))
    }

    async fn delete(&self, table: &str, index: &str, key: &str) -> Result<(), DbError> {
        let column = self.check_index(table, index)?;
        self.with_conn(|conn| {
            conn.execute(
                &format!("DELETE FROM \"{table}\" WHERE \"{column}\" = ?"),
                params![key],
            )
            .map_err(sql_error)?;
            Ok(())
        })
    }

    async fn delete_database(&self) -> Result<(), DbError> {
        let Some(conn) = self.conn.lock().take() else {
            return Err(DbError::Deleted(self.namespace.clone()));
        };
        // The handle is dead from here on, whatever happens to the file
        SQLITE_DATABASES.release(&self.path.to_string_lossy(), self);
        let closed = conn.close().map_err(|(_, e)| sql_error(e));
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(DbError::Io(e.to_string())),
        }
        closed?;
        debug!(namespace = %self.namespace, path = %self.path.display(), "deleted sqlite namespace");
        Ok(())
    }
}
