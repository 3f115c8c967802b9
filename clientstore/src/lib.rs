pub mod db;
pub mod registry;
pub mod storage;

// Re-export engine types for convenience
pub use db::{Database, DbError, MemDb, Record, TableSchema};

// Re-export the registry for engines living outside this crate
pub use registry::NamespaceRegistry;

// Re-export the facade
pub use storage::{
    resolve_namespace, storage_schema, values_equal, ClientStorage, DEFAULT_NAMESPACE, KEY_COLUMN,
    TABLE,
};
