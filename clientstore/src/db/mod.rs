//! Table engines for clientstore
//!
//! Contains the engine abstraction and the in-memory implementation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  ClientStorage (facade)             │
//! │  - one namespace, table "t"         │
//! │  - wraps values as {k, v} records   │
//! └─────────────────────────────────────┘
//!          ▲
//!          │ forwards every call to
//!          ▼
//! ┌─────────────────────────────────────┐
//! │  Database (engine trait)            │
//! │  - tables with a unique index       │
//! │  - async operations                 │
//! └─────────────────────────────────────┘
//!      ▲               ▲
//!      │               │
//!    MemDb         SqliteDb (cli crate)
//! ```

pub mod memdb;
pub mod types;

pub use memdb::MemDb;
pub use types::{Database, DbError, Record, TableSchema};
