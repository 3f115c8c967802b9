pub mod commands;
pub mod config;
pub mod sqlitedb;

pub use sqlitedb::SqliteDb;
