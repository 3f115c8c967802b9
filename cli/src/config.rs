//! Command line and environment configuration of the `clientstore` binary

use clap::{Parser, Subcommand};
use clientstore::DEFAULT_NAMESPACE;
use std::path::PathBuf;

/// Namespaced key-value storage backed by SQLite files
#[derive(Parser, Debug)]
#[command(name = "clientstore", version)]
pub struct Config {
    /// Directory holding one `<namespace>.sqlite3` file per namespace
    #[arg(long, env = "CLIENTSTORE_DIR", default_value = ".")]
    pub dir: PathBuf,

    /// Namespace to operate on
    #[arg(long, short = 'n', env = "CLIENTSTORE_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Print the value stored under KEY; prints nothing if KEY is missing
    Get { key: String },
    /// Store the JSON value under KEY
    Set { key: String, value: String },
    /// Remove KEY
    Delete { key: String },
    /// Print whether KEY is present
    Has { key: String },
    /// Print whether some stored value equals the JSON value
    Contains { value: String },
    /// Print the number of stored values
    Size,
    /// Remove all values of the namespace
    Clear,
    /// Print every stored value, one JSON document per line
    List,
    /// Delete the whole namespace
    Drop,
}
