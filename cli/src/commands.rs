//! Execution of CLI commands against a store

use crate::config::Command;
use clientstore::{ClientStorage, Database};
use serde_json::Value;
use tracing::info;

fn parse_json(text: &str) -> Result<Value, Box<dyn std::error::Error>> {
    serde_json::from_str(text).map_err(|e| format!("invalid JSON value {text:?}: {e}").into())
}

/// Run `command` on `store` and return the lines to print
///
/// # Errors
///
/// Returns an error if a JSON argument does not parse or the store fails.
pub async fn execute<D: Database>(
    store: ClientStorage<D>,
    command: Command,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let lines = match command {
        // A missing key prints no line; a stored `null` prints `null`
        Command::Get { key } => store
            .get::<Value>(&key)
            .await?
            .map(|value| value.to_string())
            .into_iter()
            .collect(),
        Command::Set { key, value } => {
            store.set(&key, &parse_json(&value)?).await?;
            Vec::new()
        }
        Command::Delete { key } => {
            store.delete(&key).await?;
            Vec::new()
        }
        Command::Has { key } => vec![store.has(&key).await?.to_string()],
        Command::Contains { value } => {
            vec![store.contains(&parse_json(&value)?).await?.to_string()]
        }
        Command::Size => vec![store.size().await?.to_string()],
        Command::Clear => {
            store.clear().await?;
            Vec::new()
        }
        Command::List => {
            let mut lines = Vec::new();
            store.each(|value: Value| lines.push(value.to_string())).await?;
            lines
        }
        Command::Drop => {
            let namespace = store.namespace().to_string();
            store.delete_storage().await?;
            info!(namespace = %namespace, "namespace deleted");
            Vec::new()
        }
    };
    Ok(lines)
}
