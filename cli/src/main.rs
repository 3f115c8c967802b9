use clap::Parser;
use clientstore::{storage_schema, ClientStorage};
use cli::commands::execute;
use cli::config::Config;
use cli::SqliteDb;
use tracing::debug;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();
    debug!(dir = %config.dir.display(), namespace = %config.namespace, command = ?config.command, "starting");

    let db = SqliteDb::open(&config.dir, &config.namespace, &storage_schema())?;
    let store = ClientStorage::from_database(db);

    for line in execute(store, config.command).await? {
        println!("{line}");
    }
    Ok(())
}
