//! Command-line interface for bulkcopy
//!
//! # Usage Examples
//!
//! ```bash
//! # Load a file into a fresh UNLOGGED table
//! bulkcopy \
//!   --connection-string "host=localhost user=postgres password=postgres dbname=testdb" \
//!   --file people.csv \
//!   --table people
//!
//! # Stream from stdin into a schema-qualified table, leaving session settings alone
//! POSTGRESQL_CONNECTION_STRING="postgresql://postgres@localhost/testdb" \
//!   gunzip -c big.csv.gz | bulkcopy --file - --table staging.big --skip-tuning
//! ```
//!
//! Set `RUST_LOG` (e.g. `RUST_LOG=debug`) for more detail.

use anyhow::Context;
use bulkcopy::postgresql::{normalize_relation_name, PostgresDestination};
use bulkcopy::{open_source, process_with, Error, LoadArgs};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Parser)]
#[command(name = "bulkcopy")]
#[command(about = "Bulk load a CSV file into a fresh PostgreSQL table with COPY")]
#[command(long_about = None)]
struct Cli {
    #[command(flatten)]
    load: LoadArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let args = cli.load;

    let source = open_source(&args.file)
        .with_context(|| format!("Failed to open CSV source '{}'", args.file))?;

    let mut destination = PostgresDestination::connect(&args.connection_string)
        .await
        .map_err(Error::Connect)?
        .with_flush_threshold(args.flush_bytes);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, rolling back load");
            on_signal.cancel();
        }
    });

    let options = args.process_options(cancel);
    process_with(&mut destination, source, &args.table, &options)
        .await
        .with_context(|| format!("Failed to load '{}' into '{}'", args.file, args.table))?;

    let table = normalize_relation_name(&args.table);
    if let Ok(rows) = destination.row_count(&table).await {
        debug!("Table {} now holds {} rows", table, rows);
    }

    Ok(())
}
