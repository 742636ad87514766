//! # farma-ingest
//!
//! Command line entry point.
//!
//! ```text
//! farma-ingest [--config farma.toml] ingest <file.xml>...   → BatchReport JSON
//! farma-ingest [--config farma.toml] reprocess <file.xml> [--invoice-id <id>]
//!                                                            → summary JSON
//! farma-ingest [--config farma.toml] delete <invoice-id>
//! farma-ingest [--config farma.toml] show <access-key>      → invoice JSON
//! ```
//!
//! Results go to stdout as JSON; logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use farma_ingest::{IngestConfig, Ingestor};

#[derive(Debug, Parser)]
#[command(name = "farma-ingest", version, about = "Ingest NFe purchase invoices")]
struct Cli {
    /// Path to farma.toml (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest one or more XML files
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Replace the stored copy of an invoice with the contents of a file
    Reprocess {
        file: PathBuf,

        /// Also replace this stored invoice (for a file with a corrected access key)
        #[arg(long)]
        invoice_id: Option<String>,
    },

    /// Delete a stored invoice and its items
    Delete { invoice_id: String },

    /// Print a stored invoice with its items
    Show { access_key: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = IngestConfig::load(cli.config).context("loading configuration")?;
    info!(database = %config.database.path.display(), "Configuration loaded");

    let ingestor = Ingestor::from_config(&config)
        .await
        .context("opening database")?;

    let code = match cli.command {
        Command::Ingest { files } => {
            let report = ingestor.ingest_batch(&files).await?;
            print_json(&report)?;
            if report.error_count == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Command::Reprocess { file, invoice_id } => {
            let ingested = ingestor.reprocess(&file, invoice_id.as_deref()).await?;
            print_json(&ingested.summary())?;
            ExitCode::SUCCESS
        }
        Command::Delete { invoice_id } => {
            let items = ingestor.delete(&invoice_id).await?;
            info!(invoice_id = %invoice_id, items, "Invoice deleted");
            ExitCode::SUCCESS
        }
        Command::Show { access_key } => match ingestor.show(&access_key).await? {
            Some(detail) => {
                print_json(&detail)?;
                ExitCode::SUCCESS
            }
            None => {
                error!(access_key = %access_key, "Invoice not found");
                ExitCode::FAILURE
            }
        },
    };

    ingestor.database().close().await;
    Ok(code)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=farma=trace` - Show trace for farma crates only
/// - Default: `info,farma=debug,sqlx=warn`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,farma=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
