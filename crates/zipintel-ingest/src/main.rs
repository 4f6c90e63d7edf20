//! ZipIntel Ingest - listing ingestion tool

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use zipintel_common::logging::{init_logging, LogConfig, LogLevel};
use zipintel_ingest::config::IngestionConfig;
use zipintel_ingest::processor::BatchProcessor;
use zipintel_ingest::progress::JsonlProgressStore;
use zipintel_ingest::source::HttpSourceClient;
use zipintel_ingest::storage::MemoryListingStore;

#[derive(Parser, Debug)]
#[command(name = "zipintel-ingest")]
#[command(author, version, about = "ZIP-code listing ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (TOML); environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Run one prioritized batch over the configured tiers
    Batch,

    /// Ingest a single ZIP code synchronously
    Unit {
        /// Postal code to ingest
        postal_code: String,
    },

    /// Summarize a past batch from the progress log
    Status {
        /// Batch identifier
        batch_id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::from_env()
        .unwrap_or_default()
        .with_level(log_level)
        .with_file_prefix("zipintel-ingest");
    init_logging(&log_config)?;

    let config = IngestionConfig::load(cli.config.as_deref())?;
    let source = Arc::new(HttpSourceClient::from_config(&config)?);
    let store = Arc::new(MemoryListingStore::new());
    let progress = Arc::new(JsonlProgressStore::new(config.progress_log_path())?);

    let processor = BatchProcessor::new(config, source, store, progress)?;

    match cli.command {
        Command::Batch => {
            info!("Starting batch run");
            let result = processor.run().await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        },
        Command::Unit { postal_code } => {
            info!(postal_code = %postal_code, "Ingesting single unit");
            let entry = processor.run_unit(&postal_code).await?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        },
        Command::Status { batch_id } => {
            let result = processor.status(batch_id).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        },
    }

    Ok(())
}
