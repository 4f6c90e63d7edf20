//! ZipIntel CLI Library
//!
//! Operator-facing command-line interface for the ingestion core:
//!
//! - **Batch runs**: dispatch a prioritized batch (`zipintel batch`)
//! - **Single units**: ingest one ZIP synchronously (`zipintel unit`)
//! - **Batch status**: summarize past runs from the progress log
//!   (`zipintel status`)
//! - **Quota inspection**: show the active call/record window
//!   (`zipintel quota`)
//! - **Queue inspection**: show work units by priority (`zipintel units`)

pub mod commands;
pub mod error;

pub use error::{CliError, Result};

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;
use zipintel_ingest::config::IngestionConfig;
use zipintel_ingest::processor::BatchProcessor;
use zipintel_ingest::progress::JsonlProgressStore;
use zipintel_ingest::source::HttpSourceClient;
use zipintel_ingest::storage::MemoryListingStore;

/// ZipIntel - ZIP-code listing ingestion
#[derive(Parser, Debug)]
#[command(name = "zipintel")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (TOML); environment variables override it
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one prioritized batch over the configured tiers
    Batch {
        /// Print the batch result as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

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

    /// Show the active quota window
    Quota,

    /// Show work units in scheduling order
    Units {
        /// Maximum number of units to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

/// Load configuration and wire up a processor over file-backed state
pub fn build_processor(config_path: Option<&std::path::Path>) -> Result<BatchProcessor> {
    let config = IngestionConfig::load(config_path)?;
    let source = Arc::new(HttpSourceClient::from_config(&config)?);
    let store = Arc::new(MemoryListingStore::new());
    let progress = Arc::new(JsonlProgressStore::new(config.progress_log_path())?);
    Ok(BatchProcessor::new(config, source, store, progress)?)
}
