//! ZipIntel CLI - Main entry point

use clap::Parser;
use std::process;
use tracing::error;
use zipintel_cli::{Cli, Commands};
use zipintel_common::logging::{init_logging, LogConfig, LogLevel};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Normal mode keeps the console quiet; pipeline logs go to file.
    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Warn
    };
    let log_config = LogConfig::from_env()
        .unwrap_or_default()
        .with_level(level)
        .with_file_prefix("zipintel-cli");

    // CLI should still work when logging cannot start
    let _ = init_logging(&log_config);

    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn execute_command(cli: &Cli) -> zipintel_cli::Result<()> {
    let config_path = cli.config.as_deref();

    match &cli.command {
        Commands::Batch { json } => {
            zipintel_cli::commands::batch::run(config_path, *json).await
        },
        Commands::Unit { postal_code } => {
            zipintel_cli::commands::unit::run(config_path, postal_code).await
        },
        Commands::Status { batch_id } => {
            zipintel_cli::commands::status::run(config_path, *batch_id).await
        },
        Commands::Quota => zipintel_cli::commands::quota::run(config_path),
        Commands::Units { limit } => zipintel_cli::commands::units::run(config_path, *limit),
    }
}
