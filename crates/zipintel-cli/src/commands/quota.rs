//! `zipintel quota` command implementation
//!
//! Reads the quota window snapshot from durable state and prints usage.

use crate::error::{CliError, Result};
use chrono::Utc;
use colored::Colorize;
use std::path::Path;
use zipintel_ingest::config::IngestionConfig;
use zipintel_ingest::quota::QuotaSnapshot;

/// Show the active quota window and remaining budget
pub fn run(config_path: Option<&Path>) -> Result<()> {
    let config = IngestionConfig::load(config_path)?;
    let path = config.quota_state_path();

    if !path.exists() {
        return Err(CliError::StateNotFound(path.display().to_string()));
    }

    let raw = std::fs::read(&path)?;
    let snapshot: QuotaSnapshot =
        serde_json::from_slice(&raw).map_err(|e| CliError::StateCorrupt {
            file: path.display().to_string(),
            detail: e.to_string(),
        })?;

    println!("{}", "Quota Window:".cyan().bold());
    println!("  Started:  {}", snapshot.window_start.to_rfc3339());
    println!("  Ends:     {}", snapshot.window_end.to_rfc3339());
    if Utc::now() >= snapshot.window_end {
        println!("  State:    {}", "expired (counters reset on next run)".yellow());
    }
    println!(
        "  Calls:    {} / {} ({} remaining)",
        snapshot.calls_used,
        snapshot.calls_allowed,
        snapshot.calls_allowed.saturating_sub(snapshot.calls_used)
    );
    println!(
        "  Records:  {} / {}",
        snapshot.records_used, snapshot.records_allowed
    );

    Ok(())
}
