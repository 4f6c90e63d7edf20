//! `zipintel batch` command implementation
//!
//! Runs one prioritized batch and prints the aggregate result.

use crate::error::Result;
use colored::Colorize;
use std::path::Path;
use zipintel_ingest::types::BatchResult;

/// Run one batch over the configured tiers
pub async fn run(config_path: Option<&Path>, json: bool) -> Result<()> {
    let processor = crate::build_processor(config_path)?;
    let result = processor.run().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }

    Ok(())
}

fn print_summary(result: &BatchResult) {
    println!("{}", "Batch Result:".cyan().bold());
    println!("  Batch id:    {}", result.batch_id);
    println!("  Attempted:   {}", result.units_attempted);
    println!("  Done:        {}", result.units_done.to_string().green());
    println!("  Failed:      {}", format_nonzero(result.units_failed, "red"));
    println!("  Skipped:     {}", result.units_skipped);
    println!("  Deferred:    {}", format_nonzero(result.units_deferred, "yellow"));
    println!("  Stored:      {}", result.records_stored);
    println!("  Calls used:  {}", result.calls_used);
    println!("  Duration:    {}ms", result.duration_ms);

    if !result.failed_units.is_empty() {
        println!();
        println!("{}", "Failed Units:".red().bold());
        for failed in &result.failed_units {
            let detail = failed
                .error
                .as_ref()
                .map(|e| format!("{}: {}", e.kind, e.message))
                .unwrap_or_else(|| "no error detail".to_string());
            println!("  {} - {}", failed.unit_id, detail);
        }
    }
}

fn format_nonzero(count: u64, color: &str) -> String {
    if count == 0 {
        count.to_string()
    } else {
        match color {
            "red" => count.to_string().red().to_string(),
            "yellow" => count.to_string().yellow().to_string(),
            _ => count.to_string(),
        }
    }
}
