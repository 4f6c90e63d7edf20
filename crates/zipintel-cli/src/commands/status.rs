//! `zipintel status` command implementation
//!
//! Rebuilds a batch summary from the append-only progress log.

use crate::error::Result;
use colored::Colorize;
use std::path::Path;
use uuid::Uuid;

/// Summarize one past batch
pub async fn run(config_path: Option<&Path>, batch_id: Uuid) -> Result<()> {
    let processor = crate::build_processor(config_path)?;
    let result = processor.status(batch_id).await?;

    if result.units_attempted == 0 {
        println!("No progress entries found for batch {batch_id}.");
        return Ok(());
    }

    println!("{}", "Batch Status:".cyan().bold());
    println!("  Batch id:   {}", result.batch_id);
    println!("  Attempted:  {}", result.units_attempted);
    println!("  Done:       {}", result.units_done);
    println!("  Failed:     {}", result.units_failed);
    println!("  Skipped:    {}", result.units_skipped);
    println!("  Deferred:   {}", result.units_deferred);
    println!("  Stored:     {}", result.records_stored);
    println!("  Calls used: {}", result.calls_used);

    Ok(())
}
