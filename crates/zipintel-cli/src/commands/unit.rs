//! `zipintel unit` command implementation
//!
//! Ingests a single ZIP code synchronously and prints the progress entry.

use crate::error::Result;
use colored::Colorize;
use std::path::Path;

/// Ingest one postal code outside the batch cadence
pub async fn run(config_path: Option<&Path>, postal_code: &str) -> Result<()> {
    let processor = crate::build_processor(config_path)?;
    let entry = processor.run_unit(postal_code).await?;

    println!("{}", "Unit Result:".cyan().bold());
    println!("  Unit:     {}", entry.unit_id);
    println!("  Status:   {}", entry.status.as_str());
    println!("  Fetched:  {}", entry.fetched);
    println!("  Stored:   {}", entry.stored);
    println!("  Skipped:  {}", entry.skipped);
    println!("  Failed:   {}", entry.failed);
    println!("  Calls:    {}", entry.calls_used);
    if let Some(error) = &entry.error_detail {
        println!("  Error:    {}: {}", error.kind.red(), error.message);
    }

    Ok(())
}
