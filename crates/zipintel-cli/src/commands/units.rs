//! `zipintel units` command implementation
//!
//! Reads the scheduler snapshot and prints units in dispatch order.

use crate::error::{CliError, Result};
use colored::Colorize;
use std::path::Path;
use zipintel_ingest::config::IngestionConfig;
use zipintel_ingest::types::{UnitState, WorkUnit};

/// Show work units sorted the way the scheduler would dispatch them
pub fn run(config_path: Option<&Path>, limit: usize) -> Result<()> {
    let config = IngestionConfig::load(config_path)?;
    let path = config.scheduler_state_path();

    if !path.exists() {
        return Err(CliError::StateNotFound(path.display().to_string()));
    }

    let raw = std::fs::read(&path)?;
    let mut units: Vec<WorkUnit> =
        serde_json::from_slice(&raw).map_err(|e| CliError::StateCorrupt {
            file: path.display().to_string(),
            detail: e.to_string(),
        })?;

    // Same ordering the scheduler applies when picking a batch.
    units.sort_by(|a, b| {
        b.priority_score
            .partial_cmp(&a.priority_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.tier.cmp(&b.tier))
            .then(a.attempts.cmp(&b.attempts))
            .then(a.seq.cmp(&b.seq))
    });

    println!("{}", "Work Units:".cyan().bold());
    println!(
        "  {:<12} {:>5} {:>9} {:>10} {:>9} {:>9}",
        "UNIT", "TIER", "SCORE", "STATE", "ATTEMPTS", "FAILURES"
    );
    for unit in units.iter().take(limit) {
        let state = match unit.state {
            UnitState::Pending => unit.state.as_str().normal(),
            UnitState::InFlight => unit.state.as_str().yellow(),
            UnitState::Done => unit.state.as_str().green(),
            UnitState::Failed => unit.state.as_str().red(),
            UnitState::Skipped => unit.state.as_str().dimmed(),
        };
        println!(
            "  {:<12} {:>5} {:>9.3} {:>10} {:>9} {:>9}",
            unit.unit_id, unit.tier, unit.priority_score, state, unit.attempts, unit.failures
        );
    }

    if units.len() > limit {
        println!("  ... and {} more", units.len() - limit);
    }

    Ok(())
}
