//! Work-unit scheduler
//!
//! Maintains a priority-ordered queue over all configured ZIP-code work
//! units. Priority combines tier weight, staleness since the last
//! successful run, and a decayed penalty for prior failures so a bad
//! unit cannot starve the budget. All state transitions happen under one
//! mutex, which enforces the single-InFlight-attempt invariant.

use crate::config::IngestionConfig;
use crate::types::{ProgressEntry, UnitOutcome, UnitState, WorkUnit};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use zipintel_common::types::ErrorDetail;
use zipintel_common::Result;

/// Staleness assumed for units that never succeeded, in hours
const NEVER_RUN_STALENESS_HOURS: f64 = 24.0 * 7.0;

/// Cap on the staleness boost multiplier
const MAX_STALENESS_BOOST: f64 = 30.0;

/// Priority scheduler over ZIP-code work units
#[derive(Debug)]
pub struct Scheduler {
    inner: Mutex<BTreeMap<String, WorkUnit>>,
}

impl Scheduler {
    /// Seed units from the tier configuration
    pub fn from_config(config: &IngestionConfig) -> Self {
        let mut units = BTreeMap::new();
        let mut seq = 0u64;
        for tier in &config.tiers {
            for zip in &tier.postal_codes {
                units
                    .entry(zip.clone())
                    .or_insert_with(|| WorkUnit::new(zip.clone(), tier.tier, tier.weight, seq));
                seq += 1;
            }
        }
        let scheduler = Self {
            inner: Mutex::new(units),
        };
        scheduler.rebalance(&[]);
        scheduler
    }

    /// Seed from config, then overlay a persisted snapshot
    ///
    /// Snapshot state wins for units still present in the configuration;
    /// units removed from config are dropped, new ones start fresh. An
    /// `InFlight` marker in the snapshot means a previous process died
    /// mid-attempt, so the unit reverts to `Pending` (its attempt, if it
    /// completed, is in the progress log).
    pub fn load_or_seed(config: &IngestionConfig, path: &Path) -> Result<Self> {
        let scheduler = Self::from_config(config);

        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let saved: Vec<WorkUnit> = serde_json::from_str(&data)?;
            let mut units = scheduler.lock();
            let mut restored = 0usize;
            for mut unit in saved {
                if let Some(slot) = units.get_mut(&unit.unit_id) {
                    if unit.state == UnitState::InFlight {
                        unit.state = UnitState::Pending;
                    }
                    // Tier placement always follows current config.
                    unit.tier = slot.tier;
                    unit.tier_weight = slot.tier_weight;
                    unit.seq = slot.seq;
                    *slot = unit;
                    restored += 1;
                }
            }
            drop(units);
            tracing::info!(restored, "Restored scheduler state from snapshot");
            scheduler.rebalance(&[]);
        }

        Ok(scheduler)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, WorkUnit>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return units whose terminal state predates the active window to
    /// the queue
    ///
    /// Keeps `Done`/`Skipped` reached within this window terminal (they
    /// are not redispatched on resume) while everything older becomes
    /// schedulable again.
    pub fn open_window(&self, window_start: DateTime<Utc>) {
        let mut units = self.lock();
        for unit in units.values_mut() {
            let completed_this_window = unit
                .last_success_at
                .is_some_and(|at| at >= window_start);
            match unit.state {
                UnitState::Done | UnitState::Skipped if completed_this_window => {},
                UnitState::Pending => {},
                _ => unit.state = UnitState::Pending,
            }
        }
    }

    /// Overlay the latest progress-log outcome per unit
    ///
    /// Used on restart when the snapshot is missing or stale: units whose
    /// latest entry is `Done` within the active window become terminal so
    /// they are not reprocessed.
    pub fn apply_progress(
        &self,
        latest: &std::collections::HashMap<String, ProgressEntry>,
        window_start: DateTime<Utc>,
    ) {
        let mut units = self.lock();
        for (unit_id, entry) in latest {
            let Some(unit) = units.get_mut(unit_id) else {
                continue;
            };
            match entry.status {
                UnitOutcome::Done if entry.completed_at >= window_start => {
                    unit.state = UnitState::Done;
                    unit.last_success_at = Some(entry.completed_at);
                },
                UnitOutcome::Done => {
                    unit.last_success_at = Some(entry.completed_at);
                },
                UnitOutcome::Skipped if entry.completed_at >= window_start => {
                    unit.state = UnitState::Skipped;
                },
                _ => {},
            }
        }
    }

    /// Take up to `n` highest-priority pending units, marking them
    /// in-flight
    ///
    /// The mark happens inside the same lock as the selection, so no
    /// unit can be handed to two workers concurrently.
    pub fn next_batch(&self, n: usize) -> Vec<WorkUnit> {
        let mut units = self.lock();

        let mut candidates: Vec<&WorkUnit> = units
            .values()
            .filter(|u| u.state == UnitState::Pending)
            .collect();
        candidates.sort_by(|a, b| {
            b.priority_score
                .partial_cmp(&a.priority_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.tier.cmp(&b.tier))
                .then(a.attempts.cmp(&b.attempts))
                .then(a.seq.cmp(&b.seq))
        });

        let picked: Vec<String> = candidates
            .into_iter()
            .take(n)
            .map(|u| u.unit_id.clone())
            .collect();

        picked
            .into_iter()
            .filter_map(|id| {
                let unit = units.get_mut(&id)?;
                unit.state = UnitState::InFlight;
                Some(unit.clone())
            })
            .collect()
    }

    /// Claim one specific unit for a synchronous single-unit run
    ///
    /// Unknown postal codes get an ad-hoc unit so operator-triggered
    /// ZIPs outside the tier config still work. Returns `None` when the
    /// unit is already in flight; the caller rejects the duplicate
    /// attempt instead of running it in parallel.
    pub fn claim(&self, unit_id: &str) -> Option<WorkUnit> {
        let mut units = self.lock();
        let next_seq = units.values().map(|u| u.seq + 1).max().unwrap_or(0);
        let unit = units
            .entry(unit_id.to_string())
            .or_insert_with(|| WorkUnit::new(unit_id, 1, 1.0, next_seq));

        if unit.state == UnitState::InFlight {
            return None;
        }
        unit.state = UnitState::InFlight;
        Some(unit.clone())
    }

    /// Record the outcome of one attempt
    pub fn complete(&self, unit_id: &str, outcome: UnitOutcome, error: Option<ErrorDetail>) {
        let mut units = self.lock();
        let Some(unit) = units.get_mut(unit_id) else {
            return;
        };

        match outcome {
            UnitOutcome::Done => {
                unit.state = UnitState::Done;
                unit.attempts += 1;
                unit.failures = 0;
                unit.last_success_at = Some(Utc::now());
                unit.last_error = None;
            },
            UnitOutcome::Failed => {
                unit.state = UnitState::Failed;
                unit.attempts += 1;
                unit.failures += 1;
                unit.last_error = error;
            },
            UnitOutcome::Skipped => {
                unit.state = UnitState::Skipped;
                unit.attempts += 1;
            },
            // No permit was available; the attempt never happened.
            UnitOutcome::Deferred => {
                unit.state = UnitState::Pending;
            },
        }
    }

    /// Recompute priority scores from recent outcomes
    ///
    /// Staleness since the last success raises priority, prior failures
    /// lower it with a penalty that halves per day, and the tier weight
    /// scales the result.
    pub fn rebalance(&self, recent: &[ProgressEntry]) {
        let mut units = self.lock();
        let now = Utc::now();

        for entry in recent {
            if let Some(unit) = units.get_mut(&entry.unit_id) {
                if entry.status == UnitOutcome::Done {
                    unit.last_success_at = Some(entry.completed_at);
                }
            }
        }

        for unit in units.values_mut() {
            unit.priority_score = Self::score(unit, now);
        }
    }

    fn score(unit: &WorkUnit, now: DateTime<Utc>) -> f64 {
        let staleness_hours = match unit.last_success_at {
            Some(at) => (now - at).num_minutes() as f64 / 60.0,
            None => NEVER_RUN_STALENESS_HOURS,
        };
        let staleness_boost = (staleness_hours / 24.0).clamp(0.0, MAX_STALENESS_BOOST);

        let failure_penalty = match (&unit.last_error, unit.failures) {
            (Some(err), failures) if failures > 0 => {
                let age_days = (now - err.occurred_at).num_minutes() as f64 / (60.0 * 24.0);
                f64::from(failures) * 0.5f64.powf(age_days.max(0.0))
            },
            (None, failures) => f64::from(failures) * 0.5,
            _ => 0.0,
        };

        unit.tier_weight * (1.0 + staleness_boost) - failure_penalty
    }

    /// Number of units currently pending
    pub fn pending_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|u| u.state == UnitState::Pending)
            .count()
    }

    /// Snapshot copy of one unit
    pub fn unit(&self, unit_id: &str) -> Option<WorkUnit> {
        self.lock().get(unit_id).cloned()
    }

    /// Persist all unit state via atomic tmp-file rename
    pub fn persist(&self, path: &Path) -> Result<()> {
        let units: Vec<WorkUnit> = self.lock().values().cloned().collect();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&units)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
