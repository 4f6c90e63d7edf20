//! Core types for the ingestion pipeline

use crate::address::NormalizedAddress;
use crate::identity::ListingId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zipintel_common::types::{ErrorDetail, QualityFlag};

/// Work unit lifecycle state
///
/// `Done`, `Failed` and `Skipped` are terminal. At most one `InFlight`
/// attempt exists per unit at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Pending,
    InFlight,
    Done,
    Failed,
    Skipped,
}

impl UnitState {
    pub fn as_str(&self) -> &str {
        match self {
            UnitState::Pending => "pending",
            UnitState::InFlight => "in_flight",
            UnitState::Done => "done",
            UnitState::Failed => "failed",
            UnitState::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitState::Done | UnitState::Failed | UnitState::Skipped)
    }
}

/// One indivisible ingestion task: a single ZIP code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkUnit {
    /// Postal code this unit covers
    pub unit_id: String,
    pub tier: u8,
    /// Tier weight at seeding time
    pub tier_weight: f64,
    pub priority_score: f64,
    pub state: UnitState,
    pub attempts: u32,
    /// Consecutive failed attempts since the last success
    pub failures: u32,
    pub last_error: Option<ErrorDetail>,
    pub last_success_at: Option<DateTime<Utc>>,
    /// Seeding order, used as the final scheduling tie-break
    pub seq: u64,
}

impl WorkUnit {
    pub fn new(unit_id: impl Into<String>, tier: u8, tier_weight: f64, seq: u64) -> Self {
        Self {
            unit_id: unit_id.into(),
            tier,
            tier_weight,
            priority_score: tier_weight,
            state: UnitState::Pending,
            attempts: 0,
            failures: 0,
            last_error: None,
            last_success_at: None,
            seq,
        }
    }
}

/// Cross-source identifiers for one listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIds {
    /// Source-assigned identifier (e.g. the Yelp business id)
    pub source_id: String,
}

/// Immutable normalized representation of one external listing
///
/// Produced once by the unit ingestor, consumed once by the storage
/// boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionRecord {
    pub listing_id: ListingId,
    pub external_ids: ExternalIds,
    pub name: String,
    pub address: NormalizedAddress,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub phone: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u64>,
    pub price: Option<String>,
    pub categories: Vec<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub is_closed: bool,
    pub transactions: Vec<String>,
    pub quality: QualityFlag,
    pub quality_score: f64,
    pub ingested_at: DateTime<Utc>,
}

/// Result of one idempotent upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Outcome of one unit attempt as recorded in the progress log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOutcome {
    /// Records stored (possibly with per-record skips/failures)
    Done,
    /// Unit-level failure: fetch exhausted retries, or nothing stored
    /// where records were expected
    Failed,
    /// Source had no records for this unit
    Skipped,
    /// No quota permit; unit stays pending for a later window
    Deferred,
}

impl UnitOutcome {
    pub fn as_str(&self) -> &str {
        match self {
            UnitOutcome::Done => "done",
            UnitOutcome::Failed => "failed",
            UnitOutcome::Skipped => "skipped",
            UnitOutcome::Deferred => "deferred",
        }
    }
}

/// Append-only record of one unit attempt
///
/// Never mutated after completion; every fetched record is accounted for
/// in exactly one of `stored`, `skipped`, or `failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub batch_id: Uuid,
    pub unit_id: String,
    pub status: UnitOutcome,
    pub fetched: u64,
    pub stored: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Quota permits consumed by this attempt, including retried calls
    pub calls_used: u64,
    pub error_detail: Option<ErrorDetail>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Result of processing one work unit
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub unit_id: String,
    pub outcome: UnitOutcome,
    pub fetched: u64,
    pub stored: u64,
    pub skipped: u64,
    pub failed: u64,
    pub calls_used: u64,
    pub error: Option<ErrorDetail>,
}

impl UnitReport {
    pub fn into_entry(
        self,
        batch_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> ProgressEntry {
        ProgressEntry {
            batch_id,
            unit_id: self.unit_id,
            status: self.outcome,
            fetched: self.fetched,
            stored: self.stored,
            skipped: self.skipped,
            failed: self.failed,
            calls_used: self.calls_used,
            error_detail: self.error,
            started_at,
            completed_at: Utc::now(),
        }
    }
}

/// A failed unit with its recorded reason
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedUnit {
    pub unit_id: String,
    pub error: Option<ErrorDetail>,
}

/// Aggregate result of one batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub units_attempted: u64,
    pub units_done: u64,
    pub units_failed: u64,
    pub units_skipped: u64,
    /// Units returned to pending because the quota window was exhausted
    pub units_deferred: u64,
    pub records_stored: u64,
    pub calls_used: u64,
    pub duration_ms: u64,
    pub failed_units: Vec<FailedUnit>,
}

impl BatchResult {
    pub fn empty(batch_id: Uuid) -> Self {
        Self {
            batch_id,
            units_attempted: 0,
            units_done: 0,
            units_failed: 0,
            units_skipped: 0,
            units_deferred: 0,
            records_stored: 0,
            calls_used: 0,
            duration_ms: 0,
            failed_units: Vec::new(),
        }
    }

    /// Fold one progress entry into the aggregate
    pub fn absorb(&mut self, entry: &ProgressEntry) {
        self.units_attempted += 1;
        self.calls_used += entry.calls_used;
        self.records_stored += entry.stored;
        match entry.status {
            UnitOutcome::Done => self.units_done += 1,
            UnitOutcome::Failed => {
                self.units_failed += 1;
                self.failed_units.push(FailedUnit {
                    unit_id: entry.unit_id.clone(),
                    error: entry.error_detail.clone(),
                });
            },
            UnitOutcome::Skipped => self.units_skipped += 1,
            UnitOutcome::Deferred => self.units_deferred += 1,
        }
    }
}
