//! Quota-aware batch processor
//!
//! Dispatches work units from the scheduler to a fixed-size worker pool
//! while enforcing the shared call budget. Dispatch stops when the
//! budget is spent or cancellation is requested, but in-flight units
//! always run to completion; progress entries and state snapshots are
//! flushed as units finish, so a killed process resumes where it left
//! off.

use crate::config::IngestionConfig;
use crate::ingestor::UnitIngestor;
use crate::progress::ProgressStore;
use crate::quota::QuotaBudget;
use crate::scheduler::Scheduler;
use crate::source::SourceClient;
use crate::storage::ListingStore;
use crate::types::{BatchResult, ProgressEntry, UnitOutcome};
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use zipintel_common::{IngestError, Result};

/// Orchestrates one batch run over the shared quota budget
pub struct BatchProcessor {
    config: Arc<IngestionConfig>,
    scheduler: Arc<Scheduler>,
    quota: Arc<QuotaBudget>,
    source: Arc<dyn SourceClient>,
    store: Arc<dyn ListingStore>,
    progress: Arc<dyn ProgressStore>,
    cancel: CancellationToken,
}

impl BatchProcessor {
    /// Build a processor, reloading durable quota and scheduler state
    ///
    /// Configuration errors abort here, before any dispatch.
    pub fn new(
        config: IngestionConfig,
        source: Arc<dyn SourceClient>,
        store: Arc<dyn ListingStore>,
        progress: Arc<dyn ProgressStore>,
    ) -> Result<Self> {
        config.validate()?;
        if config.tiers.iter().map(|t| t.postal_codes.len()).sum::<usize>() == 0 {
            return Err(IngestError::config(
                "no postal codes configured, nothing to ingest",
            ));
        }

        let quota = Arc::new(QuotaBudget::load_or_new(
            &config.quota,
            &config.quota_state_path(),
        )?);
        let scheduler = Arc::new(Scheduler::load_or_seed(
            &config,
            &config.scheduler_state_path(),
        )?);

        Ok(Self {
            config: Arc::new(config),
            scheduler,
            quota,
            source,
            store,
            progress,
            cancel: CancellationToken::new(),
        })
    }

    /// Token that aborts dispatch when cancelled; in-flight units drain
    /// to their next safe checkpoint
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one batch to completion
    pub async fn run(&self) -> Result<BatchResult> {
        let batch_id = Uuid::new_v4();
        let started = Instant::now();
        let window_start = self.quota.snapshot().window_start;

        // Resume bookkeeping: units already done within the active
        // window must not be redispatched, and past outcomes feed the
        // priority scores.
        let latest = self.progress.latest_outcomes().await?;
        self.scheduler.open_window(window_start);
        self.scheduler.apply_progress(&latest, window_start);
        let recent: Vec<ProgressEntry> = latest.into_values().collect();
        self.scheduler.rebalance(&recent);

        tracing::info!(
            batch_id = %batch_id,
            pending = self.scheduler.pending_count(),
            remaining_calls = self.quota.remaining_calls(),
            workers = self.config.workers,
            "Batch run started"
        );

        let dispatched = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::with_capacity(self.config.workers);

        for worker in 0..self.config.workers {
            let ctx = WorkerContext {
                worker,
                batch_id,
                config: Arc::clone(&self.config),
                scheduler: Arc::clone(&self.scheduler),
                quota: Arc::clone(&self.quota),
                source: Arc::clone(&self.source),
                store: Arc::clone(&self.store),
                progress: Arc::clone(&self.progress),
                dispatched: Arc::clone(&dispatched),
                cancel: self.cancel.clone(),
            };
            handles.push(tokio::spawn(ctx.run()));
        }

        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {},
                Ok(Err(err)) => tracing::error!(error = %err, "Worker ended with error"),
                Err(err) => tracing::error!(error = %err, "Worker task panicked"),
            }
        }

        self.flush_state()?;

        let entries = self.progress.entries_for_batch(batch_id).await?;
        self.scheduler.rebalance(&entries);
        self.scheduler.persist(&self.config.scheduler_state_path())?;

        let mut result = BatchResult::empty(batch_id);
        for entry in &entries {
            result.absorb(entry);
        }
        result.duration_ms = started.elapsed().as_millis() as u64;

        let quota_state = self.quota.snapshot();
        tracing::info!(
            batch_id = %batch_id,
            units_done = result.units_done,
            units_failed = result.units_failed,
            units_skipped = result.units_skipped,
            units_deferred = result.units_deferred,
            records_stored = result.records_stored,
            calls_used = quota_state.calls_used,
            calls_allowed = quota_state.calls_allowed,
            duration_ms = result.duration_ms,
            "Batch run complete"
        );

        Ok(result)
    }

    /// Reconstruct a batch's aggregate result from the progress log
    pub async fn status(&self, batch_id: Uuid) -> Result<BatchResult> {
        let entries = self.progress.entries_for_batch(batch_id).await?;
        let mut result = BatchResult::empty(batch_id);
        for entry in &entries {
            result.absorb(entry);
        }
        if let (Some(first), Some(last)) = (
            entries.iter().map(|e| e.started_at).min(),
            entries.iter().map(|e| e.completed_at).max(),
        ) {
            result.duration_ms = (last - first).num_milliseconds().max(0) as u64;
        }
        Ok(result)
    }

    /// Synchronously ingest a single postal code
    ///
    /// Rejects the attempt with `UnitBusy` when the unit already has an
    /// attempt in flight, so two triggers for one ZIP never run in
    /// parallel.
    pub async fn run_unit(&self, postal_code: &str) -> Result<ProgressEntry> {
        let unit = self
            .scheduler
            .claim(postal_code)
            .ok_or_else(|| IngestError::UnitBusy(postal_code.to_string()))?;

        let batch_id = Uuid::new_v4();
        let started_at = Utc::now();
        let ingestor = UnitIngestor::new(
            &self.config,
            Arc::clone(&self.source),
            Arc::clone(&self.store),
            Arc::clone(&self.quota),
            self.cancel.clone(),
        )?;

        let report = ingestor.process(&unit).await;
        self.scheduler
            .complete(&unit.unit_id, report.outcome, report.error.clone());

        let entry = report.into_entry(batch_id, started_at);
        self.progress.append(entry.clone()).await?;
        self.flush_state()?;

        Ok(entry)
    }

    fn flush_state(&self) -> Result<()> {
        self.quota.persist(&self.config.quota_state_path())?;
        self.scheduler.persist(&self.config.scheduler_state_path())?;
        Ok(())
    }
}

/// Everything one worker task needs to claim and process units
struct WorkerContext {
    worker: usize,
    batch_id: Uuid,
    config: Arc<IngestionConfig>,
    scheduler: Arc<Scheduler>,
    quota: Arc<QuotaBudget>,
    source: Arc<dyn SourceClient>,
    store: Arc<dyn ListingStore>,
    progress: Arc<dyn ProgressStore>,
    dispatched: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

impl WorkerContext {
    /// Claim-and-process loop, in the style of a work-stealing worker:
    /// one unit at a time until the queue, budget, or batch limit ends
    async fn run(self) -> Result<()> {
        let ingestor = UnitIngestor::new(
            &self.config,
            Arc::clone(&self.source),
            Arc::clone(&self.store),
            Arc::clone(&self.quota),
            self.cancel.clone(),
        )?;

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(worker = self.worker, "Cancellation requested, worker stopping");
                break;
            }

            // Budget gate: exhausted quota stops new dispatch while
            // other workers' in-flight units keep running.
            if self.quota.remaining_calls() == 0 {
                tracing::info!(worker = self.worker, "Call budget exhausted, worker stopping");
                break;
            }
            if self.quota.remaining_records() == 0 {
                tracing::info!(worker = self.worker, "Record budget exhausted, worker stopping");
                break;
            }

            if self.dispatched.fetch_add(1, Ordering::SeqCst) >= self.config.batch_limit {
                break;
            }

            let Some(unit) = self.scheduler.next_batch(1).into_iter().next() else {
                break;
            };

            tracing::debug!(
                worker = self.worker,
                unit_id = %unit.unit_id,
                priority = unit.priority_score,
                tier = unit.tier,
                "Processing unit"
            );

            let started_at = Utc::now();
            let report = ingestor.process(&unit).await;
            let outcome = report.outcome;

            self.scheduler
                .complete(&unit.unit_id, outcome, report.error.clone());
            self.progress
                .append(report.into_entry(self.batch_id, started_at))
                .await?;

            // Snapshot after every completed unit so a crash never
            // loses more than the in-flight work.
            self.quota.persist(&self.config.quota_state_path())?;
            self.scheduler.persist(&self.config.scheduler_state_path())?;

            // A deferral means permits ran out mid-claim; the budget
            // gate above stops the loop on the next pass.
            if outcome == UnitOutcome::Deferred {
                tracing::info!(worker = self.worker, unit_id = %unit.unit_id, "Unit deferred");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::{QuotaConfig, TierConfig};
    use crate::progress::MemoryProgressStore;
    use crate::source::SearchPage;
    use crate::storage::MemoryListingStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use zipintel_common::types::{RawAddress, RawListing};

    struct MapSource {
        by_zip: HashMap<String, Vec<RawListing>>,
    }

    #[async_trait]
    impl SourceClient for MapSource {
        async fn search(&self, zip: &str, offset: usize, limit: usize) -> Result<SearchPage> {
            let records = self.by_zip.get(zip).cloned().unwrap_or_default();
            let end = (offset + limit).min(records.len());
            let page = if offset < end {
                records[offset..end].to_vec()
            } else {
                Vec::new()
            };
            Ok(SearchPage {
                records: page,
                total: records.len() as u64,
            })
        }
    }

    fn listing(source_id: &str, street: &str, zip: &str) -> RawListing {
        RawListing {
            source_id: source_id.to_string(),
            name: Some(format!("Spot {source_id}")),
            address: RawAddress {
                street: Some(street.to_string()),
                city: Some("San Francisco".to_string()),
                state: Some("CA".to_string()),
                postal_code: Some(zip.to_string()),
            },
            latitude: Some(37.7),
            longitude: Some(-122.4),
            phone: Some("+14155550100".to_string()),
            rating: Some(4.0),
            review_count: Some(25),
            categories: vec!["restaurants".to_string()],
            url: Some("https://example.com".to_string()),
            ..RawListing::default()
        }
    }

    fn test_config(state_dir: &std::path::Path, zips: &[&str], calls: u64) -> IngestionConfig {
        IngestionConfig {
            tiers: vec![TierConfig {
                tier: 1,
                weight: 1.0,
                postal_codes: zips.iter().map(|z| z.to_string()).collect(),
            }],
            quota: QuotaConfig {
                calls_allowed: calls,
                records_allowed: 10_000,
                window_hours: 24,
            },
            workers: 3,
            state_dir: state_dir.to_path_buf(),
            ..IngestionConfig::default()
        }
    }

    fn sources(zips: &[&str]) -> MapSource {
        let mut by_zip = HashMap::new();
        for (i, zip) in zips.iter().enumerate() {
            by_zip.insert(
                zip.to_string(),
                vec![
                    listing(&format!("{zip}-a"), &format!("{} First St", i + 1), zip),
                    listing(&format!("{zip}-b"), &format!("{} Second St", i + 1), zip),
                ],
            );
        }
        MapSource { by_zip }
    }

    #[tokio::test]
    async fn test_batch_processes_all_units() {
        let dir = tempfile::tempdir().unwrap();
        let zips = ["94103", "94110", "94117"];
        let config = test_config(dir.path(), &zips, 100);
        let store = Arc::new(MemoryListingStore::new());
        let progress = Arc::new(MemoryProgressStore::new());

        let processor = BatchProcessor::new(
            config,
            Arc::new(sources(&zips)),
            Arc::clone(&store) as Arc<dyn ListingStore>,
            Arc::clone(&progress) as Arc<dyn ProgressStore>,
        )
        .unwrap();

        let result = processor.run().await.unwrap();
        assert_eq!(result.units_attempted, 3);
        assert_eq!(result.units_done, 3);
        assert_eq!(result.records_stored, 6);
        assert_eq!(store.len(), 6);
    }

    #[tokio::test]
    async fn test_exhausted_budget_stops_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let zips = ["94103", "94110", "94117", "94118"];
        // One call per unit; budget covers only two.
        let config = test_config(dir.path(), &zips, 2);
        let store = Arc::new(MemoryListingStore::new());
        let progress = Arc::new(MemoryProgressStore::new());

        let processor = BatchProcessor::new(
            config,
            Arc::new(sources(&zips)),
            store,
            Arc::clone(&progress) as Arc<dyn ProgressStore>,
        )
        .unwrap();

        let result = processor.run().await.unwrap();
        assert_eq!(result.units_done, 2);
        assert_eq!(result.calls_used, 2);
        // Undispatched units are still pending for the next window.
        assert_eq!(processor.scheduler.pending_count(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_record_budget_stops_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let zips = ["94103", "94110", "94117"];
        let mut config = test_config(dir.path(), &zips, 100);
        // The first unit stores two records and overshoots the budget
        // of one; no further unit may be dispatched after that.
        config.quota.records_allowed = 1;
        config.workers = 1;
        let store = Arc::new(MemoryListingStore::new());
        let progress = Arc::new(MemoryProgressStore::new());

        let processor = BatchProcessor::new(
            config,
            Arc::new(sources(&zips)),
            Arc::clone(&store) as Arc<dyn ListingStore>,
            Arc::clone(&progress) as Arc<dyn ProgressStore>,
        )
        .unwrap();

        let result = processor.run().await.unwrap();
        assert_eq!(result.units_done, 1);
        assert_eq!(result.records_stored, 2);
        assert_eq!(store.len(), 2);
        assert_eq!(processor.scheduler.pending_count(), 2);
    }

    #[tokio::test]
    async fn test_no_postal_codes_abort_before_dispatch() {
        // A tier with an empty postal code list is as empty as no
        // tiers at all; both must fail construction.
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), &[], 10);
        let err = BatchProcessor::new(
            config,
            Arc::new(sources(&[])),
            Arc::new(MemoryListingStore::new()),
            Arc::new(MemoryProgressStore::new()),
        )
        .err();
        assert!(matches!(err, Some(IngestError::Config(_))));

        let mut config = test_config(dir.path(), &[], 10);
        config.tiers.clear();
        let err = BatchProcessor::new(
            config,
            Arc::new(sources(&[])),
            Arc::new(MemoryListingStore::new()),
            Arc::new(MemoryProgressStore::new()),
        )
        .err();
        assert!(matches!(err, Some(IngestError::Config(_))));
    }

    #[tokio::test]
    async fn test_run_unit_rejects_concurrent_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let zips = ["94103"];
        let config = test_config(dir.path(), &zips, 100);
        let processor = BatchProcessor::new(
            config,
            Arc::new(sources(&zips)),
            Arc::new(MemoryListingStore::new()),
            Arc::new(MemoryProgressStore::new()),
        )
        .unwrap();

        // Claim the unit as if another attempt were running.
        processor.scheduler.claim("94103").unwrap();

        let err = processor.run_unit("94103").await.unwrap_err();
        assert!(matches!(err, IngestError::UnitBusy(_)));
    }

    #[tokio::test]
    async fn test_status_rebuilds_from_progress_log() {
        let dir = tempfile::tempdir().unwrap();
        let zips = ["94103", "94110"];
        let config = test_config(dir.path(), &zips, 100);
        let progress = Arc::new(MemoryProgressStore::new());

        let processor = BatchProcessor::new(
            config,
            Arc::new(sources(&zips)),
            Arc::new(MemoryListingStore::new()),
            Arc::clone(&progress) as Arc<dyn ProgressStore>,
        )
        .unwrap();

        let result = processor.run().await.unwrap();
        let status = processor.status(result.batch_id).await.unwrap();
        assert_eq!(status.units_done, result.units_done);
        assert_eq!(status.records_stored, result.records_stored);
    }

    #[tokio::test]
    async fn test_cancellation_stops_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let zips = ["94103", "94110", "94117"];
        let config = test_config(dir.path(), &zips, 100);
        let progress = Arc::new(MemoryProgressStore::new());

        let processor = BatchProcessor::new(
            config,
            Arc::new(sources(&zips)),
            Arc::new(MemoryListingStore::new()),
            Arc::clone(&progress) as Arc<dyn ProgressStore>,
        )
        .unwrap();

        // Cancel before the run: no unit is dispatched, the run drains
        // immediately and reports an empty batch.
        processor.cancel_token().cancel();
        let result = processor.run().await.unwrap();
        assert_eq!(result.units_attempted, 0);
        assert_eq!(processor.scheduler.pending_count(), 3);
    }
}
