//! End-to-end pipeline tests: batch runs, resumability, and idempotency

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use zipintel_common::types::{RawAddress, RawListing};
use zipintel_ingest::config::{IngestionConfig, QuotaConfig, TierConfig};
use zipintel_ingest::processor::BatchProcessor;
use zipintel_ingest::progress::{JsonlProgressStore, ProgressStore};
use zipintel_ingest::source::{SearchPage, SourceClient};
use zipintel_ingest::storage::{ListingStore, MemoryListingStore};
use zipintel_ingest::types::UnitOutcome;

/// Serves a fixed set of listings per ZIP code
struct FixtureSource {
    by_zip: HashMap<String, Vec<RawListing>>,
}

#[async_trait]
impl SourceClient for FixtureSource {
    async fn search(
        &self,
        postal_code: &str,
        offset: usize,
        limit: usize,
    ) -> zipintel_common::Result<SearchPage> {
        let records = self.by_zip.get(postal_code).cloned().unwrap_or_default();
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

fn complete_listing(source_id: &str, street: &str, zip: &str) -> RawListing {
    RawListing {
        source_id: source_id.to_string(),
        name: Some(format!("Diner {source_id}")),
        address: RawAddress {
            street: Some(street.to_string()),
            city: Some("San Francisco".to_string()),
            state: Some("CA".to_string()),
            postal_code: Some(zip.to_string()),
        },
        latitude: Some(37.77),
        longitude: Some(-122.42),
        phone: Some("+14155550123".to_string()),
        rating: Some(4.5),
        review_count: Some(120),
        price: Some("$$".to_string()),
        categories: vec!["restaurants".to_string()],
        url: Some("https://example.com/biz".to_string()),
        ..RawListing::default()
    }
}

/// Has only a name, so it scores below the quality threshold
fn sparse_listing(source_id: &str, zip: &str) -> RawListing {
    RawListing {
        source_id: source_id.to_string(),
        name: Some("Mystery Spot".to_string()),
        address: RawAddress {
            street: Some("1 Somewhere".to_string()),
            city: None,
            state: None,
            postal_code: Some(zip.to_string()),
        },
        ..RawListing::default()
    }
}

fn config(state_dir: &Path, zips: &[&str], calls_allowed: u64) -> IngestionConfig {
    IngestionConfig {
        tiers: vec![TierConfig {
            tier: 1,
            weight: 1.0,
            postal_codes: zips.iter().map(|z| z.to_string()).collect(),
        }],
        quota: QuotaConfig {
            calls_allowed,
            records_allowed: 100_000,
            window_hours: 24,
        },
        workers: 2,
        state_dir: state_dir.to_path_buf(),
        ..IngestionConfig::default()
    }
}

#[tokio::test]
async fn test_mixed_quality_unit_counts_every_record() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let zip = "94103";

    // Three fetched: two storable, one below the quality threshold.
    let source = FixtureSource {
        by_zip: HashMap::from([(
            zip.to_string(),
            vec![
                complete_listing("biz-1", "100 Mission St", zip),
                complete_listing("biz-2", "200 Howard St", zip),
                sparse_listing("biz-3", zip),
            ],
        )]),
    };

    let store = Arc::new(MemoryListingStore::new());
    let progress = Arc::new(JsonlProgressStore::new(dir.path().join("progress.jsonl"))?);
    let processor = BatchProcessor::new(
        config(dir.path(), &[zip], 100),
        Arc::new(source),
        Arc::clone(&store) as Arc<dyn ListingStore>,
        progress,
    )?;

    let result = processor.run().await?;

    assert_eq!(result.units_done, 1, "unit with stored records is done");
    assert_eq!(result.records_stored, 2);
    assert_eq!(store.len(), 2);

    // The unit just completed; a synchronous re-run is still allowed
    // once the attempt has finished.
    let entry = processor.run_unit(zip).await?;
    assert_eq!(entry.fetched, 3);
    assert_eq!(entry.stored + entry.skipped + entry.failed, entry.fetched);
    Ok(())
}

#[tokio::test]
async fn test_exhausted_quota_defers_units_and_resumes() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let zips = ["94103", "94110", "94117"];
    let by_zip: HashMap<String, Vec<RawListing>> = zips
        .iter()
        .enumerate()
        .map(|(i, zip)| {
            (
                zip.to_string(),
                vec![complete_listing(
                    &format!("biz-{zip}"),
                    &format!("{} Valencia St", 100 * (i + 1)),
                    zip,
                )],
            )
        })
        .collect();

    let progress_path = dir.path().join("progress.jsonl");

    // First run: budget covers only one unit.
    let first = BatchProcessor::new(
        config(dir.path(), &zips, 1),
        Arc::new(FixtureSource {
            by_zip: by_zip.clone(),
        }),
        Arc::new(MemoryListingStore::new()),
        Arc::new(JsonlProgressStore::new(&progress_path)?),
    )?;
    let result = first.run().await?;
    assert_eq!(result.units_done, 1);
    assert_eq!(result.calls_used, 1);

    // Second run against the same durable state, within the same
    // window, with the budget raised: only unfinished units dispatch.
    let second = BatchProcessor::new(
        config(dir.path(), &zips, 10),
        Arc::new(FixtureSource { by_zip }),
        Arc::new(MemoryListingStore::new()),
        Arc::new(JsonlProgressStore::new(&progress_path)?),
    )?;
    let resumed = second.run().await?;

    assert_eq!(
        resumed.units_done, 2,
        "only the two unfinished units should run"
    );
    Ok(())
}

#[tokio::test]
async fn test_completed_units_not_reprocessed_within_window() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let zip = "94103";
    let by_zip = HashMap::from([(
        zip.to_string(),
        vec![complete_listing("biz-1", "100 Mission St", zip)],
    )]);
    let progress_path = dir.path().join("progress.jsonl");

    let first = BatchProcessor::new(
        config(dir.path(), &[zip], 10),
        Arc::new(FixtureSource {
            by_zip: by_zip.clone(),
        }),
        Arc::new(MemoryListingStore::new()),
        Arc::new(JsonlProgressStore::new(&progress_path)?),
    )?;
    assert_eq!(first.run().await?.units_done, 1);

    // A restarted processor in the same quota window sees the unit as
    // done and dispatches nothing.
    let second = BatchProcessor::new(
        config(dir.path(), &[zip], 10),
        Arc::new(FixtureSource { by_zip }),
        Arc::new(MemoryListingStore::new()),
        Arc::new(JsonlProgressStore::new(&progress_path)?),
    )?;
    let resumed = second.run().await?;

    assert_eq!(resumed.units_attempted, 0, "done unit must not rerun");
    assert_eq!(resumed.calls_used, 0);
    Ok(())
}

#[tokio::test]
async fn test_reingest_is_idempotent() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let zip = "94103";
    let source = Arc::new(FixtureSource {
        by_zip: HashMap::from([(
            zip.to_string(),
            vec![
                complete_listing("biz-1", "100 Mission St", zip),
                complete_listing("biz-2", "200 Howard St", zip),
            ],
        )]),
    });

    let store = Arc::new(MemoryListingStore::new());
    let processor = BatchProcessor::new(
        config(dir.path(), &[zip], 100),
        source,
        Arc::clone(&store) as Arc<dyn ListingStore>,
        Arc::new(JsonlProgressStore::new(dir.path().join("progress.jsonl"))?),
    )?;

    let first = processor.run_unit(zip).await?;
    assert_eq!(first.stored, 2);
    assert_eq!(store.len(), 2);

    // Same source data again: upserts resolve to the same listing ids,
    // so the store does not grow.
    let second = processor.run_unit(zip).await?;
    assert_eq!(second.stored, 2);
    assert_eq!(store.len(), 2, "re-ingest must not duplicate listings");
    Ok(())
}

#[tokio::test]
async fn test_zip_mismatch_records_skipped() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let zip = "94103";

    // The source returns one neighbor-ZIP listing alongside a match.
    let source = FixtureSource {
        by_zip: HashMap::from([(
            zip.to_string(),
            vec![
                complete_listing("biz-1", "100 Mission St", zip),
                complete_listing("biz-2", "5 Outside Ave", "94110"),
            ],
        )]),
    };

    let store = Arc::new(MemoryListingStore::new());
    let processor = BatchProcessor::new(
        config(dir.path(), &[zip], 100),
        Arc::new(source),
        Arc::clone(&store) as Arc<dyn ListingStore>,
        Arc::new(JsonlProgressStore::new(dir.path().join("progress.jsonl"))?),
    )?;

    let entry = processor.run_unit(zip).await?;
    assert_eq!(entry.fetched, 2);
    assert_eq!(entry.stored, 1);
    assert_eq!(entry.skipped, 1, "neighbor-ZIP record must be skipped");
    assert_eq!(store.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_progress_log_survives_restart() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let zip = "94103";
    let by_zip = HashMap::from([(
        zip.to_string(),
        vec![complete_listing("biz-1", "100 Mission St", zip)],
    )]);
    let progress_path = dir.path().join("progress.jsonl");

    let batch_id = {
        let processor = BatchProcessor::new(
            config(dir.path(), &[zip], 10),
            Arc::new(FixtureSource {
                by_zip: by_zip.clone(),
            }),
            Arc::new(MemoryListingStore::new()),
            Arc::new(JsonlProgressStore::new(&progress_path)?),
        )?;
        processor.run().await?.batch_id
    };

    // Reopen the log as a fresh store, as a restarted process would.
    let reopened = JsonlProgressStore::new(&progress_path)?;
    let entries = reopened.entries_for_batch(batch_id).await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, UnitOutcome::Done);
    assert_eq!(entries[0].unit_id, zip);
    Ok(())
}
