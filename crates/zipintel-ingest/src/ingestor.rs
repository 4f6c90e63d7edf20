//! Per-unit ingestion pipeline
//!
//! Runs one work unit end to end: acquire quota → paginated fetch →
//! per-record normalize / identify / validate / store → one progress
//! report. Record-level errors are absorbed into the report and never
//! escape; only the aggregate outcome surfaces to the batch processor.

use crate::config::IngestionConfig;
use crate::identity::ListingId;
use crate::quality::QualityValidator;
use crate::quota::QuotaBudget;
use crate::source::{search_with_retry, SourceClient};
use crate::storage::ListingStore;
use crate::types::{ExternalIds, IngestionRecord, UnitOutcome, UnitReport, WorkUnit};
use crate::{address, config::RetryConfig};
use chrono::Utc;
use regex::Regex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use zipintel_common::types::{ErrorDetail, QualityFlag, RawListing};
use zipintel_common::{IngestError, Result};

/// How one raw record was accounted for
enum Disposition {
    Stored,
    Skipped,
    Failed(IngestError),
}

/// Executes the fetch→normalize→validate→identify→store pipeline for
/// single work units
pub struct UnitIngestor {
    source: Arc<dyn SourceClient>,
    store: Arc<dyn ListingStore>,
    quota: Arc<QuotaBudget>,
    validator: QualityValidator,
    postal_pattern: Regex,
    retry: RetryConfig,
    min_quality: f64,
    listings_per_unit: usize,
    page_size: usize,
    cancel: CancellationToken,
}

impl UnitIngestor {
    pub fn new(
        config: &IngestionConfig,
        source: Arc<dyn SourceClient>,
        store: Arc<dyn ListingStore>,
        quota: Arc<QuotaBudget>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        Ok(Self {
            source,
            store,
            quota,
            validator: QualityValidator::from_config(&config.quality),
            postal_pattern: config.compiled_postal_pattern()?,
            retry: config.retry,
            min_quality: config.quality.min_score,
            listings_per_unit: config.listings_per_zip,
            page_size: config.page_size,
            cancel,
        })
    }

    /// Process one unit; all errors are absorbed into the report
    pub async fn process(&self, unit: &WorkUnit) -> UnitReport {
        let unit_id = unit.unit_id.as_str();
        let mut report = UnitReport {
            unit_id: unit.unit_id.clone(),
            outcome: UnitOutcome::Skipped,
            fetched: 0,
            stored: 0,
            skipped: 0,
            failed: 0,
            calls_used: 0,
            error: None,
        };

        tracing::debug!(unit_id, "Unit ingestion started");

        let mut offset = 0usize;
        let mut fetch_error: Option<IngestError> = None;

        'pages: while report.stored + report.skipped + report.failed
            < self.listings_per_unit as u64
        {
            if self.cancel.is_cancelled() {
                tracing::info!(unit_id, "Cancellation requested, stopping at page boundary");
                break;
            }

            let remaining =
                self.listings_per_unit - (report.stored + report.skipped + report.failed) as usize;
            let limit = remaining.min(self.page_size);

            let page = match search_with_retry(
                self.source.as_ref(),
                &self.quota,
                &self.retry,
                unit_id,
                offset,
                limit,
                &mut report.calls_used,
            )
            .await
            {
                Ok(page) => page,
                Err(IngestError::QuotaExceeded { used, allowed }) if report.fetched == 0 => {
                    // Not a single call made: the unit never started and
                    // simply waits for the next window.
                    tracing::info!(unit_id, used, allowed, "No quota permit, deferring unit");
                    report.outcome = UnitOutcome::Deferred;
                    return report;
                },
                Err(IngestError::QuotaExceeded { .. }) => {
                    // Budget ran dry mid-unit; keep what was already
                    // processed rather than discarding partial work.
                    tracing::warn!(unit_id, "Quota exhausted mid-unit, finishing with partial fetch");
                    break;
                },
                Err(err) => {
                    fetch_error = Some(err);
                    break;
                },
            };

            if page.records.is_empty() {
                break;
            }

            let page_len = page.records.len();
            for raw in page.records {
                report.fetched += 1;

                // Strict postal-code match: the source searches by
                // proximity, so neighboring-ZIP listings come back too.
                if raw.address.postal_code.as_deref() != Some(unit_id) {
                    report.skipped += 1;
                    continue;
                }

                match self.process_record(unit_id, raw).await {
                    Disposition::Stored => report.stored += 1,
                    Disposition::Skipped => report.skipped += 1,
                    Disposition::Failed(err) => {
                        report.failed += 1;
                        tracing::error!(unit_id, error = %err, "Record failed, continuing unit");
                        if report.error.is_none() {
                            report.error = Some(ErrorDetail::new(err.kind(), err.to_string()));
                        }
                    },
                }

                if self.cancel.is_cancelled() {
                    // Current record finished; stop before the next one.
                    break 'pages;
                }
            }

            offset += page_len;
            if offset as u64 >= page.total {
                break;
            }
        }

        report.outcome = if fetch_error.is_some() {
            // Retry exhaustion is a unit failure; records already stored
            // stay stored and are reflected in the counts.
            UnitOutcome::Failed
        } else if report.fetched == 0 {
            // Source genuinely has no listings for this ZIP.
            UnitOutcome::Skipped
        } else if report.stored == 0 {
            // Records were expected but none could be stored.
            UnitOutcome::Failed
        } else {
            UnitOutcome::Done
        };
        if let Some(err) = fetch_error {
            report.error = Some(ErrorDetail::new(err.kind(), err.to_string()));
        }

        tracing::info!(
            unit_id,
            outcome = report.outcome.as_str(),
            fetched = report.fetched,
            stored = report.stored,
            skipped = report.skipped,
            failed = report.failed,
            calls = report.calls_used,
            "Unit ingestion finished"
        );

        report
    }

    /// Normalize, identify, validate, and store one raw record
    async fn process_record(&self, unit_id: &str, raw: RawListing) -> Disposition {
        let normalized = match address::normalize(&raw.address, &self.postal_pattern) {
            Ok(a) => a,
            Err(err) => {
                tracing::debug!(unit_id, source_id = %raw.source_id, error = %err, "Skipping record with invalid address");
                return Disposition::Skipped;
            },
        };

        let listing_id = match ListingId::derive(&normalized) {
            Ok(id) => id,
            Err(err) => {
                tracing::debug!(unit_id, source_id = %raw.source_id, error = %err, "Skipping record without derivable id");
                return Disposition::Skipped;
            },
        };

        let quality = self.validator.evaluate(&raw);
        if quality.below(self.min_quality) {
            tracing::debug!(
                unit_id,
                source_id = %raw.source_id,
                score = quality.score,
                missing = ?quality.missing,
                "Skipping low-quality record"
            );
            return Disposition::Skipped;
        }

        let record = IngestionRecord {
            listing_id,
            external_ids: ExternalIds {
                source_id: raw.source_id,
            },
            name: raw.name.unwrap_or_default(),
            address: normalized,
            latitude: raw.latitude,
            longitude: raw.longitude,
            phone: raw.phone,
            rating: raw.rating,
            review_count: raw.review_count,
            price: raw.price,
            categories: raw.categories,
            url: raw.url,
            image_url: raw.image_url,
            is_closed: raw.is_closed,
            transactions: raw.transactions,
            // Above threshold but with gaps: stored, flagged for review.
            quality: if quality.missing.is_empty() {
                QualityFlag::Accepted
            } else {
                QualityFlag::LowQuality
            },
            quality_score: quality.score,
            ingested_at: Utc::now(),
        };

        match self.store.upsert(record).await {
            Ok(outcome) => {
                self.quota.record_stored(1);
                tracing::debug!(unit_id, outcome = ?outcome, "Record stored");
                Disposition::Stored
            },
            Err(err) => Disposition::Failed(err),
        }
    }
}
