//! Storage boundary
//!
//! Idempotent upsert keyed primarily by the deterministic listing id,
//! with a secondary cross-check against the source's external id. The
//! real backing store lives outside this crate; `MemoryListingStore` is
//! the reference implementation used by tests and dry runs.

use crate::identity::ListingId;
use crate::types::{IngestionRecord, UpsertOutcome};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use zipintel_common::{IngestError, Result};

/// Listing persistence boundary
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Insert or update one record
    ///
    /// Semantics:
    /// - unknown listing id and external id: insert
    /// - identical re-upsert: `Unchanged` (no side effects past the first)
    /// - same external id, different listing id: the address changed;
    ///   the old row is superseded and the result is `Updated`
    /// - same listing id claimed by a different external id:
    ///   `StorageConflict`
    async fn upsert(&self, record: IngestionRecord) -> Result<UpsertOutcome>;
}

/// In-memory `ListingStore` with both key indices
#[derive(Debug, Default)]
pub struct MemoryListingStore {
    inner: Mutex<Indexes>,
}

#[derive(Debug, Default)]
struct Indexes {
    by_listing: HashMap<ListingId, IngestionRecord>,
    by_external: HashMap<String, ListingId>,
}

impl MemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().by_listing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &ListingId) -> Option<IngestionRecord> {
        self.lock().by_listing.get(id).cloned()
    }

    pub fn records(&self) -> Vec<IngestionRecord> {
        self.lock().by_listing.values().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Indexes> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Equality ignoring the ingestion timestamp
fn same_content(a: &IngestionRecord, b: &IngestionRecord) -> bool {
    let mut a = a.clone();
    a.ingested_at = b.ingested_at;
    serde_json::to_value(&a).ok() == serde_json::to_value(b).ok()
}

#[async_trait]
impl ListingStore for MemoryListingStore {
    async fn upsert(&self, record: IngestionRecord) -> Result<UpsertOutcome> {
        let mut idx = self.lock();
        let listing_id = record.listing_id.clone();
        let external_id = record.external_ids.source_id.clone();

        if let Some(existing) = idx.by_listing.get(&listing_id) {
            if existing.external_ids.source_id != external_id {
                return Err(IngestError::StorageConflict {
                    listing_id: listing_id.to_string(),
                    detail: format!(
                        "listing already claimed by external id {}, rejected {}",
                        existing.external_ids.source_id, external_id
                    ),
                });
            }
            if same_content(existing, &record) {
                return Ok(UpsertOutcome::Unchanged);
            }
            idx.by_listing.insert(listing_id.clone(), record);
            idx.by_external.insert(external_id, listing_id);
            return Ok(UpsertOutcome::Updated);
        }

        // Known external id under a different listing id: the address
        // changed, supersede the old row.
        if let Some(old_id) = idx.by_external.insert(external_id, listing_id.clone()) {
            idx.by_listing.remove(&old_id);
            idx.by_listing.insert(listing_id, record);
            return Ok(UpsertOutcome::Updated);
        }

        idx.by_listing.insert(listing_id, record);
        Ok(UpsertOutcome::Inserted)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::address::NormalizedAddress;
    use crate::types::ExternalIds;
    use chrono::Utc;
    use zipintel_common::types::QualityFlag;

    fn record(source_id: &str, street: &str) -> IngestionRecord {
        let address = NormalizedAddress {
            street: street.to_string(),
            city: "san francisco".to_string(),
            state: "ca".to_string(),
            postal_code: "94103".to_string(),
            disambiguator: None,
        };
        IngestionRecord {
            listing_id: ListingId::derive(&address).unwrap(),
            external_ids: ExternalIds {
                source_id: source_id.to_string(),
            },
            name: "Test Spot".to_string(),
            address,
            latitude: None,
            longitude: None,
            phone: None,
            rating: Some(4.0),
            review_count: Some(10),
            price: None,
            categories: vec![],
            url: None,
            image_url: None,
            is_closed: false,
            transactions: vec![],
            quality: QualityFlag::Accepted,
            quality_score: 1.0,
            ingested_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = MemoryListingStore::new();
        let r = record("yelp-1", "1 market street");

        assert_eq!(store.upsert(r.clone()).await.unwrap(), UpsertOutcome::Inserted);
        // Second application has no further effect.
        let mut again = r.clone();
        again.ingested_at = Utc::now();
        assert_eq!(store.upsert(again).await.unwrap(), UpsertOutcome::Unchanged);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_changed_fields_update_in_place() {
        let store = MemoryListingStore::new();
        let r = record("yelp-1", "1 market street");
        store.upsert(r.clone()).await.unwrap();

        let mut updated = r.clone();
        updated.rating = Some(4.5);
        assert_eq!(store.upsert(updated).await.unwrap(), UpsertOutcome::Updated);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&r.listing_id).unwrap().rating, Some(4.5));
    }

    #[tokio::test]
    async fn test_address_change_supersedes_old_row() {
        let store = MemoryListingStore::new();
        let old = record("yelp-1", "1 market street");
        store.upsert(old.clone()).await.unwrap();

        // Same business moved: same external id, new address, new
        // deterministic id.
        let moved = record("yelp-1", "99 howard street");
        assert_ne!(old.listing_id, moved.listing_id);
        assert_eq!(
            store.upsert(moved.clone()).await.unwrap(),
            UpsertOutcome::Updated
        );
        assert_eq!(store.len(), 1);
        assert!(store.get(&old.listing_id).is_none());
        assert!(store.get(&moved.listing_id).is_some());
    }

    #[tokio::test]
    async fn test_conflicting_external_id_rejected() {
        let store = MemoryListingStore::new();
        store.upsert(record("yelp-1", "1 market street")).await.unwrap();

        let intruder = record("yelp-2", "1 market street");
        let err = store.upsert(intruder).await.unwrap_err();
        assert!(matches!(err, IngestError::StorageConflict { .. }));
        assert_eq!(store.len(), 1);
    }
}
