//! Source API boundary
//!
//! `SourceClient` is the fetch seam for one postal code's listings.
//! Bounded exponential-backoff retry lives at this seam; each HTTP
//! attempt charges one call permit against the shared quota, matching
//! the source API's own accounting.

use crate::config::{IngestionConfig, RetryConfig};
use crate::quota::QuotaBudget;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use zipintel_common::types::{RawAddress, RawListing};
use zipintel_common::{IngestError, Result};

/// One page of search results
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub records: Vec<RawListing>,
    /// Total matches the source reports for this query
    pub total: u64,
}

/// Fetch boundary for raw listings
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch one page of listings around a postal code
    ///
    /// Errors: `SourceUnavailable` on network/server failure,
    /// `RateLimited` on throttling.
    async fn search(&self, postal_code: &str, offset: usize, limit: usize) -> Result<SearchPage>;
}

/// Fetch one page with bounded retry, charging quota per attempt
///
/// Every attempt acquires a call permit first and bumps `calls_spent`.
/// Retry is attempted only for retryable source errors, with delays of
/// `base_delay * 2^attempt`. A permit denial before the first attempt
/// surfaces as `QuotaExceeded` (the unit defers); a denial between
/// retries stops early with the last source error, so no quota is spent
/// beyond the attempts already made.
pub async fn search_with_retry(
    client: &dyn SourceClient,
    quota: &QuotaBudget,
    retry: &RetryConfig,
    postal_code: &str,
    offset: usize,
    limit: usize,
    calls_spent: &mut u64,
) -> Result<SearchPage> {
    let mut last_err: Option<IngestError> = None;

    for attempt in 0..retry.max_attempts {
        if let Err(quota_err) = quota.acquire_call() {
            return match last_err {
                // Budget ran out between retries; report the source
                // error that forced the retry.
                Some(err) => Err(err),
                None => Err(quota_err),
            };
        }
        *calls_spent += 1;

        match client.search(postal_code, offset, limit).await {
            Ok(page) => return Ok(page),
            Err(err) if err.is_retryable() && attempt + 1 < retry.max_attempts => {
                let delay = backoff_delay(retry, attempt);
                tracing::warn!(
                    unit_id = %postal_code,
                    attempt = attempt + 1,
                    max_attempts = retry.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Source fetch failed, backing off"
                );
                last_err = Some(err);
                tokio::time::sleep(delay).await;
            },
            Err(err) => return Err(err),
        }
    }

    // max_attempts is validated >= 1, so last_err is set when the loop
    // falls through.
    Err(last_err.unwrap_or_else(|| IngestError::source_unavailable("retries exhausted")))
}

/// Delay before the retry following `attempt`, clamped at `u64::MAX` ms
fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(retry.base_delay_ms.saturating_mul(factor))
}

// ============================================================================
// HTTP implementation (business-search API)
// ============================================================================

/// `SourceClient` over the business-search HTTP API
pub struct HttpSourceClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    categories: String,
    radius_meters: u32,
}

impl HttpSourceClient {
    pub fn from_config(config: &IngestionConfig) -> Result<Self> {
        if config.source.api_key.is_empty() {
            tracing::warn!("Source API key is empty; requests will be unauthenticated");
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.source.timeout_secs))
            .build()
            .map_err(|e| IngestError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.source.base_url.trim_end_matches('/').to_string(),
            api_key: config.source.api_key.clone(),
            categories: config.source.categories.clone(),
            radius_meters: config.source.radius_meters,
        })
    }
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    async fn search(&self, postal_code: &str, offset: usize, limit: usize) -> Result<SearchPage> {
        let url = format!("{}/businesses/search", self.base_url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[
                ("location", postal_code),
                ("categories", self.categories.as_str()),
                ("radius", &self.radius_meters.to_string()),
                ("limit", &limit.to_string()),
                ("offset", &offset.to_string()),
            ])
            .send()
            .await
            .map_err(|e| IngestError::source_unavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(IngestError::rate_limited(format!(
                "throttled by source for {postal_code}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::source_unavailable(format!(
                "search returned {status}: {body}"
            )));
        }

        let payload: SearchResponse = response
            .json()
            .await
            .map_err(|e| IngestError::source_unavailable(format!("malformed response: {e}")))?;

        Ok(SearchPage {
            records: payload.businesses.into_iter().map(RawListing::from).collect(),
            total: payload.total,
        })
    }
}

// Wire shapes of the search response
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    businesses: Vec<BusinessPayload>,
    #[serde(default)]
    total: u64,
}

#[derive(Debug, Deserialize)]
struct BusinessPayload {
    id: String,
    name: Option<String>,
    #[serde(default)]
    location: LocationPayload,
    coordinates: Option<CoordinatesPayload>,
    phone: Option<String>,
    rating: Option<f64>,
    review_count: Option<u64>,
    price: Option<String>,
    #[serde(default)]
    categories: Vec<CategoryPayload>,
    url: Option<String>,
    image_url: Option<String>,
    #[serde(default)]
    is_closed: bool,
    #[serde(default)]
    transactions: Vec<String>,
    /// Fields outside the typed schema, kept as a bounded scalar bag
    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct LocationPayload {
    address1: Option<String>,
    city: Option<String>,
    state: Option<String>,
    zip_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CoordinatesPayload {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CategoryPayload {
    alias: Option<String>,
}

impl From<BusinessPayload> for RawListing {
    fn from(b: BusinessPayload) -> Self {
        let mut listing = RawListing {
            source_id: b.id,
            name: b.name,
            address: RawAddress {
                street: b.location.address1,
                city: b.location.city,
                state: b.location.state,
                postal_code: b.location.zip_code,
            },
            latitude: b.coordinates.as_ref().and_then(|c| c.latitude),
            longitude: b.coordinates.as_ref().and_then(|c| c.longitude),
            phone: b.phone,
            rating: b.rating,
            review_count: b.review_count,
            price: b.price,
            categories: b.categories.into_iter().filter_map(|c| c.alias).collect(),
            url: b.url,
            image_url: b.image_url,
            is_closed: b.is_closed,
            transactions: b.transactions,
            extra: Default::default(),
        };
        // put_extra enforces the scalar-only, bounded contract.
        for (key, value) in b.extra {
            listing.put_extra(key, value);
        }
        listing
    }
}
