//! Shared listing types used across ZipIntel

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Upper bound on extra attributes carried per listing
///
/// Source payloads are open-ended attribute bags; anything beyond the
/// typed schema is kept in a bounded scalar map rather than an
/// unconstrained dynamic object.
pub const MAX_EXTRA_ATTRIBUTES: usize = 32;

/// Raw address fields as returned by the source API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAddress {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
}

/// One raw business listing as fetched from the source API
///
/// Field set follows the business-search payload shape: identity fields
/// plus optional enrichment (coordinates, phone, rating, categories, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawListing {
    /// Source-assigned external identifier
    pub source_id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub address: RawAddress,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub phone: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u64>,
    pub price: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub is_closed: bool,
    #[serde(default)]
    pub transactions: Vec<String>,
    /// Bounded scalar attribute bag for fields outside the typed schema
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl RawListing {
    /// Add an extra attribute, enforcing the scalar-only, bounded contract
    ///
    /// Non-scalar values and attributes past [`MAX_EXTRA_ATTRIBUTES`] are
    /// silently dropped; the typed schema is the supported surface.
    pub fn put_extra(&mut self, key: impl Into<String>, value: serde_json::Value) {
        if self.extra.len() >= MAX_EXTRA_ATTRIBUTES {
            return;
        }
        match value {
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => {},
            scalar => {
                self.extra.insert(key.into(), scalar);
            },
        }
    }
}

/// Quality flag attached to a normalized record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    Accepted,
    LowQuality,
}

/// Timestamped error detail recorded against a unit or record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Stable error classification tag (see `IngestError::kind`)
    pub kind: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl ErrorDetail {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }
}
