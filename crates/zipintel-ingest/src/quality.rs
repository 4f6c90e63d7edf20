//! Data quality scoring
//!
//! Scores one raw listing's completeness as weighted coverage of a
//! configured field-weight map. Scoring never fails hard: every record
//! gets a score in [0, 1] plus the list of missing or invalid fields,
//! and the caller decides whether low-quality records are stored.

use crate::config::QualityConfig;
use std::collections::BTreeMap;
use zipintel_common::types::RawListing;

/// Completeness report for one raw listing
#[derive(Debug, Clone)]
pub struct QualityReport {
    /// Weighted completeness in [0, 1]
    pub score: f64,
    /// Fields that were absent or failed validity checks
    pub missing: Vec<String>,
}

impl QualityReport {
    pub fn below(&self, threshold: f64) -> bool {
        self.score < threshold
    }
}

/// Weighted-completeness validator
#[derive(Debug, Clone)]
pub struct QualityValidator {
    weights: BTreeMap<String, f64>,
}

impl QualityValidator {
    /// Build from configuration; an empty weight map uses the defaults
    /// (identity fields weighted 3x over enrichment fields)
    pub fn from_config(config: &QualityConfig) -> Self {
        let weights = if config.field_weights.is_empty() {
            Self::default_weights()
        } else {
            config.field_weights.clone()
        };
        Self { weights }
    }

    fn default_weights() -> BTreeMap<String, f64> {
        let mut w = BTreeMap::new();
        // Required identity fields
        w.insert("name".to_string(), 3.0);
        w.insert("street".to_string(), 3.0);
        w.insert("postal_code".to_string(), 3.0);
        // Enrichment fields
        w.insert("city".to_string(), 1.0);
        w.insert("state".to_string(), 1.0);
        w.insert("phone".to_string(), 1.0);
        w.insert("rating".to_string(), 1.0);
        w.insert("review_count".to_string(), 1.0);
        w.insert("categories".to_string(), 1.0);
        w.insert("coordinates".to_string(), 1.0);
        w.insert("url".to_string(), 1.0);
        w
    }

    /// Score one raw listing
    pub fn evaluate(&self, listing: &RawListing) -> QualityReport {
        let mut earned = 0.0;
        let mut total = 0.0;
        let mut missing = Vec::new();

        for (field, weight) in &self.weights {
            total += weight;
            if Self::field_present(listing, field) {
                earned += weight;
            } else {
                missing.push(field.clone());
            }
        }

        let score = if total > 0.0 { earned / total } else { 0.0 };
        QualityReport { score, missing }
    }

    /// Presence-and-validity check for one scored field
    fn field_present(listing: &RawListing, field: &str) -> bool {
        fn filled(v: &Option<String>) -> bool {
            v.as_deref().is_some_and(|s| !s.trim().is_empty())
        }

        match field {
            "name" => filled(&listing.name),
            "street" => filled(&listing.address.street),
            "postal_code" => filled(&listing.address.postal_code),
            "city" => filled(&listing.address.city),
            "state" => filled(&listing.address.state),
            "phone" => filled(&listing.phone),
            "rating" => listing.rating.is_some_and(|r| (0.0..=5.0).contains(&r)),
            "review_count" => listing.review_count.is_some(),
            "categories" => !listing.categories.is_empty(),
            "coordinates" => listing.latitude.is_some() && listing.longitude.is_some(),
            "url" => filled(&listing.url),
            "price" => filled(&listing.price),
            // Unknown configured field: never satisfied, visible in the
            // missing list so the misconfiguration is noticed.
            _ => false,
        }
    }
}
