//! Run configuration for the ingestion core
//!
//! Loaded once per run and immutable afterwards: tier→ZIP mapping, quota
//! limits, quality threshold and field weights, retry policy, worker
//! pool size, and durable-state paths. Sources are a TOML file (optional)
//! layered under `ZIPINTEL_`-prefixed environment variables.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use zipintel_common::{IngestError, Result};

/// Default postal-code shape: 5-digit US ZIP with optional +4
pub const DEFAULT_POSTAL_PATTERN: &str = r"^\d{5}(-\d{4})?$";

/// Source API page-size ceiling
pub const MAX_PAGE_SIZE: usize = 50;

/// Retry ceiling; keeps the doubling backoff delay within sane bounds
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

/// One scheduling tier: a weight and the ZIP codes it covers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    /// Tier number; lower tiers win scheduling ties
    pub tier: u8,
    /// Priority weight applied to every unit in this tier
    #[serde(default = "default_tier_weight")]
    pub weight: f64,
    pub postal_codes: Vec<String>,
}

fn default_tier_weight() -> f64 {
    1.0
}

/// Shared call/record budget limits for one quota window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_calls_allowed")]
    pub calls_allowed: u64,
    #[serde(default = "default_records_allowed")]
    pub records_allowed: u64,
    /// Window length in hours; counters reset at the boundary
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
}

fn default_calls_allowed() -> u64 {
    5000
}

fn default_records_allowed() -> u64 {
    250_000
}

fn default_window_hours() -> u32 {
    24
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            calls_allowed: default_calls_allowed(),
            records_allowed: default_records_allowed(),
            window_hours: default_window_hours(),
        }
    }
}

/// Quality scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Records scoring below this are skipped, not stored
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Field→weight map; empty means built-in defaults
    #[serde(default)]
    pub field_weights: BTreeMap<String, f64>,
}

fn default_min_score() -> f64 {
    0.6
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            field_weights: BTreeMap::new(),
        }
    }
}

/// Bounded retry policy for transient source failures
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First retry delay; doubles per attempt (1s, 2s, 4s, ...)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

/// Source API connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token; usually supplied via `ZIPINTEL_SOURCE__API_KEY`
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Search radius in meters around each ZIP centroid
    #[serde(default = "default_radius_meters")]
    pub radius_meters: u32,
    #[serde(default = "default_categories")]
    pub categories: String,
}

fn default_base_url() -> String {
    "https://api.yelp.com/v3".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_radius_meters() -> u32 {
    5000
}

fn default_categories() -> String {
    "restaurants".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
            radius_meters: default_radius_meters(),
            categories: default_categories(),
        }
    }
}

/// Complete immutable run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    #[serde(default)]
    pub tiers: Vec<TierConfig>,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub source: SourceConfig,

    /// Concurrent unit ingestors
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Target listings per ZIP before pagination stops
    #[serde(default = "default_listings_per_zip")]
    pub listings_per_zip: usize,

    /// Listings requested per API call (source caps at 50)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Maximum units dispatched in one batch run
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,

    /// Postal-code validation pattern
    #[serde(default = "default_postal_pattern")]
    pub postal_code_pattern: String,

    /// Directory for quota/scheduler snapshots and the progress log
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

fn default_workers() -> usize {
    5
}

fn default_listings_per_zip() -> usize {
    50
}

fn default_page_size() -> usize {
    50
}

fn default_batch_limit() -> usize {
    100
}

fn default_postal_pattern() -> String {
    DEFAULT_POSTAL_PATTERN.to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./state")
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            tiers: Vec::new(),
            quota: QuotaConfig::default(),
            quality: QualityConfig::default(),
            retry: RetryConfig::default(),
            source: SourceConfig::default(),
            workers: default_workers(),
            listings_per_zip: default_listings_per_zip(),
            page_size: default_page_size(),
            batch_limit: default_batch_limit(),
            postal_code_pattern: default_postal_pattern(),
            state_dir: default_state_dir(),
        }
    }
}

impl IngestionConfig {
    /// Load configuration from an optional TOML file plus environment
    ///
    /// Environment variables use the `ZIPINTEL_` prefix with `__` as the
    /// section separator, e.g. `ZIPINTEL_QUOTA__CALLS_ALLOWED=5000`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("ZIPINTEL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| IngestError::config(format!("failed to read configuration: {e}")))?;

        let config: IngestionConfig = settings
            .try_deserialize()
            .map_err(|e| IngestError::config(format!("invalid configuration: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints; any violation aborts the run
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(IngestError::config("workers must be at least 1"));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(IngestError::config(format!(
                "page_size must be in 1..={MAX_PAGE_SIZE}"
            )));
        }
        if !(0.0..=1.0).contains(&self.quality.min_score) {
            return Err(IngestError::config("quality.min_score must be within [0, 1]"));
        }
        if self.retry.max_attempts == 0 || self.retry.max_attempts > MAX_RETRY_ATTEMPTS {
            return Err(IngestError::config(format!(
                "retry.max_attempts must be in 1..={MAX_RETRY_ATTEMPTS}"
            )));
        }
        if self.quota.window_hours == 0 {
            return Err(IngestError::config("quota.window_hours must be at least 1"));
        }

        let pattern = self.compiled_postal_pattern()?;
        for tier in &self.tiers {
            for zip in &tier.postal_codes {
                if !pattern.is_match(zip) {
                    return Err(IngestError::config(format!(
                        "tier {} postal code {zip:?} does not match pattern {}",
                        tier.tier, self.postal_code_pattern
                    )));
                }
            }
        }

        Ok(())
    }

    /// Compile the configured postal-code pattern
    pub fn compiled_postal_pattern(&self) -> Result<Regex> {
        Regex::new(&self.postal_code_pattern).map_err(|e| {
            IngestError::config(format!(
                "invalid postal_code_pattern {:?}: {e}",
                self.postal_code_pattern
            ))
        })
    }

    /// Path of the quota-window snapshot file
    pub fn quota_state_path(&self) -> PathBuf {
        self.state_dir.join("quota.json")
    }

    /// Path of the scheduler snapshot file
    pub fn scheduler_state_path(&self) -> PathBuf {
        self.state_dir.join("scheduler.json")
    }

    /// Path of the append-only progress log
    pub fn progress_log_path(&self) -> PathBuf {
        self.state_dir.join("progress.jsonl")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn config_with_tier(zips: &[&str]) -> IngestionConfig {
        IngestionConfig {
            tiers: vec![TierConfig {
                tier: 1,
                weight: 1.0,
                postal_codes: zips.iter().map(|z| z.to_string()).collect(),
            }],
            ..IngestionConfig::default()
        }
    }

    #[test]
    fn test_defaults_validate() {
        let config = config_with_tier(&["94103", "10001-1234"]);
        config.validate().unwrap();
        assert_eq!(config.workers, 5);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.quota.calls_allowed, 5000);
    }

    #[test]
    fn test_malformed_postal_code_rejected() {
        let config = config_with_tier(&["94103", "9410"]);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn test_page_size_cap() {
        let mut config = config_with_tier(&["94103"]);
        config.page_size = 51;
        assert!(config.validate().is_err());
        config.page_size = 50;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_attempts_bounds() {
        let mut config = config_with_tier(&["94103"]);
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
        config.retry.max_attempts = MAX_RETRY_ATTEMPTS + 1;
        assert!(config.validate().is_err());
        config.retry.max_attempts = MAX_RETRY_ATTEMPTS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_quality_threshold_range() {
        let mut config = config_with_tier(&["94103"]);
        config.quality.min_score = 1.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_state_paths() {
        let mut config = IngestionConfig::default();
        config.state_dir = PathBuf::from("/tmp/zipintel");
        assert_eq!(
            config.progress_log_path(),
            PathBuf::from("/tmp/zipintel/progress.jsonl")
        );
    }
}
