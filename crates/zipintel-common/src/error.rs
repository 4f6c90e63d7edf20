//! Error types for ZipIntel

use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Main error type for the ingestion core
///
/// Variants fall into three severity classes:
/// - run-fatal: `Config`, `Cancelled`
/// - unit-level: `QuotaExceeded`, `SourceUnavailable`, `RateLimited`
/// - record-level: `InvalidAddress`, `StorageConflict`
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Quota exhausted: {used}/{allowed} calls in current window")]
    QuotaExceeded { used: u64, allowed: u64 },

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Source rate limited: {0}")]
    RateLimited(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Storage conflict for listing {listing_id}: {detail}")]
    StorageConflict { listing_id: String, detail: String },

    #[error("Unit {0} already has an attempt in flight")]
    UnitBusy(String),

    #[error("Run cancelled")]
    Cancelled,
}

impl IngestError {
    pub fn config(msg: impl Into<String>) -> Self {
        IngestError::Config(msg.into())
    }

    pub fn invalid_address(msg: impl Into<String>) -> Self {
        IngestError::InvalidAddress(msg.into())
    }

    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        IngestError::SourceUnavailable(msg.into())
    }

    pub fn rate_limited(msg: impl Into<String>) -> Self {
        IngestError::RateLimited(msg.into())
    }

    /// True for source errors worth another bounded retry attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IngestError::SourceUnavailable(_) | IngestError::RateLimited(_)
        )
    }

    /// Short stable tag for progress-log error classification
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Io(_) => "io",
            IngestError::Serialization(_) => "serialization",
            IngestError::Config(_) => "config",
            IngestError::QuotaExceeded { .. } => "quota_exceeded",
            IngestError::SourceUnavailable(_) => "source_unavailable",
            IngestError::RateLimited(_) => "rate_limited",
            IngestError::InvalidAddress(_) => "invalid_address",
            IngestError::StorageConflict { .. } => "storage_conflict",
            IngestError::UnitBusy(_) => "unit_busy",
            IngestError::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(IngestError::source_unavailable("503").is_retryable());
        assert!(IngestError::rate_limited("429").is_retryable());
        assert!(!IngestError::invalid_address("no street").is_retryable());
        assert!(!IngestError::QuotaExceeded { used: 5, allowed: 5 }.is_retryable());
        assert!(!IngestError::Cancelled.is_retryable());
    }

    #[test]
    fn test_error_kind_tags() {
        assert_eq!(IngestError::config("bad tier").kind(), "config");
        assert_eq!(
            IngestError::StorageConflict {
                listing_id: "abc".into(),
                detail: "dup".into()
            }
            .kind(),
            "storage_conflict"
        );
    }
}
