//! ZipIntel Common Library
//!
//! Shared types, error handling, and logging for the ZipIntel workspace.
//!
//! # Overview
//!
//! This crate provides common functionality used across all ZipIntel
//! workspace members:
//!
//! - **Error Handling**: The `IngestError` taxonomy and result type
//! - **Logging**: Centralized tracing subscriber configuration
//! - **Types**: Shared listing and address types
//!
//! # Example
//!
//! ```no_run
//! use zipintel_common::{Result, IngestError};
//!
//! fn check_postal_code(zip: &str) -> Result<()> {
//!     if zip.is_empty() {
//!         return Err(IngestError::invalid_address("empty postal code"));
//!     }
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{IngestError, Result};
