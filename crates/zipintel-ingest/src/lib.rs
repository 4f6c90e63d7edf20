//! ZipIntel Ingestion Core
//!
//! ZIP-first business-listing ingestion under a shared external call
//! quota, with deterministic listing identity, idempotent storage, and a
//! durable, resumable progress log.
//!
//! # Pipeline
//!
//! The [`scheduler::Scheduler`] orders ZIP-code work units by priority,
//! the [`processor::BatchProcessor`] dispatches them to a bounded worker
//! pool within the [`quota::QuotaBudget`], and each
//! [`ingestor::UnitIngestor`] runs fetch → normalize → validate →
//! identify → store for one unit, appending its outcome to the
//! [`progress::ProgressStore`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use zipintel_ingest::config::IngestionConfig;
//! use zipintel_ingest::processor::BatchProcessor;
//! use zipintel_ingest::progress::MemoryProgressStore;
//! use zipintel_ingest::source::HttpSourceClient;
//! use zipintel_ingest::storage::MemoryListingStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestionConfig::load(None)?;
//!     let source = Arc::new(HttpSourceClient::from_config(&config)?);
//!     let store = Arc::new(MemoryListingStore::new());
//!     let progress = Arc::new(MemoryProgressStore::new());
//!
//!     let processor = BatchProcessor::new(config, source, store, progress)?;
//!     let result = processor.run().await?;
//!     println!("stored {} records", result.records_stored);
//!     Ok(())
//! }
//! ```

pub mod address;
pub mod config;
pub mod identity;
pub mod ingestor;
pub mod processor;
pub mod progress;
pub mod quality;
pub mod quota;
pub mod scheduler;
pub mod source;
pub mod storage;
pub mod types;
