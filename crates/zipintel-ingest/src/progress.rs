//! Durable progress log
//!
//! Append-only record of every unit attempt. The log is the source of
//! truth for resumability (units already done this window are not
//! redispatched), scheduler rebalancing, and batch status reporting.

use crate::types::ProgressEntry;
use async_trait::async_trait;
use serde_jsonlines::{append_json_lines, json_lines};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use uuid::Uuid;
use zipintel_common::Result;

/// Append-only progress persistence boundary
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Append one completed attempt; entries are never mutated after
    async fn append(&self, entry: ProgressEntry) -> Result<()>;

    /// All entries for one batch, in append order
    async fn entries_for_batch(&self, batch_id: Uuid) -> Result<Vec<ProgressEntry>>;

    /// Latest entry per unit across all batches
    async fn latest_outcomes(&self) -> Result<HashMap<String, ProgressEntry>>;
}

/// In-memory progress store for tests and single-shot runs
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    entries: Mutex<Vec<ProgressEntry>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<ProgressEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn append(&self, entry: ProgressEntry) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
        Ok(())
    }

    async fn entries_for_batch(&self, batch_id: Uuid) -> Result<Vec<ProgressEntry>> {
        Ok(self
            .all()
            .into_iter()
            .filter(|e| e.batch_id == batch_id)
            .collect())
    }

    async fn latest_outcomes(&self) -> Result<HashMap<String, ProgressEntry>> {
        let mut latest = HashMap::new();
        for entry in self.all() {
            latest.insert(entry.unit_id.clone(), entry);
        }
        Ok(latest)
    }
}

/// JSON Lines file-backed progress store
///
/// One JSON object per line, appended per attempt. Appends are serialized
/// through a mutex so concurrent workers never interleave partial lines.
#[derive(Debug)]
pub struct JsonlProgressStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    fn read_all(&self) -> Result<Vec<ProgressEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let entries = json_lines::<ProgressEntry, _>(&self.path)?
            .collect::<std::io::Result<Vec<_>>>()?;
        Ok(entries)
    }
}

#[async_trait]
impl ProgressStore for JsonlProgressStore {
    async fn append(&self, entry: ProgressEntry) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        append_json_lines(&self.path, [&entry])?;
        Ok(())
    }

    async fn entries_for_batch(&self, batch_id: Uuid) -> Result<Vec<ProgressEntry>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|e| e.batch_id == batch_id)
            .collect())
    }

    async fn latest_outcomes(&self) -> Result<HashMap<String, ProgressEntry>> {
        let mut latest = HashMap::new();
        for entry in self.read_all()? {
            latest.insert(entry.unit_id.clone(), entry);
        }
        Ok(latest)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::UnitOutcome;
    use chrono::Utc;

    fn entry(batch_id: Uuid, unit_id: &str, status: UnitOutcome, stored: u64) -> ProgressEntry {
        ProgressEntry {
            batch_id,
            unit_id: unit_id.to_string(),
            status,
            fetched: stored,
            stored,
            skipped: 0,
            failed: 0,
            calls_used: 1,
            error_detail: None,
            started_at: Utc::now(),
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_jsonl_append_and_query() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlProgressStore::new(dir.path().join("progress.jsonl")).unwrap();

        let batch_a = Uuid::new_v4();
        let batch_b = Uuid::new_v4();
        store.append(entry(batch_a, "94103", UnitOutcome::Done, 5)).await.unwrap();
        store.append(entry(batch_a, "94110", UnitOutcome::Failed, 0)).await.unwrap();
        store.append(entry(batch_b, "94103", UnitOutcome::Done, 2)).await.unwrap();

        let a_entries = store.entries_for_batch(batch_a).await.unwrap();
        assert_eq!(a_entries.len(), 2);
        assert_eq!(a_entries[0].unit_id, "94103");
        assert_eq!(a_entries[1].unit_id, "94110");
    }

    #[tokio::test]
    async fn test_jsonl_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.jsonl");
        let batch_id = Uuid::new_v4();

        {
            let store = JsonlProgressStore::new(&path).unwrap();
            store.append(entry(batch_id, "94103", UnitOutcome::Done, 3)).await.unwrap();
        }

        let reopened = JsonlProgressStore::new(&path).unwrap();
        let entries = reopened.entries_for_batch(batch_id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].stored, 3);
    }

    #[tokio::test]
    async fn test_latest_outcome_wins() {
        let store = MemoryProgressStore::new();
        let batch_id = Uuid::new_v4();

        store.append(entry(batch_id, "94103", UnitOutcome::Failed, 0)).await.unwrap();
        store.append(entry(batch_id, "94103", UnitOutcome::Done, 4)).await.unwrap();

        let latest = store.latest_outcomes().await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest["94103"].status, UnitOutcome::Done);
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlProgressStore::new(dir.path().join("none.jsonl")).unwrap();
        assert!(store.latest_outcomes().await.unwrap().is_empty());
    }
}
