//! Shared call/record quota budget
//!
//! One `QuotaBudget` per process, shared by every worker through an
//! `Arc`. All consuming operations go through a single mutex-guarded
//! check-and-increment, so `calls_used` can never exceed `calls_allowed`
//! within a window regardless of concurrency. Window state survives
//! restarts through a JSON snapshot file.

use crate::config::QuotaConfig;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use zipintel_common::{IngestError, Result};

/// Serializable quota-window state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub calls_used: u64,
    pub calls_allowed: u64,
    pub records_used: u64,
    pub records_allowed: u64,
}

/// Process-wide quota budget for the active window
#[derive(Debug)]
pub struct QuotaBudget {
    window_hours: u32,
    inner: Mutex<QuotaSnapshot>,
}

impl QuotaBudget {
    /// Start a fresh window beginning now
    pub fn new(config: &QuotaConfig) -> Self {
        let now = Utc::now();
        Self {
            window_hours: config.window_hours,
            inner: Mutex::new(QuotaSnapshot {
                window_start: now,
                window_end: now + Duration::hours(i64::from(config.window_hours)),
                calls_used: 0,
                calls_allowed: config.calls_allowed,
                records_used: 0,
                records_allowed: config.records_allowed,
            }),
        }
    }

    /// Reload the persisted window, or start a new one
    ///
    /// A snapshot whose window is still open resumes with its counters;
    /// an expired or missing snapshot starts fresh. Allowed limits always
    /// come from the current configuration.
    pub fn load_or_new(config: &QuotaConfig, path: &Path) -> Result<Self> {
        let budget = Self::new(config);

        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let saved: QuotaSnapshot = serde_json::from_str(&data)?;
            if Utc::now() < saved.window_end {
                let mut state = budget.lock();
                state.window_start = saved.window_start;
                state.window_end = saved.window_end;
                state.calls_used = saved.calls_used;
                state.records_used = saved.records_used;
                drop(state);
                tracing::info!(
                    calls_used = saved.calls_used,
                    window_end = %saved.window_end,
                    "Resumed quota window from snapshot"
                );
            } else {
                tracing::info!(window_end = %saved.window_end, "Quota snapshot expired, starting new window");
            }
        }

        Ok(budget)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QuotaSnapshot> {
        // A poisoned lock means a panic mid-increment; the counter state
        // itself is a plain u64 and still consistent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reset counters when the window boundary has passed
    fn roll_window(state: &mut QuotaSnapshot, window_hours: u32) {
        let now = Utc::now();
        if now < state.window_end {
            return;
        }
        let span = Duration::hours(i64::from(window_hours));
        while state.window_end <= now {
            state.window_start = state.window_end;
            state.window_end = state.window_end + span;
        }
        state.calls_used = 0;
        state.records_used = 0;
        tracing::info!(window_start = %state.window_start, "Quota window rolled over");
    }

    /// Atomically acquire one call permit
    ///
    /// Returns `QuotaExceeded` when the window budget is spent; the
    /// caller defers its unit rather than treating this as a failure.
    pub fn acquire_call(&self) -> Result<()> {
        let mut state = self.lock();
        Self::roll_window(&mut state, self.window_hours);

        if state.calls_used >= state.calls_allowed {
            return Err(IngestError::QuotaExceeded {
                used: state.calls_used,
                allowed: state.calls_allowed,
            });
        }
        state.calls_used += 1;
        Ok(())
    }

    /// Account stored records against the record budget
    ///
    /// An in-flight unit may overshoot the budget on its last page;
    /// dispatch checks `remaining_records` before claiming the next
    /// unit, so the overshoot is bounded by one unit's worth.
    pub fn record_stored(&self, count: u64) {
        let mut state = self.lock();
        state.records_used = state.records_used.saturating_add(count);
        if state.records_used > state.records_allowed {
            tracing::warn!(
                records_used = state.records_used,
                records_allowed = state.records_allowed,
                "Record budget exceeded for current window"
            );
        }
    }

    /// Permits left in the active window
    pub fn remaining_calls(&self) -> u64 {
        let mut state = self.lock();
        Self::roll_window(&mut state, self.window_hours);
        state.calls_allowed.saturating_sub(state.calls_used)
    }

    /// Record budget left in the active window
    pub fn remaining_records(&self) -> u64 {
        let mut state = self.lock();
        Self::roll_window(&mut state, self.window_hours);
        state.records_allowed.saturating_sub(state.records_used)
    }

    /// Copy of the current window state
    pub fn snapshot(&self) -> QuotaSnapshot {
        self.lock().clone()
    }

    /// Persist the window state via atomic tmp-file rename
    pub fn persist(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&snapshot)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
