//! Expiry Sweep
//!
//! Scheduled reconciliation that flags stale matches as expired and, when
//! asked to clean, purges message history past the retention window.
//!
//! Safe to re-run with any `now`: a second pass over the same `now` scans a
//! subset of the first and changes nothing. Per-record failures are logged
//! and skipped so a single bad document never blocks the batch; stragglers
//! are picked up by the next run.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use types::errors::EngineError;

use crate::repository::MatchRepository;
use crate::store::MatchStore;

/// JSON summary returned by every run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    /// Unexpired matches older than the cutoff
    pub scanned_count: usize,
    /// Matches this run flipped to expired
    pub expired_count: usize,
    /// Messages deleted by the cleaning pass
    pub cleaned_message_count: usize,
    /// Records skipped because of a store fault
    pub failed_count: usize,
    /// `now - window`; matches created at or before this are stale
    pub cutoff_timestamp: i64,
}

pub struct ExpirySweep<R> {
    store: Arc<MatchStore<R>>,
}

impl<R: MatchRepository> ExpirySweep<R> {
    pub fn new(store: Arc<MatchStore<R>>) -> Self {
        Self { store }
    }

    /// Run against the store clock.
    pub fn run(&self, clean: bool) -> Result<SweepSummary, EngineError> {
        self.run_at(self.store.now_ms(), clean)
    }

    /// Run as of `now_ms`.
    ///
    /// Only a failure of the candidate queries aborts the run; everything
    /// per-record is skip-and-continue.
    pub fn run_at(&self, now_ms: i64, clean: bool) -> Result<SweepSummary, EngineError> {
        let policy = self.store.policy();
        let cutoff = policy.expiry_cutoff(now_ms);
        let mut summary = SweepSummary {
            cutoff_timestamp: cutoff,
            ..SweepSummary::default()
        };

        let stale = self.store.repository().find_stale(cutoff)?;
        summary.scanned_count = stale.len();

        for match_id in &stale {
            match self.store.flag_expired_at(match_id, now_ms) {
                Ok(true) => summary.expired_count += 1,
                Ok(false) => {}
                // deleted by retention between query and update
                Err(EngineError::NotFound { .. }) => {}
                Err(err) => {
                    summary.failed_count += 1;
                    warn!(match_id = %match_id, error = %err, "sweep failed to flag match, skipping");
                }
            }
        }

        if clean {
            let purgeable = self
                .store
                .repository()
                .find_purgeable(policy.retention_cutoff(now_ms))?;
            for match_id in &purgeable {
                match self.store.purge_messages_at(match_id, now_ms) {
                    Ok(removed) => summary.cleaned_message_count += removed,
                    Err(EngineError::NotFound { .. }) => {}
                    Err(err) => {
                        summary.failed_count += 1;
                        warn!(match_id = %match_id, error = %err, "sweep failed to purge messages, skipping");
                    }
                }
            }
        }

        info!(
            scanned = summary.scanned_count,
            expired = summary.expired_count,
            cleaned_messages = summary.cleaned_message_count,
            failed = summary.failed_count,
            cutoff = summary.cutoff_timestamp,
            clean,
            "expiry sweep finished"
        );
        Ok(summary)
    }
}
