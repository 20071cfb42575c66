//! Sync outcome and status snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// An item the authority did not confirm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailure {
    pub ticket_id: String,
    pub reason: String,
}

/// Aggregate result of one `sync()` run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub total: usize,
    pub synced: usize,
    pub failed: usize,
    pub failures: Vec<SyncFailure>,
}

impl SyncResult {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub(crate) fn record_success(&mut self) {
        self.total += 1;
        self.synced += 1;
    }

    pub(crate) fn record_failure(&mut self, ticket_id: &str, reason: &str) {
        self.total += 1;
        self.failed += 1;
        self.failures.push(SyncFailure {
            ticket_id: ticket_id.to_string(),
            reason: reason.to_string(),
        });
    }
}

/// Point-in-time view of the coordinator for a "sync now" screen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub pending_items: usize,
    pub is_syncing: bool,
}
