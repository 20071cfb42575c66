//! Scan context.
//!
//! Everything the host knows about a scan besides the payload itself.

use chrono::{DateTime, Utc};

use crate::logging::structured::{short_id, LogContext};

/// Connectivity as last pushed by the host's network observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn is_online(self) -> bool {
        matches!(self, Connectivity::Online)
    }
}

impl From<bool> for Connectivity {
    fn from(online: bool) -> Self {
        if online {
            Connectivity::Online
        } else {
            Connectivity::Offline
        }
    }
}

/// Context for a single scan.
#[derive(Debug, Clone)]
pub struct ScanContext {
    pub scan_id: String,
    pub scanned_at: DateTime<Utc>,
    pub event_id: String,
    pub gate_id: String,
    pub connectivity: Connectivity,
}

impl ScanContext {
    pub fn new(event_id: &str, gate_id: &str, connectivity: Connectivity) -> Self {
        Self {
            scan_id: short_id("scan"),
            scanned_at: Utc::now(),
            event_id: event_id.to_string(),
            gate_id: gate_id.to_string(),
            connectivity,
        }
    }

    pub fn is_offline(&self) -> bool {
        !self.connectivity.is_online()
    }

    pub fn log_context(&self) -> LogContext {
        LogContext::scan(&self.scan_id)
            .with_event(&self.event_id)
            .with_gate(&self.gate_id)
    }
}
