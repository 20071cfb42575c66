//! Storage key layout.
//!
//! Two blobs per namespace: the pending check-in queue and the cached
//! ticket records.

/// Keys used under one storage namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub pending_check_ins: String,
    pub cached_tickets: String,
}

impl StorageKeys {
    pub fn new(namespace: &str) -> Self {
        Self {
            pending_check_ins: format!("{}:offline_check_ins", namespace),
            cached_tickets: format!("{}:cached_tickets", namespace),
        }
    }
}
