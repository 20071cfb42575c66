//! Gatecheck Core - offline-capable ticket validation for event gates
//!
//! Staff scan QR tickets and need an accept/reject answer whether or not the
//! device has network. This crate is the part of the scanning app that makes
//! that decision and later reconciles offline decisions with the ticket
//! authority. Priorities:
//!
//! 1. **At-most-once redemption** - one pending check-in per ticket, ever
//! 2. **No silent loss** - storage and transport failures are errors, not rejections
//! 3. **Logging** - every decision logged with scan context, payloads fingerprinted
//!
//! ## Architecture
//!
//! - `extraction` - QR payload decoding into a ticket reference
//! - `validation` - Event rules, ordered rule evaluation, rule set cache
//! - `pipeline` - Validation engine and the canonical verdict
//! - `storage` - Key-value store seam and the offline check-in store
//! - `sync` - Single-flight reconciliation with the authority
//! - `authority` - Remote authority seam, wire shapes, in-memory authority
//! - `security` - Payload limits and log redaction
//! - `logging` - Structured logging with scan/sync context

use std::sync::Arc;

use parking_lot::RwLock;

pub mod authority;
pub mod config;
pub mod error;
pub mod extraction;
pub mod logging;
pub mod pipeline;
pub mod security;
pub mod storage;
pub mod sync;
pub mod validation;

use authority::TicketAuthority;
use config::GatekeeperConfig;
use error::{StorageError, SyncError, ValidationError};
use pipeline::{Connectivity, ValidationEngine, Verdict};
use storage::{OfflineCheckInStore, PendingCheckIn, Store};
use sync::{SyncCoordinator, SyncResult, SyncStatus};
use validation::{EventRule, RuleSetCache};

/// Initialize an `env_logger` for hosts that have no logger of their own.
///
/// Idempotent. The crate never calls this itself: installing the global
/// logger is the host's decision, made once at its entry point.
pub fn init_logger() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}

/// Everything a scanning device needs, around one authority and one store.
///
/// Connectivity is pushed in by the host's network observer through
/// [`Gatekeeper::set_online`]; nothing here polls.
pub struct Gatekeeper {
    config: GatekeeperConfig,
    store: Arc<OfflineCheckInStore>,
    engine: ValidationEngine,
    coordinator: SyncCoordinator,
    rules: RwLock<RuleSetCache>,
}

impl Gatekeeper {
    pub fn new(
        authority: Arc<dyn TicketAuthority>,
        kv: Arc<dyn Store>,
        config: GatekeeperConfig,
    ) -> Self {
        let store = Arc::new(OfflineCheckInStore::new(kv, &config.storage_namespace));
        let engine = ValidationEngine::new(authority.clone(), store.clone(), &config);
        let coordinator = SyncCoordinator::new(authority, store.clone(), &config);

        log::info!(
            "GATEKEEPER_READY namespace={} authority_timeout_ms={} sync_attempts={}",
            config.storage_namespace,
            config.authority_timeout.as_millis(),
            config.sync_retry.max_attempts
        );

        Self {
            rules: RwLock::new(RuleSetCache::new(config.rule_cache_ttl)),
            config,
            store,
            engine,
            coordinator,
        }
    }

    pub fn config(&self) -> &GatekeeperConfig {
        &self.config
    }

    /// Validate a scan with an explicit connectivity flag and rule set.
    pub async fn validate(
        &self,
        raw_payload: &str,
        event_id: &str,
        gate_id: &str,
        connectivity: Connectivity,
        rules: &[EventRule],
    ) -> Result<Verdict, ValidationError> {
        self.engine
            .validate(raw_payload, event_id, gate_id, connectivity, rules)
            .await
    }

    /// Validate a scan using the last pushed connectivity and the cached
    /// rule set for `event_id`.
    pub async fn scan(
        &self,
        raw_payload: &str,
        event_id: &str,
        gate_id: &str,
    ) -> Result<Verdict, ValidationError> {
        let rules = self.cached_rules(event_id);
        let connectivity = Connectivity::from(self.coordinator.is_online());
        self.engine
            .validate(raw_payload, event_id, gate_id, connectivity, &rules)
            .await
    }

    /// Replace the cached rule set for `event_id`. Returns how many rules were kept.
    pub fn load_rules(&self, event_id: &str, rules: Vec<EventRule>) -> usize {
        self.rules.write().load(event_id, rules)
    }

    pub fn rules_need_refresh(&self, event_id: &str) -> bool {
        self.rules.read().needs_refresh(event_id)
    }

    fn cached_rules(&self, event_id: &str) -> Vec<EventRule> {
        let cache = self.rules.read();
        match cache.get(event_id) {
            Some(rules) => {
                if cache.needs_refresh(event_id) {
                    log::warn!(
                        "RULES_STALE event={} age_secs={:?}",
                        event_id,
                        cache.cache_age_secs(event_id)
                    );
                }
                rules.to_vec()
            }
            None => {
                log::warn!("RULES_NOT_LOADED event={} action=no_rules", event_id);
                Vec::new()
            }
        }
    }

    pub async fn sync(&self) -> Result<SyncResult, SyncError> {
        self.coordinator.sync().await
    }

    /// Push a connectivity reading. `true` means "just came online": call [`Self::sync`].
    pub fn set_online(&self, online: bool) -> bool {
        self.coordinator.set_online(online)
    }

    pub fn is_online(&self) -> bool {
        self.coordinator.is_online()
    }

    pub fn pending_check_ins(&self) -> Result<Vec<PendingCheckIn>, StorageError> {
        self.store.list()
    }

    pub fn sync_status(&self) -> Result<SyncStatus, StorageError> {
        self.coordinator.status()
    }

    pub fn store(&self) -> &OfflineCheckInStore {
        &self.store
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }
}
