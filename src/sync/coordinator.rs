//! Sync coordinator.
//!
//! Drains the offline check-in queue against the authority once connectivity
//! returns. One drain at a time: a second `sync()` while one is running is
//! refused immediately, never queued behind the first.
//!
//! Per-item outcomes are reconciled in queue order. Confirmed items leave the
//! queue; anything else stays for the next run. A batch that never reaches
//! the authority leaves the queue exactly as it was.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;

use crate::authority::{with_timeout, SyncBatchRequest, SyncItemResult, TicketAuthority};
use crate::config::{GatekeeperConfig, RetryPolicy};
use crate::error::{StorageError, SyncError};
use crate::logging::structured::{short_id, LogContext};
use crate::storage::OfflineCheckInStore;
use crate::{log_debug, log_info, log_warn};

use super::retry::retry_with_backoff;
use super::status::{SyncResult, SyncStatus};

/// Reason recorded when the authority's response skips an item.
pub const NO_RESULT_REASON: &str = "No result from authority";

pub struct SyncCoordinator {
    authority: Arc<dyn TicketAuthority>,
    store: Arc<OfflineCheckInStore>,
    retry: RetryPolicy,
    authority_timeout: Duration,
    online: AtomicBool,
    syncing: AtomicBool,
    status: Mutex<SyncStatus>,
}

/// Clears the in-flight flag however the drain ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncCoordinator {
    /// Starts offline until the host reports connectivity.
    pub fn new(
        authority: Arc<dyn TicketAuthority>,
        store: Arc<OfflineCheckInStore>,
        config: &GatekeeperConfig,
    ) -> Self {
        Self {
            authority,
            store,
            retry: config.sync_retry.clone(),
            authority_timeout: config.authority_timeout,
            online: AtomicBool::new(false),
            syncing: AtomicBool::new(false),
            status: Mutex::new(SyncStatus::default()),
        }
    }

    /// Record the latest connectivity reading. Returns `true` when this is an
    /// offline to online transition, i.e. the moment to call [`Self::sync`].
    pub fn set_online(&self, online: bool) -> bool {
        let was_online = self.online.swap(online, Ordering::AcqRel);
        if was_online != online {
            log::info!("CONNECTIVITY_CHANGED online={}", online);
        }
        online && !was_online
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    pub fn status(&self) -> Result<SyncStatus, StorageError> {
        let mut status = self.status.lock().clone();
        status.pending_items = self.store.pending_count()?;
        status.is_syncing = self.is_syncing();
        Ok(status)
    }

    /// Drain the pending queue.
    pub async fn sync(&self) -> Result<SyncResult, SyncError> {
        if !self.is_online() {
            log::debug!("SYNC_SKIPPED reason=offline");
            return Ok(SyncResult::default());
        }
        if self
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::info!("SYNC_REFUSED reason=already_in_progress");
            return Err(SyncError::AlreadyInProgress);
        }
        let _in_flight = InFlight(&self.syncing);

        let ctx = LogContext::sync(&short_id("sync"));
        self.status.lock().last_attempt = Some(Utc::now());

        let outcome = self.drain(&ctx).await;
        let mut status = self.status.lock();
        match &outcome {
            Ok(result) => {
                status.last_success = Some(Utc::now());
                status.last_error = if result.failed > 0 {
                    Some(format!("{} check-in(s) rejected by authority", result.failed))
                } else {
                    None
                };
            }
            Err(e) => status.last_error = Some(e.to_string()),
        }
        outcome
    }

    async fn drain(&self, ctx: &LogContext) -> Result<SyncResult, SyncError> {
        let pending = self.store.list()?;
        if pending.is_empty() {
            log_debug!(ctx, "SYNC_NOTHING_PENDING", pending = 0);
            return Ok(SyncResult::default());
        }

        log_info!(ctx, "SYNC_START", pending = pending.len());
        let request = SyncBatchRequest { check_ins: pending };

        let authority = &self.authority;
        let batch = &request;
        let limit = self.authority_timeout;
        let response = match retry_with_backoff(&self.retry, move |_| {
            with_timeout(limit, authority.sync_batch(batch))
        })
        .await
        {
            Ok(response) => response,
            Err(e) => {
                log_warn!(
                    ctx,
                    "SYNC_TRANSPORT_FAILED",
                    pending = request.check_ins.len(),
                    error = e.to_string()
                );
                return Err(e.into());
            }
        };

        let mut by_ticket: HashMap<&str, &SyncItemResult> = HashMap::new();
        for item in &response.results {
            by_ticket.entry(item.ticket_id.as_str()).or_insert(item);
        }

        let mut result = SyncResult::default();
        for check_in in &request.check_ins {
            match by_ticket.get(check_in.ticket_id.as_str()) {
                Some(item) if item.success => {
                    self.store.remove(&check_in.ticket_id)?;
                    result.record_success();
                }
                Some(item) => {
                    let reason = item.reason.as_deref().unwrap_or("Rejected by authority");
                    log_warn!(
                        ctx,
                        "SYNC_ITEM_FAILED",
                        ticket = check_in.ticket_id,
                        reason = reason
                    );
                    result.record_failure(&check_in.ticket_id, reason);
                }
                None => {
                    log_warn!(
                        ctx,
                        "SYNC_ITEM_MISSING",
                        ticket = check_in.ticket_id,
                        reason = NO_RESULT_REASON
                    );
                    result.record_failure(&check_in.ticket_id, NO_RESULT_REASON);
                }
            }
        }

        log_info!(
            ctx,
            "SYNC_COMPLETE",
            total = result.total,
            synced = result.synced,
            failed = result.failed
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::{InMemoryAuthority, SyncBatchResponse};
    use crate::error::AuthorityError;
    use crate::extraction::{encode_payload, TicketReference};
    use crate::pipeline::{Connectivity, ValidationEngine};
    use crate::storage::offline::tests::FlakyStore;
    use crate::storage::{MemoryStore, PendingCheckIn, Store};
    use async_trait::async_trait;

    fn config() -> GatekeeperConfig {
        GatekeeperConfig {
            sync_retry: RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            },
            ..GatekeeperConfig::default()
        }
    }

    fn setup(
        ids: &[&str],
        authority: Arc<InMemoryAuthority>,
        kv: Arc<dyn Store>,
    ) -> (Arc<OfflineCheckInStore>, SyncCoordinator) {
        let store = Arc::new(OfflineCheckInStore::new(kv, "@test"));
        for id in ids {
            authority.register(TicketReference::new(id, "E1"));
            store
                .record_offline_approval(PendingCheckIn::new(id, "E1", "G1", "{}"))
                .unwrap();
        }
        let coordinator = SyncCoordinator::new(authority, store.clone(), &config());
        coordinator.set_online(true);
        (store, coordinator)
    }

    fn pending_ids(store: &OfflineCheckInStore) -> Vec<String> {
        store.list().unwrap().into_iter().map(|c| c.ticket_id).collect()
    }

    #[test]
    fn test_set_online_reports_transitions() {
        let store = Arc::new(OfflineCheckInStore::new(Arc::new(MemoryStore::new()), "@test"));
        let coordinator =
            SyncCoordinator::new(Arc::new(InMemoryAuthority::new()), store, &config());
        assert!(!coordinator.is_online());
        assert!(coordinator.set_online(true));
        assert!(!coordinator.set_online(true));
        assert!(!coordinator.set_online(false));
        assert!(coordinator.set_online(true));
    }

    #[tokio::test]
    async fn test_offline_is_a_no_op() {
        let authority = Arc::new(InMemoryAuthority::new());
        let (store, coordinator) = setup(&["A"], authority.clone(), Arc::new(MemoryStore::new()));
        coordinator.set_online(false);

        assert_eq!(coordinator.sync().await.unwrap(), SyncResult::default());
        assert!(authority.sync_batches().is_empty());
        assert_eq!(pending_ids(&store), vec!["A"]);
    }

    #[tokio::test]
    async fn test_empty_queue_submits_nothing() {
        let authority = Arc::new(InMemoryAuthority::new());
        let (_, coordinator) = setup(&[], authority.clone(), Arc::new(MemoryStore::new()));
        assert!(coordinator.sync().await.unwrap().is_empty());
        assert!(authority.sync_batches().is_empty());
    }

    #[tokio::test]
    async fn test_replays_in_queue_order() {
        let authority = Arc::new(InMemoryAuthority::new());
        let (store, coordinator) =
            setup(&["A", "B", "C"], authority.clone(), Arc::new(MemoryStore::new()));

        let result = coordinator.sync().await.unwrap();
        assert_eq!((result.total, result.synced, result.failed), (3, 3, 0));
        assert_eq!(authority.sync_batches(), vec![vec!["A", "B", "C"]]);
        assert!(pending_ids(&store).is_empty());
        assert!(authority.is_redeemed("B"));

        let status = coordinator.status().unwrap();
        assert!(status.last_success.is_some());
        assert!(status.last_error.is_none());
        assert_eq!(status.pending_items, 0);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_only_rejected_items() {
        let authority = Arc::new(InMemoryAuthority::new());
        let (store, coordinator) =
            setup(&["A", "B", "C"], authority.clone(), Arc::new(MemoryStore::new()));
        authority.reject_on_sync("B", "Ticket voided");

        let result = coordinator.sync().await.unwrap();
        assert_eq!((result.total, result.synced, result.failed), (3, 2, 1));
        assert_eq!(result.failures[0].reason, "Ticket voided");
        assert_eq!(pending_ids(&store), vec!["B"]);

        // next run only resubmits B, and succeeds once the authority agrees
        authority.clear_sync_rejections();
        let result = coordinator.sync().await.unwrap();
        assert_eq!((result.total, result.synced, result.failed), (1, 1, 0));
        assert_eq!(authority.sync_batches().last().unwrap(), &vec!["B".to_string()]);
        assert!(pending_ids(&store).is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_leaves_queue_untouched() {
        let authority = Arc::new(InMemoryAuthority::new());
        let (store, coordinator) =
            setup(&["A", "B"], authority.clone(), Arc::new(MemoryStore::new()));
        authority.set_reachable(false);

        let err = coordinator.sync().await.unwrap_err();
        assert!(matches!(err, SyncError::Transport(AuthorityError::Transport(_))));
        assert_eq!(pending_ids(&store), vec!["A", "B"]);
        assert!(!coordinator.is_syncing());

        let status = coordinator.status().unwrap();
        assert!(status.last_error.is_some());
        assert!(status.last_success.is_none());
        assert_eq!(status.pending_items, 2);

        authority.set_reachable(true);
        assert_eq!(coordinator.sync().await.unwrap().synced, 2);
    }

    #[tokio::test]
    async fn test_single_flight() {
        let authority = Arc::new(InMemoryAuthority::new().with_latency(Duration::from_millis(100)));
        let (store, coordinator) =
            setup(&["A", "B"], authority.clone(), Arc::new(MemoryStore::new()));
        let coordinator = Arc::new(coordinator);

        let first = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.sync().await }
        });
        while authority.sync_batches().is_empty() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert!(coordinator.is_syncing());

        assert!(matches!(
            coordinator.sync().await,
            Err(SyncError::AlreadyInProgress)
        ));

        let result = first.await.unwrap().unwrap();
        assert_eq!(result.synced, 2);
        assert_eq!(authority.sync_batches().len(), 1);
        assert!(pending_ids(&store).is_empty());
        assert!(!coordinator.is_syncing());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drain_alongside_offline_scans_keeps_new_approvals() {
        let authority = Arc::new(InMemoryAuthority::new().with_latency(Duration::from_millis(50)));
        let (store, coordinator) =
            setup(&["A", "B", "C"], authority.clone(), Arc::new(MemoryStore::new()));
        let coordinator = Arc::new(coordinator);
        let engine = Arc::new(ValidationEngine::new(
            authority.clone(),
            store.clone(),
            &config(),
        ));

        let drain = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.sync().await }
        });
        while authority.sync_batches().is_empty() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let scans: Vec<_> = (0..20)
            .map(|n| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    let raw = encode_payload(&TicketReference::new(&format!("N{}", n), "E1"));
                    engine
                        .validate(&raw, "E1", "G1", Connectivity::Offline, &[])
                        .await
                })
            })
            .collect();
        for scan in scans {
            assert!(scan.await.unwrap().unwrap().success);
        }

        let result = drain.await.unwrap().unwrap();
        assert_eq!((result.total, result.synced), (3, 3));

        let mut remaining = pending_ids(&store);
        remaining.sort();
        let mut expected: Vec<String> = (0..20).map(|n| format!("N{}", n)).collect();
        expected.sort();
        assert_eq!(remaining, expected);
        for n in 0..20 {
            let id = format!("N{}", n);
            assert!(store.get_cached_ticket(&id).unwrap().map_or(false, |t| t.is_used));
        }
    }

    #[tokio::test]
    async fn test_storage_failure_during_reconcile() {
        let kv = Arc::new(FlakyStore::default());
        let authority = Arc::new(InMemoryAuthority::new());
        let (store, coordinator) = setup(&["A"], authority.clone(), kv.clone());
        kv.set_failing(true);

        assert!(matches!(coordinator.sync().await, Err(SyncError::Storage(_))));
        kv.set_failing(false);
        // the authority redeemed it, so the retry is an idempotent no-op
        assert_eq!(coordinator.sync().await.unwrap().synced, 1);
        assert!(pending_ids(&store).is_empty());
    }

    /// Answers only for the first item of every batch.
    struct ForgetfulAuthority;

    #[async_trait]
    impl TicketAuthority for ForgetfulAuthority {
        async fn validate_ticket(
            &self,
            _request: &crate::authority::ValidateTicketRequest,
        ) -> Result<crate::authority::ValidateTicketResponse, AuthorityError> {
            Err(AuthorityError::Transport("not used".into()))
        }

        async fn sync_batch(
            &self,
            request: &SyncBatchRequest,
        ) -> Result<SyncBatchResponse, AuthorityError> {
            Ok(SyncBatchResponse {
                results: request
                    .check_ins
                    .iter()
                    .take(1)
                    .map(|c| SyncItemResult::ok(&c.ticket_id))
                    .collect(),
            })
        }
    }

    #[tokio::test]
    async fn test_missing_results_count_as_failed() {
        let store = Arc::new(OfflineCheckInStore::new(Arc::new(MemoryStore::new()), "@test"));
        for id in ["A", "B"] {
            store.enqueue(PendingCheckIn::new(id, "E1", "G1", "{}")).unwrap();
        }
        let coordinator = SyncCoordinator::new(Arc::new(ForgetfulAuthority), store.clone(), &config());
        coordinator.set_online(true);

        let result = coordinator.sync().await.unwrap();
        assert_eq!((result.total, result.synced, result.failed), (2, 1, 1));
        assert_eq!(result.failures[0].reason, NO_RESULT_REASON);
        assert_eq!(pending_ids(&store), vec!["B"]);
    }
}
