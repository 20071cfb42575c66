//! Validation engine.
//!
//! One scan in, one [`Verdict`] out:
//! 1. Payload parsing
//! 2. Event match
//! 3. Online: the authority decides
//! 4. Offline: duplicate-queue check, rule evaluation, local approval
//!
//! Rejections are `Ok` verdicts. Only an unreachable authority or a failing
//! local store come back as `Err`, and neither leaves state half-written.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveTime};

use crate::authority::{with_timeout, TicketAuthority, ValidateTicketRequest};
use crate::config::GatekeeperConfig;
use crate::error::ValidationError;
use crate::extraction::{parse_payload, TicketReference, INVALID_FORMAT_REASON};
use crate::logging::structured::LogContext;
use crate::security::{mask_holder_name, payload_fingerprint};
use crate::storage::{OfflineCheckInStore, PendingCheckIn};
use crate::validation::{applicable_rules, evaluate_at, EventRule};

use super::context::{Connectivity, ScanContext};
use super::verdict::{Verdict, ALREADY_SCANNED_OFFLINE_REASON, DIFFERENT_EVENT_REASON};

pub struct ValidationEngine {
    authority: Arc<dyn TicketAuthority>,
    store: Arc<OfflineCheckInStore>,
    authority_timeout: Duration,
    max_payload_bytes: usize,
}

impl ValidationEngine {
    pub fn new(
        authority: Arc<dyn TicketAuthority>,
        store: Arc<OfflineCheckInStore>,
        config: &GatekeeperConfig,
    ) -> Self {
        Self {
            authority,
            store,
            authority_timeout: config.authority_timeout,
            max_payload_bytes: config.max_payload_bytes,
        }
    }

    pub fn store(&self) -> &Arc<OfflineCheckInStore> {
        &self.store
    }

    /// Validate a scan against the device's local wall clock.
    pub async fn validate(
        &self,
        raw_payload: &str,
        event_id: &str,
        gate_id: &str,
        connectivity: Connectivity,
        rules: &[EventRule],
    ) -> Result<Verdict, ValidationError> {
        self.validate_at(
            raw_payload,
            event_id,
            gate_id,
            connectivity,
            rules,
            Local::now().time(),
        )
        .await
    }

    /// Validate a scan with time rules evaluated at `now`.
    pub async fn validate_at(
        &self,
        raw_payload: &str,
        event_id: &str,
        gate_id: &str,
        connectivity: Connectivity,
        rules: &[EventRule],
        now: NaiveTime,
    ) -> Result<Verdict, ValidationError> {
        let ctx = ScanContext::new(event_id, gate_id, connectivity);
        let log_ctx = ctx.log_context();
        let offline = ctx.is_offline();

        log::debug!(
            "{} SCAN_START payload={} online={}",
            log_ctx,
            payload_fingerprint(raw_payload),
            connectivity.is_online()
        );

        // [1] PARSE
        let ticket = match parse_payload(raw_payload, self.max_payload_bytes) {
            Ok(ticket) => ticket,
            Err(e) => {
                log::warn!(
                    "{} PAYLOAD_INVALID payload={} error={}",
                    log_ctx,
                    payload_fingerprint(raw_payload),
                    e
                );
                return Ok(Verdict::rejected(INVALID_FORMAT_REASON, None, offline));
            }
        };

        // [2] EVENT MATCH
        if ticket.event_id != ctx.event_id {
            log::info!(
                "{} SCAN_REJECTED ticket={} reason=wrong_event ticket_event={}",
                log_ctx,
                ticket.id,
                ticket.event_id
            );
            return Ok(Verdict::rejected(DIFFERENT_EVENT_REASON, Some(ticket), offline));
        }

        // [3]/[4] AUTHORITY OR LOCAL
        let verdict = if offline {
            self.validate_offline(&ctx, &log_ctx, ticket, raw_payload, rules, now)?
        } else {
            self.validate_online(&ctx, &log_ctx, ticket).await?
        };

        log::info!(
            "{} SCAN_COMPLETE success={} offline={} reason={:?}",
            log_ctx,
            verdict.success,
            verdict.is_offline,
            verdict.reason
        );
        Ok(verdict)
    }

    async fn validate_online(
        &self,
        ctx: &ScanContext,
        log_ctx: &LogContext,
        ticket: TicketReference,
    ) -> Result<Verdict, ValidationError> {
        let request = ValidateTicketRequest {
            ticket_id: ticket.id.clone(),
            event_id: ctx.event_id.clone(),
            gate_id: ctx.gate_id.clone(),
        };

        let response = match with_timeout(
            self.authority_timeout,
            self.authority.validate_ticket(&request),
        )
        .await
        {
            Ok(response) => response,
            Err(e) => {
                log::warn!(
                    "{} AUTHORITY_UNAVAILABLE ticket={} error={}",
                    log_ctx,
                    request.ticket_id,
                    e
                );
                return Err(e.into());
            }
        };

        let verdict = response.into_verdict(ticket);
        if verdict.success {
            // keep the local mirror warm for a later offline stretch
            self.store.set_cached_ticket_used(&request.ticket_id)?;
        }
        Ok(verdict)
    }

    fn validate_offline(
        &self,
        ctx: &ScanContext,
        log_ctx: &LogContext,
        ticket: TicketReference,
        raw_payload: &str,
        rules: &[EventRule],
        now: NaiveTime,
    ) -> Result<Verdict, ValidationError> {
        if self.store.contains(&ticket.id)? {
            log::info!(
                "{} SCAN_REJECTED ticket={} reason=already_queued",
                log_ctx,
                ticket.id
            );
            return Ok(Verdict::rejected(
                ALREADY_SCANNED_OFFLINE_REASON,
                Some(ticket),
                true,
            ));
        }

        let is_used = self
            .store
            .get_cached_ticket(&ticket.id)?
            .map(|record| record.is_used)
            .unwrap_or(false);

        let rules_in_force = applicable_rules(rules, &ctx.gate_id);
        log::debug!(
            "{} RULES_EVALUATE ticket={} rules={} cached_used={}",
            log_ctx,
            ticket.id,
            rules_in_force.len(),
            is_used
        );

        let evaluation = evaluate_at(&ticket, is_used, &ctx.gate_id, rules_in_force, now);
        if !evaluation.valid {
            let reason = evaluation
                .reason
                .unwrap_or_else(|| "Ticket rejected by event rules".to_string());
            return Ok(Verdict::rejected(&reason, Some(ticket), true));
        }

        let check_in = PendingCheckIn::new(&ticket.id, &ctx.event_id, &ctx.gate_id, raw_payload);
        if !self.store.record_offline_approval(check_in)? {
            return Ok(Verdict::rejected(
                ALREADY_SCANNED_OFFLINE_REASON,
                Some(ticket),
                true,
            ));
        }

        log::debug!(
            "{} OFFLINE_APPROVED ticket={} holder={}",
            log_ctx,
            ticket.id,
            ticket
                .holder_name
                .as_deref()
                .map(mask_holder_name)
                .unwrap_or_default()
        );
        Ok(Verdict::approved(ticket, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::InMemoryAuthority;
    use crate::error::AuthorityError;
    use crate::extraction::encode_payload;
    use crate::storage::offline::tests::FlakyStore;
    use crate::storage::{MemoryStore, Store};
    use crate::validation::RuleType;
    use proptest::prelude::*;

    struct Fixture {
        authority: Arc<InMemoryAuthority>,
        store: Arc<OfflineCheckInStore>,
        engine: ValidationEngine,
    }

    fn fixture_with(kv: Arc<dyn Store>) -> Fixture {
        let authority = Arc::new(InMemoryAuthority::new());
        let store = Arc::new(OfflineCheckInStore::new(kv, "@test"));
        let engine = ValidationEngine::new(
            authority.clone(),
            store.clone(),
            &GatekeeperConfig::default(),
        );
        Fixture {
            authority,
            store,
            engine,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(MemoryStore::new()))
    }

    fn payload(id: &str, event_id: &str) -> String {
        encode_payload(&TicketReference::new(id, event_id))
    }

    fn noon() -> NaiveTime {
        NaiveTime::from_hms_opt(12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_garbage_payload() {
        let f = fixture();
        for connectivity in [Connectivity::Online, Connectivity::Offline] {
            let verdict = f
                .engine
                .validate("%%%", "E1", "G1", connectivity, &[])
                .await
                .unwrap();
            assert!(!verdict.success);
            assert!(verdict.ticket.is_none());
            assert_eq!(verdict.reason.as_deref(), Some(INVALID_FORMAT_REASON));
            assert_eq!(verdict.is_offline, !connectivity.is_online());
        }
        assert_eq!(f.store.pending_count().unwrap(), 0);
        assert!(f.authority.validate_calls().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_event_never_reaches_authority() {
        let f = fixture();
        for connectivity in [Connectivity::Online, Connectivity::Offline] {
            let verdict = f
                .engine
                .validate(&payload("T1", "E2"), "E1", "G1", connectivity, &[])
                .await
                .unwrap();
            assert_eq!(verdict.reason.as_deref(), Some(DIFFERENT_EVENT_REASON));
        }
        assert!(f.authority.validate_calls().is_empty());
        assert_eq!(f.store.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_online_approval_marks_cache_but_never_queues() {
        let f = fixture();
        f.authority.register(TicketReference::new("T1", "E1").with_holder("Ada"));

        let verdict = f
            .engine
            .validate(&payload("T1", "E1"), "E1", "G1", Connectivity::Online, &[])
            .await
            .unwrap();
        assert!(verdict.success);
        assert!(!verdict.is_offline);
        assert_eq!(verdict.ticket.unwrap().holder_name.as_deref(), Some("Ada"));
        assert!(f.store.get_cached_ticket("T1").unwrap().unwrap().is_used);
        assert_eq!(f.store.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_online_rejection_passes_through() {
        let f = fixture();
        f.authority.register(TicketReference::new("T1", "E1"));
        f.authority.redeem("T1", "G2");

        let verdict = f
            .engine
            .validate(&payload("T1", "E1"), "E1", "G1", Connectivity::Online, &[])
            .await
            .unwrap();
        assert!(!verdict.success);
        assert_eq!(verdict.reason.as_deref(), Some("Ticket has already been used"));
        assert!(f.store.get_cached_ticket("T1").unwrap().is_none());
        assert_eq!(f.store.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_online_transport_failure_is_an_error_not_an_offline_approval() {
        let f = fixture();
        f.authority.register(TicketReference::new("T1", "E1"));
        f.authority.set_reachable(false);

        let err = f
            .engine
            .validate(&payload("T1", "E1"), "E1", "G1", Connectivity::Online, &[])
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            ValidationError::Transport(AuthorityError::Transport(_))
        ));
        assert_eq!(f.store.pending_count().unwrap(), 0);
        assert!(f.store.get_cached_ticket("T1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_online_timeout() {
        let authority = Arc::new(InMemoryAuthority::new().with_latency(Duration::from_millis(200)));
        authority.register(TicketReference::new("T1", "E1"));
        let store = Arc::new(OfflineCheckInStore::new(Arc::new(MemoryStore::new()), "@test"));
        let config = GatekeeperConfig {
            authority_timeout: Duration::from_millis(10),
            ..GatekeeperConfig::default()
        };
        let engine = ValidationEngine::new(authority, store, &config);

        let err = engine
            .validate(&payload("T1", "E1"), "E1", "G1", Connectivity::Online, &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::Transport(AuthorityError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_offline_approval_then_duplicate() {
        let f = fixture();
        let raw = payload("T1", "E1");

        let first = f
            .engine
            .validate(&raw, "E1", "G1", Connectivity::Offline, &[])
            .await
            .unwrap();
        assert!(first.success);
        assert!(first.is_offline);

        let queued = f.store.list().unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].gate_id, "G1");
        assert_eq!(queued[0].scanned_payload, raw);
        assert!(f.store.get_cached_ticket("T1").unwrap().unwrap().is_used);

        let second = f
            .engine
            .validate(&raw, "E1", "G1", Connectivity::Offline, &[])
            .await
            .unwrap();
        assert!(!second.success);
        assert_eq!(second.reason.as_deref(), Some(ALREADY_SCANNED_OFFLINE_REASON));
        assert_eq!(f.store.pending_count().unwrap(), 1);
        assert!(f.authority.validate_calls().is_empty());
    }

    #[tokio::test]
    async fn test_offline_one_time_use_consults_cache() {
        let f = fixture();
        f.store.set_cached_ticket_used("T1").unwrap();
        let rules = vec![EventRule::new("once", "E1", RuleType::OneTimeUse, "")];

        let verdict = f
            .engine
            .validate(&payload("T1", "E1"), "E1", "G1", Connectivity::Offline, &rules)
            .await
            .unwrap();
        assert!(!verdict.success);
        assert_eq!(verdict.reason.as_deref(), Some("Ticket has already been used"));
        assert_eq!(f.store.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_offline_rules_respect_gate_scope_and_activity() {
        let f = fixture();
        let rules = vec![
            EventRule::new("vip", "E1", RuleType::TicketTypeRestriction, "VIP").scoped_to(["G9"]),
            EventRule::new("late", "E1", RuleType::TimeRestriction, "18:00-23:00").inactive(),
            EventRule::new("gates", "E1", RuleType::GateRestriction, "G1,G2"),
        ];

        let at_g1 = f
            .engine
            .validate_at(&payload("A", "E1"), "E1", "G1", Connectivity::Offline, &rules, noon())
            .await
            .unwrap();
        assert!(at_g1.success);

        let at_g3 = f
            .engine
            .validate_at(&payload("B", "E1"), "E1", "G3", Connectivity::Offline, &rules, noon())
            .await
            .unwrap();
        assert_eq!(
            at_g3.reason.as_deref(),
            Some("This ticket can only be used at: G1,G2")
        );
        let queued: Vec<String> = f.store.list().unwrap().into_iter().map(|c| c.ticket_id).collect();
        assert_eq!(queued, vec!["A"]);
    }

    #[tokio::test]
    async fn test_offline_storage_failure_propagates() {
        let kv = Arc::new(FlakyStore::default());
        let f = fixture_with(kv.clone());
        kv.set_failing(true);

        let err = f
            .engine
            .validate(&payload("T1", "E1"), "E1", "G1", Connectivity::Offline, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::Storage(_)));
        assert!(!err.is_retryable());

        kv.set_failing(false);
        assert_eq!(f.store.pending_count().unwrap(), 0);
        assert!(f.store.get_cached_ticket("T1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_used_flag_write_leaves_no_queued_check_in() {
        let kv = Arc::new(FlakyStore::default());
        let f = fixture_with(kv.clone());
        kv.fail_keys_ending_with(":cached_tickets");
        let raw = payload("T1", "E1");

        for _ in 0..2 {
            let err = f
                .engine
                .validate(&raw, "E1", "G1", Connectivity::Offline, &[])
                .await
                .unwrap_err();
            assert!(matches!(err, ValidationError::Storage(_)));
            assert_eq!(f.store.pending_count().unwrap(), 0);
        }
    }

    fn failing_rule() -> impl Strategy<Value = EventRule> {
        prop_oneof![
            Just(EventRule::new("time", "E1", RuleType::TimeRestriction, "18:00-23:00")),
            Just(EventRule::new("cutoff", "E1", RuleType::TimeRestriction, "09:00")),
            Just(EventRule::new("gate", "E1", RuleType::GateRestriction, "G1,G2")),
            Just(EventRule::new("type", "E1", RuleType::TicketTypeRestriction, "VIP")),
        ]
    }

    proptest! {
        #[test]
        fn prop_rejections_never_mutate_state(
            rule in failing_rule(),
            ticket_id in "[A-Z][0-9]{1,4}",
            repeats in 1usize..4,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let f = fixture();
            let raw = encode_payload(&TicketReference::new(&ticket_id, "E1").with_type("GENERAL"));
            let rules = vec![rule];

            for _ in 0..repeats {
                let verdict = runtime
                    .block_on(f.engine.validate_at(&raw, "E1", "G3", Connectivity::Offline, &rules, noon()))
                    .unwrap();
                prop_assert!(!verdict.success);
            }
            prop_assert_eq!(f.store.pending_count().unwrap(), 0);
            prop_assert!(f.store.cached_tickets().unwrap().is_empty());
        }
    }
}
