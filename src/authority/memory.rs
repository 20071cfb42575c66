//! In-process ticket authority.
//!
//! Holds a ticket registry and redemption state behind a lock, applies the
//! same idempotent-redemption contract a real authority must, and records
//! every call so tests can assert on submission order. Transport outages,
//! per-ticket sync rejections and latency can be scripted.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::authority::wire::{
    SyncBatchRequest, SyncBatchResponse, SyncItemResult, ValidateTicketRequest,
    ValidateTicketResponse,
};
use crate::authority::TicketAuthority;
use crate::error::AuthorityError;
use crate::extraction::TicketReference;

pub const TICKET_NOT_FOUND_REASON: &str = "Ticket not found";

#[derive(Debug, Default)]
struct AuthorityState {
    tickets: HashMap<String, TicketReference>,
    /// ticket id -> gate it was redeemed at
    redeemed: HashMap<String, String>,
    sync_rejections: HashMap<String, String>,
    unreachable: bool,
    validate_calls: Vec<String>,
    sync_batches: Vec<Vec<String>>,
}

#[derive(Debug, Default)]
pub struct InMemoryAuthority {
    state: Mutex<AuthorityState>,
    latency: Duration,
}

impl InMemoryAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn register(&self, ticket: TicketReference) {
        self.state.lock().tickets.insert(ticket.id.clone(), ticket);
    }

    /// Mark a ticket redeemed (e.g. at another device's gate).
    pub fn redeem(&self, ticket_id: &str, gate_id: &str) {
        self.state
            .lock()
            .redeemed
            .insert(ticket_id.to_string(), gate_id.to_string());
    }

    pub fn is_redeemed(&self, ticket_id: &str) -> bool {
        self.state.lock().redeemed.contains_key(ticket_id)
    }

    /// Make sync of `ticket_id` fail with `reason` until cleared.
    pub fn reject_on_sync(&self, ticket_id: &str, reason: &str) {
        self.state
            .lock()
            .sync_rejections
            .insert(ticket_id.to_string(), reason.to_string());
    }

    pub fn clear_sync_rejections(&self) {
        self.state.lock().sync_rejections.clear();
    }

    /// Simulate losing (or regaining) the network path to the authority.
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().unreachable = !reachable;
    }

    /// Ticket ids passed to `validate_ticket`, in call order.
    pub fn validate_calls(&self) -> Vec<String> {
        self.state.lock().validate_calls.clone()
    }

    /// Ticket ids of each received sync batch, in submission order.
    pub fn sync_batches(&self) -> Vec<Vec<String>> {
        self.state.lock().sync_batches.clone()
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn check_reachable(&self) -> Result<(), AuthorityError> {
        if self.state.lock().unreachable {
            return Err(AuthorityError::Transport("network unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TicketAuthority for InMemoryAuthority {
    async fn validate_ticket(
        &self,
        request: &ValidateTicketRequest,
    ) -> Result<ValidateTicketResponse, AuthorityError> {
        self.check_reachable()?;
        self.state
            .lock()
            .validate_calls
            .push(request.ticket_id.clone());
        self.delay().await;

        let mut state = self.state.lock();
        let Some(ticket) = state.tickets.get(&request.ticket_id).cloned() else {
            return Ok(ValidateTicketResponse::rejected(TICKET_NOT_FOUND_REASON));
        };
        if ticket.event_id != request.event_id {
            return Ok(ValidateTicketResponse::rejected(
                "Ticket is for a different event",
            ));
        }
        if state.redeemed.contains_key(&ticket.id) {
            return Ok(ValidateTicketResponse::rejected(
                "Ticket has already been used",
            ));
        }
        state
            .redeemed
            .insert(ticket.id.clone(), request.gate_id.clone());
        Ok(ValidateTicketResponse::accepted(Some(ticket)))
    }

    async fn sync_batch(
        &self,
        request: &SyncBatchRequest,
    ) -> Result<SyncBatchResponse, AuthorityError> {
        self.check_reachable()?;
        self.state.lock().sync_batches.push(
            request
                .check_ins
                .iter()
                .map(|c| c.ticket_id.clone())
                .collect(),
        );
        self.delay().await;

        let mut state = self.state.lock();
        let mut seen = HashSet::new();
        let mut results = Vec::with_capacity(request.check_ins.len());

        // Sequential, in submission order: the first check-in for a ticket wins.
        for check_in in &request.check_ins {
            let id = check_in.ticket_id.as_str();
            if let Some(reason) = state.sync_rejections.get(id) {
                results.push(SyncItemResult::failed(id, reason));
                continue;
            }
            if !state.tickets.contains_key(id) {
                results.push(SyncItemResult::failed(id, TICKET_NOT_FOUND_REASON));
                continue;
            }
            if seen.insert(id.to_string()) {
                state
                    .redeemed
                    .entry(id.to_string())
                    .or_insert_with(|| check_in.gate_id.clone());
            }
            results.push(SyncItemResult::ok(id));
        }

        Ok(SyncBatchResponse { results })
    }
}
