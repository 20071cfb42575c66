//! Request/response shapes of the remote authority's API.
//!
//! The authority's responses have drifted over time (`success`, `isValid`,
//! `valid`; `reason` vs `message`). All of that is absorbed here: the engine
//! only ever sees the canonical [`Verdict`].

use serde::{Deserialize, Serialize};

use crate::extraction::TicketReference;
use crate::pipeline::verdict::Verdict;
use crate::storage::PendingCheckIn;

/// "validate ticket" request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateTicketRequest {
    pub ticket_id: String,
    pub event_id: String,
    pub gate_id: String,
}

/// "validate ticket" response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateTicketResponse {
    #[serde(alias = "isValid", alias = "valid")]
    pub success: bool,
    #[serde(default, alias = "message", skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, alias = "ticketInfo", skip_serializing_if = "Option::is_none")]
    pub ticket: Option<TicketReference>,
}

impl ValidateTicketResponse {
    pub fn accepted(ticket: Option<TicketReference>) -> Self {
        Self {
            success: true,
            reason: None,
            ticket,
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Self {
            success: false,
            reason: Some(reason.to_string()),
            ticket: None,
        }
    }

    /// Translate into a verdict. `scanned` fills in when the authority
    /// does not echo the ticket back.
    pub fn into_verdict(self, scanned: TicketReference) -> Verdict {
        let ticket = self.ticket.unwrap_or(scanned);
        if self.success {
            Verdict::approved(ticket, false)
        } else {
            let reason = self
                .reason
                .unwrap_or_else(|| "Ticket rejected by authority".to_string());
            Verdict::rejected(&reason, Some(ticket), false)
        }
    }
}

/// "sync batch" request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBatchRequest {
    pub check_ins: Vec<PendingCheckIn>,
}

/// Per-item outcome of a sync batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncItemResult {
    pub ticket_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SyncItemResult {
    pub fn ok(ticket_id: &str) -> Self {
        Self {
            ticket_id: ticket_id.to_string(),
            success: true,
            reason: None,
        }
    }

    pub fn failed(ticket_id: &str, reason: &str) -> Self {
        Self {
            ticket_id: ticket_id.to_string(),
            success: false,
            reason: Some(reason.to_string()),
        }
    }
}

/// "sync batch" response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBatchResponse {
    pub results: Vec<SyncItemResult>,
}
