//! The one verdict shape produced for every scan.

use serde::Serialize;

use crate::extraction::TicketReference;

pub const DIFFERENT_EVENT_REASON: &str = "Ticket is for a different event";
pub const ALREADY_SCANNED_OFFLINE_REASON: &str = "Ticket already scanned (offline)";

/// Outcome of validating one scan. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub success: bool,
    pub ticket: Option<TicketReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub is_offline: bool,
}

impl Verdict {
    pub fn approved(ticket: TicketReference, is_offline: bool) -> Self {
        Self {
            success: true,
            ticket: Some(ticket),
            reason: None,
            is_offline,
        }
    }

    pub fn rejected(reason: &str, ticket: Option<TicketReference>, is_offline: bool) -> Self {
        Self {
            success: false,
            ticket,
            reason: Some(reason.to_string()),
            is_offline,
        }
    }
}
