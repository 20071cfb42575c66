//! Rule evaluation.
//!
//! Rules are checked in list order and evaluation stops at the first failure,
//! so the reason shown at the gate is always the first violated rule's.
//! Everything here is pure apart from the wall-clock read in [`evaluate`].

use chrono::{Local, NaiveTime};

use crate::extraction::TicketReference;
use crate::validation::rules::{Constraint, EventRule};

pub const ALREADY_USED_REASON: &str = "Ticket has already been used";

/// Outcome of evaluating a ticket against a rule list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleEvaluation {
    pub valid: bool,
    pub reason: Option<String>,
    pub violating_rule: Option<EventRule>,
}

impl RuleEvaluation {
    pub fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
            violating_rule: None,
        }
    }

    pub fn violation(rule: &EventRule, reason: String) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            violating_rule: Some(rule.clone()),
        }
    }
}

/// Rules in force at `gate_id`: active, and either unscoped or scoped to
/// this gate. Input order is preserved.
pub fn applicable_rules<'a>(all_rules: &'a [EventRule], gate_id: &str) -> Vec<&'a EventRule> {
    all_rules
        .iter()
        .filter(|rule| rule.is_active && rule.applies_to_gate(gate_id))
        .collect()
}

/// Evaluate against the device's local wall clock.
pub fn evaluate<'a, I>(
    ticket: &TicketReference,
    is_used: bool,
    gate_id: &str,
    rules: I,
) -> RuleEvaluation
where
    I: IntoIterator<Item = &'a EventRule>,
{
    evaluate_at(ticket, is_used, gate_id, rules, Local::now().time())
}

/// Evaluate at a fixed time of day.
pub fn evaluate_at<'a, I>(
    ticket: &TicketReference,
    is_used: bool,
    gate_id: &str,
    rules: I,
    now: NaiveTime,
) -> RuleEvaluation
where
    I: IntoIterator<Item = &'a EventRule>,
{
    for rule in rules.into_iter().filter(|rule| rule.is_active) {
        if let Some(reason) = check_rule(rule, ticket, is_used, gate_id, now) {
            log::debug!(
                "RULE_FAILED ticket={} rule_id={} type={} reason={:?}",
                ticket.id,
                rule.id,
                rule.rule_type,
                reason
            );
            return RuleEvaluation::violation(rule, reason);
        }
    }
    RuleEvaluation::valid()
}

/// Returns the rejection reason if `rule` blocks entry.
fn check_rule(
    rule: &EventRule,
    ticket: &TicketReference,
    is_used: bool,
    gate_id: &str,
    now: NaiveTime,
) -> Option<String> {
    match rule.constraint() {
        Constraint::TimeWindow(window) => {
            if window.contains(now) {
                None
            } else {
                Some(window.rejection_reason())
            }
        }
        Constraint::Gates(allowed) => {
            if allowed.iter().any(|g| g == gate_id) {
                None
            } else {
                Some(format!(
                    "This ticket can only be used at: {}",
                    allowed.join(",")
                ))
            }
        }
        Constraint::TicketTypes(allowed) => match &ticket.ticket_type {
            Some(ticket_type) if allowed.iter().any(|t| t.eq_ignore_ascii_case(ticket_type)) => {
                None
            }
            Some(ticket_type) => Some(format!("Ticket type \"{}\" is not allowed", ticket_type)),
            None => Some(format!(
                "Ticket has no type; allowed types: {}",
                allowed.join(",")
            )),
        },
        Constraint::OneTimeUse => {
            if is_used {
                Some(ALREADY_USED_REASON.to_string())
            } else {
                None
            }
        }
        Constraint::Malformed(value) => {
            log::warn!(
                "RULE_VALUE_MALFORMED rule_id={} type={} value={:?} action=skip",
                rule.id,
                rule.rule_type,
                value
            );
            None
        }
        Constraint::Unrecognized(tag) => {
            log::debug!("RULE_TYPE_UNKNOWN rule_id={} type={} action=skip", rule.id, tag);
            None
        }
    }
}
