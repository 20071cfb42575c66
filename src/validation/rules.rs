//! Event rule model.
//!
//! Rules arrive from the authority as `{type, value}` string pairs. The typed
//! [`Constraint`] is derived from them on demand so the evaluator can match
//! exhaustively instead of dispatching on strings.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveTime;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    /// "HH:MM" or "HH:MM-HH:MM"
    static ref TIME_VALUE_PATTERN: Regex =
        Regex::new(r"^\s*(\d{1,2}):(\d{2})\s*(?:-\s*(\d{1,2}):(\d{2})\s*)?$").unwrap();
}

/// Rule type tag as sent by the authority.
///
/// Unknown tags are kept verbatim so newer rule kinds round-trip through
/// the local cache untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleType {
    TimeRestriction,
    GateRestriction,
    TicketTypeRestriction,
    OneTimeUse,
    Unknown(String),
}

impl RuleType {
    pub fn as_str(&self) -> &str {
        match self {
            RuleType::TimeRestriction => "TIME_RESTRICTION",
            RuleType::GateRestriction => "GATE_RESTRICTION",
            RuleType::TicketTypeRestriction => "TICKET_TYPE_RESTRICTION",
            RuleType::OneTimeUse => "ONE_TIME_USE",
            RuleType::Unknown(tag) => tag,
        }
    }
}

impl From<String> for RuleType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "TIME_RESTRICTION" => RuleType::TimeRestriction,
            "GATE_RESTRICTION" => RuleType::GateRestriction,
            "TICKET_TYPE_RESTRICTION" => RuleType::TicketTypeRestriction,
            "ONE_TIME_USE" => RuleType::OneTimeUse,
            _ => RuleType::Unknown(tag),
        }
    }
}

impl From<RuleType> for String {
    fn from(rule_type: RuleType) -> Self {
        rule_type.as_str().to_string()
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_active() -> bool {
    true
}

/// A per-event constraint, optionally scoped to some gates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRule {
    pub id: String,
    pub event_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    #[serde(default)]
    pub value: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Empty means the rule applies at every gate.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub gate_ids: BTreeSet<String>,
}

impl EventRule {
    pub fn new(id: &str, event_id: &str, rule_type: RuleType, value: &str) -> Self {
        Self {
            id: id.to_string(),
            event_id: event_id.to_string(),
            name: String::new(),
            rule_type,
            value: value.to_string(),
            is_active: true,
            gate_ids: BTreeSet::new(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn scoped_to<I, S>(mut self, gates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.gate_ids = gates.into_iter().map(Into::into).collect();
        self
    }

    /// Whether this rule is in scope at `gate_id`.
    pub fn applies_to_gate(&self, gate_id: &str) -> bool {
        self.gate_ids.is_empty() || self.gate_ids.contains(gate_id)
    }

    /// Typed view of `type` + `value`.
    pub fn constraint(&self) -> Constraint {
        match &self.rule_type {
            RuleType::TimeRestriction => match TimeWindow::parse(&self.value) {
                Some(window) => Constraint::TimeWindow(window),
                None => Constraint::Malformed(self.value.clone()),
            },
            RuleType::GateRestriction => Constraint::Gates(split_list(&self.value)),
            RuleType::TicketTypeRestriction => Constraint::TicketTypes(split_list(&self.value)),
            RuleType::OneTimeUse => Constraint::OneTimeUse,
            RuleType::Unknown(tag) => Constraint::Unrecognized(tag.clone()),
        }
    }
}

/// What a rule actually checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    TimeWindow(TimeWindow),
    Gates(Vec<String>),
    TicketTypes(Vec<String>),
    OneTimeUse,
    /// A known rule type whose value could not be parsed.
    Malformed(String),
    /// A rule type this build does not know.
    Unrecognized(String),
}

/// Allowed wall-clock entry window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    /// `HH:MM-HH:MM`. When `start > end` the window wraps past midnight.
    Between { start: NaiveTime, end: NaiveTime },
    /// Legacy single `HH:MM` cutoff: entry allowed until then.
    Until(NaiveTime),
}

impl TimeWindow {
    pub fn parse(value: &str) -> Option<Self> {
        let caps = TIME_VALUE_PATTERN.captures(value)?;
        let start = hm(caps.get(1)?.as_str(), caps.get(2)?.as_str())?;
        match (caps.get(3), caps.get(4)) {
            (Some(h), Some(m)) => {
                let end = hm(h.as_str(), m.as_str())?;
                Some(TimeWindow::Between { start, end })
            }
            _ => Some(TimeWindow::Until(start)),
        }
    }

    pub fn contains(&self, now: NaiveTime) -> bool {
        match *self {
            TimeWindow::Between { start, end } if start <= end => start <= now && now <= end,
            TimeWindow::Between { start, end } => now >= start || now <= end,
            TimeWindow::Until(cutoff) => now <= cutoff,
        }
    }

    /// Rejection message naming the window.
    pub fn rejection_reason(&self) -> String {
        match self {
            TimeWindow::Between { start, end } => format!(
                "Entry only allowed between {} and {}",
                start.format("%H:%M"),
                end.format("%H:%M")
            ),
            TimeWindow::Until(cutoff) => {
                format!("Entry not allowed after {}", cutoff.format("%H:%M"))
            }
        }
    }
}

fn hm(hours: &str, minutes: &str) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(hours.parse().ok()?, minutes.parse().ok()?, 0)
}

/// Split a comma list, trimming entries and dropping blanks.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a rule list as served by the authority.
pub fn parse_rules(json: &str) -> Result<Vec<EventRule>, serde_json::Error> {
    serde_json::from_str(json)
}
