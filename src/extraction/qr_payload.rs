//! QR payload decoding.
//!
//! Scanners hand us whatever text the code contained. Encodings tried in order:
//! 1. JSON object
//! 2. base64 (standard or URL-safe) wrapping a JSON object
//! 3. query-parameter pairs, optionally behind a URL (`https://host/t?id=T1&eventId=E1`)
//!
//! Decoding is pure and never panics; every failure is an [`ExtractionError`].

use base64::{engine::general_purpose, Engine as _};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ExtractionError;
use crate::extraction::fields::{first_field, first_pair};
use crate::security::check_payload_size;

/// Reason attached to every verdict for an undecodable payload.
pub const INVALID_FORMAT_REASON: &str = "Invalid ticket format";

/// Ticket type written by [`encode_payload`] when none is set.
pub const DEFAULT_TICKET_TYPE: &str = "STANDARD";

const ID_KEYS: &[&str] = &["id", "ticketId", "ticket_id"];
const EVENT_KEYS: &[&str] = &["eventId", "event_id", "event"];
const TYPE_KEYS: &[&str] = &["type", "ticketType", "ticket_type"];
const HOLDER_KEYS: &[&str] = &["holderName", "holder_name", "holder"];
const SEAT_KEYS: &[&str] = &["seat"];

lazy_static! {
    /// base64 alphabet (both variants), optional padding
    static ref BASE64_PATTERN: Regex = Regex::new(r"^[A-Za-z0-9+/_-]+={0,2}$").unwrap();

    /// at least one `key=` pair somewhere in the text
    static ref KEY_VALUE_PATTERN: Regex = Regex::new(r"(^|[?&;])[A-Za-z_]+=").unwrap();
}

/// Ticket reference decoded from a QR payload. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketReference {
    pub id: String,
    pub event_id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ticket_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat: Option<String>,
}

impl TicketReference {
    pub fn new(id: &str, event_id: &str) -> Self {
        Self {
            id: id.to_string(),
            event_id: event_id.to_string(),
            ticket_type: None,
            holder_name: None,
            seat: None,
        }
    }

    pub fn with_type(mut self, ticket_type: &str) -> Self {
        self.ticket_type = Some(ticket_type.to_string());
        self
    }

    pub fn with_holder(mut self, holder_name: &str) -> Self {
        self.holder_name = Some(holder_name.to_string());
        self
    }

    pub fn with_seat(mut self, seat: &str) -> Self {
        self.seat = Some(seat.to_string());
        self
    }
}

/// Decode a raw scanned payload into a ticket reference.
pub fn parse_payload(raw: &str, max_bytes: usize) -> Result<TicketReference, ExtractionError> {
    check_payload_size(raw, max_bytes)?;
    let text = raw.trim();

    if let Some(obj) = decode_json_object(text) {
        return ticket_from_object(&obj);
    }

    if BASE64_PATTERN.is_match(text) {
        if let Some(obj) = decode_base64_object(text) {
            return ticket_from_object(&obj);
        }
    }

    if KEY_VALUE_PATTERN.is_match(text) {
        let pairs = decode_pairs(text);
        if !pairs.is_empty() {
            return ticket_from_pairs(&pairs);
        }
    }

    Err(ExtractionError::Undecodable)
}

/// Encode a ticket as the canonical JSON QR payload.
pub fn encode_payload(ticket: &TicketReference) -> String {
    let mut canonical = ticket.clone();
    if canonical.ticket_type.is_none() {
        canonical.ticket_type = Some(DEFAULT_TICKET_TYPE.to_string());
    }
    // String-keyed struct of strings; serialization cannot fail.
    serde_json::to_string(&canonical).unwrap_or_default()
}

fn decode_json_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => None,
    }
}

fn decode_base64_object(text: &str) -> Option<Map<String, Value>> {
    let bytes = general_purpose::STANDARD
        .decode(text)
        .or_else(|_| general_purpose::URL_SAFE.decode(text))
        .or_else(|_| general_purpose::URL_SAFE_NO_PAD.decode(text))
        .or_else(|_| general_purpose::STANDARD_NO_PAD.decode(text))
        .ok()?;
    let decoded = String::from_utf8(bytes).ok()?;
    decode_json_object(decoded.trim())
}

fn decode_pairs(text: &str) -> Vec<(String, String)> {
    // Drop any URL prefix and fragment; accept `;` as a separator too.
    let query = text.split_once('?').map(|(_, q)| q).unwrap_or(text);
    let query = query.split('#').next().unwrap_or_default();
    let query = query.replace(';', "&");

    serde_urlencoded::from_str::<Vec<(String, String)>>(&query).unwrap_or_default()
}

fn ticket_from_object(obj: &Map<String, Value>) -> Result<TicketReference, ExtractionError> {
    let id = first_field(obj, ID_KEYS).ok_or(ExtractionError::MissingTicketId)?;
    let event_id = first_field(obj, EVENT_KEYS).ok_or(ExtractionError::MissingEventId)?;

    Ok(TicketReference {
        id,
        event_id,
        ticket_type: first_field(obj, TYPE_KEYS),
        holder_name: first_field(obj, HOLDER_KEYS),
        seat: first_field(obj, SEAT_KEYS),
    })
}

fn ticket_from_pairs(pairs: &[(String, String)]) -> Result<TicketReference, ExtractionError> {
    let id = first_pair(pairs, ID_KEYS).ok_or(ExtractionError::MissingTicketId)?;
    let event_id = first_pair(pairs, EVENT_KEYS).ok_or(ExtractionError::MissingEventId)?;

    Ok(TicketReference {
        id,
        event_id,
        ticket_type: first_pair(pairs, TYPE_KEYS),
        holder_name: first_pair(pairs, HOLDER_KEYS),
        seat: first_pair(pairs, SEAT_KEYS),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const LIMIT: usize = 4096;

    #[test]
    fn test_parse_json() {
        let ticket = parse_payload(
            r#"{"id":"T1","eventId":"E1","type":"VIP","holderName":"Ada","seat":"A-12"}"#,
            LIMIT,
        )
        .unwrap();
        assert_eq!(ticket.id, "T1");
        assert_eq!(ticket.event_id, "E1");
        assert_eq!(ticket.ticket_type.as_deref(), Some("VIP"));
        assert_eq!(ticket.holder_name.as_deref(), Some("Ada"));
        assert_eq!(ticket.seat.as_deref(), Some("A-12"));
    }

    #[test]
    fn test_parse_json_numeric_ids() {
        let ticket = parse_payload(r#"{"ticket_id": 1042, "event_id": 7}"#, LIMIT).unwrap();
        assert_eq!(ticket, TicketReference::new("1042", "7"));
    }

    #[test]
    fn test_parse_json_missing_fields() {
        assert_eq!(
            parse_payload(r#"{"eventId":"E1"}"#, LIMIT),
            Err(ExtractionError::MissingTicketId)
        );
        assert_eq!(
            parse_payload(r#"{"id":"T1"}"#, LIMIT),
            Err(ExtractionError::MissingEventId)
        );
        assert_eq!(
            parse_payload(r#"{"id":"","eventId":"E1"}"#, LIMIT),
            Err(ExtractionError::MissingTicketId)
        );
    }

    #[test]
    fn test_parse_base64_json() {
        let json = r#"{"id":"T2","eventId":"E1"}"#;
        let standard = general_purpose::STANDARD.encode(json);
        let url_safe = general_purpose::URL_SAFE_NO_PAD.encode(json);

        assert_eq!(parse_payload(&standard, LIMIT).unwrap().id, "T2");
        assert_eq!(parse_payload(&url_safe, LIMIT).unwrap().id, "T2");
    }

    #[test]
    fn test_parse_query_string() {
        let ticket = parse_payload("id=T3&eventId=E1&type=GA", LIMIT).unwrap();
        assert_eq!(ticket.id, "T3");
        assert_eq!(ticket.ticket_type.as_deref(), Some("GA"));
    }

    #[test]
    fn test_parse_url_with_encoded_values() {
        let ticket = parse_payload(
            "https://tickets.example.com/t?ticket_id=T4&event_id=E1&holder_name=Jane+Doe&seat=B%2F7#top",
            LIMIT,
        )
        .unwrap();
        assert_eq!(ticket.id, "T4");
        assert_eq!(ticket.holder_name.as_deref(), Some("Jane Doe"));
        assert_eq!(ticket.seat.as_deref(), Some("B/7"));
    }

    #[test]
    fn test_parse_semicolon_pairs() {
        let ticket = parse_payload("id=T5;event=E1", LIMIT).unwrap();
        assert_eq!(ticket, TicketReference::new("T5", "E1"));
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(parse_payload("", LIMIT), Err(ExtractionError::Empty));
        assert_eq!(parse_payload("hello world", LIMIT), Err(ExtractionError::Undecodable));
        assert_eq!(parse_payload("[1,2,3]", LIMIT), Err(ExtractionError::Undecodable));
        assert_eq!(parse_payload("{not json", LIMIT), Err(ExtractionError::Undecodable));
        assert_eq!(
            parse_payload("id=T1", LIMIT),
            Err(ExtractionError::MissingEventId)
        );
    }

    #[test]
    fn test_parse_oversized() {
        let raw = format!(r#"{{"id":"T1","eventId":"E1","pad":"{}"}}"#, "x".repeat(64));
        assert!(matches!(
            parse_payload(&raw, 32),
            Err(ExtractionError::Oversized { limit: 32, .. })
        ));
    }

    #[test]
    fn test_encode_defaults_type() {
        let payload = encode_payload(&TicketReference::new("T1", "E1"));
        assert_eq!(payload, r#"{"id":"T1","eventId":"E1","type":"STANDARD"}"#);

        let parsed = parse_payload(&payload, LIMIT).unwrap();
        assert_eq!(parsed.ticket_type.as_deref(), Some(DEFAULT_TICKET_TYPE));
    }

    proptest! {
        #[test]
        fn prop_never_panics_on_garbage(raw in ".{0,256}") {
            let _ = parse_payload(&raw, LIMIT);
        }
    }
}
