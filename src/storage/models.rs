//! Persisted models for the offline check-in store.
//!
//! Both lists are stored as a versioned JSON envelope
//! `{"version": 1, "items": [...]}`. Bare arrays written by older builds are
//! still read; a version newer than this build understands is an error.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StorageError;

/// Envelope version written by this build.
pub const SCHEMA_VERSION: u32 = 1;

/// A locally-approved check-in awaiting submission to the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCheckIn {
    pub ticket_id: String,
    pub event_id: String,
    pub gate_id: String,
    pub timestamp: DateTime<Utc>,
    pub scanned_payload: String,
}

impl PendingCheckIn {
    pub fn new(ticket_id: &str, event_id: &str, gate_id: &str, scanned_payload: &str) -> Self {
        Self {
            ticket_id: ticket_id.to_string(),
            event_id: event_id.to_string(),
            gate_id: gate_id.to_string(),
            timestamp: Utc::now(),
            scanned_payload: scanned_payload.to_string(),
        }
    }
}

/// Local mirror of a ticket's redemption state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedTicketRecord {
    pub id: String,
    #[serde(alias = "used", default)]
    pub is_used: bool,
    #[serde(default = "Utc::now")]
    pub cached_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_at: Option<DateTime<Utc>>,
}

impl CachedTicketRecord {
    pub fn used(id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            is_used: true,
            cached_at: now,
            used_at: Some(now),
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    version: u32,
    items: &'a [T],
}

/// Serialize a list into the current envelope.
pub fn encode_list<T: Serialize>(key: &str, items: &[T]) -> Result<String, StorageError> {
    serde_json::to_string(&Envelope {
        version: SCHEMA_VERSION,
        items,
    })
    .map_err(|source| StorageError::Serialization {
        key: key.to_string(),
        source,
    })
}

/// Deserialize a list from either the envelope or a legacy bare array.
pub fn decode_list<T: DeserializeOwned>(key: &str, raw: &str) -> Result<Vec<T>, StorageError> {
    let corrupt = |source| StorageError::Serialization {
        key: key.to_string(),
        source,
    };

    let value: Value = serde_json::from_str(raw).map_err(corrupt)?;
    let items = match value {
        Value::Array(_) => value,
        Value::Object(mut obj) => {
            let found = obj.get("version").and_then(Value::as_u64).unwrap_or(0);
            if found > u64::from(SCHEMA_VERSION) {
                return Err(StorageError::UnsupportedVersion {
                    key: key.to_string(),
                    found: u32::try_from(found).unwrap_or(u32::MAX),
                    supported: SCHEMA_VERSION,
                });
            }
            obj.remove("items").unwrap_or(Value::Array(Vec::new()))
        }
        other => other,
    };

    serde_json::from_value(items).map_err(corrupt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_in_wire_shape() {
        let check_in = PendingCheckIn::new("T1", "E1", "G1", r#"{"id":"T1"}"#);
        let value = serde_json::to_value(&check_in).unwrap();
        assert_eq!(value["ticketId"], "T1");
        assert_eq!(value["gateId"], "G1");
        assert_eq!(value["scannedPayload"], r#"{"id":"T1"}"#);
        // ISO-8601
        assert!(value["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_envelope_round_trip() {
        let items = vec![CachedTicketRecord::used("T1")];
        let raw = encode_list("k", &items).unwrap();
        assert!(raw.starts_with(r#"{"version":1,"items":["#));
        let back: Vec<CachedTicketRecord> = decode_list("k", &raw).unwrap();
        assert_eq!(back, items);
    }

    #[test]
    fn test_reads_legacy_bare_array() {
        let raw = r#"[{"id":"T7","used":true,"cached_at":"ignored"}]"#;
        let back: Vec<CachedTicketRecord> = decode_list("k", raw).unwrap();
        assert_eq!(back.len(), 1);
        assert!(back[0].is_used);
        assert!(back[0].used_at.is_none());
    }

    #[test]
    fn test_rejects_future_version() {
        let raw = r#"{"version":2,"items":[]}"#;
        let err = decode_list::<PendingCheckIn>("k", raw).unwrap_err();
        assert!(matches!(
            err,
            StorageError::UnsupportedVersion { found: 2, supported: 1, .. }
        ));
    }

    #[test]
    fn test_corrupt_blob_is_an_error() {
        let err = decode_list::<PendingCheckIn>("k", "{{{").unwrap_err();
        assert!(matches!(err, StorageError::Serialization { .. }));
    }
}
