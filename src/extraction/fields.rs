//! Tolerant field resolution.
//!
//! Ticket issuers disagree on key names (`eventId`, `event_id`, `event`) and on
//! whether ids are strings or numbers, and some wrap the ticket in a `ticket`
//! object. These helpers resolve a field under any of its aliases and coerce
//! it to a string.

use serde_json::{Map, Value};

/// Convert a scalar JSON value to a trimmed, non-empty string.
///
/// Numbers are accepted (`{"id": 1042}`); booleans, nulls, arrays and
/// objects are not identifiers.
pub fn value_to_string(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Look up the first alias present in `obj`, falling back to the same
/// aliases under a nested `ticket` object.
pub fn first_field(obj: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    aliases
        .iter()
        .find_map(|alias| obj.get(*alias).and_then(value_to_string))
        .or_else(|| {
            let nested = obj.get("ticket")?.as_object()?;
            aliases
                .iter()
                .find_map(|alias| nested.get(*alias).and_then(value_to_string))
        })
}

/// Same lookup over decoded key-value pairs. Earlier pairs win.
pub fn first_pair(pairs: &[(String, String)], aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|alias| {
        pairs
            .iter()
            .find(|(k, _)| k == alias)
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}
