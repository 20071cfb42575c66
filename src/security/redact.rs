//! Payload limits and log redaction.
//!
//! QR payloads carry holder names and seats, so raw payloads never reach
//! the logs. Log lines carry a short SHA-256 fingerprint instead, which is
//! stable across scans of the same code and enough to correlate them.

use sha2::{Digest, Sha256};

use crate::error::ExtractionError;

/// Hex chars of the digest kept in a fingerprint.
pub const FINGERPRINT_LEN: usize = 12;

/// Compute a short, stable fingerprint of a scanned payload.
pub fn payload_fingerprint(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..FINGERPRINT_LEN].to_string()
}

/// Reject payloads that are empty or larger than `limit` bytes.
pub fn check_payload_size(raw: &str, limit: usize) -> Result<(), ExtractionError> {
    if raw.trim().is_empty() {
        return Err(ExtractionError::Empty);
    }
    if raw.len() > limit {
        return Err(ExtractionError::Oversized {
            size: raw.len(),
            limit,
        });
    }
    Ok(())
}

/// Mask a holder name for logging: first letter of each word, rest starred.
pub fn mask_holder_name(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    let rest = chars.count();
                    format!("{}{}", first, "*".repeat(rest))
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
