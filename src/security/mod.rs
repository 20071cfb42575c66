//! Security module.
//!
//! Payload size limits and redaction of scanned data before it reaches logs.

pub mod redact;

pub use redact::*;
