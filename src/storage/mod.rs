//! Storage module.
//!
//! Durable local state for offline operation: the pending check-in queue and
//! the cached ticket records, persisted through a small key-value [`Store`]
//! seam so the logic is independent of the device storage technology.

pub mod keys;
pub mod kv;
pub mod models;
pub mod offline;

pub use keys::*;
pub use kv::*;
pub use models::*;
pub use offline::*;
