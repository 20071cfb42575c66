//! Offline check-in reconciliation.
//!
//! - Single-flight drain of the pending queue
//! - Retry with exponential backoff on transport failure
//! - Status snapshot for the host UI

pub mod coordinator;
pub mod retry;
pub mod status;

pub use coordinator::*;
pub use retry::*;
pub use status::*;
