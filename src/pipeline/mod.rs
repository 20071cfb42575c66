//! Scan validation pipeline.
//!
//! Turns one scanned payload plus the host's context into a [`Verdict`].

pub mod context;
pub mod engine;
pub mod verdict;

pub use context::*;
pub use engine::*;
pub use verdict::*;
