//! Structured logging with scan and sync context.
//!
//! Provides logging macros and utilities that include the scan or sync id
//! (plus event and gate where known) in every log message for easy correlation.

pub mod structured;

pub use structured::*;
