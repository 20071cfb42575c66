//! Structured logging utilities.
//!
//! Provides context-aware logging with scan, event, gate and sync ids
//! included in every log message.

use std::fmt;

/// Logging context for a scan or a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogContext {
    pub scope: Scope,
    pub id: String,
    pub event_id: Option<String>,
    pub gate_id: Option<String>,
}

/// What a [`LogContext`] id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Scan,
    Sync,
}

impl LogContext {
    pub fn scan(scan_id: &str) -> Self {
        Self {
            scope: Scope::Scan,
            id: scan_id.to_string(),
            event_id: None,
            gate_id: None,
        }
    }

    pub fn sync(sync_id: &str) -> Self {
        Self {
            scope: Scope::Sync,
            id: sync_id.to_string(),
            event_id: None,
            gate_id: None,
        }
    }

    pub fn with_event(&self, event_id: &str) -> Self {
        Self {
            event_id: Some(event_id.to_string()),
            ..self.clone()
        }
    }

    pub fn with_gate(&self, gate_id: &str) -> Self {
        Self {
            gate_id: Some(gate_id.to_string()),
            ..self.clone()
        }
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = match self.scope {
            Scope::Scan => "scan",
            Scope::Sync => "sync",
        };
        write!(f, "[{}={}]", scope, self.id)?;
        if let Some(event_id) = &self.event_id {
            write!(f, " [event={}]", event_id)?;
        }
        if let Some(gate_id) = &self.gate_id {
            write!(f, " [gate={}]", gate_id)?;
        }
        Ok(())
    }
}

/// Short random id for a context (first 8 chars of a v4 uuid).
pub fn short_id(prefix: &str) -> String {
    format!("{}-{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..8])
}

/// Log an info message with context.
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $event:expr, $($key:ident = $value:expr),* $(,)?) => {
        log::info!(
            "{} {} {}",
            $ctx,
            $event,
            format_args!(concat!($(stringify!($key), "={:?} "),*), $($value),*)
        );
    };
}

/// Log a warning message with context.
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $event:expr, $($key:ident = $value:expr),* $(,)?) => {
        log::warn!(
            "{} {} {}",
            $ctx,
            $event,
            format_args!(concat!($(stringify!($key), "={:?} "),*), $($value),*)
        );
    };
}

/// Log an error message with context.
#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $event:expr, $($key:ident = $value:expr),* $(,)?) => {
        log::error!(
            "{} {} {}",
            $ctx,
            $event,
            format_args!(concat!($(stringify!($key), "={:?} "),*), $($value),*)
        );
    };
}

/// Log a debug message with context.
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $event:expr, $($key:ident = $value:expr),* $(,)?) => {
        log::debug!(
            "{} {} {}",
            $ctx,
            $event,
            format_args!(concat!($(stringify!($key), "={:?} "),*), $($value),*)
        );
    };
}
