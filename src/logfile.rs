//! Per-request diagnostic log buffer.
//!
//! Each dispatched call owns exactly one [`RequestLog`]; it is created with
//! the request and discarded with it, so nothing leaks between calls. Every
//! entry is also emitted as a `tracing` event, and in debug configuration the
//! formatted entries are appended to the response payload.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

/// Severity levels, ordered roughly by noisiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Notice,
    Success,
    Warning,
    Error,
    Debug,
}

impl LogLevel {
    fn label(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Notice => "NOTICE",
            LogLevel::Success => "SUCCESS",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Debug => "DEBUG",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub level: LogLevel,
    /// Optional scope, usually `METHOD path` of the request.
    pub area: String,
    pub message: String,
}

/// Request-scoped log accumulator.
#[derive(Debug, Default)]
pub struct RequestLog {
    entries: Vec<LogEntry>,
}

impl RequestLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&mut self, level: LogLevel, area: &str, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info | LogLevel::Success => info!(area = %area, "{message}"),
            LogLevel::Notice | LogLevel::Debug => debug!(area = %area, "{message}"),
            LogLevel::Warning => warn!(area = %area, "{message}"),
            LogLevel::Error => error!(area = %area, "{message}"),
        }
        self.entries.push(LogEntry {
            level,
            area: area.to_string(),
            message,
        });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.entry(LogLevel::Info, "", message);
    }

    pub fn notice(&mut self, message: impl Into<String>) {
        self.entry(LogLevel::Notice, "", message);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.entry(LogLevel::Success, "", message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.entry(LogLevel::Warning, "", message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.entry(LogLevel::Error, "", message);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Formatted entries (`LEVEL: [area] message`) for the response payload.
    pub fn to_value(&self) -> Value {
        Value::Array(
            self.entries
                .iter()
                .map(|e| {
                    let area = if e.area.is_empty() {
                        String::new()
                    } else {
                        format!("[{}] ", e.area)
                    };
                    Value::String(format!("{}: {}{}", e.level.label(), area, e.message))
                })
                .collect(),
        )
    }
}
