//! Execution results and structured log entries.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::exception::Exception;

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Used for log timestamps only; durations are always measured with a
/// monotonic clock by the caller.
#[must_use]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Severity of a [`LogEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Plain console output.
    Log,
    /// Informational console output.
    Info,
    /// Console warning.
    Warn,
    /// Console error.
    Error,
    /// A thrown or unhandled error.
    Exception,
}

/// One captured log line or exception.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Severity.
    pub level: LogLevel,
    /// The message text.
    pub message: String,
    /// Wall-clock timestamp in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Error name for `exception` entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Stack or position information, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl LogEntry {
    /// A console entry at the given level, stamped now.
    #[must_use]
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: now_ms(),
            name: None,
            stack: None,
        }
    }

    /// An `exception` entry with an explicit error name.
    #[must_use]
    pub fn exception(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Exception,
            message: message.into(),
            timestamp: now_ms(),
            name: Some(name.into()),
            stack: None,
        }
    }

    /// An `exception` entry for one of the well-known error kinds.
    #[must_use]
    pub fn from_exception(exception: Exception, message: impl Into<String>) -> Self {
        Self::exception(exception.name(), message)
    }

    /// Attach stack or position information.
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

/// The structured result of one execution.
///
/// Every request produces exactly one `Output`; failures are encoded as
/// `ok = false` with an `exception` log entry, never as a transport error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Output {
    /// Whether the snippet ran to completion.
    pub ok: bool,
    /// The entry function's return value, when `ok`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Captured logs in posting order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<LogEntry>,
    /// Wall-clock duration of the request in milliseconds.
    pub duration: u64,
}

impl Output {
    /// A successful output.
    #[must_use]
    pub fn success(result: Option<Value>, logs: Vec<LogEntry>, duration: u64) -> Self {
        Self {
            ok: true,
            result,
            logs,
            duration,
        }
    }

    /// A failed output carrying the given logs.
    #[must_use]
    pub fn failure(logs: Vec<LogEntry>, duration: u64) -> Self {
        Self {
            ok: false,
            result: None,
            logs,
            duration,
        }
    }

    /// A failed output with a single exception log for a well-known kind.
    #[must_use]
    pub fn exception(exception: Exception, message: impl Into<String>, duration: u64) -> Self {
        Self::failure(vec![LogEntry::from_exception(exception, message)], duration)
    }

    /// Whether any log entry carries the given exception name.
    #[must_use]
    pub fn has_exception(&self, exception: Exception) -> bool {
        self.logs
            .iter()
            .any(|entry| entry.name.as_deref() == Some(exception.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn levels_serialize_lowercase() {
        let entry = LogEntry::new(LogLevel::Warn, "b");
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["level"], "warn");
        assert!(value.get("name").is_none());
    }

    #[test]
    fn exception_output_carries_name() {
        let output = Output::exception(Exception::TimeoutError, "Execution timeout", 50);
        assert!(!output.ok);
        assert_eq!(output.logs.len(), 1);
        assert_eq!(output.logs[0].name.as_deref(), Some("TimeoutError"));
        assert_eq!(output.logs[0].level, LogLevel::Exception);
        assert!(output.has_exception(Exception::TimeoutError));
        assert!(!output.has_exception(Exception::ClusterError));
    }

    #[test]
    fn success_output_shape() {
        let output = Output::success(Some(json!(10)), Vec::new(), 3);
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value, json!({ "ok": true, "result": 10, "duration": 3 }));
    }

    #[test]
    fn timestamps_are_positive() {
        assert!(now_ms() > 0);
        assert!(LogEntry::new(LogLevel::Log, "x").timestamp > 0);
    }
}
