//! Tool errors.

use thiserror::Error;

/// A named error raised by an API call inside the isolate. The worker
/// rethrows it into the engine so the snippet sees the original name.
#[derive(Debug, Clone, Error)]
#[error("{name}: {message}")]
pub struct ApiError {
    /// Error name, e.g. `QuotaExceededError`.
    pub name: String,
    /// Error message.
    pub message: String,
}

impl ApiError {
    /// An error with an explicit name.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Errors from tool extraction, setup, and teardown.
#[derive(Debug, Error)]
pub enum ToolError {
    /// A tool's setup failed; already-installed keys were rolled back.
    #[error("tool {tool} setup failed: {message}")]
    Setup {
        /// The failing tool.
        tool: String,
        /// Failure detail.
        message: String,
    },

    /// A tool's teardown failed; callers fold this into a log entry.
    #[error("tool {tool} teardown failed: {message}")]
    Teardown {
        /// The failing tool.
        tool: String,
        /// Failure detail.
        message: String,
    },

    /// A tool required configuration the request did not provide.
    #[error("tool {tool} missing config field: {field}")]
    MissingConfig {
        /// The tool.
        tool: String,
        /// The absent field.
        field: String,
    },
}

/// Result alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;
