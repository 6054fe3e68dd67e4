//! Pipeline errors and their mapping onto outputs.

use thiserror::Error;

use islet_core::{Exception, Output};

/// Errors raised by hooks and plugin assembly.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A guard rejection with a well-known exception kind.
    #[error("{exception}: {message}")]
    Rejected {
        /// The exception kind surfaced in the output.
        exception: Exception,
        /// Human-readable detail.
        message: String,
    },

    /// A hook failed unexpectedly.
    #[error("hook in plugin {plugin} failed: {message}")]
    Hook {
        /// The plugin owning the hook.
        plugin: String,
        /// Failure detail.
        message: String,
    },

    /// A plugin's setup failed.
    #[error("plugin {plugin} setup failed: {message}")]
    Setup {
        /// The failing plugin.
        plugin: String,
        /// Failure detail.
        message: String,
    },

    /// A plugin's requirement is not in the set.
    #[error("plugin {plugin} requires missing plugin {required}")]
    MissingPlugin {
        /// The dependent plugin.
        plugin: String,
        /// The absent requirement.
        required: String,
    },

    /// Ordering constraints form a cycle.
    #[error("plugin ordering constraints form a cycle")]
    Cycle,
}

impl PipelineError {
    /// A guard rejection.
    #[must_use]
    pub fn rejected(exception: Exception, message: impl Into<String>) -> Self {
        Self::Rejected {
            exception,
            message: message.into(),
        }
    }

    /// The exception kind this error surfaces as.
    #[must_use]
    pub fn exception(&self) -> Exception {
        match self {
            Self::Rejected { exception, .. } => *exception,
            _ => Exception::ExecutionError,
        }
    }

    /// Capture this error as a non-ok output.
    #[must_use]
    pub fn into_output(&self, duration: u64) -> Output {
        Output::exception(self.exception(), self.to_string_message(), duration)
    }

    fn to_string_message(&self) -> String {
        match self {
            Self::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
