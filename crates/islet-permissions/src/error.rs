//! Permission algebra errors.

use thiserror::Error;

/// Errors from permission operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PermissionError {
    /// The `"inherit"` literal reached an operation that forbids it.
    #[error("the \"inherit\" permission literal is forbidden here")]
    InheritForbidden,
}

/// Result alias for permission operations.
pub type PermissionResult<T> = Result<T, PermissionError>;
