//! Sandbox errors.

use thiserror::Error;

use crate::ops::RuntimeOp;

/// Errors from scope, registry, and hardening operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SandboxError {
    /// Attempted to define a reserved key (`__proto__`, `constructor`,
    /// `prototype`).
    #[error("reserved scope key: {0}")]
    ReservedKey(String),

    /// Scope keys must be plain identifiers, not paths.
    #[error("scope key contains a path separator: {0}")]
    DottedKey(String),

    /// The name was locked by hardening and cannot be bound.
    #[error("scope name is locked: {0}")]
    LockedName(String),

    /// Attempted to overwrite a sealed (non-writable) slot.
    #[error("scope slot is not writable: {0}")]
    NotWritable(String),

    /// Registration after the registry was locked.
    #[error("registry is locked: cannot register {0}")]
    RegistryLocked(String),

    /// Mutation of the frozen env facade.
    #[error("environment facade is frozen")]
    FrozenEnv,

    /// A denied runtime operation was attempted.
    #[error("runtime operation denied: {0}")]
    OpDenied(RuntimeOp),

    /// Strict hardening failed.
    #[error("hardening failed in strict mode: {failures} operation(s) failed")]
    Strict {
        /// Number of failed operations across all modules.
        failures: usize,
    },
}

/// Result alias for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;
