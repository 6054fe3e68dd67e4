//! The well-known exception taxonomy.

use std::fmt;

/// Error kinds surfaced as the `name` field of `exception` log entries.
///
/// Snippet-thrown errors keep whatever name the snippet gave them; this enum
/// covers the names the runtime itself produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exception {
    /// Submitted code exceeds the configured size limit.
    PayloadTooLarge,
    /// The requested entry export is missing or not callable.
    EntryError,
    /// The deadline elapsed; the worker was killed.
    TimeoutError,
    /// The worker pool was exhausted.
    ClusterError,
    /// An unexpected crash inside the worker.
    ExecutionError,
    /// A remote method was missing or threw across the bridge.
    RpcError,
    /// A malformed request field.
    ValidationError,
}

impl Exception {
    /// The wire name of this exception kind.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::PayloadTooLarge => "PayloadTooLarge",
            Self::EntryError => "EntryError",
            Self::TimeoutError => "TimeoutError",
            Self::ClusterError => "ClusterError",
            Self::ExecutionError => "ExecutionError",
            Self::RpcError => "RPCError",
            Self::ValidationError => "ValidationError",
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_error_uses_wire_casing() {
        assert_eq!(Exception::RpcError.name(), "RPCError");
        assert_eq!(Exception::TimeoutError.to_string(), "TimeoutError");
    }
}
