//! Convenient re-exports for downstream crates.

pub use crate::exception::Exception;
pub use crate::output::{LogEntry, LogLevel, Output, now_ms};
pub use crate::packet::{Packet, ToolContext};
pub use crate::permission::{Capability, Grant, PermissionGrants, PermissionSet};
pub use crate::request::{DEFAULT_ENTRY, ExecuteRequest, ToolSpec};
pub use crate::wire::{HostMessage, WorkerMessage};
