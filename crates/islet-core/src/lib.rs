//! Islet Core - Shared types for the islet snippet execution service.
//!
//! This crate defines the vocabulary every other islet crate speaks:
//!
//! - The inbound [`ExecuteRequest`] and the outbound [`Output`] / [`LogEntry`]
//! - The [`PermissionSet`] capability model (the algebra lives in
//!   `islet-permissions`)
//! - The [`Packet`] that crosses the host→isolate boundary and the
//!   [`WorkerMessage`] / [`HostMessage`] wire protocol
//! - The exception taxonomy surfaced in `exception` log entries
//! - The spawn-time environment blocklist shared by every component that
//!   launches a worker process

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod env_policy;
mod exception;
mod output;
mod packet;
mod permission;
mod request;
mod wire;

pub use env_policy::{is_blocked_spawn_env, scrub_spawn_env};
pub use exception::Exception;
pub use output::{LogEntry, LogLevel, Output, now_ms};
pub use packet::{Packet, ToolContext};
pub use permission::{Capability, Grant, PermissionGrants, PermissionLiteral, PermissionSet};
pub use request::{ExecuteRequest, ToolSpec, DEFAULT_ENTRY};
pub use wire::{HostMessage, WireError, WorkerMessage};
