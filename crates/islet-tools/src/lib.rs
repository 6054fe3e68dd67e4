//! Islet Tools - named capabilities installed into isolate scopes.
//!
//! A [`Tool`] injects values into a request's scope during setup and clears
//! them during teardown; the scope's injected-key tracking lets the
//! [`ToolRegistry`] force-reset anything a failing tool leaves behind. The
//! registry also derives each tool's capability requirements so the host
//! can fold them into the request's effective permission set before the
//! worker is spawned.
//!
//! Built-ins: `crypto` (budgeted random/uuid/digest), `channel` (the
//! cross-isolate bus endpoint), and `db` (pooled queries over RPC).

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod channel;
mod crypto;
mod db;
mod error;
mod registry;
mod tool;

pub use channel::{ChannelApi, ChannelTool};
pub use crypto::{CryptoApi, CryptoPolicy, CryptoTool};
pub use db::{DbApi, DbTool};
pub use error::{ApiError, ToolError, ToolResult};
pub use registry::{ToolRegistry, ToolSelection};
pub use tool::{Tool, ToolHost, ToolScope};
