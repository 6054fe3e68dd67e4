//! Islet Kernel - the assembled execution engine.
//!
//! Wires the default plugin set (guard, toolset, permissions, loader,
//! sandbox, channel, cluster, logger, database) into a pipeline manager
//! over a worker cluster, channel bus, and connection pool, and exposes
//! `execute` / `config` / `has_plugin` / `shutdown`.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod kernel;

pub use kernel::{Kernel, KernelError, KernelResult};
