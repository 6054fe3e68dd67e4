//! Islet Pipeline - the hook-chain glue between request and worker.
//!
//! A request flows through five ordered hook chains - validate, load,
//! execute, format, plus a synchronous spawn chain fired for every new
//! worker. Plugins are plain records: they declare ordering constraints
//! (`pre` / `post` / `required`), get topologically sorted, and tap the
//! chains during setup. Any error raised along the way is captured into a
//! non-ok [`islet_core::Output`]; `execute` never throws.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod context;
mod error;
mod hooks;
mod manager;
mod plugin;
pub mod plugins;

pub use context::Context;
pub use error::{PipelineError, PipelineResult};
pub use hooks::HookRegistry;
pub use manager::PipelineManager;
pub use plugin::{Plugin, sort_plugins};
