//! Islet Sandbox - the worker-side runtime environment model.
//!
//! A worker isolate owns an explicit [`RuntimeEnv`]: a tracked global
//! [`Scope`], registries of the builtin namespaces and API types it
//! installed, a snapshot [`EnvFacade`] over its environment variables, and
//! a [`RuntimeOps`] policy for dangerous process operations. Hardening
//! locks all of it down in a fixed order before user code runs and reports
//! every operation; verification re-checks the descriptors afterwards.
//!
//! Nothing here touches a process-wide global: tools and the engine receive
//! the scope value explicitly, which is what makes "teardown removes
//! exactly the keys setup injected" enforceable.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod env;
mod error;
mod harden;
mod ops;
mod registry;
mod scope;

pub use env::EnvFacade;
pub use error::{SandboxError, SandboxResult};
pub use harden::{HardenOptions, ModuleReport, Report, RuntimeEnv, detect, harden, verify};
pub use ops::{RuntimeOp, RuntimeOps};
pub use registry::{BuiltinObject, BuiltinRegistry, TypeRegistry, TypeShape};
pub use scope::{Scope, Slot};
