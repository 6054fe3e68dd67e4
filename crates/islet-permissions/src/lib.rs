//! Islet Permissions - the algebra over capability grant sets.
//!
//! Operations:
//!
//! - [`normalize`] - map nullish or `"inherit"` sets to none
//! - [`merge`] - union two sets per capability; none is the identity
//! - [`detect`] - flag wildcard, host-heavy, and localhost grants
//! - [`validate`] - log strict-mode warnings; never fails
//! - [`resolve_env`] - materialize env grants through a whitelist
//!
//! Grants never shrink under [`merge`]; a blanket `true` absorbs any list.
//! The `"inherit"` literal is forbidden everywhere: [`normalize`] downgrades
//! it with a warning and [`merge`] rejects it outright.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod algebra;
mod env;
mod error;

pub use algebra::{Detection, detect, merge, normalize, validate};
pub use env::{matches_pattern, resolve_env, resolve_env_from_process};
pub use error::{PermissionError, PermissionResult};
