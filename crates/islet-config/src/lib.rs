//! Islet Config - service configuration with layered loading.
//!
//! Precedence, lowest to highest: built-in defaults, an optional TOML
//! file, then `ISLET_*` environment overrides for the fields operators
//! most often flip. Every section is optional in the file; missing fields
//! take their defaults.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod loader;
mod types;

pub use error::{ConfigError, ConfigResult};
pub use loader::{apply_env_overrides, load};
pub use types::{
    ChannelSection, ClusterSection, CryptoSection, DbSection, KernelConfig, WorkerSection,
};
