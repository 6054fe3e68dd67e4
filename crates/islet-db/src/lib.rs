//! Islet DB - pooled database connections behind the RPC bridge.
//!
//! The concrete client library is an external collaborator: everything here
//! works over the object-safe [`Connector`] / [`DbClient`] traits. The
//! [`ConnectionPool`] caches clients per connection URL with reference
//! counts, health states, LRU eviction at capacity, and an idle reaper;
//! [`register_handlers`] exposes `db.get` / `db.query` / `db.release` to
//! isolates over RPC. Connection URLs are redacted before they reach any
//! log line.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod connector;
mod error;
#[cfg(any(test, feature = "fakes"))]
pub mod fakes;
mod handlers;
mod pool;
mod redact;

pub use connector::{Connector, DbClient, UnconfiguredConnector};
pub use error::{DbError, DbResult};
pub use handlers::register_handlers;
pub use pool::{ConnectionPool, Health, PoolConfig, PoolStats};
pub use redact::redact_url;
