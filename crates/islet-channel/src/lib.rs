//! Islet Channel - cross-isolate topic-based pub/sub.
//!
//! The host-side [`ChannelBus`] keeps a registry of live workers and
//! re-broadcasts each validated message to every other worker, enforcing a
//! serialized-size cap and a per-worker sliding-window rate limit. The
//! isolate-side [`ChannelEndpoint`] buffers incoming messages in a bounded
//! queue and dispatches them serially to per-topic listener sets.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod bus;
mod endpoint;
mod error;

pub use bus::{ChannelBus, ChannelLimits, WorkerId};
pub use endpoint::ChannelEndpoint;
pub use error::{ChannelError, ChannelResult};
