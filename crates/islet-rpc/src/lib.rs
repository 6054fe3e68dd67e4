//! Islet RPC - correlated request/response over the worker transport.
//!
//! RPC shares the worker's message stream with logs and channel traffic,
//! distinguished by the `rpc` / `rpc:reply` / `rpc:error` message types.
//! The host side is an async handler registry ([`RpcHost`]); the worker
//! side is a blocking client ([`RpcClient`]) that parks the calling thread
//! until the matching reply arrives. Correlation is by UUID: each reply
//! resolves exactly one pending call, and duplicate or late replies are
//! ignored.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod client;
mod host;

pub use client::{RpcClient, RpcClientError, RpcOutcome};
pub use host::{RpcFailure, RpcHandler, RpcHost};
