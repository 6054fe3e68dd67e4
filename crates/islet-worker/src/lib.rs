//! Islet Worker - the isolate side of the execution engine.
//!
//! One worker process serves one request at a time: it receives a packet
//! over stdin, evaluates the snippet module with an embedded engine inside
//! a hardened runtime environment, streams logs and side-channel traffic
//! back over stdout, and finishes with a `result` message. The host may
//! kill it at any moment; nothing here survives a request beyond the
//! baseline scope.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod bridge;
pub mod config;
pub mod console;
pub mod engine;
pub mod runtime;
