//! Islet Cluster - worker isolate lifecycle on the host side.
//!
//! A worker isolate is a child process speaking the line-delimited JSON
//! wire protocol. The [`WorkerSpawner`] launches one with a scrubbed
//! environment and the request's effective permissions; the
//! [`WorkerProcess`] handle pumps its messages; [`Runner`] drives a single
//! request against a deadline (timeout kills the worker, always); and
//! [`WorkerCluster`] keeps a min/max pool of reusable workers with health
//! transitions and an idle reaper.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod driver;
mod error;
mod pool;
mod runner;
mod wait;

pub use driver::{WorkerProcess, WorkerSpawner};
pub use error::{ClusterError, ClusterResult};
pub use pool::{ClusterConfig, ClusterStats, WorkerCluster, WorkerHealth};
pub use runner::Runner;
pub use wait::{LogBuffer, WaitError, wait_for_result};
