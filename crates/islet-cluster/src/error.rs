//! Cluster errors.

use thiserror::Error;

/// Errors from spawning and driving workers.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The worker process could not be started.
    #[error("worker spawn failed: {0}")]
    Spawn(#[from] std::io::Error),

    /// A message could not be serialized for the wire.
    #[error(transparent)]
    Wire(#[from] islet_core::WireError),

    /// The worker's outbound queue is gone; the process is dead or dying.
    #[error("worker transport closed")]
    TransportClosed,
}

/// Result alias for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;
