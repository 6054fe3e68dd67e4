//! Channel errors.

use thiserror::Error;

/// Errors from the channel bus and endpoint.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// A message exceeded the serialized-size cap.
    #[error("channel message too large: {size} bytes (limit {limit})")]
    MessageTooLarge {
        /// Serialized size of the rejected message.
        size: usize,
        /// The configured cap.
        limit: usize,
    },

    /// A worker exceeded its send rate; the message was dropped.
    #[error("channel rate limit exceeded for worker {worker}")]
    RateLimited {
        /// The offending worker.
        worker: uuid::Uuid,
    },

    /// The per-scope listener cap was reached.
    #[error("channel listener cap reached: {cap}")]
    ListenerCap {
        /// The configured cap.
        cap: usize,
    },

    /// The payload could not be serialized for size accounting.
    #[error("channel payload not serializable: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result alias for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;
