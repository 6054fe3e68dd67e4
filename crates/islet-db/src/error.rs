//! Database pool errors.

use thiserror::Error;

/// Errors from pool and client operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// `get` was called without a connection URL.
    #[error("missing connection url")]
    MissingUrl,

    /// The pool is at capacity with no idle entry to evict.
    #[error("connection pool exhausted (limit {limit})")]
    Exhausted {
        /// The configured entry limit.
        limit: usize,
    },

    /// The connector failed to establish a connection.
    #[error("connect failed: {0}")]
    Connect(String),

    /// A query failed.
    #[error("query failed: {0}")]
    Query(String),

    /// Closing a connection failed. Callers log and swallow this.
    #[error("close failed: {0}")]
    Close(String),

    /// A query was issued against a URL with no leased connection.
    #[error("no leased connection for url")]
    NotLeased,
}

/// Result alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
