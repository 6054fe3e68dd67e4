//! The seam to the concrete database client library.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::DbResult;

/// One live database connection.
#[async_trait]
pub trait DbClient: Send + Sync {
    /// Run a statement with JSON-encoded parameters, returning JSON rows.
    async fn query(&self, statement: &str, params: Value) -> DbResult<Value>;

    /// Close the connection.
    async fn close(&self) -> DbResult<()>;
}

/// Establishes connections for the pool.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `url`.
    async fn connect(&self, url: &str) -> DbResult<Arc<dyn DbClient>>;
}

/// The connector used when no database backend is configured: every
/// connection attempt fails with a clear error.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredConnector;

#[async_trait]
impl Connector for UnconfiguredConnector {
    async fn connect(&self, _url: &str) -> DbResult<Arc<dyn DbClient>> {
        Err(crate::error::DbError::Connect(
            "no database backend configured".into(),
        ))
    }
}
