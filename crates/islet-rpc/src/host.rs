//! Host-side handler registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use islet_core::{Exception, HostMessage};

/// A failed handler invocation. The name crosses the bridge unchanged so
/// the isolate sees the original error class.
#[derive(Debug, Clone, Error)]
#[error("{name}: {message}")]
pub struct RpcFailure {
    /// Error name, preserved across the bridge.
    pub name: String,
    /// Error message.
    pub message: String,
}

impl RpcFailure {
    /// A failure with an explicit name.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// A named host-side RPC handler.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    /// Handle one call.
    async fn call(&self, args: Value) -> Result<Value, RpcFailure>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> RpcHandler for FnHandler<F>
where
    F: Fn(Value) -> BoxFuture<'static, Result<Value, RpcFailure>> + Send + Sync,
{
    async fn call(&self, args: Value) -> Result<Value, RpcFailure> {
        (self.0)(args).await
    }
}

/// Registry of named handlers plus the dispatch that turns an incoming
/// `rpc` message into the reply to post back.
#[derive(Default, Clone)]
pub struct RpcHost {
    handlers: HashMap<String, Arc<dyn RpcHandler>>,
}

impl RpcHost {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `method`.
    pub fn register(&mut self, method: impl Into<String>, handler: Arc<dyn RpcHandler>) {
        self.handlers.insert(method.into(), handler);
    }

    /// Register a closure returning a boxed future.
    pub fn register_fn<F>(&mut self, method: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> BoxFuture<'static, Result<Value, RpcFailure>> + Send + Sync + 'static,
    {
        self.register(method, Arc::new(FnHandler(handler)));
    }

    /// Whether a handler is registered under `method`.
    #[must_use]
    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Invoke the handler for an incoming call and build the reply message
    /// carrying the same correlation id.
    pub async fn dispatch(&self, id: String, method: &str, args: Value) -> HostMessage {
        let Some(handler) = self.handlers.get(method) else {
            warn!(method, "rpc call to unknown method");
            return HostMessage::RpcError {
                id,
                error: format!("unknown method: {method}"),
                name: Exception::RpcError.name().to_string(),
            };
        };

        match handler.call(args).await {
            Ok(result) => {
                debug!(method, "rpc call succeeded");
                HostMessage::RpcReply { id, result }
            },
            Err(failure) => {
                debug!(method, name = %failure.name, "rpc call failed");
                HostMessage::RpcError {
                    id,
                    error: failure.message,
                    name: failure.name,
                }
            },
        }
    }
}

impl std::fmt::Debug for RpcHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcHost")
            .field("methods", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn host_with_echo() -> RpcHost {
        let mut host = RpcHost::new();
        host.register_fn("echo", |args| Box::pin(async move { Ok(args) }));
        host.register_fn("fail", |_| {
            Box::pin(async { Err(RpcFailure::new("QueryError", "relation missing")) })
        });
        host
    }

    #[tokio::test]
    async fn dispatch_replies_with_the_same_id() {
        let host = host_with_echo();
        match host.dispatch("id-1".into(), "echo", json!([1, 2])).await {
            HostMessage::RpcReply { id, result } => {
                assert_eq!(id, "id-1");
                assert_eq!(result, json!([1, 2]));
            },
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn handler_error_names_are_preserved() {
        let host = host_with_echo();
        match host.dispatch("id-2".into(), "fail", json!(null)).await {
            HostMessage::RpcError { id, error, name } => {
                assert_eq!(id, "id-2");
                assert_eq!(name, "QueryError");
                assert_eq!(error, "relation missing");
            },
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_methods_report_rpc_error() {
        let host = host_with_echo();
        match host.dispatch("id-3".into(), "nope", json!(null)).await {
            HostMessage::RpcError { name, .. } => assert_eq!(name, "RPCError"),
            other => panic!("unexpected reply: {other:?}"),
        }
    }
}
