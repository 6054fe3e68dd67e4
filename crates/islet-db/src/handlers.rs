//! RPC methods exposing the pool to isolates.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};

use islet_rpc::{RpcFailure, RpcHost};

use crate::error::DbError;
use crate::pool::ConnectionPool;

#[derive(Deserialize)]
struct UrlArgs {
    url: String,
}

#[derive(Deserialize)]
struct QueryArgs {
    url: String,
    statement: String,
    #[serde(default)]
    params: Value,
}

fn failure_from(err: &DbError) -> RpcFailure {
    let name = match err {
        DbError::MissingUrl | DbError::NotLeased => "ValidationError",
        DbError::Exhausted { .. } => "PoolError",
        DbError::Connect(_) | DbError::Close(_) => "ConnectionError",
        DbError::Query(_) => "QueryError",
    };
    RpcFailure::new(name, err.to_string())
}

fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, RpcFailure> {
    serde_json::from_value(args)
        .map_err(|err| RpcFailure::new("ValidationError", format!("bad rpc arguments: {err}")))
}

/// Register `db.get`, `db.query`, and `db.release` on `host`.
///
/// `db.get` leases a connection (created on demand), `db.query` runs a
/// statement against an existing lease, and `db.release` returns the lease;
/// the db tool calls it from teardown.
pub fn register_handlers(host: &mut RpcHost, pool: Arc<ConnectionPool>) {
    let get_pool = Arc::clone(&pool);
    host.register_fn("db.get", move |args| {
        let pool = Arc::clone(&get_pool);
        Box::pin(async move {
            let UrlArgs { url } = parse_args(args)?;
            pool.get(&url).await.map_err(|err| failure_from(&err))?;
            Ok(json!({ "leased": true }))
        })
    });

    let query_pool = Arc::clone(&pool);
    host.register_fn("db.query", move |args| {
        let pool = Arc::clone(&query_pool);
        Box::pin(async move {
            let QueryArgs {
                url,
                statement,
                params,
            } = parse_args(args)?;
            let client = pool.peek(&url).await.map_err(|err| failure_from(&err))?;
            client
                .query(&statement, params)
                .await
                .map_err(|err| failure_from(&err))
        })
    });

    host.register_fn("db.release", move |args| {
        let pool = Arc::clone(&pool);
        Box::pin(async move {
            let UrlArgs { url } = parse_args(args)?;
            pool.release(&url).await;
            Ok(json!({ "released": true }))
        })
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeConnector;
    use crate::pool::PoolConfig;
    use islet_core::HostMessage;

    fn rpc_with_pool(connector: FakeConnector) -> (RpcHost, Arc<ConnectionPool>) {
        let pool = Arc::new(ConnectionPool::new(
            Arc::new(connector),
            PoolConfig::default(),
        ));
        let mut host = RpcHost::new();
        register_handlers(&mut host, Arc::clone(&pool));
        (host, pool)
    }

    #[tokio::test]
    async fn query_requires_a_lease() {
        let (host, pool) = rpc_with_pool(FakeConnector::new());
        let args = json!({ "url": "postgres://db/app", "statement": "select 1" });

        match host.dispatch("1".into(), "db.query", args.clone()).await {
            HostMessage::RpcError { name, .. } => assert_eq!(name, "ValidationError"),
            other => panic!("unexpected reply: {other:?}"),
        }

        host.dispatch("2".into(), "db.get", json!({ "url": "postgres://db/app" }))
            .await;
        match host.dispatch("3".into(), "db.query", args).await {
            HostMessage::RpcReply { result, .. } => {
                assert_eq!(result[0]["statement"], "select 1");
            },
            other => panic!("unexpected reply: {other:?}"),
        }
        pool.dispose().await;
    }

    #[tokio::test]
    async fn release_returns_the_lease() {
        let (host, pool) = rpc_with_pool(FakeConnector::new());
        host.dispatch("1".into(), "db.get", json!({ "url": "postgres://db/app" }))
            .await;
        assert_eq!(pool.stats().await.in_use, 1);

        host.dispatch("2".into(), "db.release", json!({ "url": "postgres://db/app" }))
            .await;
        assert_eq!(pool.stats().await.in_use, 0);
        pool.dispose().await;
    }

    #[tokio::test]
    async fn query_failures_carry_their_name() {
        let (host, pool) = rpc_with_pool(FakeConnector::with_failing_queries());
        host.dispatch("1".into(), "db.get", json!({ "url": "postgres://db/app" }))
            .await;
        let args = json!({ "url": "postgres://db/app", "statement": "select 1" });
        match host.dispatch("2".into(), "db.query", args).await {
            HostMessage::RpcError { name, .. } => assert_eq!(name, "QueryError"),
            other => panic!("unexpected reply: {other:?}"),
        }
        pool.dispose().await;
    }
}
