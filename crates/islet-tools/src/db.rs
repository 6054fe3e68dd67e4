//! The db tool: pooled queries routed over the RPC bridge.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rhai::Dynamic;
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use islet_core::{Capability, Exception, Grant, PermissionGrants, PermissionSet};
use islet_rpc::{RpcClient, RpcClientError};

use crate::error::{ApiError, ToolError, ToolResult};
use crate::tool::{Tool, ToolHost, ToolScope};

/// Request-level db tool configuration.
#[derive(Debug, Default, Deserialize)]
struct DbConfig {
    /// Connection URL, given inline.
    url: Option<String>,
    /// Name of the env grant holding the connection URL.
    env: Option<String>,
}

fn map_rpc_err(err: RpcClientError) -> ApiError {
    match err {
        RpcClientError::Remote { name, message } => ApiError::new(name, message),
        other => ApiError::new(Exception::RpcError.name(), other.to_string()),
    }
}

/// The lazy database accessor injected as `db`.
///
/// The host-side connection is leased on first use (`db.get`), reused for
/// every query, and released by the tool's teardown.
#[derive(Debug, Clone)]
pub struct DbApi {
    rpc: RpcClient,
    url: String,
    leased: Arc<AtomicBool>,
}

impl DbApi {
    /// An accessor for `url` calling through `rpc`.
    #[must_use]
    pub fn new(rpc: RpcClient, url: impl Into<String>) -> Self {
        Self {
            rpc,
            url: url.into(),
            leased: Arc::new(AtomicBool::new(false)),
        }
    }

    fn ensure_lease(&self) -> Result<(), ApiError> {
        if self.leased.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.rpc
            .call("db.get", json!({ "url": self.url }))
            .map_err(map_rpc_err)?;
        self.leased.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Run a statement, leasing a connection on first use.
    ///
    /// # Errors
    ///
    /// The remote error with its original name, or `RPCError` for
    /// transport failures.
    pub fn query(&self, statement: &str, params: Value) -> Result<Value, ApiError> {
        self.ensure_lease()?;
        self.rpc
            .call(
                "db.query",
                json!({ "url": self.url, "statement": statement, "params": params }),
            )
            .map_err(map_rpc_err)
    }

    /// Return the lease, if one was taken.
    ///
    /// # Errors
    ///
    /// `RPCError` when the release call cannot reach the host.
    pub fn release(&self) -> Result<(), ApiError> {
        if !self.leased.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.rpc
            .call("db.release", json!({ "url": self.url }))
            .map(|_| ())
            .map_err(map_rpc_err)
    }
}

/// The registry entry installing [`DbApi`].
#[derive(Debug, Default)]
pub struct DbTool;

impl DbTool {
    fn resolve_url(config: &DbConfig, host: &ToolHost) -> Option<String> {
        if let Some(url) = &config.url {
            return Some(url.clone());
        }
        config
            .env
            .as_ref()
            .and_then(|name| host.env.get(name).cloned())
    }
}

impl Tool for DbTool {
    fn name(&self) -> &'static str {
        "db"
    }

    /// The db tool needs network access to its database host and, when the
    /// URL comes from the environment, the matching env grant.
    fn permissions(&self, config: &Value) -> PermissionSet {
        let config: DbConfig = serde_json::from_value(config.clone()).unwrap_or_default();
        let mut grants = PermissionGrants::default();

        if let Some(url) = &config.url
            && let Ok(parsed) = Url::parse(url)
            && let Some(host) = parsed.host_str()
        {
            let grant = match parsed.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            };
            grants.set(Capability::Net, Grant::List(vec![grant]));
        }
        if let Some(var) = config.env {
            grants.set(Capability::Env, Grant::List(vec![var]));
        }
        PermissionSet::Grants(grants)
    }

    fn setup(&self, scope: &mut ToolScope, host: &ToolHost, config: &Value) -> ToolResult<()> {
        let config: DbConfig =
            serde_json::from_value(config.clone()).unwrap_or_default();
        let url = Self::resolve_url(&config, host).ok_or(ToolError::MissingConfig {
            tool: "db".into(),
            field: "url".into(),
        })?;
        let api = DbApi::new(host.rpc.clone(), url);
        scope
            .inject("db", Dynamic::from(api))
            .map_err(|err| ToolError::Setup {
                tool: "db".into(),
                message: err.to_string(),
            })
    }

    fn teardown(&self, scope: &mut ToolScope, _host: &ToolHost) -> ToolResult<()> {
        let Some(slot) = scope.get("db") else {
            return Ok(());
        };
        let Some(api) = slot.value.clone().try_cast::<DbApi>() else {
            return Ok(());
        };
        api.release().map_err(|err| ToolError::Teardown {
            tool: "db".into(),
            message: err.to_string(),
        })
    }
}
