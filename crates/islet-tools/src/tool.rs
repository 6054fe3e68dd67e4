//! The tool trait and the host handles passed to setups.

use std::collections::BTreeMap;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use rhai::{Dynamic, FnPtr};
use serde_json::Value;

use islet_channel::ChannelEndpoint;
use islet_core::{PermissionSet, WorkerMessage};
use islet_rpc::RpcClient;
use islet_sandbox::Scope;

use crate::crypto::CryptoPolicy;
use crate::error::ToolResult;

/// The isolate scope tools inject into.
pub type ToolScope = Scope<Dynamic>;

/// Worker-side handles a tool may wire its API values to.
#[derive(Debug, Clone)]
pub struct ToolHost {
    /// Outbound message sink to the host process.
    pub outbound: Sender<WorkerMessage>,
    /// Blocking RPC client to host-side handlers.
    pub rpc: RpcClient,
    /// The per-scope channel endpoint.
    pub channel: Arc<Mutex<ChannelEndpoint<FnPtr>>>,
    /// Service-level crypto policy.
    pub crypto: CryptoPolicy,
    /// Environment values resolved for this request.
    pub env: BTreeMap<String, String>,
}

/// A named capability installable into an isolate scope.
///
/// Every key a setup injects must be cleared again by teardown; the scope
/// tracks injected keys so the registry can force-reset whatever a failing
/// tool leaves behind.
pub trait Tool: Send + Sync {
    /// The registry name.
    fn name(&self) -> &'static str;

    /// Capabilities this tool needs, derived from its request config.
    /// Merged into the request's effective permission set host-side.
    fn permissions(&self, config: &Value) -> PermissionSet {
        let _ = config;
        PermissionSet::none()
    }

    /// Install the tool's values into `scope`.
    ///
    /// # Errors
    ///
    /// Any failure aborts the install pass; the registry rolls back keys
    /// injected by tools that already succeeded.
    fn setup(&self, scope: &mut ToolScope, host: &ToolHost, config: &Value) -> ToolResult<()>;

    /// Release anything setup acquired. Failures are folded into a log
    /// entry; the scope reset still removes the tool's keys.
    ///
    /// # Errors
    ///
    /// Reported, never fatal.
    fn teardown(&self, scope: &mut ToolScope, host: &ToolHost) -> ToolResult<()> {
        let _ = (scope, host);
        Ok(())
    }
}
