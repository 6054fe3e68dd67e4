//! The mutable value threaded through the hook chains.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use islet_config::KernelConfig;
use islet_core::{ExecuteRequest, Output, PermissionSet, ToolContext};

/// Per-request pipeline state. Born in `execute`, replaced by each hook's
/// return value, dead once the output is formatted.
#[derive(Debug, Clone)]
pub struct Context {
    /// The service configuration.
    pub config: Arc<KernelConfig>,
    /// The request being served.
    pub request: ExecuteRequest,
    /// Module data URL, set by the loader.
    pub url: Option<String>,
    /// Effective permissions, set by the permission plugin.
    pub permissions: Option<PermissionSet>,
    /// Values to install on the isolate scope (resolved env grants).
    pub globals: BTreeMap<String, Value>,
    /// The resolved tool selection.
    pub tools: Option<ToolContext>,
    /// The execution result, set by the sandbox plugin.
    pub output: Option<Output>,
}

impl Context {
    /// A fresh context for one request.
    #[must_use]
    pub fn new(config: Arc<KernelConfig>, request: ExecuteRequest) -> Self {
        Self {
            config,
            request,
            url: None,
            permissions: None,
            globals: BTreeMap::new(),
            tools: None,
            output: None,
        }
    }
}
