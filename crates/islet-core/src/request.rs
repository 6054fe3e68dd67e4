//! The inbound execution request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::permission::PermissionSet;

/// Name of the entry function invoked when a request does not name one.
pub const DEFAULT_ENTRY: &str = "default";

/// A user-submitted snippet execution request.
///
/// This is the shape accepted on the HTTP surface and threaded through the
/// pipeline unchanged. It is immutable once parsed; everything derived from
/// it (effective permissions, the module URL, resolved globals) lives on the
/// pipeline context instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// Source code of the snippet module.
    pub code: String,

    /// Optional input value passed to the entry function.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,

    /// Name of the exported function to invoke.
    #[serde(default = "default_entry")]
    pub entry: String,

    /// Per-request deadline in milliseconds. Falls back to the configured
    /// default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Requested capability grants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<PermissionSet>,

    /// Tools to install into the isolate scope, in request order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,
}

impl ExecuteRequest {
    /// Create a request for the given code with all other fields defaulted.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            input: None,
            entry: DEFAULT_ENTRY.to_string(),
            timeout: None,
            permissions: None,
            tools: Vec::new(),
        }
    }

    /// Set the input value.
    #[must_use]
    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    /// Set the entry function name.
    #[must_use]
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = entry.into();
        self
    }

    /// Set the per-request deadline in milliseconds.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }

    /// Set the requested permissions.
    #[must_use]
    pub fn with_permissions(mut self, permissions: PermissionSet) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Append a tool spec.
    #[must_use]
    pub fn with_tool(mut self, spec: ToolSpec) -> Self {
        self.tools.push(spec);
        self
    }
}

fn default_entry() -> String {
    DEFAULT_ENTRY.to_string()
}

/// A tool reference in a request: either a bare name or a `[name, config]`
/// pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolSpec {
    /// Tool by name, default configuration.
    Name(String),
    /// Tool by name with an attached configuration value.
    Configured(String, Value),
}

impl ToolSpec {
    /// The tool name this spec refers to.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Configured(name, _) => name,
        }
    }

    /// The attached configuration, if any.
    #[must_use]
    pub fn config(&self) -> Option<&Value> {
        match self {
            Self::Name(_) => None,
            Self::Configured(_, config) => Some(config),
        }
    }
}

impl From<&str> for ToolSpec {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_defaults_when_absent() {
        let request: ExecuteRequest = serde_json::from_value(json!({
            "code": "fn default(x) { x }"
        }))
        .unwrap();
        assert_eq!(request.entry, "default");
        assert!(request.input.is_none());
        assert!(request.tools.is_empty());
    }

    #[test]
    fn tool_specs_accept_both_forms() {
        let request: ExecuteRequest = serde_json::from_value(json!({
            "code": "fn default() { 1 }",
            "tools": ["crypto", ["db", {"url": "postgres://localhost/app"}]]
        }))
        .unwrap();
        assert_eq!(request.tools.len(), 2);
        assert_eq!(request.tools[0].name(), "crypto");
        assert!(request.tools[0].config().is_none());
        assert_eq!(request.tools[1].name(), "db");
        assert_eq!(
            request.tools[1].config().unwrap()["url"],
            "postgres://localhost/app"
        );
    }

    #[test]
    fn missing_code_is_rejected() {
        let result: Result<ExecuteRequest, _> = serde_json::from_value(json!({ "entry": "run" }));
        assert!(result.is_err());
    }
}
