//! Resolving request tool specs into ordered installs.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use islet_core::{LogEntry, LogLevel, PermissionSet, ToolContext, ToolSpec};

use crate::channel::ChannelTool;
use crate::crypto::CryptoTool;
use crate::db::DbTool;
use crate::error::ToolResult;
use crate::tool::{Tool, ToolHost, ToolScope};

/// The resolved tools for one request: names in installation order plus
/// their configs. Same shape the packet carries.
pub type ToolSelection = ToolContext;

/// Named tools available to requests.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in crypto, channel, and db tools.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CryptoTool));
        registry.register(Arc::new(ChannelTool));
        registry.register(Arc::new(DbTool));
        registry
    }

    /// Register a tool under its own name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Look up a tool.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Registered tool names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    /// Parse request tool specs into an ordered selection.
    ///
    /// Unknown names are dropped. When a tool appears more than once the
    /// last occurrence wins: its position and its config (or absence of
    /// one) replace the earlier mention.
    #[must_use]
    pub fn extract(&self, specs: &[ToolSpec]) -> ToolSelection {
        let mut names: Vec<String> = Vec::new();
        let mut configs: BTreeMap<String, Value> = BTreeMap::new();

        for spec in specs {
            let name = spec.name();
            if !self.tools.contains_key(name) {
                debug!(tool = name, "unknown tool spec dropped");
                continue;
            }
            names.retain(|existing| existing != name);
            names.push(name.to_string());
            match spec.config() {
                Some(config) => {
                    configs.insert(name.to_string(), config.clone());
                },
                None => {
                    configs.remove(name);
                },
            }
        }

        ToolSelection { names, configs }
    }

    /// Union of the selected tools' declared capability needs.
    #[must_use]
    pub fn permissions_for(&self, selection: &ToolSelection) -> PermissionSet {
        let mut merged = PermissionSet::none();
        for name in &selection.names {
            let Some(tool) = self.tools.get(name) else {
                continue;
            };
            let config = selection
                .configs
                .get(name)
                .cloned()
                .unwrap_or(Value::Null);
            let declared = tool.permissions(&config);
            match islet_permissions::merge(&merged, &declared) {
                Ok(result) => merged = result,
                Err(err) => warn!(tool = %name, error = %err, "tool permissions skipped"),
            }
        }
        merged
    }

    /// Install the selected tools in order.
    ///
    /// On any setup failure every key injected so far is removed
    /// (best-effort) and the error is rethrown.
    ///
    /// # Errors
    ///
    /// The failing tool's setup error.
    pub fn install(
        &self,
        selection: &ToolSelection,
        scope: &mut ToolScope,
        host: &ToolHost,
    ) -> ToolResult<Vec<String>> {
        let mut installed = Vec::new();
        for name in &selection.names {
            let Some(tool) = self.tools.get(name) else {
                continue;
            };
            let config = selection
                .configs
                .get(name)
                .cloned()
                .unwrap_or(Value::Null);
            if let Err(err) = tool.setup(scope, host, &config) {
                let removed = scope.reset(&[]);
                warn!(
                    tool = %name,
                    rolled_back = removed.len(),
                    "tool install failed, injected keys removed"
                );
                return Err(err);
            }
            installed.push(name.clone());
        }
        Ok(installed)
    }

    /// Tear down `installed` in installation order, folding failures into
    /// warning log entries, then force-reset whatever injected keys remain.
    pub fn teardown(
        &self,
        installed: &[String],
        scope: &mut ToolScope,
        host: &ToolHost,
    ) -> Vec<LogEntry> {
        let mut entries = Vec::new();
        for name in installed {
            let Some(tool) = self.tools.get(name) else {
                continue;
            };
            if let Err(err) = tool.teardown(scope, host) {
                warn!(tool = %name, error = %err, "tool teardown failed");
                entries.push(LogEntry::new(LogLevel::Warn, err.to_string()));
            }
        }
        scope.reset(&[]);
        entries
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CryptoPolicy;
    use crate::error::ToolError;
    use islet_channel::ChannelEndpoint;
    use islet_rpc::RpcClient;
    use rhai::Dynamic;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    fn host() -> ToolHost {
        let (outbound, _rx) = std::sync::mpsc::channel();
        ToolHost {
            rpc: RpcClient::new(outbound.clone(), Duration::from_secs(1)),
            outbound,
            channel: Arc::new(Mutex::new(ChannelEndpoint::default())),
            crypto: CryptoPolicy::default(),
            env: BTreeMap::new(),
        }
    }

    struct FailingTool;

    impl Tool for FailingTool {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn setup(&self, scope: &mut ToolScope, _host: &ToolHost, _config: &Value) -> ToolResult<()> {
            // Inject something, then fail, to exercise the rollback.
            let _ = scope.inject("flaky", Dynamic::from(1_i64));
            Err(ToolError::Setup {
                tool: "flaky".into(),
                message: "forced".into(),
            })
        }
    }

    #[test]
    fn extract_drops_unknown_and_applies_last_wins() {
        let registry = ToolRegistry::with_builtins();
        let selection = registry.extract(&[
            ToolSpec::Name("crypto".into()),
            ToolSpec::Name("teleport".into()),
            ToolSpec::Configured("db".into(), json!({ "url": "postgres://a/x" })),
            ToolSpec::Configured("crypto".into(), json!({ "limit": 5 })),
        ]);
        assert_eq!(selection.names, vec!["db".to_string(), "crypto".to_string()]);
        assert_eq!(selection.configs["crypto"], json!({ "limit": 5 }));

        // A later bare mention clears the earlier config.
        let selection = registry.extract(&[
            ToolSpec::Configured("crypto".into(), json!({ "limit": 5 })),
            ToolSpec::Name("crypto".into()),
        ]);
        assert_eq!(selection.names, vec!["crypto".to_string()]);
        assert!(!selection.configs.contains_key("crypto"));
    }

    #[test]
    fn install_injects_and_teardown_clears() {
        let registry = ToolRegistry::with_builtins();
        let host = host();
        let mut scope = ToolScope::new();

        let selection = registry.extract(&[ToolSpec::Name("crypto".into())]);
        let installed = registry.install(&selection, &mut scope, &host).unwrap();
        assert_eq!(installed, vec!["crypto".to_string()]);
        assert!(scope.contains("crypto"));

        let entries = registry.teardown(&installed, &mut scope, &host);
        assert!(entries.is_empty());
        assert!(!scope.contains("crypto"));
    }

    #[test]
    fn failed_install_rolls_back_earlier_tools() {
        let mut registry = ToolRegistry::with_builtins();
        registry.register(Arc::new(FailingTool));
        let host = host();
        let mut scope = ToolScope::new();

        let selection = registry.extract(&[
            ToolSpec::Name("crypto".into()),
            ToolSpec::Name("flaky".into()),
        ]);
        let err = registry.install(&selection, &mut scope, &host);
        assert!(matches!(err, Err(ToolError::Setup { .. })));
        assert!(!scope.contains("crypto"));
        assert!(!scope.contains("flaky"));
    }

    #[test]
    fn db_config_flows_into_merged_permissions() {
        let registry = ToolRegistry::with_builtins();
        let selection = registry.extract(&[ToolSpec::Configured(
            "db".into(),
            json!({ "url": "postgres://db.internal:5432/app" }),
        )]);
        let permissions = registry.permissions_for(&selection);
        let grants = permissions.grants().unwrap();
        assert_eq!(
            grants.get(islet_core::Capability::Net).items().unwrap(),
            &["db.internal:5432".to_string()]
        );
    }
}
