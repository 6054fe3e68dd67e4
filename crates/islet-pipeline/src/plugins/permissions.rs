//! Effective permission computation and env resolution.

use std::sync::Arc;

use serde_json::Value;

use islet_config::KernelConfig;
use islet_permissions::{merge, normalize, resolve_env_from_process, validate};
use islet_tools::ToolRegistry;

use crate::error::{PipelineError, PipelineResult};
use crate::hooks::HookRegistry;
use crate::plugin::Plugin;

/// Normalizes the request's permissions, folds in the selected tools'
/// declared needs, and materializes env grants into globals.
pub struct PermissionsPlugin {
    registry: Arc<ToolRegistry>,
}

impl PermissionsPlugin {
    /// A permissions plugin consulting the given tool registry.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }
}

impl Plugin for PermissionsPlugin {
    fn name(&self) -> &'static str {
        "permissions"
    }

    fn pre(&self) -> &'static [&'static str] {
        &["toolset"]
    }

    fn setup(&self, hooks: &mut HookRegistry, _config: &KernelConfig) -> PipelineResult<()> {
        let registry = Arc::clone(&self.registry);
        hooks.on_load("permissions", move |mut ctx| {
            let registry = Arc::clone(&registry);
            Box::pin(async move {
                let requested = normalize(ctx.request.permissions.as_ref());
                let effective = match ctx.tools.as_ref() {
                    Some(selection) => {
                        let declared = registry.permissions_for(selection);
                        merge(&requested, &declared).map_err(|err| PipelineError::Hook {
                            plugin: "permissions".into(),
                            message: err.to_string(),
                        })?
                    },
                    None => requested,
                };

                validate(&effective, ctx.config.strict);

                ctx.globals = resolve_env_from_process(&effective, &ctx.config.env_whitelist)
                    .into_iter()
                    .map(|(key, value)| (key, Value::String(value)))
                    .collect();
                ctx.permissions = Some(effective);
                Ok(ctx)
            })
        });
        Ok(())
    }
}
