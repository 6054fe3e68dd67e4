//! Tool spec extraction.

use std::sync::Arc;

use islet_config::KernelConfig;
use islet_tools::ToolRegistry;

use crate::error::PipelineResult;
use crate::hooks::HookRegistry;
use crate::plugin::Plugin;

/// Resolves the request's tool specs into an ordered selection.
pub struct ToolsetPlugin {
    registry: Arc<ToolRegistry>,
}

impl ToolsetPlugin {
    /// A toolset plugin over the given registry.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }
}

impl Plugin for ToolsetPlugin {
    fn name(&self) -> &'static str {
        "toolset"
    }

    fn pre(&self) -> &'static [&'static str] {
        &["guard"]
    }

    fn setup(&self, hooks: &mut HookRegistry, _config: &KernelConfig) -> PipelineResult<()> {
        let registry = Arc::clone(&self.registry);
        hooks.on_load("toolset", move |mut ctx| {
            let registry = Arc::clone(&registry);
            Box::pin(async move {
                let selection = registry.extract(&ctx.request.tools);
                ctx.tools = Some(selection);
                Ok(ctx)
            })
        });
        Ok(())
    }
}
