//! Execution against the worker cluster.

use std::sync::Arc;
use std::time::Duration;

use islet_cluster::WorkerCluster;
use islet_config::KernelConfig;
use islet_core::{Packet, PermissionSet};

use crate::error::PipelineResult;
use crate::hooks::HookRegistry;
use crate::plugin::Plugin;

/// Builds the packet and drives it through a pooled worker. Always
/// produces an output; timeouts and crashes arrive as structured logs.
pub struct SandboxPlugin {
    cluster: Arc<WorkerCluster>,
}

impl SandboxPlugin {
    /// A sandbox plugin executing on the given cluster.
    #[must_use]
    pub fn new(cluster: Arc<WorkerCluster>) -> Self {
        Self { cluster }
    }
}

impl Plugin for SandboxPlugin {
    fn name(&self) -> &'static str {
        "sandbox"
    }

    fn required(&self) -> &'static [&'static str] {
        &["guard"]
    }

    fn pre(&self) -> &'static [&'static str] {
        &["toolset", "permissions", "loader"]
    }

    fn setup(&self, hooks: &mut HookRegistry, _config: &KernelConfig) -> PipelineResult<()> {
        let cluster = Arc::clone(&self.cluster);
        hooks.on_execute("sandbox", move |mut ctx| {
            let cluster = Arc::clone(&cluster);
            Box::pin(async move {
                let context = ctx
                    .tools
                    .clone()
                    .filter(|selection| !selection.names.is_empty());
                let packet = Packet {
                    code: ctx.request.code.clone(),
                    input: ctx.request.input.clone(),
                    entry: ctx.request.entry.clone(),
                    url: ctx.url.clone().unwrap_or_default(),
                    globals: ctx.globals.clone(),
                    context,
                };
                let timeout =
                    Duration::from_millis(ctx.request.timeout.unwrap_or(ctx.config.timeout));
                let permissions = ctx
                    .permissions
                    .clone()
                    .unwrap_or_else(PermissionSet::none);

                let output = cluster.run(packet, timeout, &permissions).await;
                ctx.output = Some(output);
                Ok(ctx)
            })
        });
        Ok(())
    }
}
