//! The pipeline manager: assembly and request execution.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use islet_cluster::WorkerCluster;
use islet_config::KernelConfig;
use islet_core::{ExecuteRequest, Exception, Output};

use crate::context::Context;
use crate::error::PipelineResult;
use crate::hooks::HookRegistry;
use crate::plugin::{Plugin, sort_plugins};

/// Holds the assembled hook chains and runs requests through them.
pub struct PipelineManager {
    hooks: HookRegistry,
    config: Arc<KernelConfig>,
    plugin_names: Vec<&'static str>,
}

impl PipelineManager {
    /// Sort the plugins, run their setups in order, and assemble the
    /// chains.
    ///
    /// # Errors
    ///
    /// Any ordering or setup failure.
    pub fn build(
        config: Arc<KernelConfig>,
        plugins: Vec<Arc<dyn Plugin>>,
    ) -> PipelineResult<Self> {
        let sorted = sort_plugins(plugins)?;
        let plugin_names: Vec<&'static str> =
            sorted.iter().map(|plugin| plugin.name()).collect();
        debug!(order = ?plugin_names, "pipeline assembled");

        let mut hooks = HookRegistry::new();
        for plugin in &sorted {
            plugin.setup(&mut hooks, &config)?;
        }
        Ok(Self {
            hooks,
            config,
            plugin_names,
        })
    }

    /// Whether a plugin by this name was assembled in.
    #[must_use]
    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugin_names.contains(&name)
    }

    /// The service configuration.
    #[must_use]
    pub fn config(&self) -> &Arc<KernelConfig> {
        &self.config
    }

    /// Move the registered spawn hooks onto the cluster, so every new
    /// worker gets the side channels attached.
    pub fn connect_spawn_hooks(&mut self, cluster: &WorkerCluster) {
        let hooks = self.hooks.take_spawn_hooks();
        if hooks.is_empty() {
            return;
        }
        cluster.add_spawn_hook(move |process| {
            for hook in &hooks {
                hook(process);
            }
        });
    }

    /// Run one request through validate → load → execute → format.
    ///
    /// Never fails: every error is captured as a non-ok output. Validate
    /// rejections report duration 0; later failures report elapsed time.
    pub async fn execute(&self, request: ExecuteRequest) -> Output {
        let started = Instant::now();
        let elapsed = |instant: Instant| {
            u64::try_from(instant.elapsed().as_millis()).unwrap_or(u64::MAX)
        };

        let ctx = Context::new(Arc::clone(&self.config), request);
        let ctx = match self.hooks.run_validate(ctx).await {
            Ok(ctx) => ctx,
            Err(err) => {
                warn!(error = %err, "request rejected by validation");
                return err.into_output(0);
            },
        };
        let ctx = match self.hooks.run_load(ctx).await {
            Ok(ctx) => ctx,
            Err(err) => return err.into_output(elapsed(started)),
        };
        let ctx = match self.hooks.run_execute(ctx).await {
            Ok(ctx) => ctx,
            Err(err) => return err.into_output(elapsed(started)),
        };

        let ctx = if ctx.output.is_some() {
            match self.hooks.run_format(ctx).await {
                Ok(ctx) => ctx,
                Err(err) => return err.into_output(elapsed(started)),
            }
        } else {
            ctx
        };

        ctx.output.unwrap_or_else(|| {
            Output::exception(
                Exception::ExecutionError,
                "pipeline produced no output",
                elapsed(started),
            )
        })
    }
}

impl std::fmt::Debug for PipelineManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineManager")
            .field("plugins", &self.plugin_names)
            .field("hooks", &self.hooks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use serde_json::json;

    struct EchoExecute;

    impl Plugin for EchoExecute {
        fn name(&self) -> &'static str {
            "echo"
        }
        fn setup(
            &self,
            hooks: &mut HookRegistry,
            _config: &KernelConfig,
        ) -> PipelineResult<()> {
            hooks.on_execute("echo", |mut ctx| {
                Box::pin(async move {
                    ctx.output = Some(Output::success(
                        ctx.request.input.clone(),
                        Vec::new(),
                        1,
                    ));
                    Ok(ctx)
                })
            });
            Ok(())
        }
    }

    struct AlwaysReject;

    impl Plugin for AlwaysReject {
        fn name(&self) -> &'static str {
            "reject"
        }
        fn setup(
            &self,
            hooks: &mut HookRegistry,
            _config: &KernelConfig,
        ) -> PipelineResult<()> {
            hooks.on_validate("reject", |_ctx| {
                Box::pin(async {
                    Err(PipelineError::rejected(
                        Exception::ValidationError,
                        "nope",
                    ))
                })
            });
            Ok(())
        }
    }

    fn config() -> Arc<KernelConfig> {
        Arc::new(KernelConfig::default())
    }

    #[tokio::test]
    async fn hooks_replace_the_context_and_produce_output() {
        let manager =
            PipelineManager::build(config(), vec![Arc::new(EchoExecute)]).unwrap();
        let request = ExecuteRequest::new("code").with_input(json!(7));
        let output = manager.execute(request).await;
        assert!(output.ok);
        assert_eq!(output.result, Some(json!(7)));
        assert!(manager.has_plugin("echo"));
        assert!(!manager.has_plugin("ghost"));
    }

    #[tokio::test]
    async fn validate_rejections_surface_with_zero_duration() {
        let manager = PipelineManager::build(
            config(),
            vec![Arc::new(AlwaysReject), Arc::new(EchoExecute)],
        )
        .unwrap();
        let output = manager.execute(ExecuteRequest::new("code")).await;
        assert!(!output.ok);
        assert_eq!(output.duration, 0);
        assert!(output.has_exception(Exception::ValidationError));
    }

    #[tokio::test]
    async fn missing_output_is_reported_not_panicked() {
        let manager = PipelineManager::build(config(), Vec::new()).unwrap();
        let output = manager.execute(ExecuteRequest::new("code")).await;
        assert!(!output.ok);
        assert!(output.has_exception(Exception::ExecutionError));
    }
}
