//! The five hook chains.

use futures::future::BoxFuture;
use tracing::trace;

use islet_cluster::WorkerProcess;

use crate::context::Context;
use crate::error::PipelineResult;

/// An async hook: consumes the context, returns the replacement.
pub(crate) type AsyncHook =
    Box<dyn Fn(Context) -> BoxFuture<'static, PipelineResult<Context>> + Send + Sync>;

/// A synchronous hook fired when a worker is spawned.
pub(crate) type SpawnHook = Box<dyn Fn(&WorkerProcess) + Send + Sync>;

/// Ordered hook chains, populated by plugin setup in topological order.
#[derive(Default)]
pub struct HookRegistry {
    validate: Vec<(String, AsyncHook)>,
    load: Vec<(String, AsyncHook)>,
    execute: Vec<(String, AsyncHook)>,
    format: Vec<(String, AsyncHook)>,
    spawn: Vec<SpawnHook>,
}

impl HookRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tap the validate chain.
    pub fn on_validate<F>(&mut self, plugin: &str, hook: F)
    where
        F: Fn(Context) -> BoxFuture<'static, PipelineResult<Context>> + Send + Sync + 'static,
    {
        self.validate.push((plugin.to_string(), Box::new(hook)));
    }

    /// Tap the load chain.
    pub fn on_load<F>(&mut self, plugin: &str, hook: F)
    where
        F: Fn(Context) -> BoxFuture<'static, PipelineResult<Context>> + Send + Sync + 'static,
    {
        self.load.push((plugin.to_string(), Box::new(hook)));
    }

    /// Tap the execute chain.
    pub fn on_execute<F>(&mut self, plugin: &str, hook: F)
    where
        F: Fn(Context) -> BoxFuture<'static, PipelineResult<Context>> + Send + Sync + 'static,
    {
        self.execute.push((plugin.to_string(), Box::new(hook)));
    }

    /// Tap the format chain.
    pub fn on_format<F>(&mut self, plugin: &str, hook: F)
    where
        F: Fn(Context) -> BoxFuture<'static, PipelineResult<Context>> + Send + Sync + 'static,
    {
        self.format.push((plugin.to_string(), Box::new(hook)));
    }

    /// Tap the spawn chain.
    pub fn on_spawn<F>(&mut self, hook: F)
    where
        F: Fn(&WorkerProcess) + Send + Sync + 'static,
    {
        self.spawn.push(Box::new(hook));
    }

    async fn run_chain(
        chain: &[(String, AsyncHook)],
        stage: &str,
        mut ctx: Context,
    ) -> PipelineResult<Context> {
        for (plugin, hook) in chain {
            trace!(stage, plugin = %plugin, "running hook");
            ctx = hook(ctx).await?;
        }
        Ok(ctx)
    }

    pub(crate) async fn run_validate(&self, ctx: Context) -> PipelineResult<Context> {
        Self::run_chain(&self.validate, "validate", ctx).await
    }

    pub(crate) async fn run_load(&self, ctx: Context) -> PipelineResult<Context> {
        Self::run_chain(&self.load, "load", ctx).await
    }

    pub(crate) async fn run_execute(&self, ctx: Context) -> PipelineResult<Context> {
        Self::run_chain(&self.execute, "execute", ctx).await
    }

    pub(crate) async fn run_format(&self, ctx: Context) -> PipelineResult<Context> {
        Self::run_chain(&self.format, "format", ctx).await
    }

    pub(crate) fn take_spawn_hooks(&mut self) -> Vec<SpawnHook> {
        std::mem::take(&mut self.spawn)
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("validate", &self.validate.len())
            .field("load", &self.load.len())
            .field("execute", &self.execute.len())
            .field("format", &self.format.len())
            .field("spawn", &self.spawn.len())
            .finish()
    }
}
