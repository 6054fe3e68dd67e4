//! Kernel assembly and lifecycle.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use islet_channel::{ChannelBus, ChannelLimits};
use islet_cluster::{ClusterConfig, ClusterStats, WorkerCluster, WorkerSpawner};
use islet_config::KernelConfig;
use islet_core::{ExecuteRequest, Output};
use islet_db::{ConnectionPool, Connector, PoolConfig, PoolStats, UnconfiguredConnector};
use islet_pipeline::plugins::{
    ChannelPlugin, ClusterPlugin, DatabasePlugin, GuardPlugin, LoaderPlugin, LoggerPlugin,
    PermissionsPlugin, SandboxPlugin, ToolsetPlugin,
};
use islet_pipeline::{PipelineError, PipelineManager, Plugin};
use islet_tools::ToolRegistry;

/// Errors from kernel assembly.
#[derive(Debug, Error)]
pub enum KernelError {
    /// The pipeline could not be assembled.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Result alias for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

/// The assembled execution engine.
///
/// Owns the worker cluster, the channel bus, and the database pool;
/// everything request-scoped flows through [`Kernel::execute`].
pub struct Kernel {
    manager: PipelineManager,
    config: Arc<KernelConfig>,
    cluster: Arc<WorkerCluster>,
    pool: Arc<ConnectionPool>,
    bus: Arc<ChannelBus>,
}

impl Kernel {
    /// Assemble and warm up a kernel using the given database connector.
    ///
    /// # Errors
    ///
    /// Fails when the plugin set cannot be assembled.
    pub async fn start(
        config: KernelConfig,
        connector: Arc<dyn Connector>,
    ) -> KernelResult<Self> {
        let config = Arc::new(config);
        let registry = Arc::new(ToolRegistry::with_builtins());

        let spawner = WorkerSpawner::new(config.worker_command())
            .with_worker_config(config.worker_config_value());
        let cluster_config = ClusterConfig {
            min: config.cluster.min,
            max: config.cluster.max,
            idle: Duration::from_millis(config.cluster.idle_ms),
            ..ClusterConfig::default()
        };
        let cluster = Arc::new(WorkerCluster::new(spawner, cluster_config));

        let bus = Arc::new(ChannelBus::new(ChannelLimits {
            max_message_bytes: config.channel.max_message_bytes,
            max_messages: config.channel.max_messages,
            window: Duration::from_millis(config.channel.window_ms),
        }));

        let pool = Arc::new(ConnectionPool::new(
            connector,
            PoolConfig {
                limit: config.db.limit,
                idle_timeout: Duration::from_millis(config.db.idle_timeout_ms),
                cleanup_interval: Duration::from_millis(config.db.cleanup_interval_ms),
                ..PoolConfig::default()
            },
        ));

        let plugins: Vec<Arc<dyn Plugin>> = vec![
            Arc::new(GuardPlugin),
            Arc::new(ToolsetPlugin::new(Arc::clone(&registry))),
            Arc::new(PermissionsPlugin::new(Arc::clone(&registry))),
            Arc::new(LoaderPlugin),
            Arc::new(SandboxPlugin::new(Arc::clone(&cluster))),
            Arc::new(ChannelPlugin::new(Arc::clone(&bus))),
            Arc::new(ClusterPlugin::new(Arc::clone(&cluster))),
            Arc::new(LoggerPlugin),
            Arc::new(DatabasePlugin::new(Arc::clone(&pool))),
        ];

        let mut manager = PipelineManager::build(Arc::clone(&config), plugins)?;
        // Hooks must be attached before any worker exists, so warmup waits
        // until after this point.
        manager.connect_spawn_hooks(&cluster);
        cluster.warmup(config.cluster.warmup).await;

        info!(port = config.port, "kernel started");
        Ok(Self {
            manager,
            config,
            cluster,
            pool,
            bus,
        })
    }

    /// Assemble a kernel with no database backend.
    ///
    /// # Errors
    ///
    /// Fails when the plugin set cannot be assembled.
    pub async fn start_default(config: KernelConfig) -> KernelResult<Self> {
        Self::start(config, Arc::new(UnconfiguredConnector)).await
    }

    /// Run one request to a structured output. Never fails.
    pub async fn execute(&self, request: ExecuteRequest) -> Output {
        self.manager.execute(request).await
    }

    /// The service configuration.
    #[must_use]
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Whether a plugin by this name is assembled in.
    #[must_use]
    pub fn has_plugin(&self, name: &str) -> bool {
        self.manager.has_plugin(name)
    }

    /// Worker pool counts.
    pub async fn cluster_stats(&self) -> ClusterStats {
        self.cluster.stats().await
    }

    /// Connection pool counts.
    pub async fn pool_stats(&self) -> PoolStats {
        self.pool.stats().await
    }

    /// Registered channel workers.
    #[must_use]
    pub fn channel_workers(&self) -> usize {
        self.bus.worker_count()
    }

    /// Tear down the cluster and the connection pool.
    pub async fn shutdown(&self) {
        self.cluster.destroy().await;
        self.pool.dispose().await;
        info!("kernel stopped");
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use islet_core::Exception;

    fn test_config() -> KernelConfig {
        KernelConfig {
            // Workers are exercised end-to-end in the worker crate's
            // integration tests; here the binary is not available, so
            // keep the pool cold.
            cluster: islet_config::ClusterSection {
                min: 0,
                warmup: 0,
                ..islet_config::ClusterSection::default()
            },
            worker_cmd: Some("/bin/cat".into()),
            ..KernelConfig::default()
        }
    }

    #[tokio::test]
    async fn default_plugins_are_all_assembled() {
        let kernel = Kernel::start_default(test_config()).await.unwrap();
        for name in [
            "guard",
            "toolset",
            "permissions",
            "loader",
            "sandbox",
            "channel",
            "cluster",
            "logger",
            "database",
        ] {
            assert!(kernel.has_plugin(name), "missing plugin {name}");
        }
        assert!(!kernel.has_plugin("telemetry"));
        kernel.shutdown().await;
    }

    #[tokio::test]
    async fn guard_rejections_flow_through_execute() {
        let kernel = Kernel::start_default(test_config()).await.unwrap();
        let output = kernel
            .execute(ExecuteRequest::new("x".repeat(100_001)))
            .await;
        assert!(!output.ok);
        assert!(output.has_exception(Exception::PayloadTooLarge));
        assert_eq!(output.duration, 0);
        kernel.shutdown().await;
    }
}
