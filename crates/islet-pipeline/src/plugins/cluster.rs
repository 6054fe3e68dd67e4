//! Pool lifecycle marker plugin.

use std::sync::Arc;

use tracing::debug;

use islet_cluster::WorkerCluster;
use islet_config::KernelConfig;

use crate::error::PipelineResult;
use crate::hooks::HookRegistry;
use crate::plugin::Plugin;

/// Marks pooled execution as enabled and carries the cluster handle for
/// lifecycle operations (warmup after spawn hooks attach, destroy on
/// shutdown). The kernel drives both; without this plugin the sandbox
/// still runs, spawning per request up to the same cap.
pub struct ClusterPlugin {
    cluster: Arc<WorkerCluster>,
}

impl ClusterPlugin {
    /// A cluster plugin over the given pool.
    #[must_use]
    pub fn new(cluster: Arc<WorkerCluster>) -> Self {
        Self { cluster }
    }

    /// The pool handle.
    #[must_use]
    pub fn cluster(&self) -> &Arc<WorkerCluster> {
        &self.cluster
    }
}

impl Plugin for ClusterPlugin {
    fn name(&self) -> &'static str {
        "cluster"
    }

    fn setup(&self, _hooks: &mut HookRegistry, _config: &KernelConfig) -> PipelineResult<()> {
        debug!(config = ?self.cluster.config(), "worker pooling enabled");
        Ok(())
    }
}
