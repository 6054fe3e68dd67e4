//! Serving database RPC to workers.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use islet_config::KernelConfig;
use islet_core::WorkerMessage;
use islet_db::{ConnectionPool, register_handlers};
use islet_rpc::RpcHost;

use crate::error::PipelineResult;
use crate::hooks::HookRegistry;
use crate::plugin::Plugin;

/// Exposes the pooled database to every spawned worker over the RPC
/// bridge.
pub struct DatabasePlugin {
    rpc: Arc<RpcHost>,
}

impl DatabasePlugin {
    /// Build the RPC surface over the given pool.
    #[must_use]
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        let mut rpc = RpcHost::new();
        register_handlers(&mut rpc, pool);
        Self { rpc: Arc::new(rpc) }
    }
}

impl Plugin for DatabasePlugin {
    fn name(&self) -> &'static str {
        "database"
    }

    fn setup(&self, hooks: &mut HookRegistry, _config: &KernelConfig) -> PipelineResult<()> {
        let rpc = Arc::clone(&self.rpc);
        hooks.on_spawn(move |process| {
            let rpc = Arc::clone(&rpc);
            let id = process.id();
            let sender = process.sender();
            let mut rx = process.subscribe();
            tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(WorkerMessage::Rpc { id: call, method, args }) => {
                            let reply = rpc.dispatch(call, &method, args).await;
                            if sender.send(reply).await.is_err() {
                                break;
                            }
                        },
                        Ok(_) => {},
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(worker = %id, skipped, "rpc pump lagged");
                        },
                        Err(RecvError::Closed) => break,
                    }
                }
                debug!(worker = %id, "rpc pump stopped");
            });
        });
        Ok(())
    }
}
