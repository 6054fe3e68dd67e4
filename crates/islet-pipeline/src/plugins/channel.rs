//! Attaching workers to the cross-isolate bus.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use islet_channel::ChannelBus;
use islet_config::KernelConfig;
use islet_core::WorkerMessage;

use crate::error::PipelineResult;
use crate::hooks::HookRegistry;
use crate::plugin::Plugin;

/// Registers every spawned worker with the bus and pumps its outgoing
/// channel messages through the bus's validation and fan-out.
pub struct ChannelPlugin {
    bus: Arc<ChannelBus>,
}

impl ChannelPlugin {
    /// A channel plugin over the given bus.
    #[must_use]
    pub fn new(bus: Arc<ChannelBus>) -> Self {
        Self { bus }
    }
}

impl Plugin for ChannelPlugin {
    fn name(&self) -> &'static str {
        "channel"
    }

    fn setup(&self, hooks: &mut HookRegistry, _config: &KernelConfig) -> PipelineResult<()> {
        let bus = Arc::clone(&self.bus);
        hooks.on_spawn(move |process| {
            let id = process.id();
            bus.register(id, process.sender());
            let bus = Arc::clone(&bus);
            let mut rx = process.subscribe();
            tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(WorkerMessage::Channel { topic, data }) => {
                            if let Err(err) = bus.publish(id, &topic, &data) {
                                warn!(worker = %id, error = %err, "channel message dropped");
                            }
                        },
                        Ok(_) => {},
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(worker = %id, skipped, "channel pump lagged");
                        },
                        Err(RecvError::Closed) => break,
                    }
                }
                // Exactly-once removal whatever tore the worker down.
                bus.deregister(id);
                debug!(worker = %id, "channel pump stopped");
            });
        });
        Ok(())
    }
}
