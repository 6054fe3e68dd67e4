//! Host-side broadcast bus.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use islet_core::HostMessage;

use crate::error::{ChannelError, ChannelResult};

/// Identifier of a registered worker.
pub type WorkerId = Uuid;

/// Bus limits.
#[derive(Debug, Clone, Copy)]
pub struct ChannelLimits {
    /// Maximum serialized message size in bytes.
    pub max_message_bytes: usize,
    /// Maximum messages per worker inside the window.
    pub max_messages: usize,
    /// Sliding-window length.
    pub window: Duration,
}

impl Default for ChannelLimits {
    fn default() -> Self {
        Self {
            max_message_bytes: 100_000,
            max_messages: 100,
            window: Duration::from_secs(1),
        }
    }
}

/// Tracks send timestamps inside a sliding window.
#[derive(Debug, Default)]
struct SlidingWindow {
    sends: Vec<Instant>,
}

impl SlidingWindow {
    /// Record a send if the window has room. Returns false when the excess
    /// must be dropped.
    fn try_record(&mut self, now: Instant, limits: &ChannelLimits) -> bool {
        let cutoff = now.checked_sub(limits.window);
        self.sends
            .retain(|at| cutoff.is_none_or(|cutoff| *at > cutoff));
        if self.sends.len() >= limits.max_messages {
            return false;
        }
        self.sends.push(now);
        true
    }
}

/// The cross-isolate pub/sub bus.
///
/// Workers register at spawn time and must deregister exactly once on
/// teardown, whatever path tore them down (explicit kill, process error, or
/// a malformed message).
#[derive(Debug)]
pub struct ChannelBus {
    workers: DashMap<WorkerId, mpsc::Sender<HostMessage>>,
    windows: DashMap<WorkerId, SlidingWindow>,
    limits: ChannelLimits,
}

impl Default for ChannelBus {
    fn default() -> Self {
        Self::new(ChannelLimits::default())
    }
}

impl ChannelBus {
    /// A bus with the given limits.
    #[must_use]
    pub fn new(limits: ChannelLimits) -> Self {
        Self {
            workers: DashMap::new(),
            windows: DashMap::new(),
            limits,
        }
    }

    /// Register a worker's outbound queue.
    pub fn register(&self, worker: WorkerId, sender: mpsc::Sender<HostMessage>) {
        debug!(worker = %worker, "channel worker registered");
        self.workers.insert(worker, sender);
    }

    /// Remove a worker's registration. Returns whether it was present, so
    /// callers on multiple teardown paths can keep removal exactly-once.
    pub fn deregister(&self, worker: WorkerId) -> bool {
        self.windows.remove(&worker);
        let removed = self.workers.remove(&worker).is_some();
        if removed {
            debug!(worker = %worker, "channel worker deregistered");
        }
        removed
    }

    /// Number of registered workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Validate and re-broadcast a message from `from` to every other
    /// registered worker. Returns the number of workers it was queued to.
    ///
    /// # Errors
    ///
    /// [`ChannelError::MessageTooLarge`] for oversized payloads and
    /// [`ChannelError::RateLimited`] when the sender's window is full; in
    /// both cases nothing is forwarded.
    pub fn publish(&self, from: WorkerId, topic: &str, data: &Value) -> ChannelResult<usize> {
        let size = serde_json::to_string(data)?.len().saturating_add(topic.len());
        if size > self.limits.max_message_bytes {
            return Err(ChannelError::MessageTooLarge {
                size,
                limit: self.limits.max_message_bytes,
            });
        }

        let allowed = self
            .windows
            .entry(from)
            .or_default()
            .try_record(Instant::now(), &self.limits);
        if !allowed {
            return Err(ChannelError::RateLimited { worker: from });
        }

        let mut delivered: usize = 0;
        for entry in &self.workers {
            let (id, sender) = entry.pair();
            if *id == from {
                continue;
            }
            let message = HostMessage::Channel {
                topic: topic.to_string(),
                data: data.clone(),
            };
            match sender.try_send(message) {
                Ok(()) => delivered = delivered.saturating_add(1),
                Err(err) => {
                    warn!(worker = %id, error = %err, "channel delivery dropped");
                },
            }
        }
        trace!(from = %from, topic, delivered, "channel message broadcast");
        Ok(delivered)
    }
}
