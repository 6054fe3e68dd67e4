//! Isolate-side channel state.

use std::collections::{BTreeMap, VecDeque};

use serde_json::Value;
use tracing::{trace, warn};

use crate::error::{ChannelError, ChannelResult};

/// Default bound on queued incoming messages.
const DEFAULT_QUEUE_CAP: usize = 100;

/// Default bound on registered listeners per scope.
const DEFAULT_LISTENER_CAP: usize = 100;

/// Per-scope channel state inside a worker.
///
/// Incoming messages land on a bounded queue (messages can arrive before
/// any listener subscribes); [`ChannelEndpoint::flush`] drains it serially,
/// dispatching each message to every listener registered for its topic.
/// The `busy` flag makes a re-entrant flush a no-op, which keeps dispatch
/// order FIFO even when a handler emits while the queue is draining.
#[derive(Debug)]
pub struct ChannelEndpoint<H> {
    listeners: BTreeMap<String, Vec<H>>,
    queue: VecDeque<(String, Value)>,
    busy: bool,
    dropped: usize,
    queue_cap: usize,
    listener_cap: usize,
}

impl<H> Default for ChannelEndpoint<H> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAP, DEFAULT_LISTENER_CAP)
    }
}

impl<H> ChannelEndpoint<H> {
    /// An endpoint with explicit bounds.
    #[must_use]
    pub fn new(queue_cap: usize, listener_cap: usize) -> Self {
        Self {
            listeners: BTreeMap::new(),
            queue: VecDeque::new(),
            busy: false,
            dropped: 0,
            queue_cap,
            listener_cap,
        }
    }

    /// Register a listener for `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::ListenerCap`] once the per-scope cap is
    /// reached.
    pub fn on(&mut self, topic: impl Into<String>, handler: H) -> ChannelResult<()> {
        if self.listener_count() >= self.listener_cap {
            return Err(ChannelError::ListenerCap {
                cap: self.listener_cap,
            });
        }
        self.listeners.entry(topic.into()).or_default().push(handler);
        Ok(())
    }

    /// Remove the listeners for `topic` that `matches` selects. Returns the
    /// number removed.
    pub fn off(&mut self, topic: &str, matches: impl Fn(&H) -> bool) -> usize {
        let Some(handlers) = self.listeners.get_mut(topic) else {
            return 0;
        };
        let before = handlers.len();
        handlers.retain(|handler| !matches(handler));
        let removed = before.saturating_sub(handlers.len());
        if handlers.is_empty() {
            self.listeners.remove(topic);
        }
        removed
    }

    /// Queue an incoming message. Returns false when the queue is full and
    /// the message was dropped.
    pub fn enqueue(&mut self, topic: impl Into<String>, data: Value) -> bool {
        if self.queue.len() >= self.queue_cap {
            self.dropped = self.dropped.saturating_add(1);
            warn!(dropped = self.dropped, "channel queue full, message dropped");
            return false;
        }
        self.queue.push_back((topic.into(), data));
        true
    }

    /// Drain the queue serially, invoking `dispatch` for each (listener,
    /// topic, payload) triple. Handler failures are `dispatch`'s concern
    /// and must not abort the drain. Returns the number of dispatches.
    ///
    /// Re-entrant calls return 0 immediately. Callers that share the
    /// endpoint behind a mutex and whose dispatchers may re-enter it must
    /// use [`ChannelEndpoint::begin_drain`] / [`ChannelEndpoint::next_message`]
    /// instead, releasing the lock between messages.
    pub fn flush(&mut self, mut dispatch: impl FnMut(&H, &str, &Value)) -> usize {
        if !self.begin_drain() {
            return 0;
        }
        let mut dispatched: usize = 0;
        while let Some((topic, data)) = self.queue.pop_front() {
            if let Some(handlers) = self.listeners.get(&topic) {
                for handler in handlers {
                    dispatch(handler, &topic, &data);
                    dispatched = dispatched.saturating_add(1);
                }
            } else {
                trace!(topic = %topic, "channel message with no listener discarded");
            }
        }
        self.end_drain();
        dispatched
    }

    /// Claim the drain. Returns false when a drain is already in flight,
    /// which keeps dispatch order FIFO under re-entrant emits.
    pub fn begin_drain(&mut self) -> bool {
        if self.busy {
            return false;
        }
        self.busy = true;
        true
    }

    /// Release the drain claimed by [`ChannelEndpoint::begin_drain`].
    pub fn end_drain(&mut self) {
        self.busy = false;
    }

    /// Pop the next queued message together with a snapshot of its
    /// listeners. Part of the lock-split drain protocol: call under the
    /// lock, dispatch outside it.
    pub fn next_message(&mut self) -> Option<(String, Value, Vec<H>)>
    where
        H: Clone,
    {
        loop {
            let (topic, data) = self.queue.pop_front()?;
            match self.listeners.get(&topic) {
                Some(handlers) if !handlers.is_empty() => {
                    return Some((topic, data, handlers.clone()));
                },
                _ => trace!(topic = %topic, "channel message with no listener discarded"),
            }
        }
    }

    /// Total registered listeners across all topics.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }

    /// Listeners registered for one topic.
    #[must_use]
    pub fn topic_listener_count(&self, topic: &str) -> usize {
        self.listeners.get(topic).map_or(0, Vec::len)
    }

    /// Queued messages not yet flushed.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Messages dropped at the queue cap.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Drop all listeners and queued messages; used at scope teardown.
    pub fn clear(&mut self) {
        self.listeners.clear();
        self.queue.clear();
        self.busy = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn messages_queued_before_subscription_are_dispatched() {
        let mut endpoint: ChannelEndpoint<&str> = ChannelEndpoint::default();
        assert!(endpoint.enqueue("ticks", json!(1)));
        assert!(endpoint.enqueue("ticks", json!(2)));
        endpoint.on("ticks", "handler-a").unwrap();

        let mut seen = Vec::new();
        let dispatched = endpoint.flush(|handler, topic, data| {
            seen.push((*handler, topic.to_string(), data.clone()));
        });
        assert_eq!(dispatched, 2);
        assert_eq!(seen[0].2, json!(1));
        assert_eq!(seen[1].2, json!(2));
        assert_eq!(endpoint.queued(), 0);
    }

    #[test]
    fn queue_cap_drops_and_counts() {
        let mut endpoint: ChannelEndpoint<&str> = ChannelEndpoint::new(2, 10);
        assert!(endpoint.enqueue("t", json!(1)));
        assert!(endpoint.enqueue("t", json!(2)));
        assert!(!endpoint.enqueue("t", json!(3)));
        assert_eq!(endpoint.dropped(), 1);
        assert_eq!(endpoint.queued(), 2);
    }

    #[test]
    fn listener_cap_is_enforced() {
        let mut endpoint: ChannelEndpoint<usize> = ChannelEndpoint::new(10, 2);
        endpoint.on("a", 1).unwrap();
        endpoint.on("b", 2).unwrap();
        assert!(matches!(
            endpoint.on("c", 3),
            Err(ChannelError::ListenerCap { cap: 2 })
        ));
    }

    #[test]
    fn off_removes_matching_listeners_only() {
        let mut endpoint: ChannelEndpoint<&str> = ChannelEndpoint::default();
        endpoint.on("t", "a").unwrap();
        endpoint.on("t", "b").unwrap();
        assert_eq!(endpoint.off("t", |h| *h == "a"), 1);
        assert_eq!(endpoint.topic_listener_count("t"), 1);
        assert_eq!(endpoint.off("missing", |_| true), 0);
    }

    #[test]
    fn messages_without_listeners_are_discarded() {
        let mut endpoint: ChannelEndpoint<&str> = ChannelEndpoint::default();
        endpoint.enqueue("orphan", json!(1));
        let dispatched = endpoint.flush(|_, _, _| {});
        assert_eq!(dispatched, 0);
        assert_eq!(endpoint.queued(), 0);
    }
}
