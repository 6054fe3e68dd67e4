//! The channel tool: the isolate's handle onto the cross-isolate bus.

use std::sync::{Arc, Mutex, PoisonError};

use rhai::{Dynamic, FnPtr};
use serde_json::Value;

use islet_core::WorkerMessage;

use crate::error::{ApiError, ToolError, ToolResult};
use crate::tool::{Tool, ToolHost, ToolScope};

/// The channel view injected as `channel`.
///
/// `emit` posts outward through the worker transport; subscriptions land on
/// the per-scope endpoint. Dispatching queued messages to handlers needs an
/// engine call context, so the engine-side bindings call [`ChannelApi::drain`]
/// at the safe points (`on`, `emit`, end of run) with their own dispatcher.
#[derive(Debug, Clone)]
pub struct ChannelApi {
    endpoint: Arc<Mutex<islet_channel::ChannelEndpoint<FnPtr>>>,
    outbound: std::sync::mpsc::Sender<WorkerMessage>,
}

impl ChannelApi {
    /// A handle over the worker's endpoint and outbound sink.
    #[must_use]
    pub fn new(
        endpoint: Arc<Mutex<islet_channel::ChannelEndpoint<FnPtr>>>,
        outbound: std::sync::mpsc::Sender<WorkerMessage>,
    ) -> Self {
        Self { endpoint, outbound }
    }

    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, islet_channel::ChannelEndpoint<FnPtr>> {
        self.endpoint.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Post a message to every other isolate subscribed to `topic`.
    ///
    /// # Errors
    ///
    /// `ChannelError` when the worker transport is gone.
    pub fn emit(&self, topic: &str, data: Value) -> Result<(), ApiError> {
        self.outbound
            .send(WorkerMessage::Channel {
                topic: topic.to_string(),
                data,
            })
            .map_err(|_| ApiError::new("ChannelError", "worker transport closed"))
    }

    /// Register `handler` for `topic`.
    ///
    /// # Errors
    ///
    /// `ChannelError` once the per-scope listener cap is reached.
    pub fn subscribe(&self, topic: &str, handler: FnPtr) -> Result<(), ApiError> {
        self.lock()
            .on(topic, handler)
            .map_err(|err| ApiError::new("ChannelError", err.to_string()))
    }

    /// Remove the handlers for `topic` registered under `handler_name`.
    /// Returns the number removed.
    pub fn unsubscribe(&self, topic: &str, handler_name: &str) -> usize {
        self.lock()
            .off(topic, |handler| handler.fn_name() == handler_name)
    }

    /// Queue an incoming broadcast from the host.
    pub fn deliver(&self, topic: &str, data: Value) -> bool {
        self.lock().enqueue(topic, data)
    }

    /// Drain queued messages through `dispatch`. Serial and re-entrancy
    /// safe; handler failures are `dispatch`'s concern.
    ///
    /// The endpoint lock is released between messages, so a handler may
    /// itself emit or subscribe without deadlocking; its emissions queue
    /// behind the in-flight drain.
    pub fn drain(&self, mut dispatch: impl FnMut(&FnPtr, &str, &Value)) -> usize {
        if !self.lock().begin_drain() {
            return 0;
        }
        let mut dispatched: usize = 0;
        loop {
            let next = self.lock().next_message();
            let Some((topic, data, handlers)) = next else {
                break;
            };
            for handler in &handlers {
                dispatch(handler, &topic, &data);
                dispatched = dispatched.saturating_add(1);
            }
        }
        self.lock().end_drain();
        dispatched
    }

    /// Surface a listener failure as a warning log entry; handler errors
    /// never abort a drain.
    pub fn report_handler_error(&self, message: &str) {
        let _ = self.outbound.send(WorkerMessage::Log {
            data: islet_core::LogEntry::new(
                islet_core::LogLevel::Warn,
                format!("channel handler failed: {message}"),
            ),
        });
    }

    /// Registered listeners across all topics.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.lock().listener_count()
    }

    /// Drop all listeners and queued messages.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// The registry entry installing [`ChannelApi`].
#[derive(Debug, Default)]
pub struct ChannelTool;

impl Tool for ChannelTool {
    fn name(&self) -> &'static str {
        "channel"
    }

    fn setup(&self, scope: &mut ToolScope, host: &ToolHost, _config: &Value) -> ToolResult<()> {
        let api = ChannelApi::new(Arc::clone(&host.channel), host.outbound.clone());
        scope
            .inject("channel", Dynamic::from(api))
            .map_err(|err| ToolError::Setup {
                tool: "channel".into(),
                message: err.to_string(),
            })
    }

    fn teardown(&self, _scope: &mut ToolScope, host: &ToolHost) -> ToolResult<()> {
        host.channel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::mpsc::channel;

    fn api() -> (ChannelApi, std::sync::mpsc::Receiver<WorkerMessage>) {
        let (tx, rx) = channel();
        let endpoint = Arc::new(Mutex::new(islet_channel::ChannelEndpoint::default()));
        (ChannelApi::new(endpoint, tx), rx)
    }

    #[test]
    fn emit_posts_a_channel_message() {
        let (api, rx) = api();
        api.emit("ticks", json!({"n": 1})).unwrap();
        match rx.try_recv().unwrap() {
            WorkerMessage::Channel { topic, data } => {
                assert_eq!(topic, "ticks");
                assert_eq!(data, json!({"n": 1}));
            },
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn deliver_then_drain_dispatches_in_order() {
        let (api, _rx) = api();
        api.subscribe("ticks", FnPtr::new("handler").unwrap()).unwrap();
        assert!(api.deliver("ticks", json!(1)));
        assert!(api.deliver("ticks", json!(2)));

        let mut seen = Vec::new();
        let dispatched = api.drain(|_, _, data| seen.push(data.clone()));
        assert_eq!(dispatched, 2);
        assert_eq!(seen, vec![json!(1), json!(2)]);
    }

    #[test]
    fn unsubscribe_matches_by_handler_name() {
        let (api, _rx) = api();
        api.subscribe("t", FnPtr::new("a").unwrap()).unwrap();
        api.subscribe("t", FnPtr::new("b").unwrap()).unwrap();
        assert_eq!(api.unsubscribe("t", "a"), 1);
        assert_eq!(api.listener_count(), 1);
    }
}
