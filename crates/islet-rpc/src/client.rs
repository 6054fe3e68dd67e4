//! Worker-side blocking RPC client.

use std::collections::HashMap;
use std::sync::mpsc::{RecvTimeoutError, Sender, SyncSender, sync_channel};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::trace;
use uuid::Uuid;

use islet_core::WorkerMessage;

/// Resolution of one pending call.
#[derive(Debug, Clone)]
pub enum RpcOutcome {
    /// The handler's result.
    Reply(Value),
    /// The handler failed or was missing.
    Error {
        /// Error message.
        error: String,
        /// Original error name.
        name: String,
    },
}

/// Errors surfaced to the calling snippet code.
#[derive(Debug, Error)]
pub enum RpcClientError {
    /// The remote handler failed; the original name is preserved.
    #[error("{name}: {message}")]
    Remote {
        /// Original error name.
        name: String,
        /// Error message.
        message: String,
    },

    /// No reply arrived before the client-side deadline.
    #[error("rpc call timed out after {0:?}")]
    Timeout(Duration),

    /// The transport to the host is gone.
    #[error("rpc transport disconnected")]
    Disconnected,
}

/// Blocking RPC client for worker threads.
///
/// `call` registers a pending slot keyed by a fresh UUID, posts the `rpc`
/// message, and parks until [`RpcClient::resolve`] delivers the matching
/// reply from the worker's inbound pump. Replies with no pending slot
/// (late or duplicate) are dropped.
#[derive(Debug, Clone)]
pub struct RpcClient {
    outbound: Sender<WorkerMessage>,
    pending: Arc<Mutex<HashMap<String, SyncSender<RpcOutcome>>>>,
    timeout: Duration,
}

impl RpcClient {
    /// A client posting calls to `outbound` with the given reply deadline.
    #[must_use]
    pub fn new(outbound: Sender<WorkerMessage>, timeout: Duration) -> Self {
        Self {
            outbound,
            pending: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    /// Call a host method and block until its reply.
    ///
    /// # Errors
    ///
    /// [`RpcClientError::Remote`] when the handler failed,
    /// [`RpcClientError::Timeout`] when no reply arrived in time, and
    /// [`RpcClientError::Disconnected`] when the transport is gone.
    pub fn call(&self, method: &str, args: Value) -> Result<Value, RpcClientError> {
        let id = Uuid::new_v4().to_string();
        let (reply_tx, reply_rx) = sync_channel(1);
        self.lock_pending().insert(id.clone(), reply_tx);

        let message = WorkerMessage::Rpc {
            id: id.clone(),
            method: method.to_string(),
            args,
        };
        if self.outbound.send(message).is_err() {
            self.lock_pending().remove(&id);
            return Err(RpcClientError::Disconnected);
        }

        match reply_rx.recv_timeout(self.timeout) {
            Ok(RpcOutcome::Reply(value)) => Ok(value),
            Ok(RpcOutcome::Error { error, name }) => Err(RpcClientError::Remote {
                name,
                message: error,
            }),
            Err(RecvTimeoutError::Timeout) => {
                self.lock_pending().remove(&id);
                Err(RpcClientError::Timeout(self.timeout))
            },
            Err(RecvTimeoutError::Disconnected) => Err(RpcClientError::Disconnected),
        }
    }

    /// Resolve a pending call. Returns false when no call with this id is
    /// pending (late or duplicate reply), in which case the outcome is
    /// dropped.
    pub fn resolve(&self, id: &str, outcome: RpcOutcome) -> bool {
        let Some(slot) = self.lock_pending().remove(id) else {
            trace!(id, "rpc reply with no pending call ignored");
            return false;
        };
        slot.send(outcome).is_ok()
    }

    /// Number of calls awaiting replies.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    fn lock_pending(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<String, SyncSender<RpcOutcome>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::mpsc::channel;
    use std::thread;

    #[test]
    fn call_resolves_on_matching_reply() {
        let (tx, rx) = channel();
        let client = RpcClient::new(tx, Duration::from_secs(1));
        let resolver = client.clone();

        let handle = thread::spawn(move || client.call("db.query", json!(["select 1"])));

        let id = match rx.recv().unwrap() {
            WorkerMessage::Rpc { id, method, .. } => {
                assert_eq!(method, "db.query");
                id
            },
            other => panic!("unexpected message: {other:?}"),
        };
        assert!(resolver.resolve(&id, RpcOutcome::Reply(json!([{"n": 1}]))));

        let result = handle.join().unwrap().unwrap();
        assert_eq!(result, json!([{"n": 1}]));
        assert_eq!(resolver.pending_count(), 0);
    }

    #[test]
    fn remote_errors_keep_their_name() {
        let (tx, rx) = channel();
        let client = RpcClient::new(tx, Duration::from_secs(1));
        let resolver = client.clone();

        let handle = thread::spawn(move || client.call("db.query", json!([])));
        let id = match rx.recv().unwrap() {
            WorkerMessage::Rpc { id, .. } => id,
            other => panic!("unexpected message: {other:?}"),
        };
        resolver.resolve(
            &id,
            RpcOutcome::Error {
                error: "relation missing".into(),
                name: "QueryError".into(),
            },
        );

        match handle.join().unwrap() {
            Err(RpcClientError::Remote { name, message }) => {
                assert_eq!(name, "QueryError");
                assert_eq!(message, "relation missing");
            },
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn late_and_duplicate_replies_are_ignored() {
        let (tx, _rx) = channel();
        let client = RpcClient::new(tx, Duration::from_millis(10));
        assert!(!client.resolve("ghost", RpcOutcome::Reply(json!(null))));

        // A timed-out call clears its slot, so the eventual reply is late.
        let err = client.call("slow", json!(null)).unwrap_err();
        assert!(matches!(err, RpcClientError::Timeout(_)));
        assert_eq!(client.pending_count(), 0);
    }
}
