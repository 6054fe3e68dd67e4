//! Line-delimited JSON messages exchanged with worker processes.
//!
//! Each message is one JSON object per line. The host writes
//! [`HostMessage`]s to the worker's stdin; the worker writes
//! [`WorkerMessage`]s to its stdout. The worker's stderr is reserved for its
//! own tracing output and never carries protocol data.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::output::{LogEntry, Output};
use crate::packet::Packet;

/// Wire protocol failures.
#[derive(Debug, Error)]
pub enum WireError {
    /// A line was not a valid protocol message.
    #[error("malformed wire message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Messages the host sends to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostMessage {
    /// Run a request.
    #[serde(rename = "execute")]
    Execute {
        /// The request packet.
        data: Packet,
    },
    /// A channel broadcast from another worker.
    #[serde(rename = "channel")]
    Channel {
        /// Topic name.
        topic: String,
        /// Message payload.
        data: Value,
    },
    /// A successful RPC reply.
    #[serde(rename = "rpc:reply")]
    RpcReply {
        /// Correlation id of the originating call.
        id: String,
        /// The handler's result.
        result: Value,
    },
    /// A failed RPC reply.
    #[serde(rename = "rpc:error")]
    RpcError {
        /// Correlation id of the originating call.
        id: String,
        /// Error message.
        error: String,
        /// Original error name, preserved across the bridge.
        name: String,
    },
}

/// Messages a worker sends to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    /// A captured log entry.
    #[serde(rename = "log")]
    Log {
        /// The entry.
        data: LogEntry,
    },
    /// The final result of the in-flight request.
    #[serde(rename = "result")]
    Result {
        /// The execution output. Logs arrive separately; the host merges
        /// its buffered entries into the final output.
        data: Output,
    },
    /// A cross-isolate channel message.
    #[serde(rename = "channel")]
    Channel {
        /// Topic name.
        topic: String,
        /// Message payload.
        data: Value,
    },
    /// An RPC call to a host-side handler.
    #[serde(rename = "rpc")]
    Rpc {
        /// Correlation id, unique per call.
        id: String,
        /// Handler name, e.g. `db.query`.
        method: String,
        /// Handler arguments.
        args: Value,
    },
}

impl HostMessage {
    /// Encode as one protocol line (no trailing newline).
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Malformed`] if the message cannot be serialized.
    pub fn encode(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode one protocol line.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Malformed`] for anything that is not a valid
    /// host message.
    pub fn decode(line: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(line)?)
    }
}

impl WorkerMessage {
    /// Encode as one protocol line (no trailing newline).
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Malformed`] if the message cannot be serialized.
    pub fn encode(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode one protocol line.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Malformed`] for anything that is not a valid
    /// worker message.
    pub fn decode(line: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(line)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::LogLevel;
    use serde_json::json;

    #[test]
    fn worker_messages_tag_by_type() {
        let msg = WorkerMessage::Log {
            data: LogEntry::new(LogLevel::Log, "a"),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "log");

        let msg = WorkerMessage::Rpc {
            id: "1".into(),
            method: "db.query".into(),
            args: json!([]),
        };
        assert_eq!(serde_json::to_value(&msg).unwrap()["type"], "rpc");
    }

    #[test]
    fn rpc_error_reply_round_trips() {
        let line = HostMessage::RpcError {
            id: "abc".into(),
            error: "relation missing".into(),
            name: "QueryError".into(),
        }
        .encode()
        .unwrap();
        match HostMessage::decode(&line).unwrap() {
            HostMessage::RpcError { id, name, .. } => {
                assert_eq!(id, "abc");
                assert_eq!(name, "QueryError");
            },
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(WorkerMessage::decode(r#"{"type":"mystery"}"#).is_err());
        assert!(HostMessage::decode("not json").is_err());
    }
}
