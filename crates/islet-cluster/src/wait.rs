//! The host-side log buffer and result wait.

use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use islet_core::{LogEntry, LogLevel, Output, WorkerMessage};

/// Maximum retained log entries per in-flight request.
const MAX_ENTRIES: usize = 1000;

/// Maximum characters per log message before truncation.
const MAX_MESSAGE_CHARS: usize = 10_000;

/// Why a wait ended without a result.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WaitError {
    /// The caller's cancellation signal fired; the subscription was
    /// dropped.
    #[error("wait aborted")]
    Aborted,

    /// The worker's message stream closed without a result.
    #[error("worker stream closed before result")]
    Closed,
}

/// Bounded in-memory buffer for one request's log entries.
///
/// Retains at most 1000 entries; longer messages are truncated with a
/// marker suffix; every overflow is counted and reported as one synthetic
/// warning when the buffer is finished.
#[derive(Debug, Default)]
pub struct LogBuffer {
    entries: Vec<LogEntry>,
    dropped: u64,
}

impl LogBuffer {
    /// An empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, truncating and counting drops as needed.
    pub fn push(&mut self, mut entry: LogEntry) {
        if self.entries.len() >= MAX_ENTRIES {
            self.dropped = self.dropped.saturating_add(1);
            return;
        }
        let chars = entry.message.chars().count();
        if chars > MAX_MESSAGE_CHARS {
            let kept: String = entry.message.chars().take(MAX_MESSAGE_CHARS).collect();
            let cut = chars.saturating_sub(MAX_MESSAGE_CHARS);
            entry.message = format!("{kept}...[truncated {cut} chars]");
        }
        self.entries.push(entry);
    }

    /// Count entries lost to a lagging subscription.
    pub fn note_lag(&mut self, skipped: u64) {
        self.dropped = self.dropped.saturating_add(skipped);
    }

    /// Entries buffered so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries dropped past the cap.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Consume the buffer, appending one synthetic warning when entries
    /// were dropped.
    #[must_use]
    pub fn finish(mut self) -> Vec<LogEntry> {
        if self.dropped > 0 {
            self.entries.push(LogEntry::new(
                LogLevel::Warn,
                format!("{} log entr(ies) dropped past the buffer limit", self.dropped),
            ));
        }
        self.entries
    }
}

/// Await the worker's `result` message, buffering its logs.
///
/// Channel and RPC messages on the stream belong to the side pumps and are
/// skipped here. Cancelling drops the subscription and rejects the wait.
///
/// # Errors
///
/// [`WaitError::Aborted`] when `cancel` fires first, [`WaitError::Closed`]
/// when the stream ends without a result.
pub async fn wait_for_result(
    rx: &mut broadcast::Receiver<WorkerMessage>,
    cancel: &CancellationToken,
    buffer: &mut LogBuffer,
) -> Result<Output, WaitError> {
    loop {
        tokio::select! {
            () = cancel.cancelled() => return Err(WaitError::Aborted),
            message = rx.recv() => match message {
                Ok(WorkerMessage::Log { data }) => buffer.push(data),
                Ok(WorkerMessage::Result { data }) => return Ok(data),
                Ok(_) => trace!("non-result worker message skipped by wait"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => buffer.note_lag(skipped),
                Err(broadcast::error::RecvError::Closed) => return Err(WaitError::Closed),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use islet_core::LogLevel;

    #[test]
    fn overflow_keeps_exactly_the_cap_plus_one_warning() {
        let mut buffer = LogBuffer::new();
        for i in 0..1005 {
            buffer.push(LogEntry::new(LogLevel::Log, format!("line {i}")));
        }
        assert_eq!(buffer.len(), 1000);
        assert_eq!(buffer.dropped(), 5);

        let entries = buffer.finish();
        assert_eq!(entries.len(), 1001);
        let warning = entries.last().unwrap();
        assert_eq!(warning.level, LogLevel::Warn);
        assert!(warning.message.contains('5'));
    }

    #[test]
    fn long_messages_are_truncated_with_suffix() {
        let mut buffer = LogBuffer::new();
        buffer.push(LogEntry::new(LogLevel::Log, "x".repeat(10_050)));
        let entries = buffer.finish();
        assert!(entries[0].message.ends_with("...[truncated 50 chars]"));
        assert!(entries[0].message.starts_with("xxx"));
    }

    #[test]
    fn clean_buffer_adds_no_warning() {
        let mut buffer = LogBuffer::new();
        buffer.push(LogEntry::new(LogLevel::Log, "a"));
        assert_eq!(buffer.finish().len(), 1);
    }

    #[tokio::test]
    async fn wait_resolves_on_result_preserving_log_order() {
        let (tx, mut rx) = broadcast::channel(16);
        let cancel = CancellationToken::new();
        let mut buffer = LogBuffer::new();

        tx.send(WorkerMessage::Log {
            data: LogEntry::new(LogLevel::Log, "a"),
        })
        .unwrap();
        tx.send(WorkerMessage::Log {
            data: LogEntry::new(LogLevel::Warn, "b"),
        })
        .unwrap();
        tx.send(WorkerMessage::Result {
            data: Output::success(Some(serde_json::json!(1)), Vec::new(), 0),
        })
        .unwrap();

        let output = wait_for_result(&mut rx, &cancel, &mut buffer).await.unwrap();
        assert!(output.ok);
        let logs = buffer.finish();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "a");
        assert_eq!(logs[1].message, "b");
    }

    #[tokio::test]
    async fn cancellation_rejects_the_wait() {
        let (tx, mut rx) = broadcast::channel(16);
        let cancel = CancellationToken::new();
        let mut buffer = LogBuffer::new();

        cancel.cancel();
        let result = wait_for_result(&mut rx, &cancel, &mut buffer).await;
        assert_eq!(result, Err(WaitError::Aborted));
        drop(tx);
    }
}
