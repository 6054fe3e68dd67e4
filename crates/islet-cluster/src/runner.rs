//! Driving a single request to completion under a deadline.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use islet_core::{Exception, HostMessage, LogEntry, Output, Packet};

use crate::driver::WorkerProcess;
use crate::wait::{LogBuffer, WaitError, wait_for_result};

/// Runs one packet against a worker, racing the result message with the
/// worker's own death and the wall-clock deadline.
///
/// On deadline: the wait is cancelled, the worker is killed, and the
/// output carries a `TimeoutError` exception. A worker that dies mid-run
/// resolves immediately with an `ExecutionError` instead of waiting the
/// deadline out. The timer and subscription are scoped to the call, so
/// every exit path clears them.
#[derive(Debug, Clone, Copy)]
pub struct Runner {
    timeout: Duration,
}

impl Runner {
    /// A runner with the given deadline.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn elapsed_ms(started: Instant) -> u64 {
        u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Send `packet` and await the worker's result or the deadline,
    /// whichever comes first. Never fails: every path produces an
    /// [`Output`].
    pub async fn run(&self, process: &WorkerProcess, packet: Packet) -> Output {
        let started = Instant::now();
        let cancel = CancellationToken::new();
        let mut rx = process.subscribe();
        let mut buffer = LogBuffer::new();

        if let Err(err) = process.send(HostMessage::Execute { data: packet }).await {
            warn!(worker = %process.id(), error = %err, "packet send failed");
            return Output::exception(
                Exception::ExecutionError,
                err.to_string(),
                Self::elapsed_ms(started),
            );
        }

        // The result message is raced against the worker's stream ending
        // (process death) and the deadline. Bind before matching so the
        // wait future (and its borrows) is dropped when the deadline
        // fires.
        let waited = tokio::time::timeout(self.timeout, async {
            tokio::select! {
                result = wait_for_result(&mut rx, &cancel, &mut buffer) => result,
                () = process.closed() => Err(WaitError::Closed),
            }
        })
        .await;

        match waited {
            Ok(Ok(output)) => {
                let mut logs = buffer.finish();
                logs.extend(output.logs);
                debug!(worker = %process.id(), ok = output.ok, "worker result received");
                Output {
                    logs,
                    duration: Self::elapsed_ms(started),
                    ..output
                }
            },
            Ok(Err(err)) => {
                warn!(worker = %process.id(), error = %err, "worker stream ended without result");
                let mut logs = buffer.finish();
                logs.push(LogEntry::from_exception(
                    Exception::ExecutionError,
                    "worker stream closed before result",
                ));
                Output::failure(logs, Self::elapsed_ms(started))
            },
            Err(_elapsed) => {
                cancel.cancel();
                process.kill().await;
                warn!(worker = %process.id(), timeout = ?self.timeout, "execution timeout");
                let mut logs = buffer.finish();
                logs.push(LogEntry::from_exception(
                    Exception::TimeoutError,
                    "Execution timeout",
                ));
                Output::failure(logs, Self::elapsed_ms(started))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::WorkerSpawner;
    use islet_core::PermissionSet;
    use std::collections::BTreeMap;

    fn silent_packet() -> Packet {
        Packet {
            code: "fn default() { 1 }".into(),
            input: None,
            entry: "default".into(),
            url: "data:text/plain;base64,".into(),
            globals: BTreeMap::new(),
            context: None,
        }
    }

    /// `cat` never speaks the protocol, so the deadline must fire and the
    /// output must carry a TimeoutError with a duration past the deadline.
    #[cfg(unix)]
    #[tokio::test]
    async fn deadline_kills_a_silent_worker() {
        let spawner = WorkerSpawner::new("/bin/cat");
        let process = spawner.spawn(&PermissionSet::none()).unwrap();
        let runner = Runner::new(Duration::from_millis(50));

        let output = runner.run(&process, silent_packet()).await;
        assert!(!output.ok);
        assert!(output.has_exception(Exception::TimeoutError));
        assert_eq!(output.logs.len(), 1);
        assert_eq!(output.logs[0].message, "Execution timeout");
        assert!(output.duration >= 50);
    }

    /// Killing twice must be safe.
    #[cfg(unix)]
    #[tokio::test]
    async fn kill_is_idempotent() {
        let spawner = WorkerSpawner::new("/bin/cat");
        let process = spawner.spawn(&PermissionSet::none()).unwrap();
        process.kill().await;
        process.kill().await;
    }
}
