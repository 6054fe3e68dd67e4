//! Spawning worker processes and pumping their messages.

use std::path::PathBuf;
use std::process::Stdio;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use islet_core::{HostMessage, PermissionSet, WorkerMessage, scrub_spawn_env};

use crate::error::{ClusterError, ClusterResult};

/// Capacity of the per-worker outbound queue.
const OUTBOUND_CAPACITY: usize = 64;

/// Capacity of the per-worker inbound broadcast.
const INBOUND_CAPACITY: usize = 1024;

/// Launches worker processes with a controlled environment.
///
/// The spawn environment is cleared, refilled through the shared blocklist,
/// and extended with the request's effective permission set so the worker
/// can enforce it from the inside.
#[derive(Debug, Clone)]
pub struct WorkerSpawner {
    command: PathBuf,
    args: Vec<String>,
    worker_config: Value,
}

impl WorkerSpawner {
    /// A spawner for the given worker binary.
    #[must_use]
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            worker_config: Value::Null,
        }
    }

    /// Extra arguments for the worker binary.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Service-level worker configuration, forwarded via the environment.
    #[must_use]
    pub fn with_worker_config(mut self, config: Value) -> Self {
        self.worker_config = config;
        self
    }

    /// Spawn a worker granted `permissions`.
    ///
    /// # Errors
    ///
    /// [`ClusterError::Spawn`] when the process cannot start and
    /// [`ClusterError::Wire`] when the permission set cannot be encoded.
    pub fn spawn(&self, permissions: &PermissionSet) -> ClusterResult<WorkerProcess> {
        let permissions_json =
            serde_json::to_string(permissions).map_err(islet_core::WireError::from)?;

        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .env_clear()
            .envs(scrub_spawn_env(std::env::vars()))
            .env("ISLET_PERMISSIONS", permissions_json)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !self.worker_config.is_null() {
            let config_json =
                serde_json::to_string(&self.worker_config).map_err(islet_core::WireError::from)?;
            command.env("ISLET_WORKER_CONFIG", config_json);
        }

        let child = command.spawn()?;
        WorkerProcess::start(child)
    }
}

/// A live worker process with its message pumps.
///
/// Inbound worker messages fan out on a broadcast channel (the runner's
/// wait, the channel bus pump, and the RPC pump each hold a subscription);
/// outbound host messages funnel through a bounded queue into stdin.
#[derive(Debug)]
pub struct WorkerProcess {
    id: Uuid,
    child: Mutex<Option<Child>>,
    outbound: mpsc::Sender<HostMessage>,
    inbound: broadcast::Sender<WorkerMessage>,
    closed: CancellationToken,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerProcess {
    fn start(mut child: Child) -> ClusterResult<Self> {
        let id = Uuid::new_v4();
        let closed = CancellationToken::new();
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ClusterError::Spawn(std::io::Error::other("worker stdin not piped")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClusterError::Spawn(std::io::Error::other("worker stdout not piped")))?;
        let stderr = child.stderr.take();

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (inbound_tx, _) = broadcast::channel(INBOUND_CAPACITY);

        let mut tasks = vec![
            tokio::spawn(Self::write_loop(id, outbound_rx, stdin)),
            tokio::spawn(Self::read_loop(id, stdout, inbound_tx.clone(), closed.clone())),
        ];
        if let Some(stderr) = stderr {
            tasks.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(worker = %id, "{line}");
                }
            }));
        }

        debug!(worker = %id, "worker spawned");
        Ok(Self {
            id,
            child: Mutex::new(Some(child)),
            outbound: outbound_tx,
            inbound: inbound_tx,
            closed,
            tasks: std::sync::Mutex::new(tasks),
        })
    }

    async fn write_loop(id: Uuid, mut rx: mpsc::Receiver<HostMessage>, mut stdin: ChildStdin) {
        while let Some(message) = rx.recv().await {
            let line = match message.encode() {
                Ok(line) => line,
                Err(err) => {
                    warn!(worker = %id, error = %err, "unencodable host message dropped");
                    continue;
                },
            };
            if stdin.write_all(line.as_bytes()).await.is_err()
                || stdin.write_all(b"\n").await.is_err()
                || stdin.flush().await.is_err()
            {
                debug!(worker = %id, "worker stdin closed");
                break;
            }
        }
    }

    async fn read_loop(
        id: Uuid,
        stdout: tokio::process::ChildStdout,
        inbound: broadcast::Sender<WorkerMessage>,
        closed: CancellationToken,
    ) {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match WorkerMessage::decode(&line) {
                    Ok(message) => {
                        trace!(worker = %id, "worker message received");
                        let _ = inbound.send(message);
                    },
                    Err(err) => {
                        warn!(worker = %id, error = %err, "malformed worker message dropped");
                    },
                },
                Ok(None) => {
                    debug!(worker = %id, "worker stdout closed");
                    break;
                },
                Err(err) => {
                    warn!(worker = %id, error = %err, "worker stdout read failed");
                    break;
                },
            }
        }
        // EOF means the process died or shut its pipe; wake anyone racing
        // the stream against a deadline.
        closed.cancel();
    }

    /// The worker's id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Subscribe to the worker's inbound messages.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerMessage> {
        self.inbound.subscribe()
    }

    /// A handle to the worker's outbound queue, e.g. for bus registration.
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<HostMessage> {
        self.outbound.clone()
    }

    /// Queue a message to the worker.
    ///
    /// # Errors
    ///
    /// [`ClusterError::TransportClosed`] when the worker is gone.
    pub async fn send(&self, message: HostMessage) -> ClusterResult<()> {
        self.outbound
            .send(message)
            .await
            .map_err(|_| ClusterError::TransportClosed)
    }

    /// Resolves once the worker's message stream has ended: the process
    /// exited, closed its pipe, or was killed.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Whether the worker's message stream has ended.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Terminate the worker and stop its pumps. Idempotent.
    pub async fn kill(&self) {
        self.closed.cancel();
        let mut slot = self.child.lock().await;
        if let Some(mut child) = slot.take() {
            if let Err(err) = child.start_kill() {
                warn!(worker = %self.id, error = %err, "worker kill failed");
            }
            let _ = child.wait().await;
            debug!(worker = %self.id, "worker killed");
        }
        drop(slot);
        let tasks = {
            let mut guard = self
                .tasks
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        for task in tasks {
            task.abort();
        }
    }
}
