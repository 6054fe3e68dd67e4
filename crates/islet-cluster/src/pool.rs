//! The min/max worker pool with health tracking and idle reaping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use islet_core::{Exception, Output, Packet, PermissionSet};

use crate::driver::{WorkerProcess, WorkerSpawner};
use crate::error::ClusterResult;
use crate::runner::Runner;

/// Pool tuning.
#[derive(Debug, Clone, Copy)]
pub struct ClusterConfig {
    /// Workers kept alive even past idle expiry.
    pub min: usize,
    /// Hard cap on concurrent workers.
    pub max: usize,
    /// Idle workers past this age are evicted (down to `min`).
    pub idle: Duration,
    /// Reaper period.
    pub reap_interval: Duration,
    /// Busy workers with no activity past this age are marked dead.
    pub stuck_busy: Duration,
    /// Idle workers past this age are marked suspected.
    pub suspect_idle: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            min: 2,
            max: 8,
            idle: Duration::from_millis(120_000),
            reap_interval: Duration::from_secs(30),
            stuck_busy: Duration::from_secs(60),
            suspect_idle: Duration::from_secs(300),
        }
    }
}

/// Health of one pooled worker.
///
/// `Ok → Suspected` on long idle; a `Suspected` worker is still
/// acquirable (after every `Ok` one) and transitions back to `Ok` when a
/// run releases it successfully. `Ok`/`Suspected → Dead` on stuck-busy;
/// `Dead` workers are killed and removed by the reaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerHealth {
    /// Usable.
    Ok,
    /// Long idle; healed on successful reuse.
    Suspected,
    /// Killed and removed at the next reap.
    Dead,
}

struct PoolWorker {
    process: Arc<WorkerProcess>,
    busy: bool,
    last_used: Instant,
    last_active: Instant,
    health: WorkerHealth,
}

/// Counts reported by [`WorkerCluster::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterStats {
    /// Pooled workers.
    pub total: usize,
    /// Workers with an in-flight request.
    pub busy: usize,
    /// Workers ready for acquisition.
    pub idle: usize,
    /// Workers currently marked suspected.
    pub suspected: usize,
}

type SpawnHook = Box<dyn Fn(&WorkerProcess) + Send + Sync>;

/// A bounded pool of reusable worker processes.
///
/// The pool's methods are the only mutators of worker state: acquisition
/// marks a worker busy (exclusive use), release returns it, and a worker
/// that timed out, crashed, or died mid-run is killed instead of
/// released. Spawn hooks let
/// the channel bus and RPC serving attach to every new worker.
pub struct WorkerCluster {
    spawner: WorkerSpawner,
    config: ClusterConfig,
    workers: Arc<Mutex<Vec<PoolWorker>>>,
    spawn_hooks: std::sync::RwLock<Vec<SpawnHook>>,
    reaper: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl WorkerCluster {
    /// Create a cluster and start its reaper. Must be called inside a
    /// tokio runtime.
    #[must_use]
    pub fn new(spawner: WorkerSpawner, config: ClusterConfig) -> Self {
        let workers: Arc<Mutex<Vec<PoolWorker>>> = Arc::new(Mutex::new(Vec::new()));
        let reaper = tokio::spawn(Self::reap_loop(Arc::clone(&workers), config));
        Self {
            spawner,
            config,
            workers,
            spawn_hooks: std::sync::RwLock::new(Vec::new()),
            reaper: std::sync::Mutex::new(Some(reaper)),
        }
    }

    /// The cluster configuration.
    #[must_use]
    pub fn config(&self) -> ClusterConfig {
        self.config
    }

    /// Attach a hook invoked for every newly spawned worker.
    pub fn add_spawn_hook(&self, hook: impl Fn(&WorkerProcess) + Send + Sync + 'static) {
        self.spawn_hooks
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(Box::new(hook));
    }

    fn spawn_process(&self, permissions: &PermissionSet) -> ClusterResult<Arc<WorkerProcess>> {
        let process = Arc::new(self.spawner.spawn(permissions)?);
        for hook in self
            .spawn_hooks
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
        {
            hook(&process);
        }
        Ok(process)
    }

    /// Spawn up to `count` workers, never exceeding the configured `max`.
    /// Returns the number actually spawned.
    pub async fn warmup(&self, count: usize) -> usize {
        let mut spawned: usize = 0;
        for _ in 0..count {
            let mut workers = self.workers.lock().await;
            if workers.len() >= self.config.max {
                break;
            }
            match self.spawn_process(&PermissionSet::none()) {
                Ok(process) => {
                    workers.push(PoolWorker {
                        process,
                        busy: false,
                        last_used: Instant::now(),
                        last_active: Instant::now(),
                        health: WorkerHealth::Ok,
                    });
                    spawned = spawned.saturating_add(1);
                },
                Err(err) => {
                    warn!(error = %err, "warmup spawn failed");
                    break;
                },
            }
        }
        if spawned > 0 {
            info!(spawned, "cluster warmed up");
        }
        spawned
    }

    /// Acquire an exclusive worker: the first `Ok` idle one, then an idle
    /// `Suspected` one (healed back to `Ok` when its run releases it), or
    /// a fresh spawn below `max`. Returns `None` when the pool is
    /// exhausted.
    pub async fn acquire(&self, permissions: &PermissionSet) -> Option<Arc<WorkerProcess>> {
        let mut workers = self.workers.lock().await;
        let pick = workers
            .iter()
            .position(|worker| worker.health == WorkerHealth::Ok && !worker.busy)
            .or_else(|| {
                workers
                    .iter()
                    .position(|worker| worker.health == WorkerHealth::Suspected && !worker.busy)
            });
        if let Some(index) = pick {
            let worker = &mut workers[index];
            worker.busy = true;
            worker.last_active = Instant::now();
            return Some(Arc::clone(&worker.process));
        }

        if workers.len() >= self.config.max {
            return None;
        }
        match self.spawn_process(permissions) {
            Ok(process) => {
                workers.push(PoolWorker {
                    process: Arc::clone(&process),
                    busy: true,
                    last_used: Instant::now(),
                    last_active: Instant::now(),
                    health: WorkerHealth::Ok,
                });
                Some(process)
            },
            Err(err) => {
                warn!(error = %err, "worker spawn failed during acquire");
                None
            },
        }
    }

    /// Return a worker after a successful run.
    async fn release(&self, id: Uuid) {
        let mut workers = self.workers.lock().await;
        if let Some(worker) = workers.iter_mut().find(|worker| worker.process.id() == id) {
            worker.busy = false;
            worker.last_used = Instant::now();
            worker.last_active = Instant::now();
            if worker.health == WorkerHealth::Suspected {
                worker.health = WorkerHealth::Ok;
            }
        }
    }

    /// Kill a worker and drop it from the pool.
    async fn discard(&self, id: Uuid) {
        let removed = {
            let mut workers = self.workers.lock().await;
            workers
                .iter()
                .position(|worker| worker.process.id() == id)
                .map(|index| workers.swap_remove(index))
        };
        if let Some(worker) = removed {
            worker.process.kill().await;
            debug!(worker = %id, "worker discarded");
        }
    }

    /// Run one packet on a pooled worker.
    ///
    /// Exhaustion yields a `ClusterError` output. A `TimeoutError` or
    /// `ExecutionError` result means the worker itself misbehaved or died
    /// (the deadline fired, the stream broke, or the runtime crashed), so
    /// the worker is killed and never released. Snippet-level failures
    /// (script throws, missing entries) keep their own exception names and
    /// release the worker back.
    pub async fn run(
        &self,
        packet: Packet,
        timeout: Duration,
        permissions: &PermissionSet,
    ) -> Output {
        let Some(process) = self.acquire(permissions).await else {
            warn!("worker pool exhausted");
            return Output::exception(Exception::ClusterError, "worker pool exhausted", 0);
        };

        let runner = Runner::new(timeout);
        let output = runner.run(&process, packet).await;

        let worker_failed = output.has_exception(Exception::TimeoutError)
            || output.has_exception(Exception::ExecutionError);
        if worker_failed {
            self.discard(process.id()).await;
        } else {
            self.release(process.id()).await;
        }
        output
    }

    async fn reap_loop(workers: Arc<Mutex<Vec<PoolWorker>>>, config: ClusterConfig) {
        let mut ticker = tokio::time::interval(config.reap_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let mut doomed: Vec<Arc<WorkerProcess>> = Vec::new();
            {
                let mut guard = workers.lock().await;
                let now = Instant::now();

                for worker in guard.iter_mut() {
                    if worker.busy
                        && now.duration_since(worker.last_active) > config.stuck_busy
                    {
                        warn!(worker = %worker.process.id(), "stuck busy worker marked dead");
                        worker.health = WorkerHealth::Dead;
                    } else if !worker.busy
                        && worker.health == WorkerHealth::Ok
                        && now.duration_since(worker.last_used) > config.suspect_idle
                    {
                        worker.health = WorkerHealth::Suspected;
                    }
                }

                let mut index = 0;
                while index < guard.len() {
                    if guard[index].health == WorkerHealth::Dead {
                        doomed.push(guard.swap_remove(index).process);
                        continue;
                    }
                    index = index.saturating_add(1);
                }

                // Evict idle-expired workers while keeping at least `min`.
                let mut index = 0;
                while index < guard.len() && guard.len() > config.min {
                    let worker = &guard[index];
                    if !worker.busy && now.duration_since(worker.last_used) > config.idle {
                        doomed.push(guard.swap_remove(index).process);
                        continue;
                    }
                    index = index.saturating_add(1);
                }
            }
            for process in doomed {
                process.kill().await;
            }
        }
    }

    /// Current pool counts.
    pub async fn stats(&self) -> ClusterStats {
        let workers = self.workers.lock().await;
        let busy = workers.iter().filter(|worker| worker.busy).count();
        let suspected = workers
            .iter()
            .filter(|worker| worker.health == WorkerHealth::Suspected)
            .count();
        ClusterStats {
            total: workers.len(),
            busy,
            idle: workers.len().saturating_sub(busy),
            suspected,
        }
    }

    /// Stop the reaper, kill every worker, and empty the pool.
    pub async fn destroy(&self) {
        if let Some(handle) = self
            .reaper
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        let drained: Vec<PoolWorker> = {
            let mut workers = self.workers.lock().await;
            workers.drain(..).collect()
        };
        for worker in drained {
            worker.process.kill().await;
        }
        info!("cluster destroyed");
    }
}

impl std::fmt::Debug for WorkerCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerCluster")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
