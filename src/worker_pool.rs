//! Worker pool: a fixed number of isolated execution contexts communicating
//! with the pool strictly by message passing, so an executor panic or an
//! unexpected worker exit cannot destabilise the scheduler or the API.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};

use crate::error::{AppError, Result};
use crate::executors::ExecutorRegistry;
use crate::job::Job;

type WorkerId = u64;

enum ToWorker {
    Execute {
        job: Job,
        resp: oneshot::Sender<WorkerOutcome>,
    },
    Terminate,
}

enum WorkerOutcome {
    Success(serde_json::Value),
    Failure(String),
    Crashed(String),
}

struct WorkerSlot {
    #[allow(dead_code)]
    id: WorkerId,
    tx: mpsc::Sender<ToWorker>,
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub available: usize,
    pub busy: usize,
}

/// A fixed-size pool of isolated worker tasks.
pub struct WorkerPool {
    registry: Arc<ExecutorRegistry>,
    idle_tx: mpsc::UnboundedSender<WorkerSlot>,
    idle_rx: Mutex<mpsc::UnboundedReceiver<WorkerSlot>>,
    next_id: AtomicU64,
    worker_count: AtomicUsize,
    busy_count: AtomicUsize,
    shutting_down: std::sync::atomic::AtomicBool,
    pool_size: usize,
    init_timeout: Duration,
}

impl WorkerPool {
    pub fn new(registry: Arc<ExecutorRegistry>, pool_size: usize, init_timeout: Duration) -> Arc<Self> {
        let (idle_tx, idle_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            registry,
            idle_tx,
            idle_rx: Mutex::new(idle_rx),
            next_id: AtomicU64::new(0),
            worker_count: AtomicUsize::new(0),
            busy_count: AtomicUsize::new(0),
            shutting_down: std::sync::atomic::AtomicBool::new(false),
            pool_size,
            init_timeout,
        })
    }

    /// Spawn `pool_size` workers, waiting for each to signal readiness.
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        for _ in 0..self.pool_size {
            self.spawn_worker().await?;
        }
        Ok(())
    }

    async fn spawn_worker(self: &Arc<Self>) -> Result<()> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (worker_tx, worker_rx) = mpsc::channel::<ToWorker>(1);
        let (ready_tx, ready_rx) = oneshot::channel::<()>();
        let registry = Arc::clone(&self.registry);

        tokio::spawn(worker_loop(id, worker_rx, ready_tx, registry));

        tokio::time::timeout(self.init_timeout, ready_rx)
            .await
            .map_err(|_| AppError::WorkerInitFailed(format!("worker {id} did not signal ready in time")))?
            .map_err(|_| AppError::WorkerInitFailed(format!("worker {id} dropped before signaling ready")))?;

        self.worker_count.fetch_add(1, Ordering::AcqRel);
        let _ = self.idle_tx.send(WorkerSlot { id, tx: worker_tx });
        tracing::debug!(worker_id = id, "worker ready");
        Ok(())
    }

    /// Start a replacement worker in the background. Failure is logged,
    /// never propagated to the caller whose job just failed.
    fn spawn_replacement(self: &Arc<Self>) {
        if self.shutting_down.load(Ordering::Acquire) {
            return;
        }
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = pool.spawn_worker().await {
                tracing::error!(error = %err, "failed to start replacement worker");
            }
        });
    }

    /// Run `job` on the next available worker, blocking until an outcome
    /// is known.
    pub async fn execute(self: &Arc<Self>, job: Job) -> Result<serde_json::Value> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(AppError::PoolShuttingDown);
        }

        let slot = {
            let mut rx = self.idle_rx.lock().await;
            rx.recv().await
        }
        .ok_or_else(|| AppError::Internal("worker pool closed".to_string()))?;

        self.busy_count.fetch_add(1, Ordering::AcqRel);
        let (resp_tx, resp_rx) = oneshot::channel();

        if slot.tx.send(ToWorker::Execute { job, resp: resp_tx }).await.is_err() {
            self.busy_count.fetch_sub(1, Ordering::AcqRel);
            self.worker_count.fetch_sub(1, Ordering::AcqRel);
            self.spawn_replacement();
            return Err(AppError::WorkerExited);
        }

        let outcome = resp_rx.await;
        self.busy_count.fetch_sub(1, Ordering::AcqRel);

        match outcome {
            Ok(WorkerOutcome::Success(value)) => {
                let _ = self.idle_tx.send(slot);
                Ok(value)
            }
            Ok(WorkerOutcome::Failure(error)) => {
                let _ = self.idle_tx.send(slot);
                Err(AppError::ExecutorError(error))
            }
            Ok(WorkerOutcome::Crashed(error)) => {
                self.worker_count.fetch_sub(1, Ordering::AcqRel);
                self.spawn_replacement();
                Err(AppError::WorkerCrashed(error))
            }
            Err(_) => {
                self.worker_count.fetch_sub(1, Ordering::AcqRel);
                self.spawn_replacement();
                Err(AppError::WorkerExited)
            }
        }
    }

    /// Enter draining state: reject new work, let busy workers finish
    /// their current job, then terminate every worker.
    pub async fn shutdown(self: &Arc<Self>) {
        self.shutting_down.store(true, Ordering::Release);
        loop {
            if self.worker_count.load(Ordering::Acquire) == 0 {
                break;
            }
            let slot = {
                let mut rx = self.idle_rx.lock().await;
                tokio::time::timeout(Duration::from_millis(100), rx.recv()).await
            };
            if let Ok(Some(slot)) = slot {
                let _ = slot.tx.send(ToWorker::Terminate).await;
                self.worker_count.fetch_sub(1, Ordering::AcqRel);
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        let total = self.worker_count.load(Ordering::Acquire);
        let busy = self.busy_count.load(Ordering::Acquire);
        PoolStats {
            total,
            available: total.saturating_sub(busy),
            busy,
        }
    }
}

async fn worker_loop(
    id: WorkerId,
    mut rx: mpsc::Receiver<ToWorker>,
    ready_tx: oneshot::Sender<()>,
    registry: Arc<ExecutorRegistry>,
) {
    if ready_tx.send(()).is_err() {
        return;
    }

    while let Some(message) = rx.recv().await {
        match message {
            ToWorker::Execute { job, resp } => {
                let outcome = run_job(&registry, job).await;
                let _ = resp.send(outcome);
            }
            ToWorker::Terminate => break,
        }
    }
    tracing::debug!(worker_id = id, "worker terminated");
}

/// Runs one job's executor inside its own task so a panic surfaces as a
/// `JoinError` instead of unwinding the worker loop.
async fn run_job(registry: &ExecutorRegistry, job: Job) -> WorkerOutcome {
    let Some(executor) = registry.get(job.job_type) else {
        return WorkerOutcome::Failure(format!("no executor registered for {:?}", job.job_type));
    };

    let payload = job.payload.clone();
    match tokio::spawn(async move { executor.execute(&payload).await }).await {
        Ok(Ok(value)) => WorkerOutcome::Success(value),
        Ok(Err(error)) => WorkerOutcome::Failure(error),
        Err(join_err) => WorkerOutcome::Crashed(join_err.to_string()),
    }
}
