//! Polls the ready set and dispatches jobs to the worker pool, one
//! concurrent dispatch per job id.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};

use crate::job::JobId;
use crate::queue_manager::QueueManager;
use crate::worker_pool::WorkerPool;

/// Drives dispatch of ready jobs onto the worker pool at a fixed poll
/// interval. `pause`/`resume` stop and restart polling without touching
/// executions already in flight.
pub struct Scheduler {
    queue_manager: Arc<QueueManager>,
    worker_pool: Arc<WorkerPool>,
    poll_interval: Duration,
    in_flight: Mutex<HashSet<JobId>>,
    paused: AtomicBool,
    stopped: AtomicBool,
    idle_notify: Notify,
}

impl Scheduler {
    pub fn new(queue_manager: Arc<QueueManager>, worker_pool: Arc<WorkerPool>, poll_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            queue_manager,
            worker_pool,
            poll_interval,
            in_flight: Mutex::new(HashSet::new()),
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            idle_notify: Notify::new(),
        })
    }

    /// Runs the poll loop until `stop()` is called. Intended to be spawned
    /// as its own task.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            if self.stopped.load(Ordering::Acquire) {
                break;
            }
            if self.paused.load(Ordering::Acquire) {
                continue;
            }
            self.dispatch_ready().await;
        }
    }

    async fn dispatch_ready(self: &Arc<Self>) {
        let ready = self.queue_manager.ready_for_execution().await;
        for job in ready {
            let already_dispatched = {
                let mut in_flight = self.in_flight.lock().await;
                if in_flight.contains(&job.id) {
                    true
                } else {
                    in_flight.insert(job.id);
                    false
                }
            };
            if already_dispatched {
                continue;
            }

            if self.queue_manager.start(job.id).await.is_err() {
                self.in_flight.lock().await.remove(&job.id);
                continue;
            }

            let scheduler = Arc::clone(self);
            let job_for_pool = job.clone();
            tokio::spawn(async move {
                let outcome = scheduler.worker_pool.execute(job_for_pool).await;
                match outcome {
                    Ok(_) => {
                        let _ = scheduler.queue_manager.complete(job.id).await;
                    }
                    Err(err) => {
                        let _ = scheduler.queue_manager.fail(job.id, err.to_string()).await;
                    }
                }
                let mut in_flight = scheduler.in_flight.lock().await;
                in_flight.remove(&job.id);
                if in_flight.is_empty() {
                    scheduler.idle_notify.notify_waiters();
                }
            });
        }
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Blocks until the in-flight set is empty.
    pub async fn wait_for_active_executions(&self) {
        loop {
            if self.in_flight.lock().await.is_empty() {
                return;
            }
            let notified = self.idle_notify.notified();
            if self.in_flight.lock().await.is_empty() {
                return;
            }
            notified.await;
        }
    }

    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::executors::{Executor, ExecutorRegistry};
    use crate::job::JobType;
    use crate::store::JobStore;
    use async_trait::async_trait;

    struct EchoExecutor;
    #[async_trait]
    impl Executor for EchoExecutor {
        async fn execute(&self, payload: &serde_json::Value) -> std::result::Result<serde_json::Value, String> {
            Ok(payload.clone())
        }
    }

    struct AlwaysFailExecutor;
    #[async_trait]
    impl Executor for AlwaysFailExecutor {
        async fn execute(&self, _payload: &serde_json::Value) -> std::result::Result<serde_json::Value, String> {
            Err("nope".to_string())
        }
    }

    async fn setup(executor: Arc<dyn Executor>) -> (Arc<QueueManager>, Arc<Scheduler>) {
        let store = Arc::new(JobStore::new(100, 3, 10));
        let bus = Arc::new(EventBus::new());
        let queue_manager = Arc::new(QueueManager::new(store, bus));
        let registry = Arc::new(ExecutorRegistry::new().register(JobType::SendEmail, executor));
        let pool = WorkerPool::new(registry, 2, Duration::from_secs(1));
        pool.initialize().await.unwrap();
        let scheduler = Scheduler::new(Arc::clone(&queue_manager), pool, Duration::from_millis(10));
        (queue_manager, scheduler)
    }

    #[tokio::test]
    async fn dispatches_pending_job_to_completion() {
        let (queue_manager, scheduler) = setup(Arc::new(EchoExecutor)).await;
        let job = queue_manager
            .submit(JobType::SendEmail, serde_json::json!({"n": 1}), None)
            .await
            .unwrap();

        let handle = tokio::spawn(Arc::clone(&scheduler).run());
        for _ in 0..100 {
            if let Some(j) = queue_manager.get(job.id).await {
                if j.status == crate::job::JobStatus::Completed {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        scheduler.stop();
        handle.abort();

        let final_job = queue_manager.get(job.id).await.unwrap();
        assert_eq!(final_job.status, crate::job::JobStatus::Completed);
    }

    #[tokio::test]
    async fn pause_stops_the_poll_loop_from_dispatching() {
        let (queue_manager, scheduler) = setup(Arc::new(AlwaysFailExecutor)).await;
        scheduler.pause();
        let handle = tokio::spawn(Arc::clone(&scheduler).run());

        queue_manager
            .submit(JobType::SendEmail, serde_json::json!({}), None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        scheduler.stop();
        handle.abort();

        assert_eq!(scheduler.in_flight_count().await, 0);
        let stats = queue_manager.stats().await;
        assert_eq!(stats.pending, 1);
    }

    #[tokio::test]
    async fn wait_for_active_executions_returns_once_drained() {
        let (queue_manager, scheduler) = setup(Arc::new(EchoExecutor)).await;
        queue_manager
            .submit(JobType::SendEmail, serde_json::json!({}), None)
            .await
            .unwrap();

        scheduler.dispatch_ready().await;
        tokio::time::timeout(Duration::from_secs(2), scheduler.wait_for_active_executions())
            .await
            .expect("should not deadlock");
    }
}
