//! Aggregates event-bus counters and component snapshots into a single
//! status document, and emits a periodic summary log line. Not on the
//! critical path: a failure here must never affect job processing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::bus::{EventBus, JobEvent};
use crate::queue_manager::QueueManager;
use crate::store::StoreStats;
use crate::worker_pool::{PoolStats, WorkerPool};

#[derive(Default)]
struct Counters {
    created: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    retrying: AtomicU64,
    dead: AtomicU64,
}

/// Tracks job lifecycle counts and exposes a combined health snapshot.
pub struct HealthMonitor {
    counters: Arc<Counters>,
    queue_manager: Arc<QueueManager>,
    worker_pool: Arc<WorkerPool>,
    started_at: Instant,
    pid: u32,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub pid: u32,
    pub memory_kb: Option<u64>,
    pub jobs_created: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_retrying: u64,
    pub jobs_dead: u64,
    pub store: StoreStats,
    pub pool: PoolStats,
}

impl HealthMonitor {
    pub fn new(bus: Arc<EventBus>, queue_manager: Arc<QueueManager>, worker_pool: Arc<WorkerPool>) -> Arc<Self> {
        let counters = Arc::new(Counters::default());
        let monitor = Arc::new(Self {
            counters: Arc::clone(&counters),
            queue_manager,
            worker_pool,
            started_at: Instant::now(),
            pid: std::process::id(),
        });

        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => record(&counters, &event),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        monitor
    }

    pub async fn status(&self) -> HealthStatus {
        HealthStatus {
            status: "ok",
            uptime_secs: self.started_at.elapsed().as_secs(),
            pid: self.pid,
            memory_kb: read_memory_kb(),
            jobs_created: self.counters.created.load(Ordering::Relaxed),
            jobs_completed: self.counters.completed.load(Ordering::Relaxed),
            jobs_failed: self.counters.failed.load(Ordering::Relaxed),
            jobs_retrying: self.counters.retrying.load(Ordering::Relaxed),
            jobs_dead: self.counters.dead.load(Ordering::Relaxed),
            store: self.queue_manager.stats().await,
            pool: self.worker_pool.stats(),
        }
    }

    /// Spawns the periodic summary-log task. Intended to be called once
    /// at startup; runs until the process exits.
    pub fn spawn_summary_loop(self: &Arc<Self>, interval: Duration) {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let status = monitor.status().await;
                tracing::info!(
                    uptime_secs = status.uptime_secs,
                    jobs_created = status.jobs_created,
                    jobs_completed = status.jobs_completed,
                    jobs_failed = status.jobs_failed,
                    jobs_retrying = status.jobs_retrying,
                    jobs_dead = status.jobs_dead,
                    pool_busy = status.pool.busy,
                    pool_total = status.pool.total,
                    "health summary"
                );
            }
        });
    }
}

fn record(counters: &Counters, event: &JobEvent) {
    match event {
        JobEvent::Created { .. } => counters.created.fetch_add(1, Ordering::Relaxed),
        JobEvent::Completed { .. } => counters.completed.fetch_add(1, Ordering::Relaxed),
        JobEvent::Failed { .. } => counters.failed.fetch_add(1, Ordering::Relaxed),
        JobEvent::Retrying { .. } => counters.retrying.fetch_add(1, Ordering::Relaxed),
        JobEvent::Dead { .. } => counters.dead.fetch_add(1, Ordering::Relaxed),
        JobEvent::Started { .. } => return,
    };
}

/// Best-effort resident memory in KB, read from `/proc/self/statm` on
/// Linux. `None` on platforms without it.
#[cfg(target_os = "linux")]
fn read_memory_kb() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    let page_size_kb = 4; // typical Linux page size; best-effort only
    Some(pages * page_size_kb)
}

#[cfg(not(target_os = "linux"))]
fn read_memory_kb() -> Option<u64> {
    None
}
