//! Runs registered teardown steps in order on receipt of a termination
//! signal, bounded by a global deadline.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

type Step = Box<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Coordinates graceful shutdown: each registered step runs in order,
/// with a single overall deadline rather than a per-step one.
pub struct ShutdownCoordinator {
    steps: Vec<(String, Step)>,
    timeout: Duration,
    shutting_down: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            steps: Vec::new(),
            timeout,
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register an async teardown step, run in registration order.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, step: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.steps.push((name.into(), Box::new(move || Box::pin(step()))));
    }

    /// Run every registered step in order, bounded by the overall
    /// timeout. A repeat call while already running is a no-op. Returns
    /// `true` if every step completed within the deadline.
    pub async fn run(&self) -> bool {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            tracing::warn!("shutdown already in progress, ignoring repeat signal");
            return false;
        }

        let deadline = tokio::time::Instant::now() + self.timeout;
        for (name, step) in &self.steps {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                tracing::error!(step = %name, "shutdown deadline exceeded before step could run");
                return false;
            }
            match tokio::time::timeout(remaining, step()).await {
                Ok(()) => tracing::info!(step = %name, "shutdown step completed"),
                Err(_) => {
                    tracing::error!(step = %name, "shutdown step exceeded deadline");
                    return false;
                }
            }
        }
        true
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn steps_run_in_registration_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut coordinator = ShutdownCoordinator::new(Duration::from_secs(1));

        let o1 = Arc::clone(&order);
        coordinator.register("first", move || {
            let o1 = Arc::clone(&o1);
            async move { o1.lock().unwrap().push(1) }
        });
        let o2 = Arc::clone(&order);
        coordinator.register("second", move || {
            let o2 = Arc::clone(&o2);
            async move { o2.lock().unwrap().push(2) }
        });

        assert!(coordinator.run().await);
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn a_failing_step_does_not_short_circuit_the_rest() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut coordinator = ShutdownCoordinator::new(Duration::from_millis(500));

        coordinator.register("slow", || async {
            tokio::time::sleep(Duration::from_millis(5)).await;
        });
        let c = Arc::clone(&count);
        coordinator.register("counts", move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert!(coordinator.run().await);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn repeat_signal_is_a_no_op() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(1));
        assert!(coordinator.run().await);
        assert!(!coordinator.run().await);
    }

    #[tokio::test]
    async fn deadline_exceeded_reports_failure() {
        let mut coordinator = ShutdownCoordinator::new(Duration::from_millis(20));
        coordinator.register("too_slow", || async {
            tokio::time::sleep(Duration::from_millis(200)).await;
        });
        assert!(!coordinator.run().await);
    }
}
