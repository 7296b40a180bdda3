//! Per-job-type executors: a capability registry rather than a type switch.

pub mod email;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::job::JobType;

/// Type-specific code that performs the external side effect a job
/// represents. Implementations must not panic on ordinary failures —
/// return `Err` instead — but a genuine panic is still caught by the
/// worker pool rather than propagated to the caller.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, payload: &serde_json::Value) -> Result<serde_json::Value, String>;
}

/// Maps `job.type -> Executor`, built once at startup. Adding a job type
/// is purely additive: register it here, nothing else changes.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<JobType, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, job_type: JobType, executor: Arc<dyn Executor>) -> Self {
        self.executors.insert(job_type, executor);
        self
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn Executor>> {
        self.executors.get(&job_type).cloned()
    }
}
