//! In-memory job repository: the sole authority for state transitions.
//!
//! All mutation goes through a single `tokio::sync::Mutex` guarding the
//! id→job map and the per-status id buckets together, so a transition is
//! always observed atomically — never in zero or two buckets at once.
//! This is the "single owner" serialization point favored over
//! fine-grained per-bucket locking.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::job::{Job, JobId, JobStatus, JobType};

/// Snapshot of job counts by status.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StoreStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub retrying: usize,
    pub dead: usize,
    pub total: usize,
}

struct Inner {
    jobs: HashMap<JobId, Job>,
    buckets: HashMap<JobStatus, HashSet<JobId>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            jobs: HashMap::new(),
            buckets: HashMap::new(),
        }
    }

    fn bucket_of(&mut self, status: JobStatus) -> &mut HashSet<JobId> {
        self.buckets.entry(status).or_default()
    }

    /// Move `id` from its current bucket to `new_status` and apply `patch`
    /// to the job itself. The job must already exist.
    fn transition(&mut self, id: JobId, new_status: JobStatus, patch: impl FnOnce(&mut Job)) -> Job {
        let old_status = self.jobs.get(&id).expect("job exists").status;
        self.bucket_of(old_status).remove(&id);

        let job = self.jobs.get_mut(&id).expect("job exists");
        job.status = new_status;
        patch(job);
        let snapshot = job.clone();

        self.bucket_of(new_status).insert(id);
        snapshot
    }
}

/// Authoritative `id -> Job` repository.
pub struct JobStore {
    inner: Mutex<Inner>,
    max_size: usize,
    default_max_attempts: u32,
    retry_backoff_base_ms: u64,
}

impl JobStore {
    pub fn new(max_size: usize, default_max_attempts: u32, retry_backoff_base_ms: u64) -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
            max_size,
            default_max_attempts,
            retry_backoff_base_ms,
        }
    }

    pub fn retry_backoff_base_ms(&self) -> u64 {
        self.retry_backoff_base_ms
    }

    /// Insert a new job in `Pending`. Fails with `QueueFull` at capacity.
    pub async fn create(
        &self,
        job_type: JobType,
        payload: serde_json::Value,
        max_attempts: Option<u32>,
    ) -> Result<Job> {
        let mut inner = self.inner.lock().await;
        if inner.jobs.len() >= self.max_size {
            return Err(AppError::QueueFull);
        }

        let id = Uuid::new_v4();
        let job = Job::new(
            id,
            job_type,
            payload,
            max_attempts.unwrap_or(self.default_max_attempts),
            Utc::now(),
        );
        inner.jobs.insert(id, job.clone());
        inner.bucket_of(JobStatus::Pending).insert(id);
        Ok(job)
    }

    pub async fn get(&self, id: JobId) -> Option<Job> {
        self.inner.lock().await.jobs.get(&id).cloned()
    }

    /// Transition a job to `Running`, incrementing `attempts` and setting
    /// `started_at` on first start only. Fails with `AlreadyRunning` if the
    /// job is already `Running`, `NotFound` if unknown, and
    /// `IllegalTransition` if the job is terminal.
    pub async fn mark_started(&self, id: JobId) -> Result<Job> {
        let mut inner = self.inner.lock().await;
        let job = inner.jobs.get(&id).ok_or(AppError::NotFound(id))?;
        if job.status == JobStatus::Running {
            return Err(AppError::AlreadyRunning(id));
        }
        if job.status.is_terminal() {
            return Err(AppError::IllegalTransition(id));
        }

        Ok(inner.transition(id, JobStatus::Running, |job| {
            job.attempts += 1;
            if job.started_at.is_none() {
                job.started_at = Some(Utc::now());
            }
            job.retry_at = None;
        }))
    }

    /// Transition a job to `Completed`.
    pub async fn mark_completed(&self, id: JobId) -> Result<Job> {
        let mut inner = self.inner.lock().await;
        let job = inner.jobs.get(&id).ok_or(AppError::NotFound(id))?;
        if job.status.is_terminal() {
            return Err(AppError::IllegalTransition(id));
        }

        Ok(inner.transition(id, JobStatus::Completed, |job| {
            job.finished_at = Some(Utc::now());
            job.error = None;
        }))
    }

    /// Transition a job to `Retrying` (if attempts remain) or `Dead`
    /// (otherwise), recording `error`. The two branches are mutually
    /// exclusive: a job is never moved to both.
    pub async fn mark_failed(&self, id: JobId, error: impl Into<String>) -> Result<Job> {
        let mut inner = self.inner.lock().await;
        let job = inner.jobs.get(&id).ok_or(AppError::NotFound(id))?;
        if job.status.is_terminal() {
            return Err(AppError::IllegalTransition(id));
        }

        let error = error.into();
        if job.attempts < job.max_attempts {
            let attempts = job.attempts;
            let delay_ms = self.retry_backoff_base_ms * 2u64.pow((attempts.max(1) - 1) as u32);
            let retry_at = Utc::now() + chrono::Duration::milliseconds(delay_ms as i64);
            Ok(inner.transition(id, JobStatus::Retrying, |job| {
                job.error = Some(error);
                job.retry_at = Some(retry_at);
            }))
        } else {
            Ok(inner.transition(id, JobStatus::Dead, |job| {
                job.error = Some(error);
                job.finished_at = Some(Utc::now());
                job.retry_at = None;
            }))
        }
    }

    /// Jobs eligible for dispatch: `Pending`, or `Retrying` with an
    /// elapsed `retry_at`. FIFO by `created_at`, ties broken by id.
    pub async fn ready_for_execution(&self) -> Vec<Job> {
        let inner = self.inner.lock().await;
        let now = Utc::now();
        let mut ready: Vec<Job> = inner
            .jobs
            .values()
            .filter(|job| job.is_ready(now))
            .cloned()
            .collect();
        ready.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        ready
    }

    pub async fn stats(&self) -> StoreStats {
        let inner = self.inner.lock().await;
        let count = |s: JobStatus| inner.buckets.get(&s).map(|b| b.len()).unwrap_or(0);
        StoreStats {
            pending: count(JobStatus::Pending),
            running: count(JobStatus::Running),
            completed: count(JobStatus::Completed),
            failed: count(JobStatus::Failed),
            retrying: count(JobStatus::Retrying),
            dead: count(JobStatus::Dead),
            total: inner.jobs.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> JobStore {
        JobStore::new(2, 3, 1000)
    }

    #[tokio::test]
    async fn create_and_get_round_trips() {
        let store = store();
        let job = store
            .create(JobType::SendEmail, serde_json::json!({}), None)
            .await
            .unwrap();
        let fetched = store.get(job.id).await.unwrap();
        assert_eq!(fetched.id, job.id);
        assert_eq!(fetched.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn queue_full_rejects_beyond_capacity() {
        let store = store();
        store
            .create(JobType::SendEmail, serde_json::json!({}), None)
            .await
            .unwrap();
        store
            .create(JobType::SendEmail, serde_json::json!({}), None)
            .await
            .unwrap();
        let err = store
            .create(JobType::SendEmail, serde_json::json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::QueueFull));
        assert_eq!(store.stats().await.total, 2);
    }

    #[tokio::test]
    async fn ready_for_execution_only_returns_pending_and_elapsed_retrying() {
        let store = JobStore::new(10, 3, 1000);
        let pending = store
            .create(JobType::SendEmail, serde_json::json!({}), None)
            .await
            .unwrap();
        let running = store
            .create(JobType::SendEmail, serde_json::json!({}), None)
            .await
            .unwrap();
        store.mark_started(running.id).await.unwrap();

        let ready = store.ready_for_execution().await;
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, pending.id);
    }

    #[tokio::test]
    async fn mark_failed_retries_then_dies() {
        let store = JobStore::new(10, 2, 1000);
        let job = store
            .create(JobType::SendEmail, serde_json::json!({}), None)
            .await
            .unwrap();

        store.mark_started(job.id).await.unwrap();
        let after_first = store.mark_failed(job.id, "boom").await.unwrap();
        assert_eq!(after_first.status, JobStatus::Retrying);
        assert!(after_first.retry_at.is_some());

        store.mark_started(job.id).await.unwrap();
        let after_second = store.mark_failed(job.id, "boom again").await.unwrap();
        assert_eq!(after_second.status, JobStatus::Dead);
        assert_eq!(after_second.attempts, 2);
    }

    #[tokio::test]
    async fn terminal_jobs_reject_further_transitions() {
        let store = store();
        let job = store
            .create(JobType::SendEmail, serde_json::json!({}), None)
            .await
            .unwrap();
        store.mark_started(job.id).await.unwrap();
        store.mark_completed(job.id).await.unwrap();

        let err = store.mark_completed(job.id).await.unwrap_err();
        assert!(matches!(err, AppError::IllegalTransition(_)));
        let err = store.mark_failed(job.id, "late").await.unwrap_err();
        assert!(matches!(err, AppError::IllegalTransition(_)));
    }

    #[tokio::test]
    async fn started_at_is_first_start_not_most_recent() {
        let store = JobStore::new(10, 3, 1000);
        let job = store
            .create(JobType::SendEmail, serde_json::json!({}), None)
            .await
            .unwrap();
        let first = store.mark_started(job.id).await.unwrap();
        let first_started_at = first.started_at.unwrap();

        store.mark_failed(job.id, "retry me").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store.mark_started(job.id).await.unwrap();

        assert_eq!(second.started_at.unwrap(), first_started_at);
    }
}
