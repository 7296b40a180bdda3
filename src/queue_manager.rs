//! Coordinates the job store and the event bus so every state transition
//! is persisted and broadcast as a single logical operation.

use std::sync::Arc;

use crate::bus::EventBus;
use crate::error::Result;
use crate::job::{Job, JobId, JobType};
use crate::store::{JobStore, StoreStats};

/// Facade in front of [`JobStore`] and [`EventBus`]: every write path goes
/// through here so callers never publish an event without first
/// persisting the transition it describes, or vice versa.
pub struct QueueManager {
    store: Arc<JobStore>,
    bus: Arc<EventBus>,
}

impl QueueManager {
    pub fn new(store: Arc<JobStore>, bus: Arc<EventBus>) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub async fn submit(
        &self,
        job_type: JobType,
        payload: serde_json::Value,
        max_attempts: Option<u32>,
    ) -> Result<Job> {
        let job = self.store.create(job_type, payload, max_attempts).await?;
        self.bus.created(&job);
        Ok(job)
    }

    pub async fn get(&self, id: JobId) -> Option<Job> {
        self.store.get(id).await
    }

    pub async fn start(&self, id: JobId) -> Result<Job> {
        let job = self.store.mark_started(id).await?;
        self.bus.started(&job);
        Ok(job)
    }

    pub async fn complete(&self, id: JobId) -> Result<Job> {
        let job = self.store.mark_completed(id).await?;
        self.bus.completed(&job);
        Ok(job)
    }

    /// Record a failed attempt. The store resolves it to `Retrying` or
    /// `Dead`; `failed` is published first, then the matching follow-up
    /// event, per the contract order observers may rely on.
    pub async fn fail(&self, id: JobId, error: impl Into<String>) -> Result<Job> {
        let error = error.into();
        let job = self.store.mark_failed(id, error.clone()).await?;
        self.bus.failed(&job, &error);
        match job.status {
            crate::job::JobStatus::Retrying => self.bus.retrying(&job, &error),
            crate::job::JobStatus::Dead => self.bus.dead(&job, &error),
            _ => unreachable!("mark_failed only resolves to Retrying or Dead"),
        }
        Ok(job)
    }

    pub async fn ready_for_execution(&self) -> Vec<Job> {
        self.store.ready_for_execution().await
    }

    pub async fn stats(&self) -> StoreStats {
        self.store.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(max_attempts: u32) -> QueueManager {
        QueueManager::new(
            Arc::new(JobStore::new(100, max_attempts, 10)),
            Arc::new(EventBus::new()),
        )
    }

    #[tokio::test]
    async fn submit_publishes_created_event() {
        let manager = manager(3);
        let mut rx = manager.bus().subscribe();
        let job = manager
            .submit(JobType::SendEmail, serde_json::json!({}), None)
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.job_id(), job.id);
    }

    #[tokio::test]
    async fn fail_publishes_failed_then_retrying_then_dead() {
        let manager = manager(2);
        let job = manager
            .submit(JobType::SendEmail, serde_json::json!({}), None)
            .await
            .unwrap();
        let mut rx = manager.bus().subscribe();

        manager.start(job.id).await.unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            crate::bus::JobEvent::Started { .. }
        ));
        let after_first = manager.fail(job.id, "boom").await.unwrap();
        assert_eq!(after_first.status, crate::job::JobStatus::Retrying);
        assert!(matches!(
            rx.recv().await.unwrap(),
            crate::bus::JobEvent::Failed { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            crate::bus::JobEvent::Retrying { .. }
        ));

        manager.start(job.id).await.unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            crate::bus::JobEvent::Started { .. }
        ));
        let after_second = manager.fail(job.id, "boom again").await.unwrap();
        assert_eq!(after_second.status, crate::job::JobStatus::Dead);
        assert!(matches!(
            rx.recv().await.unwrap(),
            crate::bus::JobEvent::Failed { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            crate::bus::JobEvent::Dead { .. }
        ));
    }
}
