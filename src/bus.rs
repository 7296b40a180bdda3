//! Event bus broadcasting job lifecycle transitions.
//!
//! Built on `tokio::sync::broadcast`: at-most-once delivery per receiver,
//! with slow subscribers observing `Lagged` rather than back-pressuring
//! publishers. Subscribers that care about every event must keep up or
//! accept gaps — there is no persistence or replay.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::job::{Job, JobId};

/// A lifecycle event published whenever a job crosses a state boundary.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobEvent {
    Created { job_id: JobId, at: DateTime<Utc> },
    Started { job_id: JobId, attempt: u32, at: DateTime<Utc> },
    Completed { job_id: JobId, at: DateTime<Utc> },
    Failed { job_id: JobId, error: String, at: DateTime<Utc> },
    Retrying { job_id: JobId, retry_at: DateTime<Utc>, at: DateTime<Utc> },
    Dead { job_id: JobId, error: String, at: DateTime<Utc> },
}

impl JobEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Created { job_id, .. }
            | JobEvent::Started { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::Retrying { job_id, .. }
            | JobEvent::Dead { job_id, .. } => *job_id,
        }
    }
}

const CHANNEL_CAPACITY: usize = 1024;

/// Broadcast hub for job lifecycle events.
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. A send with no subscribers is not an error; the
    /// event is simply dropped.
    pub fn publish(&self, event: JobEvent) {
        let _ = self.sender.send(event);
    }

    pub fn created(&self, job: &Job) {
        self.publish(JobEvent::Created {
            job_id: job.id,
            at: Utc::now(),
        });
    }

    pub fn started(&self, job: &Job) {
        self.publish(JobEvent::Started {
            job_id: job.id,
            attempt: job.attempts,
            at: Utc::now(),
        });
    }

    pub fn completed(&self, job: &Job) {
        self.publish(JobEvent::Completed {
            job_id: job.id,
            at: Utc::now(),
        });
    }

    /// Emitted immediately before `retrying`/`dead` for the same job; order
    /// between the two is part of the contract observers may rely on.
    pub fn failed(&self, job: &Job, error: &str) {
        self.publish(JobEvent::Failed {
            job_id: job.id,
            error: error.to_string(),
            at: Utc::now(),
        });
    }

    pub fn retrying(&self, job: &Job, error: &str) {
        self.publish(JobEvent::Retrying {
            job_id: job.id,
            retry_at: job.retry_at.unwrap_or_else(Utc::now),
            at: Utc::now(),
        });
        tracing::debug!(job_id = %job.id, error, "job scheduled for retry");
    }

    pub fn dead(&self, job: &Job, error: &str) {
        self.publish(JobEvent::Dead {
            job_id: job.id,
            error: error.to_string(),
            at: Utc::now(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobType;

    fn job() -> Job {
        Job::new(
            uuid::Uuid::new_v4(),
            JobType::SendEmail,
            serde_json::json!({}),
            3,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn subscriber_receives_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let job = job();
        bus.created(&job);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.job_id(), job.id);
        assert!(matches!(event, JobEvent::Created { .. }));
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.created(&job());
    }

    #[tokio::test]
    async fn multiple_subscribers_each_get_a_copy() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        let job = job();
        bus.completed(&job);

        assert_eq!(rx1.recv().await.unwrap().job_id(), job.id);
        assert_eq!(rx2.recv().await.unwrap().job_id(), job.id);
    }
}
