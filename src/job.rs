//! Job identity, payload and lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque job identifier. Assigned at creation, never reused.
pub type JobId = Uuid;

/// Enumerated job type tag. Selects which [`crate::executors::Executor`]
/// runs the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    SendEmail,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::SendEmail => "SEND_EMAIL",
        }
    }
}

/// A job's position in the state machine.
///
/// `Failed` is transient bookkeeping between a failure and the
/// `Retrying`/`Dead` branch that follows it; the store never holds a job
/// in `Failed` because `mark_failed` resolves straight to one or the
/// other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Retrying,
    Dead,
}

impl JobStatus {
    /// Terminal statuses never transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Dead)
    }
}

/// A single unit of queued work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub retry_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        id: JobId,
        job_type: JobType,
        payload: serde_json::Value,
        max_attempts: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            job_type,
            payload,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts,
            created_at,
            started_at: None,
            finished_at: None,
            error: None,
            retry_at: None,
        }
    }

    /// Whether this job belongs in the ready set: pending, or retrying
    /// with an elapsed `retry_at`.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            JobStatus::Pending => true,
            JobStatus::Retrying => self.retry_at.map(|at| at <= now).unwrap_or(false),
            _ => false,
        }
    }
}
