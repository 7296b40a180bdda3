//! Request/response bodies for the HTTP surface.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::job::{Job, JobStatus};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

#[derive(Debug, Deserialize)]
pub struct SubmitEmailJobRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl SubmitEmailJobRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.to.trim().is_empty() || !EMAIL_RE.is_match(&self.to) {
            return Err(AppError::Validation("`to` must be a valid email address".to_string()));
        }
        if self.subject.trim().is_empty() {
            return Err(AppError::Validation("`subject` must not be empty".to_string()));
        }
        if self.body.trim().is_empty() {
            return Err(AppError::Validation("`body` must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "to": self.to,
            "subject": self.subject,
            "body": self.body,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct JobView {
    pub id: Uuid,
    pub job_type: String,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub retry_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type.as_str().to_string(),
            status: job.status,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            retry_at: job.retry_at,
            error: job.error,
        }
    }
}
