//! Unified error taxonomy with HTTP status mapping.
//!
//! Every error kind named in the component contracts collapses into
//! [`AppError`]. `axum` handlers return `Result<_, AppError>` and rely on
//! the `IntoResponse` impl below to produce the right status code and a
//! stable machine-readable `code` field.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Machine-readable error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Validation,
    QueueFull,
    NotFound,
    IllegalTransition,
    AlreadyRunning,
    ExecutorError,
    WorkerCrashed,
    WorkerExited,
    PoolShuttingDown,
    WorkerInitFailed,
    ShutdownTimeout,
    Configuration,
    Internal,
}

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("queue is full")]
    QueueFull,

    #[error("job not found: {0}")]
    NotFound(uuid::Uuid),

    #[error("illegal transition on job {0}: job is in a terminal state")]
    IllegalTransition(uuid::Uuid),

    #[error("job {0} is already running")]
    AlreadyRunning(uuid::Uuid),

    #[error("executor error: {0}")]
    ExecutorError(String),

    #[error("worker crashed: {0}")]
    WorkerCrashed(String),

    #[error("worker exited unexpectedly")]
    WorkerExited,

    #[error("worker pool is shutting down")]
    PoolShuttingDown,

    #[error("worker failed to initialize: {0}")]
    WorkerInitFailed(String),

    #[error("shutdown exceeded its deadline")]
    ShutdownTimeout,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation(_) => ErrorCode::Validation,
            AppError::QueueFull => ErrorCode::QueueFull,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::IllegalTransition(_) => ErrorCode::IllegalTransition,
            AppError::AlreadyRunning(_) => ErrorCode::AlreadyRunning,
            AppError::ExecutorError(_) => ErrorCode::ExecutorError,
            AppError::WorkerCrashed(_) => ErrorCode::WorkerCrashed,
            AppError::WorkerExited => ErrorCode::WorkerExited,
            AppError::PoolShuttingDown => ErrorCode::PoolShuttingDown,
            AppError::WorkerInitFailed(_) => ErrorCode::WorkerInitFailed,
            AppError::ShutdownTimeout => ErrorCode::ShutdownTimeout,
            AppError::Configuration(_) => ErrorCode::Configuration,
            AppError::Internal(_) => ErrorCode::Internal,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::QueueFull | AppError::PoolShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::IllegalTransition(_) | AppError::AlreadyRunning(_) => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: ErrorCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
