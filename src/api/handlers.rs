use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use super::dto::{JobView, SubmitEmailJobRequest, SubmitJobResponse};
use super::AppState;
use crate::error::{AppError, Result};
use crate::job::JobType;

pub async fn submit_email_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitEmailJobRequest>,
) -> Result<(StatusCode, Json<SubmitJobResponse>)> {
    request.validate()?;

    let job = state
        .queue_manager
        .submit(JobType::SendEmail, request.to_payload(), None)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitJobResponse {
            job_id: job.id,
            status: job.status,
            created_at: job.created_at,
            message: "job accepted".to_string(),
        }),
    ))
}

pub async fn get_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<JobView>> {
    let job = state.queue_manager.get(id).await.ok_or(AppError::NotFound(id))?;
    Ok(Json(job.into()))
}

pub async fn health(State(state): State<AppState>) -> Json<crate::health::HealthStatus> {
    Json(state.health_monitor.status().await)
}
