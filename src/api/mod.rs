//! HTTP transport: exactly the routes the external interface names,
//! wired to the Queue Manager and Health Monitor via shared state.

pub mod dto;
mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::health::HealthMonitor;
use crate::queue_manager::QueueManager;

#[derive(Clone)]
pub struct AppState {
    pub queue_manager: Arc<QueueManager>,
    pub health_monitor: Arc<HealthMonitor>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/jobs/email", post(handlers::submit_email_job))
        .route("/jobs/:id", get(handlers::get_job))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::executors::ExecutorRegistry;
    use crate::queue_manager::QueueManager;
    use crate::store::JobStore;
    use crate::worker_pool::WorkerPool;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let store = Arc::new(JobStore::new(1, 3, 10));
        let bus = Arc::new(EventBus::new());
        let queue_manager = Arc::new(QueueManager::new(store, Arc::clone(&bus)));
        let pool = WorkerPool::new(Arc::new(ExecutorRegistry::new()), 1, Duration::from_secs(1));
        pool.initialize().await.unwrap();
        let health_monitor = HealthMonitor::new(bus, Arc::clone(&queue_manager), pool);
        AppState {
            queue_manager,
            health_monitor,
        }
    }

    #[tokio::test]
    async fn rejects_invalid_email() {
        let app = router(test_state().await);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/jobs/email")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({"to": "not-an-email", "subject": "hi", "body": "hello"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn submits_valid_job_and_reports_queue_full() {
        let app = router(test_state().await);
        let body = serde_json::json!({"to": "a@b.com", "subject": "hi", "body": "hello"}).to_string();

        let first = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/jobs/email")
                    .header("content-type", "application/json")
                    .body(Body::from(body.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/jobs/email")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn unknown_job_id_is_404() {
        let app = router(test_state().await);
        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(format!("/jobs/{}", uuid::Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_endpoint_returns_200() {
        let app = router(test_state().await);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
