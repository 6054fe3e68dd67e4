//! Router and handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::debug;

use islet_core::{Exception, ExecuteRequest, LogEntry, Output, now_ms};
use islet_kernel::Kernel;

use crate::dedupe::DedupeWindow;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// The execution engine.
    pub kernel: Arc<Kernel>,
    /// The duplicate-request window.
    pub dedupe: Arc<DedupeWindow>,
}

impl AppState {
    /// State over a running kernel.
    #[must_use]
    pub fn new(kernel: Arc<Kernel>) -> Self {
        let window = Duration::from_millis(kernel.config().dedupe_window_ms);
        Self {
            kernel,
            dedupe: Arc::new(DedupeWindow::new(window)),
        }
    }
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/execute", post(execute))
        .route("/health", get(health))
        .with_state(state)
}

async fn execute(State(state): State<AppState>, Json(request): Json<ExecuteRequest>) -> Response {
    if state.dedupe.is_duplicate(&request) {
        debug!("duplicate request rejected");
        let output = Output::failure(
            vec![LogEntry::from_exception(
                Exception::ValidationError,
                "duplicate request within window",
            )],
            0,
        );
        return (StatusCode::TOO_MANY_REQUESTS, Json(output)).into_response();
    }

    let output = state.kernel.execute(request).await;
    let status = if output.has_exception(Exception::PayloadTooLarge) {
        StatusCode::PAYLOAD_TOO_LARGE
    } else {
        StatusCode::OK
    };
    (status, Json(output)).into_response()
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true, "timestamp": now_ms() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use islet_config::{ClusterSection, KernelConfig};
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let config = KernelConfig {
            cluster: ClusterSection {
                min: 0,
                warmup: 0,
                ..ClusterSection::default()
            },
            worker_cmd: Some("/bin/cat".into()),
            ..KernelConfig::default()
        };
        let kernel = Kernel::start_default(config).await.unwrap();
        AppState::new(Arc::new(kernel))
    }

    #[tokio::test]
    async fn health_reports_ok_with_timestamp() {
        let app = router(test_state().await);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn oversized_code_maps_to_413() {
        let app = router(test_state().await);
        let body = serde_json::json!({ "code": "x".repeat(100_001) }).to_string();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/execute")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn duplicate_requests_map_to_429() {
        let state = test_state().await;
        let body = serde_json::json!({ "code": "x".repeat(100_001) }).to_string();
        let request = || {
            Request::builder()
                .method("POST")
                .uri("/execute")
                .header("content-type", "application/json")
                .body(Body::from(body.clone()))
                .unwrap()
        };

        let first = router(state.clone()).oneshot(request()).await.unwrap();
        assert_eq!(first.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let second = router(state).oneshot(request()).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
