//! HTTP API
//!
//! Routes:
//!
//! - `POST /excel-processor/process`, `POST /excel-processor/process-workflow`
//! - `GET /excel-processor/health`
//! - `GET /v1/downloads/excel/{session_id}`
//! - `GET /v1/health`
//! - `GET /v1/agents`, `POST /v1/agents/{agent_id}/runs`
//! - `GET /v1/sessions/{session_id}`
//!
//! Every error body is `{"detail": "..."}`.

mod handlers;

use crate::llm::ChatModel;
use crate::workflow::{WorkflowConfig, WorkflowRunner};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tokio::net::TcpListener;

pub use handlers::{AgentRunRequest, AgentRunResponse, ProcessRequest, ProcessResponse};

/// Shared state of the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub runner: WorkflowRunner,
    pub client: Arc<dyn ChatModel>,
    /// Model used when a request does not name one
    pub default_model: String,
    /// Chunk size and iteration cap used when a request does not override them
    pub workflow: WorkflowConfig,
}

/// Build the router over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/excel-processor/process", post(handlers::process))
        .route("/excel-processor/process-workflow", post(handlers::process))
        .route("/excel-processor/health", get(handlers::excel_health))
        .route("/v1/downloads/excel/{session_id}", get(handlers::download_excel))
        .route("/v1/health", get(handlers::health))
        .route("/v1/agents", get(handlers::list_agents))
        .route("/v1/agents/{agent_id}/runs", post(handlers::run_agent))
        .route("/v1/sessions/{session_id}", get(handlers::get_session))
        .with_state(state)
}

/// Serve the API on an already bound listener until the process stops.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "chunkflow API listening");
    }
    axum::serve(listener, router(state)).await
}

/// An error response with a `detail` message.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = self.status.as_u16(), detail = %self.detail, "request failed");
        }
        (self.status, Json(serde_json::json!({ "detail": self.detail }))).into_response()
    }
}
