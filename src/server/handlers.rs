use super::{ApiError, AppState};
use crate::agent::{catalog, Agent, AgentSpec};
use crate::session::{RunRecord, SessionKey, SessionRecord};
use crate::workflow::{WorkflowConfig, WorkflowError};
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::io::ReaderStream;

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const RECENT_RUNS: usize = 10;

fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text()))
}

/// Key from a lookup path. An ill-formed key names nothing, so it is a 404.
fn lookup_key(raw: &str, not_found: impl FnOnce() -> ApiError) -> Result<SessionKey, ApiError> {
    SessionKey::parse(raw).map_err(|_| not_found())
}

// ---------------------------------------------------------------------------
// Excel processing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessRequest {
    pub base64_string: String,
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub input_file_path: String,
    pub output_file_path: String,
    pub total_columns: usize,
    pub total_chunks: usize,
    pub processing_status: String,
    pub message: String,
    pub session_id: String,
}

/// POST /excel-processor/process and /excel-processor/process-workflow
pub(super) async fn process(
    State(state): State<AppState>,
    body: Result<Json<ProcessRequest>, JsonRejection>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let request = parse_body(body)?;
    let key = SessionKey::parse_or_generate(request.session_id.as_deref())
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let model_id = request
        .model_id
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| state.default_model.clone());
    let config = WorkflowConfig {
        chunk_size: request.chunk_size.unwrap_or(state.workflow.chunk_size),
        ..state.workflow
    };
    let agent = Agent::new(&catalog::KEYWORD_ANALYSIS, model_id, state.client.clone());

    tracing::info!(session = %key, chunk_size = config.chunk_size, model = agent.model_id(), "processing upload");
    let report = state
        .runner
        .process_base64(&key, request.user_id.as_deref(), &request.base64_string, &agent, config)
        .await
        .map_err(|e| match e {
            e if e.is_client_error() => ApiError::bad_request(e.to_string()),
            WorkflowError::Table(e) => ApiError::internal(format!("Error processing Excel file: {e}")),
            e => ApiError::internal(e.to_string()),
        })?;

    Ok(Json(ProcessResponse {
        input_file_path: report.input_path.display().to_string(),
        output_file_path: report.output_path.display().to_string(),
        total_columns: report.table.total_columns,
        total_chunks: report.stats.chunks_read,
        processing_status: report.status.as_str().to_string(),
        message: report.summary.message,
        session_id: key.to_string(),
    }))
}

/// GET /excel-processor/health
pub(super) async fn excel_health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "excel-processor" }))
}

/// GET /v1/health
pub(super) async fn health() -> Json<Value> {
    Json(json!({ "status": "success" }))
}

/// GET /v1/downloads/excel/{session_id}
pub(super) async fn download_excel(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let key = lookup_key(&session_id, || ApiError::not_found("File not found"))?;
    let path = state.runner.workspace().output_path(&key);
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::not_found("File not found"));
        }
        Err(e) => return Err(ApiError::internal(format!("Error reading {}: {e}", path.display()))),
    };

    let disposition = format!("attachment; filename=\"session_keywords_{key}.xlsx\"");
    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AgentRunRequest {
    pub message: String,
    #[serde(default)]
    pub model_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRunResponse {
    pub agent_id: String,
    pub content: String,
}

/// GET /v1/agents
pub(super) async fn list_agents() -> Json<&'static [&'static AgentSpec]> {
    Json(catalog::all())
}

/// POST /v1/agents/{agent_id}/runs
pub(super) async fn run_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    body: Result<Json<AgentRunRequest>, JsonRejection>,
) -> Result<Json<AgentRunResponse>, ApiError> {
    let spec = catalog::find(&agent_id).ok_or_else(|| ApiError::not_found(format!("Agent not found: {agent_id}")))?;
    let request = parse_body(body)?;
    let model_id = request.model_id.unwrap_or_else(|| state.default_model.clone());
    let agent = Agent::new(spec, model_id, state.client.clone());

    let content = agent
        .run(&request.message)
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_GATEWAY, format!("Agent run failed: {e}")))?;

    Ok(Json(AgentRunResponse {
        agent_id: spec.id.to_string(),
        content,
    }))
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(super) struct SessionView {
    #[serde(flatten)]
    session: SessionRecord,
    remaining_rows: usize,
    runs: Vec<RunRecord>,
}

/// GET /v1/sessions/{session_id}
pub(super) async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let key = lookup_key(&session_id, || ApiError::not_found(format!("Session not found: {session_id}")))?;
    let store = state.runner.store();
    let session = store
        .load_session(&key)
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found(format!("Session not found: {key}")))?;
    let runs = store
        .list_runs(&key, RECENT_RUNS)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(SessionView {
        remaining_rows: session.remaining_rows(),
        session,
        runs,
    }))
}
