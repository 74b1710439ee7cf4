use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

use super::{ApiError, ApiResult, AppState, EngineOverride};
use crate::debug::{
    Breakpoint, DebugSession, DebugStep, ExecutionContext, StartSession, VariableInspection,
    WatchVariable,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    #[serde(flatten)]
    pub session: StartSession,
    #[serde(default)]
    pub engine: Option<EngineOverride>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointRequest {
    pub node_id: String,
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
}

#[derive(Deserialize)]
pub struct WatchRequest {
    pub expression: String,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/debug/sessions", get(list_sessions).post(start_session))
        .route(
            "/api/debug/sessions/:id",
            get(get_session).delete(clear_session),
        )
        .route("/api/debug/sessions/:id/continue", post(continue_session))
        .route("/api/debug/sessions/:id/step", post(step_session))
        .route("/api/debug/sessions/:id/stop", post(stop_session))
        .route(
            "/api/debug/sessions/:id/steps/:step_id/variables",
            get(inspect_variables),
        )
        .route(
            "/api/debug/sessions/:id/steps/:step_id/context",
            get(execution_context),
        )
        .route(
            "/api/debug/workflows/:workflow_id/breakpoints",
            get(list_breakpoints).post(add_breakpoint),
        )
        .route(
            "/api/debug/workflows/:workflow_id/breakpoints/:node_id",
            delete(remove_breakpoint),
        )
        .route(
            "/api/debug/workflows/:workflow_id/breakpoints/:node_id/toggle",
            post(toggle_breakpoint),
        )
        .route(
            "/api/debug/workflows/:workflow_id/watches",
            get(list_watches).post(add_watch),
        )
        .route(
            "/api/debug/workflows/:workflow_id/watches/:watch_id",
            delete(remove_watch),
        )
}

/// POST /api/debug/sessions
async fn start_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartSessionRequest>,
) -> ApiResult<DebugSession> {
    let engine = state.engine(request.engine.as_ref())?;
    let session = state
        .debugger
        .start_debug_session(request.session, engine)
        .await?;
    Ok(Json(session))
}

async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<DebugSession>> {
    Json(state.debugger.list_sessions())
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<DebugSession> {
    state
        .debugger
        .get_session(&id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("debug session", &id))
}

async fn clear_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.debugger.clear_session(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("debug session", &id))
    }
}

async fn continue_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<DebugSession> {
    Ok(Json(state.debugger.continue_execution(&id).await?))
}

async fn step_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<DebugStep> {
    Ok(Json(state.debugger.step_next(&id).await?))
}

async fn stop_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<DebugSession> {
    Ok(Json(state.debugger.stop_execution(&id)?))
}

async fn inspect_variables(
    State(state): State<Arc<AppState>>,
    Path((id, step_id)): Path<(String, String)>,
) -> ApiResult<VariableInspection> {
    state
        .debugger
        .inspect_variables(&id, &step_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("step", &step_id))
}

async fn execution_context(
    State(state): State<Arc<AppState>>,
    Path((id, step_id)): Path<(String, String)>,
) -> ApiResult<ExecutionContext> {
    state
        .debugger
        .get_execution_context(&id, &step_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("step", &step_id))
}

async fn list_breakpoints(
    State(state): State<Arc<AppState>>,
    Path(workflow_id): Path<String>,
) -> Json<Vec<Breakpoint>> {
    Json(state.debugger.store().breakpoints(&workflow_id))
}

async fn add_breakpoint(
    State(state): State<Arc<AppState>>,
    Path(workflow_id): Path<String>,
    Json(request): Json<BreakpointRequest>,
) -> impl IntoResponse {
    let node_name = request.node_name.unwrap_or_else(|| request.node_id.clone());
    let breakpoint = state.debugger.store().add_breakpoint(
        &workflow_id,
        &request.node_id,
        &node_name,
        request.condition,
    );
    (StatusCode::CREATED, Json(breakpoint))
}

async fn remove_breakpoint(
    State(state): State<Arc<AppState>>,
    Path((workflow_id, node_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    if state.debugger.store().remove_breakpoint(&workflow_id, &node_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("breakpoint", &node_id))
    }
}

async fn toggle_breakpoint(
    State(state): State<Arc<AppState>>,
    Path((workflow_id, node_id)): Path<(String, String)>,
) -> ApiResult<Breakpoint> {
    state
        .debugger
        .store()
        .toggle_breakpoint(&workflow_id, &node_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("breakpoint", &node_id))
}

async fn list_watches(
    State(state): State<Arc<AppState>>,
    Path(workflow_id): Path<String>,
) -> Json<Vec<WatchVariable>> {
    Json(state.debugger.store().watches(&workflow_id))
}

async fn add_watch(
    State(state): State<Arc<AppState>>,
    Path(workflow_id): Path<String>,
    Json(request): Json<WatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.expression.trim().is_empty() {
        return Err(ApiError::BadRequest("expression must not be empty".to_string()));
    }
    let watch = state
        .debugger
        .store()
        .add_watch(&workflow_id, &request.expression);
    Ok((StatusCode::CREATED, Json(watch)))
}

async fn remove_watch(
    State(state): State<Arc<AppState>>,
    Path((workflow_id, watch_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    if state.debugger.store().remove_watch(&workflow_id, &watch_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("watch variable", &watch_id))
    }
}
