use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{ApiError, ApiResult, AppState};
use crate::vcs::{BranchInfo, CommitInfo, CommitOptions, TagInfo, WorkflowDiff, WorkflowEntry};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    pub workflow_name: String,
    pub workflow_data: Value,
    #[serde(flatten)]
    pub options: CommitOptions,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct DiffQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Deserialize)]
pub struct RollbackRequest {
    pub commit: String,
}

#[derive(Deserialize)]
pub struct BranchRequest {
    pub name: String,
    pub from: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct DeleteBranchQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Deserialize)]
pub struct MergeRequest {
    pub source: String,
    pub target: Option<String>,
    pub message: Option<String>,
}

#[derive(Deserialize)]
pub struct TagRequest {
    pub name: String,
    #[serde(default)]
    pub message: Option<String>,
    pub commit: Option<String>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/vcs/workflows", get(list_workflows))
        .route("/api/vcs/workflows/:id/commits", post(commit_workflow))
        .route("/api/vcs/workflows/:id/commits/:hash", get(workflow_at_commit))
        .route("/api/vcs/workflows/:id/history", get(history))
        .route("/api/vcs/workflows/:id/diff", get(diff))
        .route("/api/vcs/workflows/:id/rollback", post(rollback))
        .route("/api/vcs/branches", get(list_branches).post(checkout_branch))
        .route("/api/vcs/branches/current", get(current_branch))
        .route("/api/vcs/branches/:name", delete(delete_branch))
        .route("/api/vcs/merge", post(merge))
        .route("/api/vcs/tags", get(list_tags).post(create_tag))
}

async fn list_workflows(State(state): State<Arc<AppState>>) -> ApiResult<Vec<WorkflowEntry>> {
    Ok(Json(state.repository()?.list_workflows()?))
}

/// POST /api/vcs/workflows/:id/commits
async fn commit_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<CommitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let commit = state
        .repository()?
        .commit(&id, &request.workflow_name, &request.workflow_data, &request.options)
        .await?;
    Ok((StatusCode::CREATED, Json(commit)))
}

async fn workflow_at_commit(
    State(state): State<Arc<AppState>>,
    Path((id, hash)): Path<(String, String)>,
) -> ApiResult<Value> {
    Ok(Json(state.repository()?.get_workflow_at_commit(&id, &hash).await?))
}

async fn history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<CommitInfo>> {
    let limit = query.limit.unwrap_or(50);
    Ok(Json(state.repository()?.history(&id, limit).await))
}

async fn diff(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<DiffQuery>,
) -> ApiResult<WorkflowDiff> {
    let from = query
        .from
        .ok_or_else(|| ApiError::BadRequest("query parameter `from` is required".to_string()))?;
    let to = query.to.unwrap_or_else(|| "HEAD".to_string());
    Ok(Json(state.repository()?.diff(&id, &from, &to).await?))
}

/// Restores the working copy only; the caller commits when ready
async fn rollback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<RollbackRequest>,
) -> ApiResult<Value> {
    Ok(Json(state.repository()?.rollback(&id, &request.commit).await?))
}

async fn list_branches(State(state): State<Arc<AppState>>) -> ApiResult<Vec<BranchInfo>> {
    Ok(Json(state.repository()?.list_branches().await))
}

async fn current_branch(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    let branch = state.repository()?.current_branch().await?;
    Ok(Json(json!({ "branch": branch })))
}

async fn checkout_branch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BranchRequest>,
) -> ApiResult<Value> {
    let branch = state
        .repository()?
        .create_or_checkout_branch(&request.name, request.from.as_deref())
        .await?;
    Ok(Json(json!({ "branch": branch })))
}

async fn delete_branch(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<DeleteBranchQuery>,
) -> Result<StatusCode, ApiError> {
    state.repository()?.delete_branch(&name, query.force).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn merge(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MergeRequest>,
) -> ApiResult<CommitInfo> {
    let commit = state
        .repository()?
        .merge(
            &request.source,
            request.target.as_deref(),
            request.message.as_deref(),
        )
        .await?;
    Ok(Json(commit))
}

async fn list_tags(State(state): State<Arc<AppState>>) -> ApiResult<Vec<TagInfo>> {
    Ok(Json(state.repository()?.list_tags().await))
}

async fn create_tag(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TagRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = request.message.unwrap_or_else(|| request.name.clone());
    let tag = state
        .repository()?
        .create_tag(&request.name, &message, request.commit.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(tag)))
}
