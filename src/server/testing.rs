use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::{ApiError, ApiResult, AppState, EngineOverride};
use crate::runner::scenario::{TestScenario, TestSuite};
use crate::runner::state::{TestResult, TestRun};

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub workflow_id: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RunsQuery {
    #[serde(default)]
    pub active: bool,
    pub suite_id: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RunRequest {
    pub engine: Option<EngineOverride>,
    pub environment: Option<String>,
    /// Block until the suite finishes instead of returning the run id
    pub wait: bool,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/tests/scenarios",
            get(list_scenarios).post(create_scenario),
        )
        .route(
            "/api/tests/scenarios/:id",
            get(get_scenario).put(update_scenario).delete(delete_scenario),
        )
        .route("/api/tests/scenarios/:id/run", post(run_scenario))
        .route("/api/tests/suites", get(list_suites).post(create_suite))
        .route(
            "/api/tests/suites/:id",
            get(get_suite).put(update_suite).delete(delete_suite),
        )
        .route("/api/tests/suites/:id/run", post(run_suite))
        .route("/api/tests/results/:id", get(get_result))
        .route("/api/tests/runs", get(list_runs))
        .route("/api/tests/runs/:id", get(get_run))
}

async fn list_scenarios(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<TestScenario>> {
    let store = state.runner.store();
    Ok(Json(store.list(query.workflow_id.as_deref()).await?))
}

async fn create_scenario(
    State(state): State<Arc<AppState>>,
    Json(scenario): Json<TestScenario>,
) -> Result<Response, ApiError> {
    if scenario.workflow_id.is_empty() {
        return Err(ApiError::BadRequest("workflowId is required".to_string()));
    }
    state.runner.store().save(&scenario).await?;
    Ok((StatusCode::CREATED, Json(scenario)).into_response())
}

async fn get_scenario(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<TestScenario> {
    state
        .runner
        .store()
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("scenario", &id))
}

async fn update_scenario(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(mut scenario): Json<TestScenario>,
) -> ApiResult<TestScenario> {
    let store = state.runner.store();
    if store.get::<TestScenario>(&id).await?.is_none() {
        return Err(ApiError::not_found("scenario", &id));
    }
    scenario.id = id;
    store.save(&scenario).await?;
    Ok(Json(scenario))
}

async fn delete_scenario(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.runner.store().delete::<TestScenario>(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("scenario", &id))
    }
}

/// POST /api/tests/scenarios/:id/run
async fn run_scenario(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    request: Option<Json<RunRequest>>,
) -> ApiResult<TestResult> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let scenario: TestScenario = state
        .runner
        .store()
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("scenario", &id))?;
    let engine = state.engine(request.engine.as_ref())?;
    Ok(Json(state.runner.run_scenario(&scenario, engine).await))
}

async fn list_suites(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<TestSuite>> {
    let store = state.runner.store();
    Ok(Json(store.list(query.workflow_id.as_deref()).await?))
}

fn inherit_workflow(suite: &mut TestSuite) {
    for scenario in &mut suite.scenarios {
        if scenario.workflow_id.is_empty() {
            scenario.workflow_id = suite.workflow_id.clone();
        }
    }
}

async fn create_suite(
    State(state): State<Arc<AppState>>,
    Json(mut suite): Json<TestSuite>,
) -> Result<Response, ApiError> {
    if suite.workflow_id.is_empty() {
        return Err(ApiError::BadRequest("workflowId is required".to_string()));
    }
    inherit_workflow(&mut suite);
    state.runner.store().save(&suite).await?;
    Ok((StatusCode::CREATED, Json(suite)).into_response())
}

async fn get_suite(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<TestSuite> {
    state
        .runner
        .store()
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("suite", &id))
}

async fn update_suite(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(mut suite): Json<TestSuite>,
) -> ApiResult<TestSuite> {
    let store = state.runner.store();
    if store.get::<TestSuite>(&id).await?.is_none() {
        return Err(ApiError::not_found("suite", &id));
    }
    suite.id = id;
    inherit_workflow(&mut suite);
    store.save(&suite).await?;
    Ok(Json(suite))
}

async fn delete_suite(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.runner.store().delete::<TestSuite>(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("suite", &id))
    }
}

/// POST /api/tests/suites/:id/run - background run unless `wait` is set
async fn run_suite(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    request: Option<Json<RunRequest>>,
) -> Result<Response, ApiError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let suite: TestSuite = state
        .runner
        .store()
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("suite", &id))?;
    let engine = state.engine(request.engine.as_ref())?;
    let environment = request.environment.unwrap_or_else(|| "default".to_string());

    if request.wait {
        let run = state.runner.run_suite(&suite, &environment, engine).await;
        return Ok(Json(run).into_response());
    }
    let run_id = state.runner.start_suite(suite, &environment, engine).await;
    Ok((StatusCode::ACCEPTED, Json(json!({ "runId": run_id }))).into_response())
}

async fn get_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<TestResult> {
    state
        .runner
        .get_result(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("result", &id))
}

async fn list_runs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RunsQuery>,
) -> ApiResult<Vec<TestRun>> {
    if query.active {
        return Ok(Json(state.runner.list_active_runs().await));
    }
    let store = state.runner.store();
    Ok(Json(store.list(query.suite_id.as_deref()).await?))
}

async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<TestRun> {
    state
        .runner
        .get_run(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("run", &id))
}
