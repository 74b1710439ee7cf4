//! HTTP surface for the debugger, the test runner and version control.

pub mod debug;
pub mod testing;
pub mod vcs;

use anyhow::Result;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::debug::{DebugError, DebugStore, Debugger};
use crate::engine::{AutomationEngine, EngineError, EngineSettings, HttpEngine};
use crate::runner::store::{SqliteStore, StoreError, TestStore};
use crate::runner::TestRunner;
use crate::utils::Config;
use crate::vcs::{VcsError, WorkflowRepository};

/// Shared state for API handlers
pub struct AppState {
    pub config: Config,
    pub debugger: Debugger,
    pub runner: TestRunner,
    /// `None` when git is unavailable
    pub repository: Option<WorkflowRepository>,
    pub default_engine: Arc<dyn AutomationEngine>,
}

/// Per-request engine endpoint and credential
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineOverride {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

impl AppState {
    /// Build every component from configuration
    pub async fn from_config(config: Config) -> Result<Self> {
        let store = match config.debug.state_file {
            Some(ref path) => DebugStore::open(path)?,
            None => DebugStore::new(),
        };

        let tests = match config.testing.database_url {
            Some(ref url) => TestStore::new(Arc::new(SqliteStore::connect(url).await?)),
            None => TestStore::in_memory(),
        };

        let repository = match WorkflowRepository::new(config.repository.clone()) {
            Ok(repo) => match repo.init().await {
                Ok(()) => Some(repo),
                Err(e) => {
                    log::warn!("Version control disabled: {}", e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Version control disabled: {}", e);
                None
            }
        };

        let default_engine: Arc<dyn AutomationEngine> = Arc::new(HttpEngine::new(&config.engine)?);

        Ok(Self {
            debugger: Debugger::new(Arc::new(store)),
            runner: TestRunner::new(tests, config.testing.runner.clone()),
            repository,
            default_engine,
            config,
        })
    }

    /// The configured engine, or one built from the request's override
    pub fn engine(&self, overrides: Option<&EngineOverride>) -> Result<Arc<dyn AutomationEngine>, ApiError> {
        let Some(o) = overrides.filter(|o| o.endpoint.is_some() || o.api_key.is_some()) else {
            return Ok(self.default_engine.clone());
        };
        let settings = EngineSettings {
            endpoint: o
                .endpoint
                .clone()
                .unwrap_or_else(|| self.config.engine.endpoint.clone()),
            api_key: o.api_key.clone().or_else(|| self.config.engine.api_key.clone()),
            request_timeout_ms: self.config.engine.request_timeout_ms,
        };
        Ok(Arc::new(HttpEngine::new(&settings)?))
    }

    pub fn repository(&self) -> Result<&WorkflowRepository, ApiError> {
        self.repository
            .as_ref()
            .ok_or_else(|| ApiError::Internal("version control is not available".to_string()))
    }
}

/// Errors returned to API callers as `{"error": message}`
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    BadGateway(String),
    Internal(String),
}

impl ApiError {
    pub fn not_found(what: &str, id: &str) -> Self {
        ApiError::NotFound(format!("{} {} not found", what, id))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
            ApiError::BadGateway(m) => (StatusCode::BAD_GATEWAY, m),
            ApiError::Internal(m) => {
                log::error!("API error: {}", m);
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<DebugError> for ApiError {
    fn from(e: DebugError) -> Self {
        match e {
            DebugError::SessionNotFound(_) => ApiError::NotFound(e.to_string()),
            DebugError::InvalidState { .. } => ApiError::Conflict(e.to_string()),
            DebugError::State(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::BadGateway(e.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<VcsError> for ApiError {
    fn from(e: VcsError) -> Self {
        match e {
            VcsError::WorkflowNotFound(_) | VcsError::RevisionNotFound { .. } => {
                ApiError::NotFound(e.to_string())
            }
            VcsError::NothingToCommit(_)
            | VcsError::MergeConflict { .. }
            | VcsError::PathConflict { .. } => ApiError::Conflict(e.to_string()),
            VcsError::InvalidWorkflow(_) => ApiError::BadRequest(e.to_string()),
            _ => ApiError::Internal(e.to_string()),
        }
    }
}

pub type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Build the full API router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .merge(debug::router())
        .merge(testing::router())
        .merge(vcs::router())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// Main API server
pub struct FlowlabServer {
    state: Arc<AppState>,
}

impl FlowlabServer {
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Start the server
    pub async fn start(&self) -> Result<()> {
        let server = &self.state.config.server;
        let addr: SocketAddr = format!("{}:{}", server.host, server.port).parse()?;
        let app = router(self.state.clone());

        log::info!("Listening on http://{}", addr);
        println!("\n🔧 flowlab API started!");
        println!("   Open: http://{}", addr);
        println!("   Engine: {}", self.state.config.engine.endpoint);
        match self.state.repository {
            Some(ref repo) => println!("   Repository: {}", repo.settings().root.display()),
            None => println!("   Repository: disabled"),
        }
        println!("\n   Press Ctrl+C to stop.\n");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app.into_make_service()).await?;

        Ok(())
    }
}
