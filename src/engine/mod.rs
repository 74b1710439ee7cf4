//! Integration boundary with the external automation engine.
//!
//! The engine owns and executes workflows. Everything this crate knows about
//! a run comes back as [`NodeRun`] records: the debugger turns them into
//! steps and the test runner turns them into coverage, so both features share
//! one instrumentation source.

pub mod http;
#[cfg(test)]
pub mod scripted;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::workflow::{Workflow, WorkflowNode};

pub use http::{EngineSettings, HttpEngine};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("engine request failed: {0}")]
    Request(String),

    #[error("engine response could not be decoded: {0}")]
    Decode(String),

    #[error("engine call timed out after {0}ms")]
    Timeout(u64),

    #[error("node '{node}' failed: {message}")]
    Node { node: String, message: String },
}

impl EngineError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, EngineError::Timeout(_))
    }
}

/// Request to run a whole workflow once
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub workflow_id: String,
    #[serde(default)]
    pub input: Value,
}

/// Request to run exactly one node with an explicit input (checkpointed contract)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRunRequest<'a> {
    pub workflow_id: &'a str,
    /// Correlates the node calls of one instrumented execution
    pub checkpoint_id: &'a str,
    pub node: &'a WorkflowNode,
    pub input: &'a Value,
}

/// One node's execution as reported by the engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeRun {
    pub node_id: String,
    pub node_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    #[serde(default)]
    pub execution_id: Option<String>,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub node_runs: Vec<NodeRun>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExecutionResult {
    /// Output of every executed node keyed by node name
    pub fn node_outputs(&self) -> serde_json::Map<String, Value> {
        self.node_runs
            .iter()
            .map(|run| (run.node_name.clone(), run.output.clone()))
            .collect()
    }
}

/// Operations an automation engine integration must provide.
///
/// `execute_node` is the resumable contract the debugger relies on for
/// node-level pausing; engines that only stream per-node events can satisfy
/// it by running to the requested node and holding the continuation.
#[async_trait]
pub trait AutomationEngine: Send + Sync {
    /// Fetch the workflow definition
    async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow, EngineError>;

    /// Execute a workflow end to end
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, EngineError>;

    /// Execute a single node with the given input
    async fn execute_node(&self, request: NodeRunRequest<'_>) -> Result<NodeRun, EngineError>;
}
