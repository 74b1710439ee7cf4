use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DebugMode {
    /// Pause after every node
    Step,
    /// Pause on breakpoints
    Breakpoint,
    /// Run through, pausing only on breakpoints
    Continuous,
}

impl std::str::FromStr for DebugMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "step" => Ok(DebugMode::Step),
            "breakpoint" => Ok(DebugMode::Breakpoint),
            "continuous" => Ok(DebugMode::Continuous),
            other => Err(format!("unknown debug mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Running,
    Paused,
    Completed,
    Failed,
}

/// Where a step sits in the run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub previous_node_id: Option<String>,
    pub next_node_ids: Vec<String>,
    pub loop_iteration: u32,
    pub retry_count: u32,
}

/// Result of one watch expression for one step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WatchValue {
    pub expression: String,
    pub value: Option<Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DebugStep {
    pub id: String,
    pub node_id: String,
    pub node_name: String,
    pub node_type: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub input: Value,
    pub output: Option<Value>,
    pub error: Option<String>,
    /// Session variables as they stood after this step
    pub variables: BTreeMap<String, Value>,
    pub watches: Vec<WatchValue>,
    pub context: ExecutionContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSession {
    pub id: String,
    pub workflow_id: String,
    pub workflow_name: String,
    pub mode: DebugMode,
    pub status: SessionStatus,
    pub current_node_id: Option<String>,
    pub input: Value,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<DebugStep>,
    /// Enabled breakpoint node ids captured when the session started
    pub breakpoints: Vec<String>,
    /// Output of every executed node keyed by node name
    pub variables: BTreeMap<String, Value>,
    pub error: Option<String>,
}

impl DebugSession {
    pub fn new(
        id: String,
        workflow_id: &str,
        workflow_name: &str,
        mode: DebugMode,
        input: Value,
        breakpoints: Vec<String>,
    ) -> Self {
        Self {
            id,
            workflow_id: workflow_id.to_string(),
            workflow_name: workflow_name.to_string(),
            mode,
            status: SessionStatus::Pending,
            current_node_id: None,
            input,
            started_at: Utc::now(),
            finished_at: None,
            steps: Vec::new(),
            breakpoints,
            variables: BTreeMap::new(),
            error: None,
        }
    }

    pub fn step(&self, step_id: &str) -> Option<&DebugStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn pause_at(&mut self, node_id: &str) {
        self.status = SessionStatus::Paused;
        self.current_node_id = Some(node_id.to_string());
    }

    pub fn resume(&mut self) {
        self.status = SessionStatus::Running;
        self.current_node_id = None;
    }

    pub fn complete(&mut self) {
        self.finish(SessionStatus::Completed);
    }

    pub fn fail(&mut self, error: Option<String>) {
        if error.is_some() {
            self.error = error;
        }
        self.finish(SessionStatus::Failed);
    }

    fn finish(&mut self, status: SessionStatus) {
        self.status = status;
        self.current_node_id = None;
        self.finished_at = Some(Utc::now());
    }
}

/// Variables recorded for one step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableInspection {
    pub step_id: String,
    pub node_id: String,
    pub input: Value,
    pub output: Option<Value>,
    pub variables: BTreeMap<String, Value>,
    pub watches: Vec<WatchValue>,
}

impl From<&DebugStep> for VariableInspection {
    fn from(step: &DebugStep) -> Self {
        Self {
            step_id: step.id.clone(),
            node_id: step.node_id.clone(),
            input: step.input.clone(),
            output: step.output.clone(),
            variables: step.variables.clone(),
            watches: step.watches.clone(),
        }
    }
}
