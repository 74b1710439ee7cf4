//! In-process engine with canned node behaviour, used by unit tests.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{
    AutomationEngine, EngineError, ExecutionRequest, ExecutionResult, ExecutionStatus, NodeRun,
    NodeRunRequest,
};
use crate::workflow::Workflow;

pub struct ScriptedEngine {
    pub workflow: Workflow,
    /// Per-node output overrides; `Err` makes the node fail
    pub outputs: HashMap<String, Result<Value, String>>,
    /// Node ids skipped by `execute` (to simulate untaken branches)
    pub skipped: Vec<String>,
    /// `execute` never resolves
    pub hang: bool,
    /// `execute` reports an engine-side timeout
    pub time_out: bool,
    pub fail_first_executions: usize,
    pub execute_calls: AtomicUsize,
    pub node_calls: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new(workflow: Workflow) -> Self {
        Self {
            workflow,
            outputs: HashMap::new(),
            skipped: Vec::new(),
            hang: false,
            time_out: false,
            fail_first_executions: 0,
            execute_calls: AtomicUsize::new(0),
            node_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_output(mut self, node_id: &str, output: Value) -> Self {
        self.outputs.insert(node_id.to_string(), Ok(output));
        self
    }

    pub fn with_failure(mut self, node_id: &str, message: &str) -> Self {
        self.outputs
            .insert(node_id.to_string(), Err(message.to_string()));
        self
    }

    fn run_node(&self, node_id: &str, node_name: &str, input: &Value) -> NodeRun {
        let now = Utc::now();
        let (output, error) = match self.outputs.get(node_id) {
            Some(Ok(v)) => (v.clone(), None),
            Some(Err(e)) => (Value::Null, Some(e.clone())),
            None => (json!({ "from": node_id, "input": input }), None),
        };
        NodeRun {
            node_id: node_id.to_string(),
            node_name: node_name.to_string(),
            started_at: now,
            finished_at: now,
            duration_ms: 0,
            output,
            error,
        }
    }
}

#[async_trait]
impl AutomationEngine for ScriptedEngine {
    async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow, EngineError> {
        if workflow_id != self.workflow.id {
            return Err(EngineError::Status {
                status: 404,
                body: format!("workflow {} not found", workflow_id),
            });
        }
        Ok(self.workflow.clone())
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, EngineError> {
        let call = self.execute_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.time_out {
            return Err(EngineError::Timeout(50));
        }
        if call < self.fail_first_executions {
            return Err(EngineError::Status {
                status: 503,
                body: "engine busy".to_string(),
            });
        }

        let mut input = request.input.clone();
        let mut node_runs = Vec::new();
        for node in self.workflow.execution_order() {
            if self.skipped.contains(&node.id) {
                continue;
            }
            let run = self.run_node(&node.id, &node.name, &input);
            input = run.output.clone();
            let failed = run.error.clone();
            node_runs.push(run);
            if let Some(message) = failed {
                return Ok(ExecutionResult {
                    execution_id: Some(format!("exec-{}", call)),
                    status: ExecutionStatus::Error,
                    output: Value::Null,
                    node_runs,
                    error: Some(message),
                });
            }
        }

        Ok(ExecutionResult {
            execution_id: Some(format!("exec-{}", call)),
            status: ExecutionStatus::Success,
            output: input,
            node_runs,
            error: None,
        })
    }

    async fn execute_node(&self, request: NodeRunRequest<'_>) -> Result<NodeRun, EngineError> {
        self.node_calls.fetch_add(1, Ordering::SeqCst);
        let run = self.run_node(&request.node.id, &request.node.name, request.input);
        match run.error {
            Some(message) => Err(EngineError::Node {
                node: request.node.name.clone(),
                message,
            }),
            None => Ok(run),
        }
    }
}
