use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

use super::{
    AutomationEngine, EngineError, ExecutionRequest, ExecutionResult, ExecutionStatus, NodeRun,
    NodeRunRequest,
};
use crate::workflow::Workflow;

const API_KEY_HEADER: &str = "X-N8N-API-KEY";

/// Connection settings for an HTTP automation engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    pub endpoint: String,
    #[serde(alias = "api_key")]
    pub api_key: Option<String>,
    #[serde(alias = "request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5678".to_string(),
            api_key: None,
            request_timeout_ms: 60_000,
        }
    }
}

/// n8n-compatible REST client
pub struct HttpEngine {
    client: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
}

impl HttpEngine {
    pub fn new(settings: &EngineSettings) -> Result<Self, EngineError> {
        let mut headers = HeaderMap::new();
        if let Some(ref key) = settings.api_key {
            let value =
                HeaderValue::from_str(key).map_err(|e| EngineError::Request(e.to_string()))?;
            headers.insert(API_KEY_HEADER, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()
            .map_err(|e| EngineError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.endpoint.trim_end_matches('/').to_string(),
            timeout_ms: settings.request_timeout_ms,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    fn request_error(&self, e: reqwest::Error) -> EngineError {
        if e.is_timeout() {
            EngineError::Timeout(self.timeout_ms)
        } else {
            EngineError::Request(e.to_string())
        }
    }

    async fn send_json(&self, request: reqwest::RequestBuilder) -> Result<Value, EngineError> {
        let response = request.send().await.map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                EngineError::Timeout(self.timeout_ms)
            } else {
                EngineError::Decode(e.to_string())
            }
        })
    }
}

#[async_trait]
impl AutomationEngine for HttpEngine {
    async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow, EngineError> {
        let url = self.url(&format!("/workflows/{}", workflow_id));
        log::debug!("GET {}", url);
        let body = self.send_json(self.client.get(&url)).await?;
        serde_json::from_value(body).map_err(|e| EngineError::Decode(e.to_string()))
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, EngineError> {
        let url = self.url(&format!("/workflows/{}/execute", request.workflow_id));
        log::debug!("POST {}", url);
        let body = self
            .send_json(self.client.post(&url).json(&json!({ "input": request.input })))
            .await?;
        parse_execution(body)
    }

    async fn execute_node(&self, request: NodeRunRequest<'_>) -> Result<NodeRun, EngineError> {
        let url = self.url(&format!(
            "/workflows/{}/nodes/{}/execute",
            request.workflow_id, request.node.id
        ));
        log::debug!("POST {}", url);
        let body = self
            .send_json(self.client.post(&url).json(&json!({
                "checkpointId": request.checkpoint_id,
                "input": request.input,
            })))
            .await?;

        if let Ok(run) = serde_json::from_value::<NodeRun>(body.clone()) {
            return Ok(run);
        }

        // Fall back to a single-node execution in run-data form
        let result = parse_execution(body)?;
        result
            .node_runs
            .into_iter()
            .rev()
            .find(|r| r.node_id == request.node.id || r.node_name == request.node.name)
            .ok_or_else(|| {
                EngineError::Decode(format!("no run data for node '{}'", request.node.name))
            })
    }
}

/// Accept either the native [`ExecutionResult`] shape or n8n execution data
pub fn parse_execution(body: Value) -> Result<ExecutionResult, EngineError> {
    if body.get("nodeRuns").is_some() {
        return serde_json::from_value(body).map_err(|e| EngineError::Decode(e.to_string()));
    }

    let result_data = body
        .pointer("/data/resultData")
        .ok_or_else(|| EngineError::Decode("missing data.resultData".to_string()))?;

    let name_to_id: HashMap<String, String> = body
        .pointer("/data/workflowData/nodes")
        .or_else(|| body.pointer("/workflowData/nodes"))
        .and_then(Value::as_array)
        .map(|nodes| {
            nodes
                .iter()
                .filter_map(|n| {
                    Some((
                        n.get("name")?.as_str()?.to_string(),
                        n.get("id")?.as_str()?.to_string(),
                    ))
                })
                .collect()
        })
        .unwrap_or_default();

    let mut node_runs = Vec::new();
    if let Some(run_data) = result_data.get("runData").and_then(Value::as_object) {
        for (name, runs) in run_data {
            for task in runs.as_array().into_iter().flatten() {
                node_runs.push(task_to_node_run(name, &name_to_id, task));
            }
        }
    }
    node_runs.sort_by_key(|r| r.started_at);

    let error = result_data
        .pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_string);

    let status = match body.get("status").and_then(Value::as_str) {
        Some("success") => ExecutionStatus::Success,
        Some(_) => ExecutionStatus::Error,
        None if error.is_some() => ExecutionStatus::Error,
        None => ExecutionStatus::Success,
    };

    let output = result_data
        .get("lastNodeExecuted")
        .and_then(Value::as_str)
        .and_then(|last| node_runs.iter().rev().find(|r| r.node_name == last))
        .or_else(|| node_runs.last())
        .map(|r| r.output.clone())
        .unwrap_or(Value::Null);

    Ok(ExecutionResult {
        execution_id: body.get("id").map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }),
        status,
        output,
        node_runs,
        error,
    })
}

fn task_to_node_run(name: &str, name_to_id: &HashMap<String, String>, task: &Value) -> NodeRun {
    let start_ms = task.get("startTime").and_then(Value::as_i64).unwrap_or(0);
    let duration_ms = task.get("executionTime").and_then(Value::as_u64).unwrap_or(0);
    let started_at: DateTime<Utc> = Utc
        .timestamp_millis_opt(start_ms)
        .single()
        .unwrap_or_else(Utc::now);
    let finished_at = started_at + chrono::Duration::milliseconds(duration_ms as i64);

    let items: Vec<Value> = task
        .pointer("/data/main/0")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| item.get("json").cloned().unwrap_or(Value::Null))
                .collect()
        })
        .unwrap_or_default();

    let output = match items.len() {
        0 => Value::Null,
        1 => items.into_iter().next().unwrap_or(Value::Null),
        _ => Value::Array(items),
    };

    NodeRun {
        node_id: name_to_id
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string()),
        node_name: name.to_string(),
        started_at,
        finished_at,
        duration_ms,
        output,
        error: task
            .pointer("/error/message")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_data() {
        let body = json!({
            "id": 42,
            "status": "success",
            "data": {
                "workflowData": {"nodes": [
                    {"id": "n1", "name": "Webhook"},
                    {"id": "n2", "name": "Set Lead"}
                ]},
                "resultData": {
                    "lastNodeExecuted": "Set Lead",
                    "runData": {
                        "Set Lead": [{
                            "startTime": 1700000000100i64,
                            "executionTime": 5,
                            "data": {"main": [[{"json": {"lead": "ada"}}]]}
                        }],
                        "Webhook": [{
                            "startTime": 1700000000000i64,
                            "executionTime": 3,
                            "data": {"main": [[{"json": {"a": 1}}, {"json": {"a": 2}}]]}
                        }]
                    }
                }
            }
        });

        let result = parse_execution(body).unwrap();
        assert_eq!(result.execution_id.as_deref(), Some("42"));
        assert_eq!(result.status, ExecutionStatus::Success);
        let ids: Vec<&str> = result.node_runs.iter().map(|r| r.node_id.as_str()).collect();
        assert_eq!(ids, vec!["n1", "n2"]);
        assert_eq!(result.output, json!({"lead": "ada"}));
        assert_eq!(result.node_runs[0].output, json!([{"a": 1}, {"a": 2}]));
    }

    #[test]
    fn test_parse_error_execution() {
        let body = json!({
            "data": {"resultData": {
                "error": {"message": "boom"},
                "runData": {}
            }}
        });
        let result = parse_execution(body).unwrap();
        assert_eq!(result.status, ExecutionStatus::Error);
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert!(result.node_runs.is_empty());
    }

    #[tokio::test]
    async fn test_slow_engine_is_a_timeout() {
        // Accepts connections but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let engine = HttpEngine::new(&EngineSettings {
            endpoint: format!("http://{}", addr),
            api_key: Some("secret".into()),
            request_timeout_ms: 150,
        })
        .unwrap();
        let err = engine.get_workflow("w1").await.unwrap_err();
        assert!(err.is_timeout(), "{:?}", err);
        assert_eq!(err.to_string(), "engine call timed out after 150ms");
    }

    #[test]
    fn test_missing_result_data_is_decode_error() {
        let err = parse_execution(json!({"foo": 1})).unwrap_err();
        assert!(matches!(err, EngineError::Decode(_)));
    }
}
