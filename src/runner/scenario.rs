use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioType {
    #[default]
    Unit,
    Integration,
    E2e,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AssertionType {
    Equals,
    Contains,
    Matches,
    Exists,
    NotExists,
    GreaterThan,
    LessThan,
}

/// One structured check against a path in the execution result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestAssertion {
    #[serde(rename = "type")]
    pub assertion_type: AssertionType,
    /// Dot/bracket path into the output; empty for the whole output
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub expected: Value,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestScenario {
    #[serde(default = "new_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// May be omitted inside a suite, which then supplies it
    #[serde(default)]
    pub workflow_id: String,
    #[serde(default)]
    pub scenario_type: ScenarioType,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub expected_output: Option<Value>,
    /// Milliseconds; the runner default applies when absent
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl TestScenario {
    pub fn new(name: &str, workflow_id: &str, input: Value) -> Self {
        Self {
            id: new_id(),
            name: name.to_string(),
            description: None,
            workflow_id: workflow_id.to_string(),
            scenario_type: ScenarioType::Unit,
            enabled: true,
            input,
            expected_output: None,
            timeout_ms: None,
            retry_count: 0,
            tags: Vec::new(),
            assertions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_assertion(mut self, assertion_type: AssertionType, path: &str, expected: Value) -> Self {
        self.assertions.push(TestAssertion {
            assertion_type,
            path: path.to_string(),
            expected,
            description: None,
        });
        self
    }

    /// True when the scenario carries every tag in `required`
    pub fn matches_tags(&self, required: &[String]) -> bool {
        required.iter().all(|t| self.tags.contains(t))
    }
}

/// A named group of scenarios for one workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestSuite {
    #[serde(default = "new_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub workflow_id: String,
    #[serde(default)]
    pub scenarios: Vec<TestScenario>,
    /// Record the remaining scenarios as skipped after the first failure
    #[serde(default)]
    pub stop_on_failure: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl TestSuite {
    pub fn new(name: &str, workflow_id: &str, scenarios: Vec<TestScenario>) -> Self {
        Self {
            id: new_id(),
            name: name.to_string(),
            description: None,
            workflow_id: workflow_id.to_string(),
            scenarios,
            stop_on_failure: false,
            tags: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn enabled_scenarios(&self) -> impl Iterator<Item = &TestScenario> {
        self.scenarios.iter().filter(|s| s.enabled)
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_enabled() -> bool {
    true
}
