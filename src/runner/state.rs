use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::assertion::AssertionResult;
use super::coverage::CoverageSummary;

/// Scenario execution status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Running,
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TestErrorKind {
    Timeout,
    Engine,
    Execution,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestError {
    pub kind: TestErrorKind,
    pub message: String,
    #[serde(default)]
    pub node_id: Option<String>,
}

/// Outcome of running one scenario once
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub id: String,
    pub scenario_id: String,
    pub scenario_name: String,
    pub workflow_id: String,
    pub run_id: Option<String>,
    pub status: TestStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub attempts: u32,
    pub output: Option<Value>,
    pub logs: Vec<LogEntry>,
    pub errors: Vec<TestError>,
    pub assertions: Vec<AssertionResult>,
    pub coverage: CoverageSummary,
}

impl TestResult {
    pub fn new(id: String, scenario_id: &str, scenario_name: &str, workflow_id: &str) -> Self {
        Self {
            id,
            scenario_id: scenario_id.to_string(),
            scenario_name: scenario_name.to_string(),
            workflow_id: workflow_id.to_string(),
            run_id: None,
            status: TestStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: 0,
            attempts: 0,
            output: None,
            logs: Vec::new(),
            errors: Vec::new(),
            assertions: Vec::new(),
            coverage: CoverageSummary::default(),
        }
    }

    pub fn log(&mut self, level: LogLevel, message: impl Into<String>, data: Option<Value>) {
        self.logs.push(LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            data,
        });
    }

    pub fn failed_assertions(&self) -> usize {
        self.assertions.iter().filter(|a| !a.passed).count()
    }

    /// Passed only with no errors and no failed assertions
    pub fn finalize(&mut self) {
        let finished_at = Utc::now();
        self.duration_ms = (finished_at - self.started_at).num_milliseconds().max(0) as u64;
        self.finished_at = Some(finished_at);
        self.status = if self.errors.is_empty() && self.failed_assertions() == 0 {
            TestStatus::Passed
        } else {
            TestStatus::Failed
        };
    }

    pub fn skip(&mut self, reason: &str) {
        self.log(LogLevel::Info, format!("Skipped: {}", reason), None);
        self.status = TestStatus::Skipped;
        self.finished_at = Some(self.started_at);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// One execution of a suite
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRun {
    pub id: String,
    pub suite_id: String,
    pub suite_name: String,
    pub workflow_id: String,
    pub environment: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub total_scenarios: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub results: Vec<TestResult>,
}

impl TestRun {
    pub fn new(id: String, suite_id: &str, suite_name: &str, workflow_id: &str, environment: &str, total: u32) -> Self {
        Self {
            id,
            suite_id: suite_id.to_string(),
            suite_name: suite_name.to_string(),
            workflow_id: workflow_id.to_string(),
            environment: environment.to_string(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            total_scenarios: total,
            passed: 0,
            failed: 0,
            skipped: 0,
            results: Vec::new(),
        }
    }

    pub fn record(&mut self, result: TestResult) {
        match result.status {
            TestStatus::Passed => self.passed += 1,
            TestStatus::Failed => self.failed += 1,
            TestStatus::Skipped => self.skipped += 1,
            TestStatus::Running => {}
        }
        self.results.push(result);
    }

    pub fn finish(&mut self) {
        let finished_at = Utc::now();
        self.duration_ms = Some((finished_at - self.started_at).num_milliseconds().max(0) as u64);
        self.finished_at = Some(finished_at);
        self.status = if self.failed > 0 {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
    }

    pub fn is_active(&self) -> bool {
        self.status == RunStatus::Running
    }
}
