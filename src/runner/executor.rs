use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::assertion::{validate_assertions, ResultView};
use super::coverage::CoverageSummary;
use super::events::{EventEmitter, TestEvent};
use super::scenario::{AssertionType, TestAssertion, TestScenario, TestSuite};
use super::state::{LogLevel, TestError, TestErrorKind, TestResult, TestRun, TestStatus};
use super::store::{StoreError, TestStore};
use crate::engine::{AutomationEngine, ExecutionRequest, ExecutionResult, ExecutionStatus};

/// Runner limits and defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunnerSettings {
    /// Applied when a scenario has no timeout of its own
    #[serde(alias = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Upper bound for any scenario timeout
    #[serde(alias = "max_timeout_ms")]
    pub max_timeout_ms: u64,
    /// Pause between retry attempts
    #[serde(alias = "retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
            max_timeout_ms: 300_000,
            retry_delay_ms: 1_000,
        }
    }
}

/// Executes scenarios against the engine and tracks suite runs
#[derive(Clone)]
pub struct TestRunner {
    store: TestStore,
    settings: RunnerSettings,
    emitter: EventEmitter,
    active_runs: Arc<RwLock<HashMap<String, TestRun>>>,
}

impl TestRunner {
    pub fn new(store: TestStore, settings: RunnerSettings) -> Self {
        Self {
            store,
            settings,
            emitter: EventEmitter::default(),
            active_runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &TestStore {
        &self.store
    }

    /// Subscribe to test execution events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<TestEvent> {
        self.emitter.subscribe()
    }

    /// Run one scenario and persist its result
    pub async fn run_scenario(
        &self,
        scenario: &TestScenario,
        engine: Arc<dyn AutomationEngine>,
    ) -> TestResult {
        let result = self.execute_scenario(scenario, engine.as_ref(), None, 0).await;
        self.persist(&result).await;
        result
    }

    /// Run every enabled scenario of the suite, one after another
    pub async fn run_suite(
        &self,
        suite: &TestSuite,
        environment: &str,
        engine: Arc<dyn AutomationEngine>,
    ) -> TestRun {
        let run = self.prepare_run(suite, environment).await;
        self.drive_run(run.id, suite.clone(), engine).await
    }

    /// Start a suite run in the background and return its id
    pub async fn start_suite(
        &self,
        suite: TestSuite,
        environment: &str,
        engine: Arc<dyn AutomationEngine>,
    ) -> String {
        let run = self.prepare_run(&suite, environment).await;
        let run_id = run.id.clone();
        let runner = self.clone();
        tokio::spawn(async move {
            runner.drive_run(run.id, suite, engine).await;
        });
        run_id
    }

    pub async fn list_active_runs(&self) -> Vec<TestRun> {
        let mut runs: Vec<TestRun> = self.active_runs.read().await.values().cloned().collect();
        runs.sort_by_key(|r| r.started_at);
        runs
    }

    /// Live runs first, then persisted ones
    pub async fn get_run(&self, run_id: &str) -> Result<Option<TestRun>, StoreError> {
        if let Some(run) = self.active_runs.read().await.get(run_id) {
            return Ok(Some(run.clone()));
        }
        self.store.get(run_id).await
    }

    pub async fn get_result(&self, result_id: &str) -> Result<Option<TestResult>, StoreError> {
        self.store.get(result_id).await
    }

    async fn persist<T: super::store::Document>(&self, doc: &T) {
        if let Err(e) = self.store.save(doc).await {
            log::warn!("Failed to persist {}: {}", doc.id(), e);
        }
    }

    async fn prepare_run(&self, suite: &TestSuite, environment: &str) -> TestRun {
        let total = suite.enabled_scenarios().count() as u32;
        let run = TestRun::new(
            Uuid::new_v4().to_string(),
            &suite.id,
            &suite.name,
            &suite.workflow_id,
            environment,
            total,
        );
        self.active_runs
            .write()
            .await
            .insert(run.id.clone(), run.clone());
        self.persist(&run).await;

        log::info!(
            "Suite '{}' run {} started with {} scenarios",
            suite.name,
            run.id,
            total
        );
        self.emitter.emit(TestEvent::RunStarted {
            run_id: run.id.clone(),
            suite_name: suite.name.clone(),
            total_scenarios: total,
        });
        run
    }

    /// Single worker over an ordered queue keeps results in declaration order
    async fn drive_run(
        &self,
        run_id: String,
        suite: TestSuite,
        engine: Arc<dyn AutomationEngine>,
    ) -> TestRun {
        let mut queue: VecDeque<TestScenario> = suite.enabled_scenarios().cloned().collect();
        let mut halted = false;
        let mut index = 0;

        while let Some(scenario) = queue.pop_front() {
            let result = if halted {
                let mut skipped = TestResult::new(
                    Uuid::new_v4().to_string(),
                    &scenario.id,
                    &scenario.name,
                    &scenario.workflow_id,
                );
                skipped.run_id = Some(run_id.clone());
                skipped.skip("a previous scenario failed");
                self.emitter.emit(TestEvent::ScenarioSkipped {
                    scenario_name: scenario.name.clone(),
                    reason: "previous scenario failed".to_string(),
                });
                skipped
            } else {
                self.execute_scenario(&scenario, engine.as_ref(), Some(&run_id), index)
                    .await
            };

            if result.status == TestStatus::Failed && suite.stop_on_failure {
                halted = true;
            }
            self.persist(&result).await;
            if let Some(run) = self.active_runs.write().await.get_mut(&run_id) {
                run.record(result);
            }
            index += 1;
        }

        let mut run = match self.active_runs.write().await.remove(&run_id) {
            Some(run) => run,
            None => TestRun::new(run_id.clone(), &suite.id, &suite.name, &suite.workflow_id, "", 0),
        };
        run.finish();
        self.persist(&run).await;

        log::info!(
            "Run {} finished: {} passed, {} failed, {} skipped",
            run.id,
            run.passed,
            run.failed,
            run.skipped
        );
        self.emitter.emit(TestEvent::RunFinished {
            run_id: run.id.clone(),
            status: run.status,
            passed: run.passed,
            failed: run.failed,
            skipped: run.skipped,
            duration_ms: run.duration_ms,
        });
        run
    }

    async fn execute_scenario(
        &self,
        scenario: &TestScenario,
        engine: &dyn AutomationEngine,
        run_id: Option<&str>,
        index: usize,
    ) -> TestResult {
        let mut result = TestResult::new(
            Uuid::new_v4().to_string(),
            &scenario.id,
            &scenario.name,
            &scenario.workflow_id,
        );
        result.run_id = run_id.map(str::to_string);

        let timeout_ms = scenario
            .timeout_ms
            .unwrap_or(self.settings.default_timeout_ms)
            .min(self.settings.max_timeout_ms);
        let max_attempts = scenario.retry_count + 1;

        self.emitter.emit(TestEvent::ScenarioStarted {
            scenario_name: scenario.name.clone(),
            index,
        });
        result.log(
            LogLevel::Info,
            format!("Executing workflow {}", scenario.workflow_id),
            Some(json!({ "timeoutMs": timeout_ms, "maxAttempts": max_attempts })),
        );

        let request = ExecutionRequest {
            workflow_id: scenario.workflow_id.clone(),
            input: scenario.input.clone(),
        };

        let mut execution: Option<ExecutionResult> = None;
        let mut last_error: Option<TestError> = None;
        for attempt in 1..=max_attempts {
            result.attempts = attempt;
            let outcome =
                tokio::time::timeout(Duration::from_millis(timeout_ms), engine.execute(&request))
                    .await;

            let error = match outcome {
                Ok(Ok(exec)) => {
                    execution = Some(exec);
                    last_error = None;
                    break;
                }
                Ok(Err(e)) => TestError {
                    kind: if e.is_timeout() {
                        TestErrorKind::Timeout
                    } else {
                        TestErrorKind::Engine
                    },
                    message: e.to_string(),
                    node_id: None,
                },
                Err(_) => TestError {
                    kind: TestErrorKind::Timeout,
                    message: format!("Execution timed out after {}ms", timeout_ms),
                    node_id: None,
                },
            };

            result.log(
                LogLevel::Warn,
                format!("Attempt {}/{} failed: {}", attempt, max_attempts, error.message),
                None,
            );
            last_error = Some(error);

            if attempt < max_attempts {
                self.emitter.emit(TestEvent::ScenarioRetrying {
                    scenario_name: scenario.name.clone(),
                    attempt: attempt + 1,
                    max_attempts,
                });
                tokio::time::sleep(Duration::from_millis(self.settings.retry_delay_ms)).await;
            }
        }

        if let Some(error) = last_error {
            result.errors.push(error);
        }

        if let Some(exec) = execution {
            self.evaluate_execution(scenario, engine, &exec, timeout_ms, &mut result)
                .await;
        }

        result.finalize();
        self.report(&result);
        result
    }

    async fn evaluate_execution(
        &self,
        scenario: &TestScenario,
        engine: &dyn AutomationEngine,
        exec: &ExecutionResult,
        timeout_ms: u64,
        result: &mut TestResult,
    ) {
        result.log(
            LogLevel::Info,
            "Execution finished",
            Some(json!({
                "executionId": exec.execution_id,
                "status": exec.status,
                "nodesExecuted": exec.node_runs.len(),
            })),
        );

        if exec.status == ExecutionStatus::Error {
            let failed_node = exec.node_runs.iter().find(|r| r.error.is_some());
            result.errors.push(TestError {
                kind: TestErrorKind::Execution,
                message: exec
                    .error
                    .clone()
                    .or_else(|| failed_node.and_then(|r| r.error.clone()))
                    .unwrap_or_else(|| "workflow reported an error".to_string()),
                node_id: failed_node.map(|r| r.node_id.clone()),
            });
        }
        result.output = Some(exec.output.clone());

        let mut assertions: Vec<TestAssertion> = scenario.assertions.clone();
        if let Some(ref expected) = scenario.expected_output {
            assertions.push(TestAssertion {
                assertion_type: AssertionType::Equals,
                path: String::new(),
                expected: expected.clone(),
                description: Some("expected output".to_string()),
            });
        }

        let nodes = exec.node_outputs();
        let view = ResultView {
            output: &exec.output,
            nodes: &nodes,
        };
        let outcomes = validate_assertions(&assertions, &view);
        for failed in outcomes.iter().filter(|a| !a.passed) {
            result.log(LogLevel::Error, failed.message.clone(), None);
        }
        result.assertions = outcomes;

        let workflow = match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            engine.get_workflow(&scenario.workflow_id),
        )
        .await
        {
            Ok(Ok(workflow)) => Some(workflow),
            Ok(Err(e)) => {
                result.log(
                    LogLevel::Warn,
                    format!("Workflow definition unavailable for coverage: {}", e),
                    None,
                );
                None
            }
            Err(_) => {
                result.log(
                    LogLevel::Warn,
                    "Workflow definition request timed out; coverage uses executed nodes only",
                    None,
                );
                None
            }
        };
        result.coverage = CoverageSummary::from_node_runs(workflow.as_ref(), &exec.node_runs);
    }

    fn report(&self, result: &TestResult) {
        let reasons: Vec<String> = result
            .errors
            .iter()
            .map(|e| e.message.clone())
            .chain(
                result
                    .assertions
                    .iter()
                    .filter(|a| !a.passed)
                    .map(|a| a.message.clone()),
            )
            .collect();
        if result.status == TestStatus::Passed {
            log::info!("{} Scenario '{}' passed", "✓".green(), result.scenario_name);
        } else {
            log::warn!(
                "{} Scenario '{}' failed: {}",
                "✗".red(),
                result.scenario_name,
                reasons.join("; ")
            );
        }
        self.emitter.emit(TestEvent::ScenarioFinished {
            scenario_name: result.scenario_name.clone(),
            status: result.status,
            duration_ms: result.duration_ms,
            coverage: result.coverage.percentage,
            reasons,
        });
    }
}
