use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use uuid::Uuid;

use super::js_engine::{evaluate, evaluate_condition, ExpressionScope};
use super::session::{
    DebugMode, DebugSession, DebugStep, ExecutionContext, SessionStatus, StepStatus,
    VariableInspection, WatchValue,
};
use super::store::{Breakpoint, DebugStore};
use super::DebugError;
use crate::engine::{AutomationEngine, NodeRunRequest};
use crate::workflow::{Workflow, WorkflowNode};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSession {
    pub workflow_id: String,
    #[serde(default)]
    pub workflow_name: Option<String>,
    #[serde(default)]
    pub input: Value,
    pub mode: DebugMode,
}

/// How far one call may advance a session
#[derive(Debug, Clone, Copy, PartialEq)]
enum Advance {
    /// Until a breakpoint, failure or completion
    UntilPause,
    /// Exactly one node, then pause
    OneNode,
}

/// Mutable execution state, only touched by the call currently driving the session
struct Driver {
    engine: Arc<dyn AutomationEngine>,
    workflow: Option<Workflow>,
    plan: Vec<WorkflowNode>,
    /// Index into `plan` of the next node to execute
    cursor: usize,
    /// `plan[cursor]` already has a paused step recorded for it
    pending_pause: bool,
    breakpoints: Vec<Breakpoint>,
    last_output: Value,
}

struct SessionHandle {
    state: Mutex<DebugSession>,
    driver: tokio::sync::Mutex<Driver>,
    stopped: AtomicBool,
}

impl SessionHandle {
    fn state(&self) -> MutexGuard<'_, DebugSession> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> DebugSession {
        self.state().clone()
    }
}

/// Owns every live debug session of the process
pub struct Debugger {
    store: Arc<DebugStore>,
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl Debugger {
    pub fn new(store: Arc<DebugStore>) -> Self {
        Self {
            store,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<DebugStore> {
        &self.store
    }

    fn handle(&self, session_id: &str) -> Result<Arc<SessionHandle>, DebugError> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
            .ok_or_else(|| DebugError::SessionNotFound(session_id.to_string()))
    }

    /// Create a session and run it to its first suspension point.
    ///
    /// Step-mode sessions are left `pending` so that every node, including
    /// the first, is driven by an explicit `step_next`.
    pub async fn start_debug_session(
        &self,
        request: StartSession,
        engine: Arc<dyn AutomationEngine>,
    ) -> Result<DebugSession, DebugError> {
        let breakpoints: Vec<Breakpoint> = self
            .store
            .breakpoints(&request.workflow_id)
            .into_iter()
            .filter(|b| b.enabled)
            .collect();

        let session = DebugSession::new(
            Uuid::new_v4().to_string(),
            &request.workflow_id,
            request.workflow_name.as_deref().unwrap_or(&request.workflow_id),
            request.mode,
            request.input.clone(),
            breakpoints.iter().map(|b| b.node_id.clone()).collect(),
        );
        let session_id = session.id.clone();

        let handle = Arc::new(SessionHandle {
            state: Mutex::new(session),
            driver: tokio::sync::Mutex::new(Driver {
                engine: engine.clone(),
                workflow: None,
                plan: Vec::new(),
                cursor: 0,
                pending_pause: false,
                breakpoints,
                last_output: request.input.clone(),
            }),
            stopped: AtomicBool::new(false),
        });
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id.clone(), handle.clone());

        log::info!(
            "Debug session {} started for workflow {} ({:?} mode)",
            session_id,
            request.workflow_id,
            request.mode
        );

        let mut driver = handle.driver.lock().await;
        match engine.get_workflow(&request.workflow_id).await {
            Ok(workflow) => {
                driver.plan = workflow.execution_order().into_iter().cloned().collect();
                if let Some(name) = request.workflow_name.as_deref() {
                    handle.state().workflow_name = name.to_string();
                } else {
                    handle.state().workflow_name = workflow.name.clone();
                }
                driver.workflow = Some(workflow);
            }
            Err(e) => {
                log::error!("Debug session {}: failed to load workflow: {}", session_id, e);
                handle.state().fail(Some(e.to_string()));
                return Ok(handle.snapshot());
            }
        }

        if request.mode == DebugMode::Step {
            return Ok(handle.snapshot());
        }

        handle.state().status = SessionStatus::Running;
        self.advance(&handle, &mut driver, Advance::UntilPause).await;
        drop(driver);
        Ok(handle.snapshot())
    }

    /// Resume a paused session
    pub async fn continue_execution(&self, session_id: &str) -> Result<DebugSession, DebugError> {
        let handle = self.handle(session_id)?;
        let mode = {
            let mut state = handle.state();
            if state.status != SessionStatus::Paused {
                return Err(DebugError::InvalidState {
                    session: session_id.to_string(),
                    status: state.status,
                    expected: "paused",
                });
            }
            state.resume();
            state.mode
        };

        let advance = if mode == DebugMode::Step {
            Advance::OneNode
        } else {
            Advance::UntilPause
        };
        let mut driver = handle.driver.lock().await;
        self.advance(&handle, &mut driver, advance).await;
        drop(driver);
        Ok(handle.snapshot())
    }

    /// Execute exactly one more node and return its step
    pub async fn step_next(&self, session_id: &str) -> Result<DebugStep, DebugError> {
        let handle = self.handle(session_id)?;
        {
            let mut state = handle.state();
            if !matches!(state.status, SessionStatus::Paused | SessionStatus::Pending) {
                return Err(DebugError::InvalidState {
                    session: session_id.to_string(),
                    status: state.status,
                    expected: "paused or pending",
                });
            }
            state.resume();
        }

        let mut driver = handle.driver.lock().await;
        let step = self.advance(&handle, &mut driver, Advance::OneNode).await;
        drop(driver);

        match step {
            Some(step) => Ok(step),
            None => {
                let state = handle.state();
                Err(DebugError::InvalidState {
                    session: session_id.to_string(),
                    status: state.status,
                    expected: "a remaining node",
                })
            }
        }
    }

    /// Terminate a session as failed.
    ///
    /// Sessions that already completed or failed are returned unchanged.
    pub fn stop_execution(&self, session_id: &str) -> Result<DebugSession, DebugError> {
        let handle = self.handle(session_id)?;
        handle.stopped.store(true, Ordering::SeqCst);
        let mut state = handle.state();
        if !state.status.is_terminal() {
            state.fail(Some("stopped by user".to_string()));
            log::info!("Debug session {} stopped", session_id);
        }
        Ok(state.clone())
    }

    pub fn get_session(&self, session_id: &str) -> Option<DebugSession> {
        self.handle(session_id).ok().map(|h| h.snapshot())
    }

    pub fn list_sessions(&self) -> Vec<DebugSession> {
        let mut sessions: Vec<DebugSession> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|h| h.snapshot())
            .collect();
        sessions.sort_by_key(|s| s.started_at);
        sessions
    }

    /// Forget a session; it is stopped first if still live
    pub fn clear_session(&self, session_id: &str) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
        match removed {
            Some(handle) => {
                handle.stopped.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn inspect_variables(&self, session_id: &str, step_id: &str) -> Option<VariableInspection> {
        let handle = self.handle(session_id).ok()?;
        let state = handle.state();
        state.step(step_id).map(VariableInspection::from)
    }

    pub fn get_execution_context(
        &self,
        session_id: &str,
        step_id: &str,
    ) -> Option<ExecutionContext> {
        let handle = self.handle(session_id).ok()?;
        let state = handle.state();
        state.step(step_id).map(|s| s.context.clone())
    }

    /// Drive the session forward; returns the last step executed by this call
    async fn advance(
        &self,
        handle: &SessionHandle,
        driver: &mut Driver,
        advance: Advance,
    ) -> Option<DebugStep> {
        let mut last_step = None;

        loop {
            if handle.stopped.load(Ordering::SeqCst) {
                return last_step;
            }
            let Some(node) = driver.plan.get(driver.cursor).cloned() else {
                self.finish(handle);
                return last_step;
            };

            let resuming = driver.pending_pause;
            if !resuming && advance == Advance::UntilPause && self.breakpoint_hit(handle, driver, &node)
            {
                let step = new_step(handle, driver, &node, StepStatus::Paused);
                let mut state = handle.state();
                if state.status.is_terminal() {
                    return last_step;
                }
                state.steps.push(step);
                state.pause_at(&node.id);
                driver.pending_pause = true;
                drop(state);
                self.store.record_hit(&state_workflow_id(handle), &node.id);
                log::info!("Paused at breakpoint on node '{}'", node.name);
                return last_step;
            }

            let step = self.execute_node(handle, driver, &node, resuming).await;
            driver.pending_pause = false;
            let Some(step) = step else {
                return last_step;
            };
            let failed = step.status == StepStatus::Failed;
            last_step = Some(step);
            if failed {
                return last_step;
            }

            driver.cursor += 1;
            if driver.cursor >= driver.plan.len() {
                self.finish(handle);
                return last_step;
            }
            if advance == Advance::OneNode {
                handle.state().pause_at(&node.id);
                return last_step;
            }
        }
    }

    fn finish(&self, handle: &SessionHandle) {
        let mut state = handle.state();
        if !state.status.is_terminal() {
            state.complete();
            log::info!(
                "Debug session {} completed after {} steps",
                state.id,
                state.steps.len()
            );
        }
    }

    fn breakpoint_hit(&self, handle: &SessionHandle, driver: &Driver, node: &WorkflowNode) -> bool {
        let Some(bp) = driver.breakpoints.iter().find(|b| b.node_id == node.id) else {
            return false;
        };
        let Some(ref condition) = bp.condition else {
            return true;
        };

        let scope = ExpressionScope {
            input: driver.last_output.clone(),
            output: Value::Null,
            variables: variables_value(&handle.state().variables),
            node: node_value(node),
            error: Value::Null,
        };
        match evaluate_condition(condition, &scope) {
            Ok(hit) => hit,
            Err(e) => {
                log::warn!(
                    "Breakpoint condition on '{}' could not be evaluated: {}",
                    node.name,
                    e
                );
                false
            }
        }
    }

    /// Run one node through the engine and record it as a step
    async fn execute_node(
        &self,
        handle: &SessionHandle,
        driver: &mut Driver,
        node: &WorkflowNode,
        resuming: bool,
    ) -> Option<DebugStep> {
        let mut step = if resuming {
            let paused = handle.state().steps.last().cloned();
            match paused {
                Some(mut s) if s.node_id == node.id => {
                    s.status = StepStatus::Running;
                    s.started_at = Utc::now();
                    s
                }
                _ => new_step(handle, driver, node, StepStatus::Running),
            }
        } else {
            new_step(handle, driver, node, StepStatus::Running)
        };

        let (session_id, workflow_id) = {
            let state = handle.state();
            (state.id.clone(), state.workflow_id.clone())
        };
        let outcome = driver
            .engine
            .execute_node(NodeRunRequest {
                workflow_id: &workflow_id,
                checkpoint_id: &session_id,
                node,
                input: &step.input,
            })
            .await;

        let finished_at = Utc::now();
        step.finished_at = Some(finished_at);

        let error = match outcome {
            Ok(run) => {
                step.duration_ms = Some(run.duration_ms.max(elapsed_ms(&step)));
                step.output = Some(run.output.clone());
                run.error
            }
            Err(e) => {
                step.duration_ms = Some(elapsed_ms(&step));
                Some(e.to_string())
            }
        };

        let mut state = handle.state();
        if state.status.is_terminal() || handle.stopped.load(Ordering::SeqCst) {
            return None;
        }

        if let Some(message) = error {
            log::warn!("Node '{}' failed: {}", node.name, message);
            step.status = StepStatus::Failed;
            step.error = Some(message.clone());
            step.variables = state.variables.clone();
            let scope = ExpressionScope {
                input: step.input.clone(),
                output: Value::Null,
                variables: variables_value(&state.variables),
                node: node_value(node),
                error: Value::String(message.clone()),
            };
            drop(state);

            step.watches = self.evaluate_watches(&workflow_id, &scope);

            let mut state = handle.state();
            if state.status.is_terminal() {
                return None;
            }
            push_or_replace(&mut state.steps, step.clone(), resuming);
            state.fail(Some(message));
            return Some(step);
        }

        let output = step.output.clone().unwrap_or(Value::Null);
        state.variables.insert(node.name.clone(), output.clone());
        step.status = StepStatus::Completed;
        step.variables = state.variables.clone();
        let scope = ExpressionScope {
            input: step.input.clone(),
            output: output.clone(),
            variables: variables_value(&state.variables),
            node: node_value(node),
            error: Value::Null,
        };
        drop(state);

        step.watches = self.evaluate_watches(&workflow_id, &scope);
        driver.last_output = output;

        let mut state = handle.state();
        if state.status.is_terminal() {
            return None;
        }
        push_or_replace(&mut state.steps, step.clone(), resuming);
        Some(step)
    }

    fn evaluate_watches(&self, workflow_id: &str, scope: &ExpressionScope) -> Vec<WatchValue> {
        self.store
            .watches(workflow_id)
            .into_iter()
            .map(|watch| {
                let result = evaluate(&watch.expression, scope);
                self.store.record_watch(workflow_id, &watch.id, &result);
                match result {
                    Ok(value) => WatchValue {
                        expression: watch.expression,
                        value: Some(value),
                        error: None,
                    },
                    Err(error) => WatchValue {
                        expression: watch.expression,
                        value: None,
                        error: Some(error),
                    },
                }
            })
            .collect()
    }
}

fn new_step(
    handle: &SessionHandle,
    driver: &Driver,
    node: &WorkflowNode,
    status: StepStatus,
) -> DebugStep {
    let state = handle.state();
    let previous_node_id = state
        .steps
        .iter()
        .rev()
        .find(|s| s.status == StepStatus::Completed)
        .map(|s| s.node_id.clone());
    let loop_iteration = state.steps.iter().filter(|s| s.node_id == node.id).count() as u32;
    let next_node_ids = driver
        .workflow
        .as_ref()
        .map(|w| w.next_node_ids(&node.id))
        .unwrap_or_default();

    DebugStep {
        id: Uuid::new_v4().to_string(),
        node_id: node.id.clone(),
        node_name: node.name.clone(),
        node_type: node.node_type.clone(),
        status,
        started_at: Utc::now(),
        finished_at: None,
        duration_ms: None,
        input: driver.last_output.clone(),
        output: None,
        error: None,
        variables: state.variables.clone(),
        watches: Vec::new(),
        context: ExecutionContext {
            previous_node_id,
            next_node_ids,
            loop_iteration,
            retry_count: 0,
        },
    }
}

/// A resumed paused step replaces itself; anything else is appended
fn push_or_replace(steps: &mut Vec<DebugStep>, step: DebugStep, resuming: bool) {
    if resuming {
        if let Some(last) = steps.last_mut() {
            if last.id == step.id {
                *last = step;
                return;
            }
        }
    }
    steps.push(step);
}

fn state_workflow_id(handle: &SessionHandle) -> String {
    handle.state().workflow_id.clone()
}

fn elapsed_ms(step: &DebugStep) -> u64 {
    step.finished_at
        .map(|f| (f - step.started_at).num_milliseconds().max(0) as u64)
        .unwrap_or(0)
}

fn variables_value(variables: &std::collections::BTreeMap<String, Value>) -> Value {
    Value::Object(variables.clone().into_iter().collect())
}

fn node_value(node: &WorkflowNode) -> Value {
    json!({ "id": node.id, "name": node.name, "type": node.node_type })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scripted::ScriptedEngine;

    fn chain() -> Workflow {
        Workflow::linear(
            "w1",
            "Lead intake",
            &[
                ("start", "trigger"),
                ("process", "set"),
                ("condition", "if"),
                ("end", "noOp"),
            ],
        )
    }

    fn start(mode: DebugMode) -> StartSession {
        StartSession {
            workflow_id: "w1".to_string(),
            workflow_name: None,
            input: json!({"lead": "ada"}),
            mode,
        }
    }

    #[tokio::test]
    async fn test_pauses_at_breakpoint_after_two_steps() {
        let store = Arc::new(DebugStore::new());
        store.add_breakpoint("w1", "condition", "condition", None);
        let debugger = Debugger::new(store.clone());
        let engine = Arc::new(ScriptedEngine::new(chain()));

        let session = debugger
            .start_debug_session(start(DebugMode::Breakpoint), engine)
            .await
            .unwrap();

        assert_eq!(session.status, SessionStatus::Paused);
        assert_eq!(session.current_node_id.as_deref(), Some("condition"));
        let completed: Vec<_> = session
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .collect();
        assert_eq!(completed.len(), 2);
        assert_eq!(session.steps.last().unwrap().status, StepStatus::Paused);
        assert_eq!(session.breakpoints, vec!["condition".to_string()]);
        assert_eq!(store.breakpoints("w1")[0].hit_count, 1);

        let resumed = debugger.continue_execution(&session.id).await.unwrap();
        assert_eq!(resumed.status, SessionStatus::Completed);
        assert_eq!(resumed.steps.len(), 4);
        assert!(resumed.steps.iter().all(|s| s.status == StepStatus::Completed));
        assert_eq!(resumed.workflow_name, "Lead intake");
    }

    #[tokio::test]
    async fn test_step_mode_needs_one_call_per_node() {
        let debugger = Debugger::new(Arc::new(DebugStore::new()));
        let engine = Arc::new(ScriptedEngine::new(chain()));
        let session = debugger
            .start_debug_session(start(DebugMode::Step), engine)
            .await
            .unwrap();
        assert_eq!(session.status, SessionStatus::Pending);
        assert!(session.steps.is_empty());

        let first = debugger.step_next(&session.id).await.unwrap();
        assert_eq!(first.node_id, "start");
        let paused = debugger.get_session(&session.id).unwrap();
        assert_eq!(paused.status, SessionStatus::Paused);
        assert_eq!(paused.current_node_id.as_deref(), Some("start"));

        let after_continue = debugger.continue_execution(&session.id).await.unwrap();
        assert_eq!(after_continue.status, SessionStatus::Paused);
        assert_eq!(after_continue.current_node_id.as_deref(), Some("process"));

        let third = debugger.step_next(&session.id).await.unwrap();
        assert_eq!(third.node_id, "condition");
        assert_eq!(
            debugger.get_session(&session.id).unwrap().status,
            SessionStatus::Paused
        );

        let last = debugger.step_next(&session.id).await.unwrap();
        assert_eq!(last.node_id, "end");
        let done = debugger.get_session(&session.id).unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.steps.len(), 4);
        assert!(done.current_node_id.is_none());
    }

    #[tokio::test]
    async fn test_outputs_flow_into_next_input() {
        let debugger = Debugger::new(Arc::new(DebugStore::new()));
        let engine = Arc::new(
            ScriptedEngine::new(chain()).with_output("process", json!({"score": 90})),
        );
        let session = debugger
            .start_debug_session(start(DebugMode::Continuous), engine)
            .await
            .unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.steps[0].input, json!({"lead": "ada"}));
        assert_eq!(session.steps[2].input, json!({"score": 90}));
        assert_eq!(session.variables.get("process"), Some(&json!({"score": 90})));

        let ctx = debugger
            .get_execution_context(&session.id, &session.steps[1].id)
            .unwrap();
        assert_eq!(ctx.previous_node_id.as_deref(), Some("start"));
        assert_eq!(ctx.next_node_ids, vec!["condition".to_string()]);
    }

    #[tokio::test]
    async fn test_terminal_session_rejects_continue() {
        let store = Arc::new(DebugStore::new());
        store.add_watch("w1", "output === null && error");
        let debugger = Debugger::new(store);
        let engine = Arc::new(ScriptedEngine::new(chain()).with_failure("condition", "bad input"));
        let session = debugger
            .start_debug_session(start(DebugMode::Continuous), engine)
            .await
            .unwrap();
        assert_eq!(session.status, SessionStatus::Failed);
        assert_eq!(session.steps.len(), 3);
        assert_eq!(session.steps[2].error.as_deref(), Some("node 'condition' failed: bad input"));
        let watches = &session.steps[2].watches;
        assert_eq!(watches.len(), 1);
        assert_eq!(
            watches[0].value,
            Some(json!("node 'condition' failed: bad input"))
        );

        let err = debugger.continue_execution(&session.id).await.unwrap_err();
        assert!(matches!(err, DebugError::InvalidState { .. }));
        assert!(debugger.step_next(&session.id).await.is_err());
        assert_eq!(debugger.get_session(&session.id).unwrap().steps.len(), 3);
    }

    #[tokio::test]
    async fn test_stop_terminates_paused_session() {
        let store = Arc::new(DebugStore::new());
        store.add_breakpoint("w1", "process", "process", None);
        let debugger = Debugger::new(store);
        let engine = Arc::new(ScriptedEngine::new(chain()));
        let session = debugger
            .start_debug_session(start(DebugMode::Breakpoint), engine)
            .await
            .unwrap();

        let stopped = debugger.stop_execution(&session.id).unwrap();
        assert_eq!(stopped.status, SessionStatus::Failed);
        assert!(stopped.finished_at.is_some());
        assert!(debugger.continue_execution(&session.id).await.is_err());
        assert!(debugger.stop_execution("nope").is_err());
    }

    #[tokio::test]
    async fn test_breakpoint_edits_do_not_affect_running_session() {
        let store = Arc::new(DebugStore::new());
        store.add_breakpoint("w1", "process", "process", None);
        let debugger = Debugger::new(store.clone());
        let engine = Arc::new(ScriptedEngine::new(chain()));
        let session = debugger
            .start_debug_session(start(DebugMode::Breakpoint), engine)
            .await
            .unwrap();
        assert_eq!(session.current_node_id.as_deref(), Some("process"));

        store.add_breakpoint("w1", "end", "end", None);
        let resumed = debugger.continue_execution(&session.id).await.unwrap();
        assert_eq!(resumed.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_conditional_breakpoint_and_watches() {
        let store = Arc::new(DebugStore::new());
        store.add_breakpoint("w1", "end", "end", Some("input.score > 100".into()));
        store.add_watch("w1", "{{ $json.score }}");
        store.add_watch("w1", "output.nothing.here");
        let debugger = Debugger::new(store.clone());
        let engine = Arc::new(
            ScriptedEngine::new(chain()).with_output("condition", json!({"score": 50})),
        );
        let session = debugger
            .start_debug_session(start(DebugMode::Breakpoint), engine)
            .await
            .unwrap();
        assert_eq!(session.status, SessionStatus::Completed);

        let condition_step = &session.steps[2];
        assert_eq!(condition_step.watches[0].value, Some(json!(50)));
        assert!(condition_step.watches[1].error.is_some());

        let inspection = debugger
            .inspect_variables(&session.id, &condition_step.id)
            .unwrap();
        assert_eq!(inspection.output, Some(json!({"score": 50})));
        assert!(debugger.inspect_variables(&session.id, "missing").is_none());
        assert!(debugger.inspect_variables("missing", &condition_step.id).is_none());

        let watches = store.watches("w1");
        assert!(watches[0].last_evaluated_at.is_some());
    }

    #[tokio::test]
    async fn test_unknown_workflow_fails_session() {
        let debugger = Debugger::new(Arc::new(DebugStore::new()));
        let engine = Arc::new(ScriptedEngine::new(chain()));
        let mut request = start(DebugMode::Continuous);
        request.workflow_id = "missing".to_string();
        let session = debugger.start_debug_session(request, engine).await.unwrap();
        assert_eq!(session.status, SessionStatus::Failed);
        assert!(session.error.is_some());
        assert_eq!(debugger.list_sessions().len(), 1);
        assert!(debugger.clear_session(&session.id));
        assert!(debugger.get_session(&session.id).is_none());
    }
}
