//! Per-workflow breakpoint and watch-variable storage.
//!
//! Readers always get copies, so a session that snapshots the breakpoints at
//! start is unaffected by later edits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use super::DebugError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    pub node_id: String,
    pub node_name: String,
    pub condition: Option<String>,
    pub hit_count: u64,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WatchVariable {
    pub id: String,
    pub expression: String,
    pub last_value: Option<Value>,
    pub last_error: Option<String>,
    pub last_evaluated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkflowDebugState {
    #[serde(default)]
    breakpoints: Vec<Breakpoint>,
    #[serde(default)]
    watches: Vec<WatchVariable>,
}

#[derive(Default)]
pub struct DebugStore {
    workflows: RwLock<HashMap<String, WorkflowDebugState>>,
    state_file: Option<PathBuf>,
}

impl DebugStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store backed by a JSON file, rewritten on breakpoint and watch edits.
    /// Hit counts and watch values are saved with the next edit.
    pub fn open(path: &Path) -> Result<Self, DebugError> {
        let workflows = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| DebugError::State(format!("{}: {}", path.display(), e)))?;
            serde_json::from_str(&raw)
                .map_err(|e| DebugError::State(format!("{}: {}", path.display(), e)))?
        } else {
            HashMap::new()
        };

        Ok(Self {
            workflows: RwLock::new(workflows),
            state_file: Some(path.to_path_buf()),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, WorkflowDebugState>> {
        self.workflows.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, WorkflowDebugState>> {
        self.workflows.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, workflows: &HashMap<String, WorkflowDebugState>) {
        let Some(ref path) = self.state_file else {
            return;
        };
        let result = serde_json::to_string_pretty(workflows)
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(path, json).map_err(|e| e.to_string()));
        if let Err(e) = result {
            log::warn!("Failed to save debug state to {}: {}", path.display(), e);
        }
    }

    /// Add a breakpoint, replacing any existing one on the same node
    pub fn add_breakpoint(
        &self,
        workflow_id: &str,
        node_id: &str,
        node_name: &str,
        condition: Option<String>,
    ) -> Breakpoint {
        let breakpoint = Breakpoint {
            node_id: node_id.to_string(),
            node_name: node_name.to_string(),
            condition: condition.filter(|c| !c.trim().is_empty()),
            hit_count: 0,
            enabled: true,
            created_at: Utc::now(),
        };

        let mut workflows = self.write();
        let state = workflows.entry(workflow_id.to_string()).or_default();
        state.breakpoints.retain(|b| b.node_id != node_id);
        state.breakpoints.push(breakpoint.clone());
        self.persist(&workflows);
        breakpoint
    }

    pub fn remove_breakpoint(&self, workflow_id: &str, node_id: &str) -> bool {
        let mut workflows = self.write();
        let Some(state) = workflows.get_mut(workflow_id) else {
            return false;
        };
        let before = state.breakpoints.len();
        state.breakpoints.retain(|b| b.node_id != node_id);
        let removed = state.breakpoints.len() != before;
        if removed {
            self.persist(&workflows);
        }
        removed
    }

    pub fn toggle_breakpoint(&self, workflow_id: &str, node_id: &str) -> Option<Breakpoint> {
        let mut workflows = self.write();
        let toggled = workflows
            .get_mut(workflow_id)?
            .breakpoints
            .iter_mut()
            .find(|b| b.node_id == node_id)
            .map(|b| {
                b.enabled = !b.enabled;
                b.clone()
            });
        if toggled.is_some() {
            self.persist(&workflows);
        }
        toggled
    }

    pub fn breakpoints(&self, workflow_id: &str) -> Vec<Breakpoint> {
        self.read()
            .get(workflow_id)
            .map(|s| s.breakpoints.clone())
            .unwrap_or_default()
    }

    pub fn record_hit(&self, workflow_id: &str, node_id: &str) {
        let mut workflows = self.write();
        if let Some(bp) = workflows
            .get_mut(workflow_id)
            .and_then(|s| s.breakpoints.iter_mut().find(|b| b.node_id == node_id))
        {
            bp.hit_count += 1;
        }
    }

    pub fn add_watch(&self, workflow_id: &str, expression: &str) -> WatchVariable {
        let watch = WatchVariable {
            id: Uuid::new_v4().to_string(),
            expression: expression.to_string(),
            last_value: None,
            last_error: None,
            last_evaluated_at: None,
        };
        let mut workflows = self.write();
        workflows
            .entry(workflow_id.to_string())
            .or_default()
            .watches
            .push(watch.clone());
        self.persist(&workflows);
        watch
    }

    pub fn remove_watch(&self, workflow_id: &str, watch_id: &str) -> bool {
        let mut workflows = self.write();
        let Some(state) = workflows.get_mut(workflow_id) else {
            return false;
        };
        let before = state.watches.len();
        state.watches.retain(|w| w.id != watch_id);
        let removed = state.watches.len() != before;
        if removed {
            self.persist(&workflows);
        }
        removed
    }

    pub fn watches(&self, workflow_id: &str) -> Vec<WatchVariable> {
        self.read()
            .get(workflow_id)
            .map(|s| s.watches.clone())
            .unwrap_or_default()
    }

    /// Store the latest evaluation of a watch expression
    pub fn record_watch(&self, workflow_id: &str, watch_id: &str, result: &Result<Value, String>) {
        let mut workflows = self.write();
        if let Some(watch) = workflows
            .get_mut(workflow_id)
            .and_then(|s| s.watches.iter_mut().find(|w| w.id == watch_id))
        {
            match result {
                Ok(v) => {
                    watch.last_value = Some(v.clone());
                    watch.last_error = None;
                }
                Err(e) => {
                    watch.last_value = None;
                    watch.last_error = Some(e.clone());
                }
            }
            watch.last_evaluated_at = Some(Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_breakpoint_lifecycle() {
        let store = DebugStore::new();
        store.add_breakpoint("w1", "condition", "Condition", None);
        store.add_breakpoint("w1", "condition", "Condition", Some("output.x > 1".into()));
        let bps = store.breakpoints("w1");
        assert_eq!(bps.len(), 1);
        assert_eq!(bps[0].condition.as_deref(), Some("output.x > 1"));

        let toggled = store.toggle_breakpoint("w1", "condition").unwrap();
        assert!(!toggled.enabled);
        assert!(store.toggle_breakpoint("w1", "missing").is_none());

        store.record_hit("w1", "condition");
        assert_eq!(store.breakpoints("w1")[0].hit_count, 1);

        assert!(store.remove_breakpoint("w1", "condition"));
        assert!(!store.remove_breakpoint("w1", "condition"));
        assert!(store.breakpoints("w1").is_empty());
    }

    #[test]
    fn test_snapshot_is_independent_of_later_edits() {
        let store = DebugStore::new();
        store.add_breakpoint("w1", "a", "A", None);
        let snapshot = store.breakpoints("w1");
        store.add_breakpoint("w1", "b", "B", None);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.breakpoints("w1").len(), 2);
        assert!(store.breakpoints("other").is_empty());
    }

    #[test]
    fn test_watch_values() {
        let store = DebugStore::new();
        let watch = store.add_watch("w1", "output.total");
        store.record_watch("w1", &watch.id, &Ok(json!(12)));
        let saved = &store.watches("w1")[0];
        assert_eq!(saved.last_value, Some(json!(12)));
        assert!(saved.last_evaluated_at.is_some());

        store.record_watch("w1", &watch.id, &Err("boom".to_string()));
        let saved = &store.watches("w1")[0];
        assert_eq!(saved.last_value, None);
        assert_eq!(saved.last_error.as_deref(), Some("boom"));

        assert!(store.remove_watch("w1", &watch.id));
        assert!(store.watches("w1").is_empty());
    }

    #[test]
    fn test_state_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug-state.json");
        {
            let store = DebugStore::open(&path).unwrap();
            store.add_breakpoint("w1", "a", "A", None);
            store.add_watch("w1", "input.id");
        }
        let reopened = DebugStore::open(&path).unwrap();
        assert_eq!(reopened.breakpoints("w1").len(), 1);
        assert_eq!(reopened.watches("w1")[0].expression, "input.id");
    }

    #[test]
    fn test_evaluations_do_not_rewrite_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug-state.json");
        let store = DebugStore::open(&path).unwrap();
        store.add_breakpoint("w1", "a", "A", None);
        let watch = store.add_watch("w1", "input.id");
        let saved = std::fs::read(&path).unwrap();

        store.record_hit("w1", "a");
        store.record_watch("w1", &watch.id, &Ok(json!(7)));
        assert_eq!(std::fs::read(&path).unwrap(), saved);
        assert_eq!(store.breakpoints("w1")[0].hit_count, 1);
        assert_eq!(store.watches("w1")[0].last_value, Some(json!(7)));

        store.toggle_breakpoint("w1", "a");
        let reopened = DebugStore::open(&path).unwrap();
        assert_eq!(reopened.breakpoints("w1")[0].hit_count, 1);
        assert_eq!(reopened.watches("w1")[0].last_value, Some(json!(7)));
    }
}
