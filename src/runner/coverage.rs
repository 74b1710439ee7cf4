use serde::{Deserialize, Serialize};

use crate::engine::NodeRun;
use crate::workflow::Workflow;

/// Fraction of a workflow's nodes exercised by one execution
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoverageSummary {
    pub total_nodes: usize,
    pub executed_nodes: usize,
    pub percentage: f64,
    pub executed: Vec<String>,
    pub missed: Vec<String>,
}

impl CoverageSummary {
    /// Coverage from the engine's node runs. Without a workflow definition
    /// only the executed nodes are known, so they form the whole node set.
    pub fn from_node_runs(workflow: Option<&Workflow>, runs: &[NodeRun]) -> Self {
        let mut executed: Vec<String> = Vec::new();
        for run in runs {
            if !executed.contains(&run.node_id) {
                executed.push(run.node_id.clone());
            }
        }

        let all = match workflow {
            Some(wf) => wf.node_ids(),
            None => executed.clone(),
        };
        let executed: Vec<String> = match workflow {
            Some(_) => executed.into_iter().filter(|id| all.contains(id)).collect(),
            None => executed,
        };
        let missed: Vec<String> = all
            .iter()
            .filter(|id| !executed.contains(id))
            .cloned()
            .collect();

        let percentage = if all.is_empty() {
            0.0
        } else {
            (executed.len() as f64 / all.len() as f64 * 10_000.0).round() / 100.0
        };

        Self {
            total_nodes: all.len(),
            executed_nodes: executed.len(),
            percentage,
            executed,
            missed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::Value;

    fn run(id: &str) -> NodeRun {
        NodeRun {
            node_id: id.to_string(),
            node_name: id.to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            duration_ms: 1,
            output: Value::Null,
            error: None,
        }
    }

    #[test]
    fn test_partial_coverage() {
        let wf = Workflow::linear("w1", "wf", &[("a", "t"), ("b", "t"), ("c", "t")]);
        let summary = CoverageSummary::from_node_runs(Some(&wf), &[run("a"), run("b"), run("a")]);
        assert_eq!(summary.total_nodes, 3);
        assert_eq!(summary.executed_nodes, 2);
        assert_eq!(summary.missed, vec!["c".to_string()]);
        assert_eq!(summary.percentage, 66.67);
    }

    #[test]
    fn test_without_definition() {
        let summary = CoverageSummary::from_node_runs(None, &[run("a")]);
        assert_eq!(summary.total_nodes, 1);
        assert_eq!(summary.percentage, 100.0);
        assert_eq!(CoverageSummary::from_node_runs(None, &[]).percentage, 0.0);
    }
}
