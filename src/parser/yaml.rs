use crate::runner::scenario::{TestScenario, TestSuite};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Suites collected from one or more scenario files
#[derive(Debug, Clone, Default)]
pub struct TestPlan {
    pub suites: Vec<TestSuite>,
}

impl TestPlan {
    pub fn scenario_count(&self) -> usize {
        self.suites.iter().map(|s| s.enabled_scenarios().count()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.scenario_count() == 0
    }

    /// Keep only scenarios carrying every required tag (suite tags count too).
    /// Suites left without scenarios are dropped.
    pub fn filter_tags(mut self, required: &[String]) -> Self {
        if required.is_empty() {
            return self;
        }
        for suite in &mut self.suites {
            let suite_tags = suite.tags.clone();
            suite.scenarios.retain(|scenario| {
                required
                    .iter()
                    .all(|t| scenario.tags.contains(t) || suite_tags.contains(t))
            });
        }
        self.suites.retain(|s| !s.scenarios.is_empty());
        self
    }
}

/// Load a scenario file, or every `.yaml`/`.yml`/`.json` file under a directory
pub fn load_path(path: &Path) -> Result<TestPlan> {
    let mut plan = TestPlan::default();
    for file in collect_files(path)? {
        let mut suites = parse_test_file(&file)?;
        plan.suites.append(&mut suites);
    }
    Ok(plan)
}

fn collect_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        anyhow::bail!("Path not found: {}", path.display());
    }
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let is_scenario_file = entry
            .path()
            .extension()
            .map_or(false, |ext| ext == "yaml" || ext == "yml" || ext == "json");
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if is_scenario_file && !hidden {
            files.push(entry.path().to_path_buf());
        }
    }
    Ok(files)
}

/// Parse one file into suites
pub fn parse_test_file(path: &Path) -> Result<Vec<TestSuite>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "scenarios".to_string());

    parse_content(&content, &stem)
        .with_context(|| format!("Failed to parse scenarios in {}", path.display()))
}

/// Parse YAML (or JSON) content. A file holds one or more `---` separated
/// documents, each a suite (a map with `scenarios`), a single scenario, or a
/// list of scenarios. Loose scenarios are grouped into one suite per workflow
/// named after `default_name`.
pub fn parse_content(content: &str, default_name: &str) -> Result<Vec<TestSuite>> {
    let mut suites = Vec::new();
    let mut loose: Vec<TestScenario> = Vec::new();

    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document).context("Invalid YAML document")?;
        match value {
            serde_yaml::Value::Null => {}
            serde_yaml::Value::Sequence(_) => {
                let mut scenarios: Vec<TestScenario> =
                    serde_yaml::from_value(value).context("Invalid scenario list")?;
                loose.append(&mut scenarios);
            }
            serde_yaml::Value::Mapping(ref map) if map.contains_key("scenarios") => {
                let mut suite: TestSuite =
                    serde_yaml::from_value(value).context("Invalid suite")?;
                // Scenarios inherit the suite's workflow unless they name one
                for scenario in &mut suite.scenarios {
                    if scenario.workflow_id.is_empty() {
                        scenario.workflow_id = suite.workflow_id.clone();
                    }
                }
                suites.push(suite);
            }
            serde_yaml::Value::Mapping(_) => {
                let scenario: TestScenario =
                    serde_yaml::from_value(value).context("Invalid scenario")?;
                loose.push(scenario);
            }
            other => anyhow::bail!("Expected a suite, a scenario or a list, got {:?}", other),
        }
    }

    let mut by_workflow: Vec<(String, Vec<TestScenario>)> = Vec::new();
    for scenario in loose {
        if scenario.workflow_id.is_empty() {
            anyhow::bail!("Scenario '{}' has no workflowId", scenario.name);
        }
        match by_workflow.iter_mut().find(|(w, _)| *w == scenario.workflow_id) {
            Some((_, group)) => group.push(scenario),
            None => by_workflow.push((scenario.workflow_id.clone(), vec![scenario])),
        }
    }
    let grouped = by_workflow.len() > 1;
    for (workflow_id, scenarios) in by_workflow {
        let name = if grouped {
            format!("{} ({})", default_name, workflow_id)
        } else {
            default_name.to_string()
        };
        suites.push(TestSuite::new(&name, &workflow_id, scenarios));
    }

    Ok(suites)
}
