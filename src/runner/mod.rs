pub mod assertion;
pub mod coverage;
pub mod events;
pub mod executor;
pub mod scenario;
pub mod state;
pub mod store;

use anyhow::Result;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::AutomationEngine;
use crate::report::RunReport;

pub use events::*;
pub use executor::{RunnerSettings, TestRunner};
pub use scenario::{TestAssertion, TestScenario, TestSuite};
pub use state::*;

/// Options for a command-line test run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Keep only scenarios carrying all of these tags
    pub tags: Vec<String>,
    pub environment: String,
    /// `json` or `junit`; no report is written when absent
    pub report_format: Option<String>,
    pub output: Option<PathBuf>,
}

/// Run every suite found under `path` and print progress to the console.
///
/// Takes the runner by value so the console listener sees the event
/// channel close once the last suite is done.
pub async fn run_tests(
    path: &Path,
    runner: TestRunner,
    engine: Arc<dyn AutomationEngine>,
    options: RunOptions,
) -> Result<RunReport> {
    let mut plan = crate::parser::load_path(path)?;
    if !options.tags.is_empty() {
        plan = plan.filter_tags(&options.tags);
    }

    if plan.is_empty() {
        println!("{} No test scenarios found.", "ℹ".blue());
        return Ok(RunReport::new(Vec::new()));
    }

    log::info!(
        "Running {} scenarios in {} suites from {}",
        plan.scenario_count(),
        plan.suites.len(),
        path.display()
    );

    let listener = tokio::spawn(ConsoleEventListener::listen(runner.subscribe()));
    let environment = if options.environment.is_empty() {
        "default"
    } else {
        options.environment.as_str()
    };

    let mut runs = Vec::with_capacity(plan.suites.len());
    for suite in &plan.suites {
        runs.push(runner.run_suite(suite, environment, engine.clone()).await);
    }

    drop(runner);
    if let Err(e) = listener.await {
        log::debug!("Console listener ended abnormally: {}", e);
    }

    let report = RunReport::new(runs);
    print_summary(&report);

    if let Some(ref format) = options.report_format {
        crate::report::generate_report(report.runs.clone(), format, options.output.as_deref())
            .await?;
    }

    Ok(report)
}

fn print_summary(report: &RunReport) {
    let summary = &report.summary;
    let status = if report.is_success() {
        "PASSED".green().bold()
    } else {
        "FAILED".red().bold()
    };
    println!(
        "\n{} {} passed, {} failed, {} skipped across {} suites ({}ms, avg coverage {:.1}%)",
        status,
        summary.passed.to_string().green(),
        summary.failed.to_string().red(),
        summary.skipped.to_string().yellow(),
        summary.total_runs,
        summary.total_duration_ms,
        summary.average_coverage
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scripted::ScriptedEngine;
    use crate::runner::store::TestStore;
    use crate::workflow::Workflow;
    use serde_json::json;

    fn runner() -> TestRunner {
        TestRunner::new(
            TestStore::in_memory(),
            RunnerSettings {
                retry_delay_ms: 0,
                ..RunnerSettings::default()
            },
        )
    }

    fn engine() -> Arc<dyn AutomationEngine> {
        let workflow = Workflow::linear("w1", "Lead intake", &[("start", "trigger"), ("notify", "email")]);
        Arc::new(ScriptedEngine::new(workflow).with_output("notify", json!({"sent": true})))
    }

    #[tokio::test]
    async fn test_run_tests_from_directory_writes_junit() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("smoke.yaml"),
            r#"
name: smoke
workflowId: w1
scenarios:
  - name: sends
    tags: [fast]
    assertions:
      - type: equals
        path: sent
        expected: true
  - name: wrong
    tags: [slow]
    assertions:
      - type: equals
        path: sent
        expected: false
"#,
        )
        .unwrap();
        let out = tempfile::tempdir().unwrap();

        let report = run_tests(
            dir.path(),
            runner(),
            engine(),
            RunOptions {
                tags: vec!["fast".into()],
                environment: "ci".into(),
                report_format: Some("junit".into()),
                output: Some(out.path().to_path_buf()),
            },
        )
        .await
        .unwrap();

        assert_eq!(report.summary.total_scenarios, 1);
        assert_eq!(report.summary.passed, 1);
        assert!(report.is_success());
        assert_eq!(report.runs[0].environment, "ci");
        assert!(out.path().join("junit.xml").exists());
    }

    #[tokio::test]
    async fn test_run_tests_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("one.yaml");
        std::fs::write(
            &file,
            "name: wrong\nworkflowId: w1\nexpectedOutput:\n  sent: false\n",
        )
        .unwrap();

        let report = run_tests(&file, runner(), engine(), RunOptions::default())
            .await
            .unwrap();
        assert_eq!(report.summary.failed, 1);
        assert!(!report.is_success());
        assert_eq!(report.runs[0].environment, "default");
    }

    #[tokio::test]
    async fn test_empty_plan() {
        let dir = tempfile::tempdir().unwrap();
        let report = run_tests(dir.path(), runner(), engine(), RunOptions::default())
            .await
            .unwrap();
        assert_eq!(report.summary.total_runs, 0);
    }
}
