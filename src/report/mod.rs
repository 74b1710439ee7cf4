pub mod json;
pub mod junit;
pub mod types;

use anyhow::Result;
use std::path::Path;

use crate::runner::state::TestRun;
pub use types::{ReportSummary, RunReport};

/// Generate a report for finished runs
pub async fn generate_report(runs: Vec<TestRun>, format: &str, output: Option<&Path>) -> Result<()> {
    let report = RunReport::new(runs);

    match format {
        "json" => json::generate(&report, output).await,
        "junit" => match output {
            Some(path) => junit::write_report(&report, path),
            None => {
                println!("{}", junit::generate_junit_xml(&report)?);
                Ok(())
            }
        },
        _ => anyhow::bail!("Unknown format: {}", format),
    }
}

/// Load previously saved runs (a JSON report or a single run) and re-render them
pub async fn convert_report(results_path: &Path, format: &str, output: Option<&Path>) -> Result<()> {
    let content = std::fs::read_to_string(results_path)?;
    let runs = match serde_json::from_str::<RunReport>(&content) {
        Ok(report) => report.runs,
        Err(_) => vec![serde_json::from_str::<TestRun>(&content)?],
    };
    generate_report(runs, format, output).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::state::TestResult;

    #[tokio::test]
    async fn test_json_report_round_trips_into_junit() {
        let mut run = TestRun::new("run-1".into(), "suite-1", "Smoke", "w1", "dev", 1);
        let mut result = TestResult::new("r1".into(), "s1", "only", "w1");
        result.finalize();
        run.record(result);
        run.finish();

        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("report.json");
        generate_report(vec![run], "json", Some(&json_path)).await.unwrap();

        let report: RunReport =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(report.summary.passed, 1);
        assert!(report.is_success());

        convert_report(&json_path, "junit", Some(dir.path())).await.unwrap();
        let xml = std::fs::read_to_string(dir.path().join("junit.xml")).unwrap();
        assert!(xml.contains(r#"<testcase name="only""#));

        assert!(generate_report(Vec::new(), "html", None).await.is_err());
    }
}
