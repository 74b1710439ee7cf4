use crate::runner::state::{RunStatus, TestRun};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Test runs bundled for report generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub runs: Vec<TestRun>,
    pub summary: ReportSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_runs: usize,
    pub failed_runs: usize,
    pub total_scenarios: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub total_duration_ms: u64,
    /// Mean coverage over executed scenarios
    pub average_coverage: f64,
}

impl RunReport {
    pub fn new(runs: Vec<TestRun>) -> Self {
        let mut summary = ReportSummary {
            total_runs: runs.len(),
            ..ReportSummary::default()
        };
        let mut coverage_sum = 0.0;
        let mut covered = 0usize;

        for run in &runs {
            if run.status == RunStatus::Failed {
                summary.failed_runs += 1;
            }
            summary.total_scenarios += run.total_scenarios;
            summary.passed += run.passed;
            summary.failed += run.failed;
            summary.skipped += run.skipped;
            summary.total_duration_ms += run.duration_ms.unwrap_or(0);
            for result in &run.results {
                if result.coverage.total_nodes > 0 {
                    coverage_sum += result.coverage.percentage;
                    covered += 1;
                }
            }
        }
        if covered > 0 {
            summary.average_coverage = (coverage_sum / covered as f64 * 100.0).round() / 100.0;
        }

        Self {
            generated_at: Utc::now(),
            runs,
            summary,
        }
    }

    pub fn is_success(&self) -> bool {
        self.summary.failed == 0
    }
}
