use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::time::Duration;
use tokio::sync::broadcast;

use super::state::{RunStatus, TestStatus};

/// Progress of a suite run, in emission order
#[derive(Debug, Clone)]
pub enum TestEvent {
    RunStarted {
        run_id: String,
        suite_name: String,
        total_scenarios: u32,
    },
    ScenarioStarted {
        scenario_name: String,
        index: usize,
    },
    ScenarioRetrying {
        scenario_name: String,
        attempt: u32,
        max_attempts: u32,
    },
    ScenarioSkipped {
        scenario_name: String,
        reason: String,
    },
    /// Execution and assertions are done; `reasons` is empty on success
    ScenarioFinished {
        scenario_name: String,
        status: TestStatus,
        duration_ms: u64,
        coverage: f64,
        reasons: Vec<String>,
    },
    RunFinished {
        run_id: String,
        status: RunStatus,
        passed: u32,
        failed: u32,
        skipped: u32,
        duration_ms: Option<u64>,
    },
}

/// Broadcasts runner events; sending without subscribers is a no-op
#[derive(Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<TestEvent>,
}

impl EventEmitter {
    pub fn emit(&self, event: TestEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TestEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }
}

/// Prints suite progress with one spinner per running scenario
pub struct ConsoleEventListener {
    multi: MultiProgress,
    spinner: Option<ProgressBar>,
    label: String,
}

impl ConsoleEventListener {
    /// Render events until the runner drops its emitter
    pub async fn listen(mut receiver: broadcast::Receiver<TestEvent>) {
        // Escape codes only make sense on a terminal
        let multi = if std::io::stdout().is_terminal() {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };
        let mut listener = Self {
            multi,
            spinner: None,
            label: String::new(),
        };

        loop {
            match receiver.recv().await {
                Ok(event) => listener.render(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    log::debug!("Console listener skipped {} events", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        listener.clear_spinner();
    }

    fn clear_spinner(&mut self) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
    }

    fn render(&mut self, event: TestEvent) {
        match event {
            TestEvent::RunStarted {
                run_id,
                suite_name,
                total_scenarios,
            } => {
                println!(
                    "\n{} Suite {} ({} scenarios) run {}",
                    "▶".green().bold(),
                    suite_name.white().bold(),
                    total_scenarios,
                    run_id.cyan()
                );
            }

            TestEvent::ScenarioStarted {
                scenario_name,
                index,
            } => {
                self.clear_spinner();
                let pb = self.multi.add(ProgressBar::new_spinner());
                if let Ok(style) = ProgressStyle::default_spinner().template("    {spinner} {msg}") {
                    pb.set_style(style);
                }
                self.label = format!("[{}] {} ", index + 1, scenario_name.dimmed());
                pb.set_message(self.label.clone());
                pb.enable_steady_tick(Duration::from_millis(100));
                self.spinner = Some(pb);
            }

            TestEvent::ScenarioRetrying {
                attempt,
                max_attempts,
                ..
            } => {
                if let Some(ref pb) = self.spinner {
                    let retry = format!("↻ attempt {}/{}", attempt, max_attempts);
                    pb.set_message(format!("{}{}", self.label, retry.yellow()));
                }
            }

            TestEvent::ScenarioSkipped {
                scenario_name,
                reason,
            } => {
                println!("    {} {} ({})", "○".yellow(), scenario_name, reason.dimmed());
            }

            TestEvent::ScenarioFinished {
                status,
                duration_ms,
                coverage,
                reasons,
                ..
            } => {
                self.clear_spinner();
                if status == TestStatus::Passed {
                    println!(
                        "    {} {}({}ms, {:.1}% of nodes)",
                        "✓".green(),
                        self.label,
                        duration_ms,
                        coverage
                    );
                } else {
                    println!("    {} {}({}ms)", "✗".red(), self.label, duration_ms);
                    for reason in reasons {
                        println!("        {}", reason.red());
                    }
                }
            }

            TestEvent::RunFinished {
                status,
                passed,
                failed,
                skipped,
                duration_ms,
                ..
            } => {
                self.clear_spinner();
                let status = match status {
                    RunStatus::Completed => "COMPLETED".green().bold(),
                    RunStatus::Failed => "FAILED".red().bold(),
                    RunStatus::Running => "RUNNING".yellow().bold(),
                };
                println!(
                    "{} {} {} passed, {} failed, {} skipped ({}ms)",
                    "■".blue().bold(),
                    status,
                    passed.to_string().green(),
                    failed.to_string().red(),
                    skipped.to_string().yellow(),
                    duration_ms.unwrap_or(0)
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scripted::ScriptedEngine;
    use crate::runner::scenario::{TestScenario, TestSuite};
    use crate::runner::store::TestStore;
    use crate::runner::{RunnerSettings, TestRunner};
    use crate::workflow::Workflow;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_suite_events_in_order() {
        let workflow = Workflow::linear("w1", "Lead intake", &[("start", "trigger"), ("notify", "email")]);
        let engine = Arc::new(ScriptedEngine::new(workflow).with_output("notify", json!({"sent": true})));
        let runner = TestRunner::new(TestStore::in_memory(), RunnerSettings::default());
        let mut events = runner.subscribe();

        let mut failing = TestScenario::new("b", "w1", json!({}));
        failing.expected_output = Some(json!({"sent": false}));
        let mut suite = TestSuite::new(
            "smoke",
            "w1",
            vec![TestScenario::new("a", "w1", json!({})), failing, TestScenario::new("c", "w1", json!({}))],
        );
        suite.stop_on_failure = true;
        runner.run_suite(&suite, "ci", engine).await;

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(match event {
                TestEvent::RunStarted { total_scenarios, .. } => format!("run:{}", total_scenarios),
                TestEvent::ScenarioStarted { scenario_name, .. } => format!("start:{}", scenario_name),
                TestEvent::ScenarioRetrying { scenario_name, .. } => format!("retry:{}", scenario_name),
                TestEvent::ScenarioSkipped { scenario_name, .. } => format!("skip:{}", scenario_name),
                TestEvent::ScenarioFinished {
                    scenario_name,
                    status,
                    reasons,
                    ..
                } => format!("{:?}:{}:{}", status, scenario_name, reasons.len()),
                TestEvent::RunFinished { status, .. } => format!("end:{:?}", status),
            });
        }
        assert_eq!(
            seen,
            vec![
                "run:3",
                "start:a",
                "Passed:a:0",
                "start:b",
                "Failed:b:1",
                "skip:c",
                "end:Failed",
            ]
        );
    }
}
