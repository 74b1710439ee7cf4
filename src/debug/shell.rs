use anyhow::Result;
use colored::Colorize;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{DebugSession, DebugStep, Debugger, SessionStatus, StartSession, StepStatus};
use crate::engine::AutomationEngine;

/// One line typed at the debug prompt
#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Continue,
    Step,
    /// Variables of a step; the latest step when absent
    Vars(Option<String>),
    Context(Option<String>),
    Break {
        node_id: String,
        condition: Option<String>,
    },
    Unbreak(String),
    Watch(String),
    Status,
    Stop,
    Help,
    Exit,
}

pub fn parse_line(line: &str) -> Result<ShellCommand, String> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    let arg = (!rest.is_empty()).then(|| rest.to_string());

    match head {
        "c" | "continue" => Ok(ShellCommand::Continue),
        "s" | "n" | "step" | "next" => Ok(ShellCommand::Step),
        "v" | "vars" => Ok(ShellCommand::Vars(arg)),
        "ctx" | "context" => Ok(ShellCommand::Context(arg)),
        "b" | "break" => {
            let (node_id, condition) = match rest.split_once(char::is_whitespace) {
                Some((node, cond)) => (node, Some(cond.trim().to_string())),
                None => (rest, None),
            };
            if node_id.is_empty() {
                return Err("usage: break <node-id> [condition]".to_string());
            }
            Ok(ShellCommand::Break {
                node_id: node_id.to_string(),
                condition,
            })
        }
        "unbreak" => arg
            .map(ShellCommand::Unbreak)
            .ok_or_else(|| "usage: unbreak <node-id>".to_string()),
        "w" | "watch" => arg
            .map(ShellCommand::Watch)
            .ok_or_else(|| "usage: watch <expression>".to_string()),
        "status" => Ok(ShellCommand::Status),
        "stop" => Ok(ShellCommand::Stop),
        "h" | "help" | "?" => Ok(ShellCommand::Help),
        "q" | "exit" | "quit" => Ok(ShellCommand::Exit),
        other => Err(format!("unknown command: {}", other)),
    }
}

/// Interactive debugging of one workflow from the terminal
pub async fn run_shell(
    debugger: &Debugger,
    engine: Arc<dyn AutomationEngine>,
    request: StartSession,
) -> Result<()> {
    println!("\n{}", "=== flowlab debugger ===".bold().green());
    println!("Type 'help' for commands or 'exit' to quit.\n");

    let workflow_id = request.workflow_id.clone();
    let session = debugger.start_debug_session(request, engine).await?;
    print_session(&session);
    let session_id = session.id;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", "flowlab>".blue().bold());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match parse_line(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{} {}", "⚠".yellow(), e);
                continue;
            }
        };

        match command {
            ShellCommand::Exit => break,
            ShellCommand::Help => print_help(),
            ShellCommand::Continue => match debugger.continue_execution(&session_id).await {
                Ok(session) => print_session(&session),
                Err(e) => println!("{} {}", "❌".red(), e),
            },
            ShellCommand::Step => match debugger.step_next(&session_id).await {
                Ok(step) => print_step(&step),
                Err(e) => println!("{} {}", "❌".red(), e),
            },
            ShellCommand::Vars(step_id) => {
                let Some(step_id) = resolve_step(debugger, &session_id, step_id) else {
                    println!("{} No steps recorded yet", "ℹ".blue());
                    continue;
                };
                match debugger.inspect_variables(&session_id, &step_id) {
                    Some(inspection) => print_json(&inspection),
                    None => println!("{} Step {} not found", "⚠".yellow(), step_id),
                }
            }
            ShellCommand::Context(step_id) => {
                let Some(step_id) = resolve_step(debugger, &session_id, step_id) else {
                    println!("{} No steps recorded yet", "ℹ".blue());
                    continue;
                };
                match debugger.get_execution_context(&session_id, &step_id) {
                    Some(context) => print_json(&context),
                    None => println!("{} Step {} not found", "⚠".yellow(), step_id),
                }
            }
            ShellCommand::Break { node_id, condition } => {
                let bp = debugger
                    .store()
                    .add_breakpoint(&workflow_id, &node_id, &node_id, condition);
                println!("{} Breakpoint on {}", "●".red(), bp.node_id.cyan());
            }
            ShellCommand::Unbreak(node_id) => {
                if debugger.store().remove_breakpoint(&workflow_id, &node_id) {
                    println!("{} Breakpoint on {} removed", "○".dimmed(), node_id.cyan());
                } else {
                    println!("{} No breakpoint on {}", "⚠".yellow(), node_id);
                }
            }
            ShellCommand::Watch(expression) => {
                let watch = debugger.store().add_watch(&workflow_id, &expression);
                println!("{} Watching {} ({})", "👁".blue(), watch.expression.cyan(), watch.id);
            }
            ShellCommand::Status => match debugger.get_session(&session_id) {
                Some(session) => print_session(&session),
                None => println!("{} Session is gone", "⚠".yellow()),
            },
            ShellCommand::Stop => match debugger.stop_execution(&session_id) {
                Ok(session) => print_session(&session),
                Err(e) => println!("{} {}", "❌".red(), e),
            },
        }
    }

    println!("\nExiting debugger.");
    Ok(())
}

fn resolve_step(debugger: &Debugger, session_id: &str, step_id: Option<String>) -> Option<String> {
    step_id.or_else(|| {
        debugger
            .get_session(session_id)
            .and_then(|s| s.steps.last().map(|step| step.id.clone()))
    })
}

fn print_session(session: &DebugSession) {
    let status = match session.status {
        SessionStatus::Pending => "PENDING".dimmed(),
        SessionStatus::Running => "RUNNING".yellow().bold(),
        SessionStatus::Paused => "PAUSED".yellow().bold(),
        SessionStatus::Completed => "COMPLETED".green().bold(),
        SessionStatus::Failed => "FAILED".red().bold(),
    };
    println!(
        "{} {} [{}] {} steps",
        status,
        session.workflow_name.white().bold(),
        session.id.dimmed(),
        session.steps.len()
    );
    if let Some(ref node) = session.current_node_id {
        println!("  at {}", node.cyan());
    }
    if let Some(ref error) = session.error {
        println!("  {} {}", "error:".red(), error);
    }
}

fn print_step(step: &DebugStep) {
    let marker = match step.status {
        StepStatus::Completed => "✓".green(),
        StepStatus::Failed => "✗".red(),
        StepStatus::Running | StepStatus::Paused => "…".yellow(),
    };
    println!(
        "{} {} ({}) {}ms",
        marker,
        step.node_name.white().bold(),
        step.node_type.dimmed(),
        step.duration_ms.unwrap_or(0)
    );
    for watch in &step.watches {
        match (&watch.value, &watch.error) {
            (_, Some(error)) => println!("  {} = {}", watch.expression.cyan(), error.red()),
            (Some(value), None) => println!("  {} = {}", watch.expression.cyan(), value),
            (None, None) => println!("  {} = undefined", watch.expression.cyan()),
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => println!("{} {}", "❌".red(), e),
    }
}

fn print_help() {
    println!("  continue, c          run until the next breakpoint or the end");
    println!("  step, s              execute one node");
    println!("  vars [step-id]       inputs, outputs and variables of a step");
    println!("  ctx [step-id]        previous and next nodes of a step");
    println!("  break <node> [cond]  pause before a node, optionally when cond is true");
    println!("  unbreak <node>       remove a breakpoint");
    println!("  watch <expr>         evaluate an expression after every step");
    println!("  status               show the session");
    println!("  stop                 stop the session");
    println!("  exit                 leave the debugger");
}
