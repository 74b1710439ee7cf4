use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use flowlab::debug::{DebugMode, DebugStore, Debugger, StartSession};
use flowlab::engine::{AutomationEngine, HttpEngine};
use flowlab::runner::store::{SqliteStore, TestStore};
use flowlab::runner::{RunOptions, TestRunner};
use flowlab::server::{AppState, FlowlabServer};
use flowlab::utils::Config;
use flowlab::vcs::{CommitOptions, WorkflowRepository};
use flowlab::{debug, report, runner};

#[derive(Parser)]
#[command(name = "flowlab")]
#[command(version)]
#[command(about = "Debug, test and version automation workflows", long_about = None)]
struct Cli {
    /// Config file (defaults to <config dir>/flowlab/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Debug a workflow interactively
    Debug {
        workflow_id: String,

        /// step, breakpoint or continuous
        #[arg(short, long, default_value = "step")]
        mode: DebugMode,

        /// Trigger input as JSON
        #[arg(short, long)]
        input: Option<String>,
    },

    /// Run test scenarios from a file or directory
    Test {
        path: PathBuf,

        /// Filter scenarios by tags (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,

        #[arg(short, long, default_value = "default")]
        environment: String,

        /// Write a report after the run
        #[arg(short, long)]
        report: bool,

        /// Report format (json, junit)
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Report file or directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Re-render a saved JSON report
    Report {
        results: PathBuf,

        #[arg(short, long, default_value = "junit")]
        format: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Workflow version control
    Vcs {
        #[command(subcommand)]
        command: VcsCommands,
    },
}

#[derive(Subcommand)]
enum VcsCommands {
    /// Create the repository if needed
    Init,

    /// Commit a workflow definition read from a JSON file
    Commit {
        workflow_id: String,

        file: PathBuf,

        #[arg(short, long)]
        message: Option<String>,

        /// Defaults to the definition's `name` field
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        author: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(short, long)]
        branch: Option<String>,
    },

    History {
        workflow_id: String,

        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    Diff {
        workflow_id: String,
        from: String,
        #[arg(default_value = "HEAD")]
        to: String,
    },

    /// Restore the working copy of a workflow to a past commit
    Rollback { workflow_id: String, commit: String },

    /// Print a workflow as of a commit
    Show { workflow_id: String, commit: String },

    Branches,

    /// Switch to a branch, creating it when missing
    Checkout {
        name: String,
        #[arg(long)]
        from: Option<String>,
    },

    DeleteBranch {
        name: String,
        #[arg(short, long)]
        force: bool,
    },

    Merge {
        source: String,
        #[arg(long)]
        into: Option<String>,
        #[arg(short, long)]
        message: Option<String>,
    },

    Tag {
        name: String,
        #[arg(short, long)]
        message: Option<String>,
        #[arg(long)]
        commit: Option<String>,
    },

    Tags,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let state = AppState::from_config(config).await?;
            FlowlabServer::new(state).start().await?;
        }

        Commands::Debug {
            workflow_id,
            mode,
            input,
        } => {
            let input = match input {
                Some(raw) => serde_json::from_str(&raw)?,
                None => Value::Null,
            };
            let store = match config.debug.state_file {
                Some(ref path) => DebugStore::open(path)?,
                None => DebugStore::new(),
            };
            let debugger = Debugger::new(Arc::new(store));
            let engine: Arc<dyn AutomationEngine> = Arc::new(HttpEngine::new(&config.engine)?);
            let request = StartSession {
                workflow_id,
                workflow_name: None,
                input,
                mode,
            };
            debug::shell::run_shell(&debugger, engine, request).await?;
        }

        Commands::Test {
            path,
            tags,
            environment,
            report,
            format,
            output,
        } => {
            println!(
                "{} Running tests from: {}",
                "▶".green().bold(),
                path.display()
            );
            println!("  Engine: {}", config.engine.endpoint.cyan());
            if !tags.is_empty() {
                println!("  Tags: {}", tags.join(", ").yellow());
            }

            let store = match config.testing.database_url {
                Some(ref url) => TestStore::new(Arc::new(SqliteStore::connect(url).await?)),
                None => TestStore::in_memory(),
            };
            let test_runner = TestRunner::new(store, config.testing.runner.clone());
            let engine: Arc<dyn AutomationEngine> = Arc::new(HttpEngine::new(&config.engine)?);

            let summary = runner::run_tests(
                &path,
                test_runner,
                engine,
                RunOptions {
                    tags,
                    environment,
                    report_format: report.then_some(format),
                    output,
                },
            )
            .await?;

            if !summary.is_success() {
                std::process::exit(1);
            }
        }

        Commands::Report {
            results,
            format,
            output,
        } => {
            println!(
                "{} Generating {} report from: {}",
                "📊".to_string().blue(),
                format.cyan(),
                results.display()
            );
            report::convert_report(&results, &format, output.as_deref()).await?;
        }

        Commands::Vcs { command } => {
            let repo = WorkflowRepository::new(config.repository.clone())?;
            run_vcs(&repo, command).await?;
        }
    }

    Ok(())
}

async fn run_vcs(repo: &WorkflowRepository, command: VcsCommands) -> anyhow::Result<()> {
    if !matches!(command, VcsCommands::Init) && !repo.is_initialized() {
        anyhow::bail!(
            "No repository at {}. Run `flowlab vcs init` first.",
            repo.settings().root.display()
        );
    }

    match command {
        VcsCommands::Init => {
            repo.init().await?;
            println!(
                "{} Repository ready at {}",
                "✅".green(),
                repo.settings().root.display()
            );
        }

        VcsCommands::Commit {
            workflow_id,
            file,
            message,
            name,
            author,
            email,
            branch,
        } => {
            let data: Value = serde_json::from_str(&std::fs::read_to_string(&file)?)?;
            let name = name
                .or_else(|| data.get("name").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| workflow_id.clone());
            let options = CommitOptions {
                message,
                author,
                email,
                branch,
            };
            let commit = repo.commit(&workflow_id, &name, &data, &options).await?;
            println!(
                "{} [{}] {}",
                "✅".green(),
                commit.short_hash.yellow(),
                commit.message
            );
        }

        VcsCommands::History { workflow_id, limit } => {
            let history = repo.history(&workflow_id, limit).await;
            if history.is_empty() {
                println!("{} No history for {}", "ℹ".blue(), workflow_id);
            }
            for commit in history {
                println!(
                    "{} {} {} {}",
                    commit.short_hash.yellow(),
                    commit.timestamp.format("%Y-%m-%d %H:%M"),
                    commit.author.cyan(),
                    commit.message
                );
            }
        }

        VcsCommands::Diff {
            workflow_id,
            from,
            to,
        } => {
            let diff = repo.diff(&workflow_id, &from, &to).await?;
            println!(
                "{} {}..{}  {} {}",
                diff.workflow_id.white().bold(),
                diff.from,
                diff.to,
                format!("+{}", diff.additions).green(),
                format!("-{}", diff.deletions).red()
            );
            for change in diff.changes {
                let line = format!("{:>5} {}", change.line, change.content);
                match change.kind {
                    flowlab::vcs::ChangeKind::Add => println!("{}", format!("+{}", line).green()),
                    flowlab::vcs::ChangeKind::Remove => println!("{}", format!("-{}", line).red()),
                }
            }
        }

        VcsCommands::Rollback {
            workflow_id,
            commit,
        } => {
            repo.rollback(&workflow_id, &commit).await?;
            println!(
                "{} {} restored to {} (not committed)",
                "↩".yellow(),
                workflow_id,
                commit
            );
        }

        VcsCommands::Show {
            workflow_id,
            commit,
        } => {
            let workflow = repo.get_workflow_at_commit(&workflow_id, &commit).await?;
            println!("{}", serde_json::to_string_pretty(&workflow)?);
        }

        VcsCommands::Branches => {
            for branch in repo.list_branches().await {
                let marker = if branch.current { "*" } else { " " };
                println!("{} {} {}", marker.green(), branch.name, branch.commit.dimmed());
            }
        }

        VcsCommands::Checkout { name, from } => {
            let branch = repo.create_or_checkout_branch(&name, from.as_deref()).await?;
            println!("{} On branch {}", "✅".green(), branch.cyan());
        }

        VcsCommands::DeleteBranch { name, force } => {
            repo.delete_branch(&name, force).await?;
            println!("{} Deleted branch {}", "✅".green(), name);
        }

        VcsCommands::Merge {
            source,
            into,
            message,
        } => {
            let commit = repo
                .merge(&source, into.as_deref(), message.as_deref())
                .await?;
            println!(
                "{} [{}] {}",
                "✅".green(),
                commit.short_hash.yellow(),
                commit.message
            );
        }

        VcsCommands::Tag {
            name,
            message,
            commit,
        } => {
            let message = message.unwrap_or_else(|| name.clone());
            let tag = repo.create_tag(&name, &message, commit.as_deref()).await?;
            println!("{} Tagged {} as {}", "🏷".blue(), tag.commit.yellow(), tag.name.cyan());
        }

        VcsCommands::Tags => {
            for tag in repo.list_tags().await {
                println!("{} {} {}", tag.name.cyan(), tag.commit.dimmed(), tag.message);
            }
        }
    }

    Ok(())
}
