use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use autodev::agent::{Orchestrator, PlanningRequest, RefineRequest};
use autodev::config::AppConfig;
use autodev::docker::{ContainerSupervisor, DockerCli};
use autodev::github::GithubService;
use autodev::llm::providers::provider_from_config;
use autodev::llm::LlmRunner;
use autodev::store::SessionStore;
use autodev::tools::ToolRegistry;

#[derive(Parser)]
#[command(name = "autodev", version, about = "Autonomous coding agent")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Turn a development goal into an ordered task plan.
    Plan {
        /// The development goal.
        #[arg(long)]
        prompt: String,
        /// Repository the work targets.
        #[arg(long)]
        repo_url: String,
        /// Optional RFC 3339 deadline for the session.
        #[arg(long)]
        deadline: Option<String>,
    },
    /// Execute a confirmed plan to completion.
    Execute {
        #[arg(long)]
        session_id: String,
    },
    /// Replace a session's plan with a revision of it.
    Refine {
        #[arg(long)]
        session_id: String,
        /// The revision request.
        #[arg(long)]
        prompt: String,
    },
    /// Destroy containers idle past the configured threshold.
    CleanupContainers,
    /// List recent sessions.
    ListSessions {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Hand off to the external evaluation harness.
    RunEvaluation {
        /// Ask the harness for an HTML report.
        #[arg(long)]
        html: bool,
    },
}

fn main() {
    // Load .env before anything reads the environment. An explicit env file
    // can be pointed at with AUTODEV_ENV_FILE.
    match std::env::var("AUTODEV_ENV_FILE") {
        Ok(path) if !path.trim().is_empty() => {
            if let Err(e) = dotenvy::from_path(&path) {
                eprintln!("Warning: failed to load AUTODEV_ENV_FILE '{}': {}", path, e);
            }
        }
        _ => {
            let _ = dotenvy::dotenv();
        }
    }

    let cli = Cli::parse();
    let config = AppConfig::from_env();

    let default_filter = if config.debug_enabled { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    if let Err(e) = run(cli, config) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

#[tokio::main]
async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    // run-evaluation delegates before any wiring; the harness brings its own
    // configuration.
    if let Command::RunEvaluation { html } = &cli.command {
        return run_evaluation(*html).await;
    }

    config.validate()?;

    let store = Arc::new(SessionStore::connect(&config.database_url, config.debug_enabled).await?);
    let supervisor = Arc::new(ContainerSupervisor::new(
        Arc::new(DockerCli::new(config.docker.socket_path.clone())),
        config.docker.clone(),
    ));
    let github = Arc::new(GithubService::new(&config.github.token));
    let registry = Arc::new(ToolRegistry::with_default_tools(
        supervisor.clone(),
        github,
    ));
    let provider = provider_from_config(&config.llm);
    let runner = Arc::new(LlmRunner::new(provider, registry, config.llm.clone()));
    let orchestrator = Orchestrator::new(store.clone(), runner);

    match cli.command {
        Command::Plan {
            prompt,
            repo_url,
            deadline,
        } => {
            let deadline = deadline
                .map(|d| {
                    chrono::DateTime::parse_from_rfc3339(&d)
                        .map(|dt| dt.with_timezone(&chrono::Utc))
                })
                .transpose()
                .map_err(|e| anyhow::anyhow!("Invalid --deadline: {}", e))?;

            let tasks = orchestrator
                .start_planning(PlanningRequest {
                    prompt,
                    repo_url,
                    deadline,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        }
        Command::Execute { session_id } => {
            let report = orchestrator.execute_plan(&session_id).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "status": report.status.as_str(),
                    "log": report.log,
                }))?
            );
        }
        Command::Refine { session_id, prompt } => {
            let tasks = orchestrator
                .refine_plan(RefineRequest {
                    session_id,
                    refinement_prompt: prompt,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        }
        Command::CleanupContainers => {
            let cleaned = supervisor.cleanup_idle_containers().await?;
            println!("{}", cleaned);
        }
        Command::ListSessions { limit } => {
            for session in store.list_sessions(limit).await? {
                println!(
                    "{}  {:<22}  {}",
                    session.id,
                    session.status.as_str(),
                    session.created_at.to_rfc3339()
                );
            }
        }
        Command::RunEvaluation { .. } => unreachable!("handled above"),
    }

    Ok(())
}

/// The evaluation harness ships separately; hand the invocation off to it.
async fn run_evaluation(html: bool) -> anyhow::Result<()> {
    let mut cmd = tokio::process::Command::new("autodev-eval");
    if html {
        cmd.arg("--html");
    }
    let status = cmd.status().await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to launch the evaluation harness (is autodev-eval installed?): {}",
            e
        )
    })?;
    if !status.success() {
        anyhow::bail!("Evaluation harness exited with {}", status);
    }
    Ok(())
}
