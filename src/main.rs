//! CLI entry point.
//!
//! Two subcommands: `plan` turns a goal into a `Plan` and prints it as
//! JSON; `execute` loads a `Plan` from disk, validates it, and drives it
//! to completion, streaming every `Event` to stdout as newline-delimited
//! JSON. While a run is in flight, typing `approve <step-id>` or
//! `deny <step-id>` on stdin answers any step waiting on the Approval
//! Gate.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};

use agent_core::approval::ApprovalGate;
use agent_core::artifacts::ArtifactStore;
use agent_core::budget::BudgetManager;
use agent_core::critic::DefaultCritic;
use agent_core::events::EventBus;
use agent_core::executor::{Executor, ExecutorConfig};
use agent_core::planner::{DeterministicPlanner, GoalPlanner};
use agent_core::protocol::{self, new_run_id};
use agent_core::store::RunStore;
use agent_core::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use agent_core::tools::{
    echo::Echo,
    fixtures::{BrowserExtract, Search},
    wait::Wait,
    ToolRouter,
};
use agent_core::{loader, validation};

#[derive(Parser)]
#[command(name = "agent-core")]
#[command(about = "A small autonomous task-execution engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Turns a goal into a `Plan` and prints it as JSON.
    Plan {
        /// Natural-language goal, e.g. "search for the rust 1.80 release notes".
        goal: String,
    },

    /// Validates and runs a `Plan` loaded from a JSON file, streaming
    /// events to stdout.
    Execute {
        /// Path to a plan JSON file (the shape `Plan` deserializes from).
        #[arg(short, long)]
        file: PathBuf,

        /// Tool names (case-insensitive) that require approval before
        /// running. Repeatable. Falls back to `AGENT_RISKY_TOOLS`
        /// (comma-separated) when omitted.
        #[arg(long = "risky")]
        risky_tools: Vec<String>,

        #[arg(long, default_value = "false")]
        otel: bool,

        #[arg(long)]
        otel_endpoint: Option<String>,

        #[arg(long, short = 's', default_value = "false")]
        silent: bool,

        #[arg(long, short = 'v', default_value = "false")]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Plan { goal } => {
            let router = default_router();
            match DeterministicPlanner.plan(&goal, &router.names()).await {
                Ok(plan) => match serde_json::to_string_pretty(&plan) {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        eprintln!("failed to serialize plan: {e}");
                        std::process::exit(1);
                    }
                },
                Err(e) => {
                    eprintln!("planning failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Execute { file, risky_tools, otel, otel_endpoint, silent, verbose } => {
            let mut telemetry_config = TelemetryConfig::from_env();
            telemetry_config.log_level = if silent {
                Level::ERROR
            } else if verbose {
                Level::DEBUG
            } else {
                Level::INFO
            };
            if otel {
                telemetry_config.otlp_endpoint =
                    otel_endpoint.or(telemetry_config.otlp_endpoint).or_else(|| {
                        Some("http://localhost:4317".to_string())
                    });
            }

            if let Err(e) = init_telemetry(telemetry_config) {
                if !silent {
                    eprintln!("Warning: failed to initialize telemetry: {e}");
                }
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                    .try_init();
            }

            run_execute(file, risky_tools, silent).await;
            shutdown_telemetry();
        }
    }
}

fn default_router() -> ToolRouter {
    let mut router = ToolRouter::new();
    router.register(Arc::new(Echo));
    router.register(Arc::new(Wait));
    router.register(Arc::new(Search));
    router.register(Arc::new(BrowserExtract));
    router
}

fn risky_tool_set(explicit: Vec<String>) -> Vec<String> {
    if !explicit.is_empty() {
        return explicit;
    }
    std::env::var("AGENT_RISKY_TOOLS")
        .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

async fn run_execute(file: PathBuf, risky_tools: Vec<String>, silent: bool) {
    let plan = match loader::load_plan_from_file(&file) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "failed to load plan");
            std::process::exit(1);
        }
    };

    let router = default_router();
    if let Err(errors) = validation::validate_plan(&plan, &router) {
        error!("plan failed validation with {} error(s):", errors.len());
        for err in &errors {
            error!("  - [{}] {}", err.code().formatted(), err);
        }
        std::process::exit(1);
    }
    if !silent {
        info!(goal = %plan.goal, steps = plan.steps.len(), "plan validated");
    }

    let events = EventBus::new();
    let approvals = ApprovalGate::new();
    let run_id = new_run_id();
    let rx = events.subscribe(run_id).await;

    let mut config = ExecutorConfig::from_env();
    for tool in risky_tool_set(risky_tools) {
        config = config.with_risky_tool(tool);
    }

    let executor = Executor::new(
        events,
        RunStore::new(),
        BudgetManager::from_env(),
        approvals.clone(),
        ArtifactStore::new(artifact_dir()),
        Arc::new(DefaultCritic),
        router,
        config,
    );

    let (_, succeeded) = tokio::join!(
        executor.execute(run_id, plan, CancellationToken::new()),
        stream_until_terminal(rx, approvals, run_id),
    );

    if !succeeded {
        std::process::exit(1);
    }
}

fn artifact_dir() -> PathBuf {
    std::env::var("AGENT_ARTIFACT_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./artifacts"))
}

/// Prints every event on `rx` as a line of JSON, answering `approve`/`deny`
/// lines on stdin against `approvals` as they arrive, until a terminal
/// event is seen. Returns whether the run succeeded.
async fn stream_until_terminal(
    mut rx: tokio::sync::broadcast::Receiver<protocol::Event>,
    approvals: ApprovalGate,
    run_id: protocol::RunId,
) -> bool {
    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        if let Ok(line) = serde_json::to_string(&event) {
                            println!("{line}");
                        }
                        match &event {
                            protocol::Event::RunSucceeded { .. } => return true,
                            protocol::Event::RunFailed { .. } => return false,
                            _ => {}
                        }
                    }
                    Err(_) => return false,
                }
            }
            line = stdin_lines.next_line() => {
                if let Ok(Some(line)) = line {
                    apply_approval_command(&line, &approvals, run_id).await;
                }
            }
        }
    }
}

async fn apply_approval_command(line: &str, approvals: &ApprovalGate, run_id: protocol::RunId) {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("approve"), Some(step_id)) => approvals.grant(run_id, step_id).await,
        (Some("deny"), Some(step_id)) => approvals.deny(run_id, step_id).await,
        _ => {}
    }
}
