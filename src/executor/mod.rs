//! Executor — drives a `Plan` to completion.
//!
//! This is the core the rest of the crate exists to support: it owns the
//! attempt loop (budget scope, per-step deadline, tool invocation, critic
//! check, backoff), the approval rendezvous, and the translation of all
//! of that into the `Event` stream. Grounded on the teacher's
//! `execute_plan`/`execute_sequential`/`execute_step_with_retry` control
//! flow in `main.rs`, generalized from HTTP-assertion retries to
//! tool-invocation retries with critic rejection and browser-extraction
//! repair folded into the same failure path.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::approval::ApprovalGate;
use crate::artifacts::ArtifactStore;
use crate::budget::{BudgetManager, DEFAULT_STEP_TIMEOUT_SECS};
use crate::context::Context;
use crate::critic::Critic;
use crate::errors::ExecutorError;
use crate::protocol::{Artifact, Event, Plan, RunId, Step, StepState};
use crate::retry;
use crate::store::RunStore;
use crate::tools::{ToolCategory, ToolRouter};
use crate::events::EventBus;

const TOOL_OUTPUT_PREVIEW_CHARS: usize = 10_000;
const MAX_PREVIEWED_IMAGE_BYTES: u64 = 2_000_000;
const REPAIR_SLEEP_SECS: u64 = 1;
const REPAIR_DOMAIN_SKIP_LIST: &[&str] = &["captcha.example.com"];

/// Tunables that are not part of any individual step's input.
pub struct ExecutorConfig {
    pub step_timeout: Duration,
    /// Tool names (case-insensitive) that require human approval. Empty
    /// by default — nothing requires approval unless configured.
    pub risky_tools: HashSet<String>,
}

impl ExecutorConfig {
    pub fn from_env() -> Self {
        let step_timeout = std::env::var("AGENT_STEP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(DEFAULT_STEP_TIMEOUT_SECS));
        Self { step_timeout, risky_tools: HashSet::new() }
    }

    pub fn with_risky_tool(mut self, tool: impl Into<String>) -> Self {
        self.risky_tools.insert(tool.into().to_lowercase());
        self
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

enum AttemptOutcome {
    Success,
    /// Step should retry: carries the error message to publish.
    Retryable(String),
    /// Run-level cancellation; no further attempts for this step or run.
    Cancelled(String),
}

/// What ends a run early, from inside the per-step attempt loop.
enum RunTerminator {
    BudgetExhausted(String),
    Failed(String),
}

pub struct Executor {
    events: EventBus,
    store: RunStore,
    budget: BudgetManager,
    approvals: ApprovalGate,
    artifacts: ArtifactStore,
    critic: Arc<dyn Critic>,
    router: ToolRouter,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(
        events: EventBus,
        store: RunStore,
        budget: BudgetManager,
        approvals: ApprovalGate,
        artifacts: ArtifactStore,
        critic: Arc<dyn Critic>,
        router: ToolRouter,
        config: ExecutorConfig,
    ) -> Self {
        Self { events, store, budget, approvals, artifacts, critic, router, config }
    }

    fn requires_approval(&self, tool: &str) -> bool {
        self.config.risky_tools.contains(&tool.to_lowercase())
    }

    /// Drives `plan` to completion, publishing every event along the way.
    /// Never returns an error for a routine tool failure — those are
    /// reported exclusively via `StepFailed`/`RunFailed` events.
    #[instrument(skip(self, plan, cancellation), fields(run_id = %run_id, goal = %plan.goal))]
    pub async fn execute(&self, run_id: RunId, plan: Plan, cancellation: CancellationToken) {
        let start = Instant::now();
        self.store.start_run(run_id, plan.goal.clone()).await;
        self.events.emit(Event::RunStarted { run_id, goal: plan.goal.clone() }).await;
        self.events
            .emit(Event::PlanCreated { run_id, goal: plan.goal.clone(), steps: plan.steps.clone() })
            .await;

        let mut context = Context::new();

        for step in &plan.steps {
            self.store.set_step_state(run_id, &step.id, StepState::Running).await;
            self.events
                .emit(Event::StepStarted {
                    run_id,
                    step_id: step.id.clone(),
                    tool: step.tool.clone(),
                    input: step.input.clone(),
                })
                .await;

            if self.requires_approval(&step.tool) {
                match self.gate_on_approval(run_id, step, &cancellation).await {
                    ApprovalOutcome::Granted => {}
                    ApprovalOutcome::Denied => continue,
                    ApprovalOutcome::Cancelled => {
                        self.fail_run(run_id, "run was cancelled while awaiting approval").await;
                        return;
                    }
                }
            }

            let category = self
                .router
                .get(&step.tool)
                .map(|t| t.category())
                .unwrap_or(ToolCategory::Standard);
            let max_attempts = retry::max_attempts(step.requested_max_attempts(), category);

            match self
                .run_step_with_retries(run_id, step, category, max_attempts, &mut context, &cancellation)
                .await
            {
                Ok(()) => {
                    self.store.set_step_state(run_id, &step.id, StepState::Succeeded).await;
                    self.events.emit(Event::StepSucceeded { run_id, step_id: step.id.clone() }).await;
                }
                Err(RunTerminator::BudgetExhausted(details)) => {
                    self.events
                        .emit(Event::BudgetExceeded { run_id, what: "tokens".to_string(), details })
                        .await;
                    self.fail_run(run_id, "Token budget exceeded").await;
                    return;
                }
                Err(RunTerminator::Failed(error)) => {
                    self.store.set_step_state(run_id, &step.id, StepState::Failed).await;
                    self.fail_run(run_id, &error).await;
                    return;
                }
            }
        }

        self.store.finish_run(run_id, true).await;
        self.events
            .emit(Event::RunSucceeded { run_id, elapsed_ms: start.elapsed().as_millis() as u64 })
            .await;
    }

    async fn fail_run(&self, run_id: RunId, error: &str) {
        self.store.finish_run(run_id, false).await;
        self.events.emit(Event::RunFailed { run_id, error: error.to_string() }).await;
    }

    async fn gate_on_approval(
        &self,
        run_id: RunId,
        step: &Step,
        cancellation: &CancellationToken,
    ) -> ApprovalOutcome {
        self.events
            .emit(Event::PermissionRequested {
                run_id,
                step_id: step.id.clone(),
                tool: step.tool.clone(),
                input: step.input.clone(),
            })
            .await;

        let decision = tokio::select! {
            granted = self.approvals.wait_for_approval(run_id, &step.id) => Some(granted),
            _ = cancellation.cancelled() => None,
        };

        match decision {
            Some(true) => {
                self.events.emit(Event::PermissionGranted { run_id, step_id: step.id.clone() }).await;
                ApprovalOutcome::Granted
            }
            Some(false) => {
                self.store.set_step_state(run_id, &step.id, StepState::Skipped).await;
                self.events
                    .emit(Event::PermissionDenied {
                        run_id,
                        step_id: step.id.clone(),
                        reason: "denied by operator".to_string(),
                    })
                    .await;
                ApprovalOutcome::Denied
            }
            None => {
                self.approvals.abandon(run_id, &step.id).await;
                ApprovalOutcome::Cancelled
            }
        }
    }

    async fn run_step_with_retries(
        &self,
        run_id: RunId,
        step: &Step,
        category: ToolCategory,
        max_attempts: u32,
        context: &mut Context,
        cancellation: &CancellationToken,
    ) -> Result<(), RunTerminator> {
        let mut current_input = step.input.clone();
        let mut tried_urls = HashSet::new();
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let _scope = self.budget.enter_step();
            let step_cancel = cancellation.child_token();

            let attempt_outcome = self
                .run_one_attempt(run_id, step, category, &current_input, context, cancellation, step_cancel)
                .await;

            match attempt_outcome {
                Ok(AttemptOutcome::Success) => return Ok(()),
                Ok(AttemptOutcome::Retryable(error)) => {
                    last_error = error.clone();
                    self.store.set_step_state(run_id, &step.id, StepState::Failed).await;
                    self.events
                        .emit(Event::StepFailed { run_id, step_id: step.id.clone(), error, attempt })
                        .await;
                }
                Ok(AttemptOutcome::Cancelled(error)) => {
                    self.events
                        .emit(Event::StepFailed {
                            run_id,
                            step_id: step.id.clone(),
                            error: error.clone(),
                            attempt,
                        })
                        .await;
                    return Err(RunTerminator::Failed(error));
                }
                Err(terminator) => return Err(terminator),
            }

            if attempt < max_attempts {
                if category == ToolCategory::BrowserExtraction {
                    if let Some(new_input) = self
                        .attempt_repair(run_id, &step.id, &current_input, context, &mut tried_urls)
                        .await
                    {
                        current_input = new_input;
                    }
                }
                sleep(retry::backoff_for_attempt(attempt)).await;
            }
        }

        Err(RunTerminator::Failed(last_error))
    }

    async fn run_one_attempt(
        &self,
        run_id: RunId,
        step: &Step,
        category: ToolCategory,
        input: &Value,
        context: &mut Context,
        cancellation: &CancellationToken,
        step_cancel: CancellationToken,
    ) -> Result<AttemptOutcome, RunTerminator> {
        let result = {
            let tool_future = self.router.execute(&step.id, &step.tool, input, context, step_cancel.clone());
            tokio::pin!(tool_future);

            tokio::select! {
                res = &mut tool_future => Branch::Tool(res),
                _ = sleep(self.config.step_timeout) => { step_cancel.cancel(); Branch::Timeout }
            }
        };

        // A run-level cancellation propagates to `step_cancel` (its child
        // token) and typically surfaces as an ordinary tool error or a
        // timeout; a success that slips through right as cancellation fires
        // is still honored. Anything else on a cancelled run ends the step
        // (and the run) immediately instead of retrying.
        let outcome = match result {
            Branch::Tool(Ok(tool_outcome)) => self.handle_success(run_id, step, category, tool_outcome, context).await?,
            Branch::Tool(Err(err)) if cancellation.is_cancelled() => AttemptOutcome::Cancelled(err.to_string()),
            Branch::Tool(Err(err)) => AttemptOutcome::Retryable(err.to_string()),
            Branch::Timeout if cancellation.is_cancelled() => {
                AttemptOutcome::Cancelled(format!("step {} aborted: run was cancelled", step.id))
            }
            Branch::Timeout => {
                let err = ExecutorError::StepDeadlineExceeded {
                    step_id: step.id.clone(),
                    deadline_secs: self.config.step_timeout.as_secs(),
                };
                warn!(step_id = %step.id, "step exceeded its deadline");
                AttemptOutcome::Retryable(err.to_string())
            }
        };

        Ok(outcome)
    }

    async fn handle_success(
        &self,
        run_id: RunId,
        step: &Step,
        category: ToolCategory,
        outcome: crate::tools::ToolOutcome,
        context: &mut Context,
    ) -> Result<AttemptOutcome, RunTerminator> {
        self.events
            .emit(Event::ToolOutput { run_id, step_id: step.id.clone(), summary: outcome.summary.clone() })
            .await;

        if let Some(preview) = payload_preview(&outcome.payload) {
            self.events
                .emit(Event::ToolOutput { run_id, step_id: step.id.clone(), summary: preview })
                .await;
        }

        let tokens = (outcome.summary.len() / 4).max(1) as u64;
        if let Err(ExecutorError::BudgetExhausted { spent, limit }) = self.budget.try_spend(tokens) {
            return Err(RunTerminator::BudgetExhausted(format!("{spent}/{limit} tokens spent")));
        }

        let mut saved_artifacts = Vec::with_capacity(outcome.artifacts.len());
        for artifact in &outcome.artifacts {
            let persisted = self.persist_artifact(run_id, artifact);
            self.events
                .emit(Event::ArtifactCreated {
                    run_id,
                    step_id: step.id.clone(),
                    artifact: persisted.clone(),
                })
                .await;

            if persisted.mime_type.starts_with("image/") && persisted.size <= MAX_PREVIEWED_IMAGE_BYTES {
                if let Ok(data_uri) = self.artifacts.preview_data_uri(&persisted) {
                    self.events
                        .emit(Event::ToolOutput { run_id, step_id: step.id.clone(), summary: data_uri })
                        .await;
                }
            }
            saved_artifacts.push(persisted);
        }

        context.set_step_payload(&step.id, outcome.payload.clone());
        context.set_step_artifacts(&step.id, &saved_artifacts);
        mirror_conventions(&step.tool, &outcome.payload, context);

        match self.critic.check(step, category, &outcome.payload).await {
            Ok(()) => Ok(AttemptOutcome::Success),
            Err(reason) => {
                let err = ExecutorError::CriticRejection { step_id: step.id.clone(), reason };
                Ok(AttemptOutcome::Retryable(err.to_string()))
            }
        }
    }

    fn persist_artifact(&self, run_id: RunId, artifact: &Artifact) -> Artifact {
        if !Path::new(&artifact.path).is_file() {
            return artifact.clone();
        }
        match std::fs::read(&artifact.path) {
            Ok(bytes) => self
                .artifacts
                .save(run_id, &artifact.file_name, &artifact.mime_type, &bytes)
                .unwrap_or_else(|_| artifact.clone()),
            Err(_) => artifact.clone(),
        }
    }

    /// Browser-extraction-only: try an unvisited candidate from
    /// `search:results`, skipping anything on the static skip-list.
    /// Returns the rewritten input when a candidate was found.
    async fn attempt_repair(
        &self,
        run_id: RunId,
        step_id: &str,
        current_input: &Value,
        context: &Context,
        tried: &mut HashSet<String>,
    ) -> Option<Value> {
        if let Some(url) = current_input.get("url").and_then(Value::as_str) {
            tried.insert(url.to_lowercase());
        }

        let candidates = context
            .search_results()
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let chosen = candidates.iter().find_map(|candidate| {
            let url = candidate.get("url").and_then(Value::as_str)?;
            let lower = url.to_lowercase();
            if tried.contains(&lower) {
                return None;
            }
            if REPAIR_DOMAIN_SKIP_LIST.iter().any(|domain| lower.contains(domain)) {
                return None;
            }
            Some(url.to_string())
        });

        match chosen {
            Some(url) => {
                tried.insert(url.to_lowercase());
                info!(step_id = %step_id, url = %url, "repairing browser extraction input");
                self.events
                    .emit(Event::ToolOutput {
                        run_id,
                        step_id: step_id.to_string(),
                        summary: format!("Repair: switching to {url}"),
                    })
                    .await;
                sleep(Duration::from_secs(REPAIR_SLEEP_SECS)).await;
                Some(json!({
                    "url": url,
                    "selector": "main, article, #content, body",
                    "timeoutSec": 30,
                }))
            }
            None => {
                self.events
                    .emit(Event::ToolOutput {
                        run_id,
                        step_id: step_id.to_string(),
                        summary: "Repair: no alternate candidates remain".to_string(),
                    })
                    .await;
                None
            }
        }
    }
}

enum ApprovalOutcome {
    Granted,
    Denied,
    Cancelled,
}

enum Branch {
    Tool(Result<crate::tools::ToolOutcome, ExecutorError>),
    Timeout,
}

/// Builds the second `ToolOutput` the success path publishes: the
/// payload itself, truncated to a safe preview length.
fn payload_preview(payload: &Value) -> Option<String> {
    match payload {
        Value::String(s) if !s.is_empty() => Some(truncate_preview(s)),
        Value::Null => None,
        other => serde_json::to_string(other).ok().map(|s| truncate_preview(&s)),
    }
}

/// Truncates on a `char` boundary rather than a raw byte index, since
/// byte-slicing a UTF-8 string at an arbitrary offset panics.
fn truncate_preview(s: &str) -> String {
    match s.char_indices().nth(TOOL_OUTPUT_PREVIEW_CHARS) {
        Some((boundary, _)) => format!("{}…", &s[..boundary]),
        None => s.to_string(),
    }
}

/// Mirrors well-known payload shapes into their conventional context
/// keys. Currently just search-like tools publishing `results`.
fn mirror_conventions(tool: &str, payload: &Value, context: &mut Context) {
    if tool.to_lowercase().contains("search") {
        if let Some(Value::Array(items)) = payload.get("results") {
            let normalized: Vec<Value> = items
                .iter()
                .map(|item| match item {
                    Value::String(s) => json!({ "url": s }),
                    other => other.clone(),
                })
                .collect();
            context.set("search:results", Value::Array(normalized));
        }
    }
}
