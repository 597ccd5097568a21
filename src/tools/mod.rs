//! Tool Router: resolves a step's `tool` name to an implementation and
//! invokes it.
//!
//! Grounded on the teacher's `StepExecutor` trait (`can_handle`/`execute`)
//! generalized from "HTTP request or wait" to an open-ended tool registry,
//! and on the `ToolExecutor`/`ToolInvoker` shape from the pack's event-bus
//! reference (`execute`, `get_metadata`, batch dispatch by name).

pub mod echo;
pub mod fixtures;
pub mod wait;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::errors::ExecutorError;
use crate::protocol::Artifact;

/// Coarse classification used to pick default retry/repair behavior
/// without every tool having to opt in explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    Standard,
    BrowserExtraction,
}

/// Falls back to a name-based guess when a tool does not override
/// `Tool::category`. Matches anything with both "browser" and "extract"
/// in its name, case-insensitively.
pub fn category_from_name(name: &str) -> ToolCategory {
    let lower = name.to_lowercase();
    if lower.contains("browser") && lower.contains("extract") {
        ToolCategory::BrowserExtraction
    } else {
        ToolCategory::Standard
    }
}

/// What a tool hands back to the Executor on success.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub payload: Value,
    pub artifacts: Vec<Artifact>,
    pub summary: String,
}

impl ToolOutcome {
    pub fn new(payload: Value, summary: impl Into<String>) -> Self {
        Self { payload, artifacts: Vec::new(), summary: summary.into() }
    }

    pub fn with_artifacts(mut self, artifacts: Vec<Artifact>) -> Self {
        self.artifacts = artifacts;
        self
    }
}

/// A single capability the Executor can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the router dispatches on. Matching is case-insensitive.
    fn name(&self) -> &str;

    /// Used for default retry-attempt and repair-eligibility decisions.
    /// Defaults to a name-based guess; override when a tool knows better.
    fn category(&self) -> ToolCategory {
        category_from_name(self.name())
    }

    /// Optional JSON Schema the Planner validates `Step.input` against
    /// before the run starts. Tools that don't need structural validation
    /// can leave this as `None`.
    fn input_schema(&self) -> Option<Value> {
        None
    }

    async fn run(
        &self,
        input: &Value,
        context: &Context,
        cancellation: CancellationToken,
    ) -> Result<ToolOutcome, String>;
}

/// Resolves tool names to implementations and invokes them, turning an
/// unknown name or a tool-level error into the matching `ExecutorError`.
#[derive(Clone, Default)]
pub struct ToolRouter {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_lowercase(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(&name.to_lowercase()).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.values().map(|t| t.name().to_string()).collect()
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.tools.contains_key(&name.to_lowercase())
    }

    pub async fn execute(
        &self,
        step_id: &str,
        tool_name: &str,
        input: &Value,
        context: &Context,
        cancellation: CancellationToken,
    ) -> Result<ToolOutcome, ExecutorError> {
        let tool = self.get(tool_name).ok_or_else(|| ExecutorError::UnknownTool {
            step_id: step_id.to_string(),
            tool: tool_name.to_string(),
        })?;

        tool.run(input, context, cancellation).await.map_err(|message| {
            ExecutorError::ToolFailure {
                step_id: step_id.to_string(),
                tool: tool_name.to_string(),
                message,
            }
        })
    }
}
