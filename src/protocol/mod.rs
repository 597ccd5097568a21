//! Data model: plans, steps, artifacts and the event taxonomy.
//!
//! These are plain, immutable value types. They carry no behavior; the
//! Planner produces a `Plan`, the Executor drives it, and both communicate
//! progress to the outside world exclusively through `Event`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A goal translated into an ordered, dependency-checked list of tool calls.
///
/// Steps are topologically ordered: for any step, every id in its `deps`
/// appears earlier in `steps`. The Executor relies on this and runs steps
/// strictly in list order rather than scheduling off the dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub goal: String,
    pub steps: Vec<Step>,
}

/// One planned tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Unique within the plan. Short tokens like "s1", "s2".
    pub id: String,

    /// Name the Tool Router resolves, case-insensitively.
    pub tool: String,

    /// Opaque structured input. The core only reads `maxAttempts` and a
    /// handful of tool-specific repair keys out of this; everything else
    /// is for the tool itself.
    #[serde(default = "default_input")]
    pub input: Value,

    /// Human-readable success criterion, surfaced in events.
    #[serde(default)]
    pub success: String,

    /// Step ids that must have succeeded before this one runs. Checked as
    /// an invariant at plan-validation time, not used for scheduling.
    #[serde(default)]
    pub deps: Vec<String>,
}

fn default_input() -> Value {
    Value::Object(serde_json::Map::new())
}

impl Step {
    /// `maxAttempts` from input, clamped to 1..=10. `None` if absent or not
    /// an integer, leaving the category default to the caller.
    pub fn requested_max_attempts(&self) -> Option<u32> {
        self.input
            .get("maxAttempts")
            .and_then(Value::as_u64)
            .map(|n| n.clamp(1, 10) as u32)
    }
}

/// Lifecycle state of one step. Transitions are monotonic per attempt:
/// `Pending -> Running -> {Succeeded, Failed, Skipped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

/// A file produced by a tool and persisted by the Artifact Store.
///
/// Tools populate `path` with wherever they happened to write the file;
/// the Executor replaces it with the store-managed location once saved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub file_name: String,
    pub path: String,
    pub mime_type: String,
    pub size: u64,
}

/// A globally unique run identifier.
pub type RunId = Uuid;

pub fn new_run_id() -> RunId {
    Uuid::new_v4()
}

/// Tagged event taxonomy published by the Executor. Every variant carries
/// `run_id` directly (no reflection-based routing) so the Event Bus can
/// route without matching on individual variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "$type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Event {
    RunStarted {
        run_id: RunId,
        goal: String,
    },
    PlanCreated {
        run_id: RunId,
        goal: String,
        steps: Vec<Step>,
    },
    StepStarted {
        run_id: RunId,
        step_id: String,
        tool: String,
        input: Value,
    },
    PermissionRequested {
        run_id: RunId,
        step_id: String,
        tool: String,
        input: Value,
    },
    PermissionGranted {
        run_id: RunId,
        step_id: String,
    },
    PermissionDenied {
        run_id: RunId,
        step_id: String,
        reason: String,
    },
    ToolOutput {
        run_id: RunId,
        step_id: String,
        summary: String,
    },
    ArtifactCreated {
        run_id: RunId,
        step_id: String,
        artifact: Artifact,
    },
    StepSucceeded {
        run_id: RunId,
        step_id: String,
    },
    StepFailed {
        run_id: RunId,
        step_id: String,
        error: String,
        attempt: u32,
    },
    BudgetExceeded {
        run_id: RunId,
        what: String,
        details: String,
    },
    RunSucceeded {
        run_id: RunId,
        elapsed_ms: u64,
    },
    RunFailed {
        run_id: RunId,
        error: String,
    },
}

impl Event {
    /// The run this event belongs to. Lets the Event Bus route without
    /// matching on every variant.
    pub fn run_id(&self) -> RunId {
        match self {
            Event::RunStarted { run_id, .. }
            | Event::PlanCreated { run_id, .. }
            | Event::StepStarted { run_id, .. }
            | Event::PermissionRequested { run_id, .. }
            | Event::PermissionGranted { run_id, .. }
            | Event::PermissionDenied { run_id, .. }
            | Event::ToolOutput { run_id, .. }
            | Event::ArtifactCreated { run_id, .. }
            | Event::StepSucceeded { run_id, .. }
            | Event::StepFailed { run_id, .. }
            | Event::BudgetExceeded { run_id, .. }
            | Event::RunSucceeded { run_id, .. }
            | Event::RunFailed { run_id, .. } => *run_id,
        }
    }

    pub fn step_id(&self) -> Option<&str> {
        match self {
            Event::StepStarted { step_id, .. }
            | Event::PermissionRequested { step_id, .. }
            | Event::PermissionGranted { step_id, .. }
            | Event::PermissionDenied { step_id, .. }
            | Event::ToolOutput { step_id, .. }
            | Event::ArtifactCreated { step_id, .. }
            | Event::StepSucceeded { step_id, .. }
            | Event::StepFailed { step_id, .. } => Some(step_id),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::RunSucceeded { .. } | Event::RunFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_reads_clamped_max_attempts() {
        let step = Step {
            id: "s1".into(),
            tool: "Echo".into(),
            input: json!({ "maxAttempts": 99 }),
            success: String::new(),
            deps: vec![],
        };
        assert_eq!(step.requested_max_attempts(), Some(10));
    }

    #[test]
    fn step_without_max_attempts_is_none() {
        let step = Step {
            id: "s1".into(),
            tool: "Echo".into(),
            input: json!({}),
            success: String::new(),
            deps: vec![],
        };
        assert_eq!(step.requested_max_attempts(), None);
    }

    #[test]
    fn event_run_id_matches_for_every_variant() {
        let rid = new_run_id();
        let events = vec![
            Event::RunStarted { run_id: rid, goal: "g".into() },
            Event::RunSucceeded { run_id: rid, elapsed_ms: 1 },
        ];
        for e in events {
            assert_eq!(e.run_id(), rid);
        }
    }

    #[test]
    fn event_serializes_with_type_discriminator() {
        let e = Event::StepSucceeded { run_id: new_run_id(), step_id: "s1".into() };
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["$type"], "stepSucceeded");
        assert_eq!(v["stepId"], "s1");
    }
}
