//! Structured error taxonomy for the engine.
//!
//! Every failure the Executor can produce maps to one of seven kinds. Each
//! kind carries a numeric code so callers (CLI exit codes, dashboards,
//! `RunFailed` events) can act on it without string matching.
//!
//! | Range | Kind                  |
//! |-------|-----------------------|
//! | E1xxx | Planning/validation   |
//! | E2xxx | Tool execution        |
//! | E3xxx | Critic rejection      |
//! | E4xxx | Deadlines and budget  |
//! | E5xxx | Approval              |
//! | E6xxx | Cancellation          |

use std::fmt;

use thiserror::Error;

/// Structured code with category + number, e.g. `E2001`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(u16);

impl ErrorCode {
    // E1xxx: the plan itself is invalid.
    pub const EMPTY_PLAN: Self = Self(1001);
    pub const UNKNOWN_TOOL: Self = Self(1002);
    pub const DUPLICATE_STEP_ID: Self = Self(1003);
    pub const UNKNOWN_DEPENDENCY: Self = Self(1004);
    pub const CIRCULAR_DEPENDENCY: Self = Self(1005);
    pub const OUT_OF_ORDER_DEPENDENCY: Self = Self(1006);
    pub const SCHEMA_VALIDATION_FAILED: Self = Self(1007);

    // E2xxx: the tool ran and failed.
    pub const TOOL_FAILURE: Self = Self(2001);

    // E3xxx: the critic rejected a step's output.
    pub const CRITIC_REJECTION: Self = Self(3001);

    // E4xxx: time or token budget exhausted.
    pub const STEP_DEADLINE_EXCEEDED: Self = Self(4001);
    pub const BUDGET_EXHAUSTED: Self = Self(4002);

    // E5xxx: a human said no.
    pub const APPROVAL_DENIED: Self = Self(5001);

    // E6xxx: the run was cancelled from outside.
    pub const CANCELLATION: Self = Self(6001);

    pub fn code(&self) -> u16 {
        self.0
    }

    pub fn formatted(&self) -> String {
        format!("E{:04}", self.0)
    }

    pub fn category(&self) -> ErrorCategory {
        match self.0 / 1000 {
            1 => ErrorCategory::Planning,
            2 => ErrorCategory::ToolExecution,
            3 => ErrorCategory::Critic,
            4 => ErrorCategory::Budget,
            5 => ErrorCategory::Approval,
            6 => ErrorCategory::Cancellation,
            _ => ErrorCategory::Unknown,
        }
    }

    pub fn description(&self) -> &'static str {
        match self.0 {
            1001 => "plan has no steps",
            1002 => "step references a tool the router does not know",
            1003 => "two steps share the same id",
            1004 => "step depends on an id that is not in the plan",
            1005 => "dependency cycle detected",
            1006 => "dependency appears after the step that needs it",
            1007 => "step input does not satisfy the tool's schema",
            2001 => "tool returned a failure",
            3001 => "critic rejected the step's output",
            4001 => "step exceeded its deadline",
            4002 => "run exhausted its token budget",
            5001 => "approval was denied",
            6001 => "run was cancelled",
            _ => "unknown error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Planning,
    ToolExecution,
    Critic,
    Budget,
    Approval,
    Cancellation,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planning => write!(f, "planning"),
            Self::ToolExecution => write!(f, "tool execution"),
            Self::Critic => write!(f, "critic"),
            Self::Budget => write!(f, "budget"),
            Self::Approval => write!(f, "approval"),
            Self::Cancellation => write!(f, "cancellation"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// The seven ways a step or run can fail. Every variant holds an
/// `ErrorCode` via `code()` so callers don't have to match on kind twice.
#[derive(Debug, Error, Clone)]
pub enum ExecutorError {
    #[error("unknown tool '{tool}' referenced by step '{step_id}'")]
    UnknownTool { step_id: String, tool: String },

    #[error("tool '{tool}' failed for step '{step_id}': {message}")]
    ToolFailure {
        step_id: String,
        tool: String,
        message: String,
    },

    #[error("critic rejected output of step '{step_id}': {reason}")]
    CriticRejection { step_id: String, reason: String },

    #[error("step '{step_id}' exceeded its {deadline_secs}s deadline")]
    StepDeadlineExceeded { step_id: String, deadline_secs: u64 },

    #[error("run exhausted its token budget ({spent}/{limit})")]
    BudgetExhausted { spent: u64, limit: u64 },

    #[error("approval for step '{step_id}' was denied: {reason}")]
    ApprovalDenied { step_id: String, reason: String },

    #[error("run was cancelled")]
    Cancellation,
}

impl ExecutorError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownTool { .. } => ErrorCode::UNKNOWN_TOOL,
            Self::ToolFailure { .. } => ErrorCode::TOOL_FAILURE,
            Self::CriticRejection { .. } => ErrorCode::CRITIC_REJECTION,
            Self::StepDeadlineExceeded { .. } => ErrorCode::STEP_DEADLINE_EXCEEDED,
            Self::BudgetExhausted { .. } => ErrorCode::BUDGET_EXHAUSTED,
            Self::ApprovalDenied { .. } => ErrorCode::APPROVAL_DENIED,
            Self::Cancellation => ErrorCode::CANCELLATION,
        }
    }

    pub fn step_id(&self) -> Option<&str> {
        match self {
            Self::UnknownTool { step_id, .. }
            | Self::ToolFailure { step_id, .. }
            | Self::CriticRejection { step_id, .. }
            | Self::StepDeadlineExceeded { step_id, .. }
            | Self::ApprovalDenied { step_id, .. } => Some(step_id),
            Self::BudgetExhausted { .. } | Self::Cancellation => None,
        }
    }

    pub fn user_message(&self) -> String {
        format!("[{}] {}", self.code(), self)
    }
}

/// Errors raised while validating a `Plan` before any step runs.
#[derive(Debug, Error, Clone)]
pub enum ValidationError {
    #[error("plan has no steps")]
    EmptyPlan,

    #[error("step '{step_id}' references unknown tool '{tool}'")]
    UnknownTool { step_id: String, tool: String },

    #[error("step id '{step_id}' is used more than once")]
    DuplicateStepId { step_id: String },

    #[error("step '{step_id}' depends on unknown step '{dep}'")]
    UnknownDependency { step_id: String, dep: String },

    #[error("circular dependency detected at step '{step_id}'")]
    CircularDependency { step_id: String },

    #[error("step '{step_id}' depends on '{dep}' which appears later in the plan")]
    OutOfOrderDependency { step_id: String, dep: String },

    #[error("step '{step_id}' input fails schema for tool '{tool}': {detail}")]
    SchemaValidationFailed {
        step_id: String,
        tool: String,
        detail: String,
    },
}

impl ValidationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::EmptyPlan => ErrorCode::EMPTY_PLAN,
            Self::UnknownTool { .. } => ErrorCode::UNKNOWN_TOOL,
            Self::DuplicateStepId { .. } => ErrorCode::DUPLICATE_STEP_ID,
            Self::UnknownDependency { .. } => ErrorCode::UNKNOWN_DEPENDENCY,
            Self::CircularDependency { .. } => ErrorCode::CIRCULAR_DEPENDENCY,
            Self::OutOfOrderDependency { .. } => ErrorCode::OUT_OF_ORDER_DEPENDENCY,
            Self::SchemaValidationFailed { .. } => ErrorCode::SCHEMA_VALIDATION_FAILED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_formatting() {
        assert_eq!(ErrorCode::EMPTY_PLAN.formatted(), "E1001");
        assert_eq!(ErrorCode::TOOL_FAILURE.formatted(), "E2001");
        assert_eq!(ErrorCode::BUDGET_EXHAUSTED.formatted(), "E4002");
    }

    #[test]
    fn error_code_category() {
        assert_eq!(ErrorCode::UNKNOWN_TOOL.category(), ErrorCategory::Planning);
        assert_eq!(ErrorCode::CRITIC_REJECTION.category(), ErrorCategory::Critic);
        assert_eq!(ErrorCode::CANCELLATION.category(), ErrorCategory::Cancellation);
    }

    #[test]
    fn executor_error_carries_step_id() {
        let err = ExecutorError::ToolFailure {
            step_id: "s1".into(),
            tool: "Search".into(),
            message: "timed out".into(),
        };
        assert_eq!(err.step_id(), Some("s1"));
        assert!(err.user_message().contains("E2001"));
    }

    #[test]
    fn budget_exhausted_has_no_step_id() {
        let err = ExecutorError::BudgetExhausted { spent: 100_000, limit: 100_000 };
        assert_eq!(err.step_id(), None);
        assert_eq!(err.code(), ErrorCode::BUDGET_EXHAUSTED);
    }
}
