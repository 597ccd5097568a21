//! `Wait` tool: pauses for a fixed duration. Accepts `duration_ms` or the
//! shorter `ms` alias, with `duration_ms` taking precedence when both are
//! present.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::context::Context;

use super::{Tool, ToolOutcome};

#[derive(Debug, Deserialize)]
struct WaitInput {
    #[serde(default)]
    duration_ms: Option<u64>,
    #[serde(default)]
    ms: Option<u64>,
}

impl WaitInput {
    fn duration(&self) -> Option<u64> {
        self.duration_ms.or(self.ms)
    }
}

pub struct Wait;

#[async_trait]
impl Tool for Wait {
    fn name(&self) -> &str {
        "Wait"
    }

    async fn run(
        &self,
        input: &Value,
        _context: &Context,
        cancellation: CancellationToken,
    ) -> Result<ToolOutcome, String> {
        let params: WaitInput = serde_json::from_value(input.clone())
            .map_err(|e| format!("invalid input: {e}"))?;
        let duration_ms = params
            .duration()
            .ok_or_else(|| "missing 'duration_ms' or 'ms'".to_string())?;

        tokio::select! {
            _ = sleep(Duration::from_millis(duration_ms)) => {
                Ok(ToolOutcome::new(json!({ "waitedMs": duration_ms }), "waited"))
            }
            _ = cancellation.cancelled() => Err("cancelled".to_string()),
        }
    }
}
