//! `Echo` tool: returns its input verbatim as the payload. Used as the
//! simplest possible reference tool and in tests that just need something
//! registered in the router.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::context::Context;

use super::{Tool, ToolOutcome};

pub struct Echo;

#[async_trait]
impl Tool for Echo {
    fn name(&self) -> &str {
        "Echo"
    }

    async fn run(
        &self,
        input: &Value,
        _context: &Context,
        _cancellation: CancellationToken,
    ) -> Result<ToolOutcome, String> {
        Ok(ToolOutcome::new(input.clone(), "echoed input"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn echoes_input_back_as_payload() {
        let tool = Echo;
        let ctx = Context::new();
        let outcome = tool
            .run(&json!({"value": "hi"}), &ctx, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.payload, json!({"value": "hi"}));
    }
}
