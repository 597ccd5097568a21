//! Reference tools used by the end-to-end tests in the `executor` module.
//! None of these call out to the network; they exist to exercise retry,
//! critic-rejection, and repair behavior deterministically.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::context::Context;

use super::{Tool, ToolCategory, ToolOutcome};

/// Fails its first `fail_times` invocations, then succeeds.
pub struct Flaky {
    fail_times: u32,
    attempts: AtomicU32,
}

impl Flaky {
    pub fn new(fail_times: u32) -> Self {
        Self { fail_times, attempts: AtomicU32::new(0) }
    }
}

#[async_trait]
impl Tool for Flaky {
    fn name(&self) -> &str {
        "Flaky"
    }

    async fn run(
        &self,
        _input: &Value,
        _context: &Context,
        _cancellation: CancellationToken,
    ) -> Result<ToolOutcome, String> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_times {
            return Err(format!("flaky failure on attempt {attempt}"));
        }
        Ok(ToolOutcome::new(json!({"attempt": attempt}), "succeeded after retrying"))
    }
}

/// Always fails. Used to exercise max-attempts exhaustion.
pub struct Risky;

#[async_trait]
impl Tool for Risky {
    fn name(&self) -> &str {
        "Risky"
    }

    async fn run(
        &self,
        _input: &Value,
        _context: &Context,
        _cancellation: CancellationToken,
    ) -> Result<ToolOutcome, String> {
        Err("risky tool always fails".to_string())
    }
}

/// Returns a fixed result set under the `results` payload field, which
/// the Executor mirrors into the `search:results` context convention.
pub struct Search;

#[async_trait]
impl Tool for Search {
    fn name(&self) -> &str {
        "Search"
    }

    async fn run(
        &self,
        input: &Value,
        _context: &Context,
        _cancellation: CancellationToken,
    ) -> Result<ToolOutcome, String> {
        let query = input.get("query").and_then(Value::as_str).unwrap_or("");
        Ok(ToolOutcome::new(
            json!({ "results": [format!("result for {query}")] }),
            "search completed",
        ))
    }
}

/// Simulates a browser extraction that returns a thin page unless the
/// input carries a `selector` hint wider than `"title"` — the shape a
/// repair attempt is expected to supply after a critic rejection.
pub struct BrowserExtract;

#[async_trait]
impl Tool for BrowserExtract {
    fn name(&self) -> &str {
        "Browser.Extract"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::BrowserExtraction
    }

    async fn run(
        &self,
        input: &Value,
        _context: &Context,
        _cancellation: CancellationToken,
    ) -> Result<ToolOutcome, String> {
        let selector = input.get("selector").and_then(Value::as_str).unwrap_or("title");
        if selector == "title" {
            Ok(ToolOutcome::new(
                json!({ "thin": true, "text": "short" }),
                "extracted a thin page",
            ))
        } else {
            Ok(ToolOutcome::new(
                json!({ "thin": false, "text": "a much longer extracted body of text" }),
                "extracted full content",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flaky_fails_then_succeeds() {
        let tool = Flaky::new(2);
        let ctx = Context::new();
        assert!(tool.run(&Value::Null, &ctx, CancellationToken::new()).await.is_err());
        assert!(tool.run(&Value::Null, &ctx, CancellationToken::new()).await.is_err());
        assert!(tool.run(&Value::Null, &ctx, CancellationToken::new()).await.is_ok());
    }

    #[tokio::test]
    async fn risky_always_fails() {
        let tool = Risky;
        let ctx = Context::new();
        assert!(tool.run(&Value::Null, &ctx, CancellationToken::new()).await.is_err());
        assert!(tool.run(&Value::Null, &ctx, CancellationToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn browser_extract_is_thin_until_selector_is_widened() {
        let tool = BrowserExtract;
        let ctx = Context::new();
        let thin = tool.run(&json!({}), &ctx, CancellationToken::new()).await.unwrap();
        assert_eq!(thin.payload["thin"], true);

        let full = tool
            .run(&json!({"selector": "article"}), &ctx, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(full.payload["thin"], false);
    }
}
