//! Critic: a cheap, rule-based sanity check run against a step's output
//! before it is accepted, separate from whatever checks the tool itself
//! performed.
//!
//! This is not a second opinion from a model — it is a handful of shape
//! checks that catch the common ways a tool can technically succeed while
//! returning garbage: an empty payload, a browser extraction that came
//! back "thin", or a synthesis step that forgot to cite its sources.

use async_trait::async_trait;
use serde_json::Value;

use crate::protocol::Step;
use crate::tools::ToolCategory;

const MIN_PAYLOAD_LEN: usize = 20;

#[async_trait]
pub trait Critic: Send + Sync {
    /// Returns `Ok(())` if the output is acceptable, or `Err(reason)`
    /// describing why it was rejected.
    async fn check(&self, step: &Step, category: ToolCategory, payload: &Value) -> Result<(), String>;
}

/// Reference critic: null/empty-payload rejection plus two
/// category-specific heuristics.
pub struct DefaultCritic;

#[async_trait]
impl Critic for DefaultCritic {
    async fn check(&self, step: &Step, category: ToolCategory, payload: &Value) -> Result<(), String> {
        if payload.is_null() {
            return Err("payload is null".to_string());
        }

        if let Some(s) = payload.as_str() {
            if s.trim().len() <= MIN_PAYLOAD_LEN {
                return Err(format!(
                    "payload is only {} characters, expected more than {}",
                    s.trim().len(),
                    MIN_PAYLOAD_LEN
                ));
            }
        }

        if category == ToolCategory::BrowserExtraction {
            if payload.get("thin").and_then(Value::as_bool) == Some(true) {
                return Err("browser extraction returned a thin page".to_string());
            }
        }

        if is_final_synthesis(step) {
            let has_url = payload.get("url").is_some();
            let has_citations = payload
                .get("citations")
                .and_then(Value::as_array)
                .map(|c| !c.is_empty())
                .unwrap_or(false);
            if !has_url && !has_citations {
                return Err("synthesis output has neither a url nor citations".to_string());
            }
        }

        Ok(())
    }
}

fn is_final_synthesis(step: &Step) -> bool {
    let haystack = format!("{} {}", step.id, step.success).to_lowercase();
    haystack.contains("final-synthesis") || haystack.contains("final synthesis")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(id: &str, success: &str) -> Step {
        Step {
            id: id.into(),
            tool: "Search".into(),
            input: json!({}),
            success: success.into(),
            deps: vec![],
        }
    }

    #[tokio::test]
    async fn null_payload_is_rejected() {
        let critic = DefaultCritic;
        let err = critic
            .check(&step("s1", ""), ToolCategory::Standard, &Value::Null)
            .await
            .unwrap_err();
        assert!(err.contains("null"));
    }

    #[tokio::test]
    async fn short_string_payload_is_rejected() {
        let critic = DefaultCritic;
        let err = critic
            .check(&step("s1", ""), ToolCategory::Standard, &json!("too short"))
            .await
            .unwrap_err();
        assert!(err.contains("characters"));
    }

    #[tokio::test]
    async fn thin_browser_extraction_is_rejected() {
        let critic = DefaultCritic;
        let err = critic
            .check(
                &step("s1", ""),
                ToolCategory::BrowserExtraction,
                &json!({"thin": true}),
            )
            .await
            .unwrap_err();
        assert!(err.contains("thin"));
    }

    #[tokio::test]
    async fn synthesis_without_sources_is_rejected() {
        let critic = DefaultCritic;
        let err = critic
            .check(
                &step("final-synthesis", ""),
                ToolCategory::Standard,
                &json!({"summary": "a long enough summary of what happened"}),
            )
            .await
            .unwrap_err();
        assert!(err.contains("citations"));
    }

    #[tokio::test]
    async fn synthesis_with_citations_passes() {
        let critic = DefaultCritic;
        critic
            .check(
                &step("final-synthesis", ""),
                ToolCategory::Standard,
                &json!({"citations": ["https://example.com"]}),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn ordinary_payload_passes() {
        let critic = DefaultCritic;
        critic
            .check(
                &step("s1", ""),
                ToolCategory::Standard,
                &json!({"value": "a sufficiently long payload body"}),
            )
            .await
            .unwrap();
    }
}
