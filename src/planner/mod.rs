//! Planner: turns a goal string into a `Plan`.
//!
//! `GoalPlanner` is the seam an LLM-backed planner would sit behind; that
//! integration is explicitly out of scope here. `DeterministicPlanner` is
//! a keyword-driven reference implementation good enough to drive the
//! Executor and its tests without a model in the loop. It is `async` and
//! fallible because the trait is the seam a real planner sits behind —
//! one backed by a model call has both properties even though this
//! reference implementation never actually awaits or fails for its own
//! reasons.

use async_trait::async_trait;
use serde_json::json;

use crate::protocol::{Plan, Step};

#[async_trait]
pub trait GoalPlanner: Send + Sync {
    /// `known_tools` lets a planner validate the tool names it emits
    /// against what the router actually advertises before handing back a
    /// plan; an implementation that ignores the list entirely is
    /// conforming as long as the resulting plan still passes
    /// `validation::validate_plan`.
    async fn plan(&self, goal: &str, known_tools: &[String]) -> anyhow::Result<Plan>;
}

/// Builds a plan by pattern-matching keywords in the goal text. Produces,
/// at most, one step per recognized intent, each depending on whatever
/// step before it supplies its input.
pub struct DeterministicPlanner;

#[async_trait]
impl GoalPlanner for DeterministicPlanner {
    async fn plan(&self, goal: &str, known_tools: &[String]) -> anyhow::Result<Plan> {
        let lower = goal.to_lowercase();
        let mut steps = Vec::new();
        let mut last_id: Option<String> = None;

        if lower.contains("search") || lower.contains("find") || lower.contains("look up") {
            let id = "search".to_string();
            steps.push(Step {
                id: id.clone(),
                tool: "Search".to_string(),
                input: json!({ "query": goal }),
                success: "search returns at least one result".to_string(),
                deps: vec![],
            });
            last_id = Some(id);
        }

        if lower.contains("browse") || lower.contains("extract") || lower.contains("page") {
            let id = "extract".to_string();
            let deps = last_id.clone().into_iter().collect();
            steps.push(Step {
                id: id.clone(),
                tool: "Browser.Extract".to_string(),
                input: json!({}),
                success: "extraction is not a thin page".to_string(),
                deps,
            });
            last_id = Some(id);
        }

        if lower.contains("summarize") || lower.contains("report") || steps.is_empty() {
            let deps = last_id.clone().into_iter().collect();
            steps.push(Step {
                id: "final-synthesis".to_string(),
                tool: "Echo".to_string(),
                input: json!({ "goal": goal }),
                success: "synthesis cites its sources".to_string(),
                deps,
            });
        }

        if !known_tools.is_empty() {
            for step in &steps {
                if !known_tools.iter().any(|t| t.eq_ignore_ascii_case(&step.tool)) {
                    anyhow::bail!(
                        "planner emitted step '{}' naming tool '{}', which is not in the router's known-tools list",
                        step.id,
                        step.tool
                    );
                }
            }
        }

        Ok(Plan { goal: goal.to_string(), steps })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_TOOLS: &[String] = &[];

    #[tokio::test]
    async fn search_goal_produces_a_search_step() {
        let plan = DeterministicPlanner.plan("search for the latest rust release", NO_TOOLS).await.unwrap();
        assert!(plan.steps.iter().any(|s| s.tool == "Search"));
    }

    #[tokio::test]
    async fn browse_goal_produces_an_extraction_step_depending_on_search() {
        let plan = DeterministicPlanner
            .plan("search then browse the page and summarize it", NO_TOOLS)
            .await
            .unwrap();
        let extract = plan.steps.iter().find(|s| s.tool == "Browser.Extract").unwrap();
        assert_eq!(extract.deps, vec!["search".to_string()]);
    }

    #[tokio::test]
    async fn goal_with_no_keywords_still_ends_in_a_synthesis_step() {
        let plan = DeterministicPlanner.plan("do something vague", NO_TOOLS).await.unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].id, "final-synthesis");
    }

    #[tokio::test]
    async fn plan_steps_are_in_dependency_order() {
        let plan = DeterministicPlanner
            .plan("search, browse the page, and report back", NO_TOOLS)
            .await
            .unwrap();
        let positions: Vec<&str> = plan.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(positions, vec!["search", "extract", "final-synthesis"]);
    }

    #[tokio::test]
    async fn unknown_tool_against_a_restricted_router_is_rejected() {
        let known = vec!["Echo".to_string()];
        let result = DeterministicPlanner.plan("search for rust news", &known).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn known_tools_list_accepts_a_matching_plan() {
        let known = vec!["Echo".to_string()];
        let result = DeterministicPlanner.plan("do something vague", &known).await;
        assert!(result.is_ok());
    }
}
