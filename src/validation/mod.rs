//! Plan validation: everything the Planner checks before a single step
//! runs.
//!
//! The dependency-cycle check is the teacher's 3-color DFS
//! (`validate_dag`/`detect_cycle_dfs`) carried over almost unchanged. The
//! rest is new: unknown-tool-name and duplicate-id checks, and an
//! out-of-order-dependency check, since this engine runs steps strictly
//! in list order rather than scheduling off the dependency graph — so a
//! dependency that appears later in the list can never actually be
//! satisfied in time.

use std::collections::{HashMap, HashSet};

use crate::errors::ValidationError;
use crate::protocol::Plan;
use crate::tools::ToolRouter;

pub fn validate_plan(plan: &Plan, router: &ToolRouter) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if plan.steps.is_empty() {
        return Err(vec![ValidationError::EmptyPlan]);
    }

    check_duplicate_ids(plan, &mut errors);
    check_unknown_tools(plan, router, &mut errors);
    check_dependencies(plan, &mut errors);
    check_schemas(plan, router, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_duplicate_ids(plan: &Plan, errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    for step in &plan.steps {
        if !seen.insert(step.id.as_str()) {
            errors.push(ValidationError::DuplicateStepId { step_id: step.id.clone() });
        }
    }
}

fn check_unknown_tools(plan: &Plan, router: &ToolRouter, errors: &mut Vec<ValidationError>) {
    for step in &plan.steps {
        if !router.is_known(&step.tool) {
            errors.push(ValidationError::UnknownTool {
                step_id: step.id.clone(),
                tool: step.tool.clone(),
            });
        }
    }
}

/// Checks that every `deps` entry exists, appears earlier in the list,
/// and that no cycle exists among them.
fn check_dependencies(plan: &Plan, errors: &mut Vec<ValidationError>) {
    let position: HashMap<&str, usize> =
        plan.steps.iter().enumerate().map(|(i, s)| (s.id.as_str(), i)).collect();

    for (i, step) in plan.steps.iter().enumerate() {
        for dep in &step.deps {
            match position.get(dep.as_str()) {
                None => errors.push(ValidationError::UnknownDependency {
                    step_id: step.id.clone(),
                    dep: dep.clone(),
                }),
                Some(&dep_pos) if dep_pos >= i => errors.push(ValidationError::OutOfOrderDependency {
                    step_id: step.id.clone(),
                    dep: dep.clone(),
                }),
                Some(_) => {}
            }
        }
    }

    let graph: HashMap<&str, Vec<&str>> = plan
        .steps
        .iter()
        .map(|s| (s.id.as_str(), s.deps.iter().map(String::as_str).collect()))
        .collect();

    let mut color: HashMap<&str, u8> = HashMap::new();
    for step in &plan.steps {
        if !color.contains_key(step.id.as_str()) {
            detect_cycle_dfs(step.id.as_str(), &graph, &mut color, errors);
        }
    }
}

/// 0 = white (unvisited), 1 = gray (on the current path), 2 = black (done).
fn detect_cycle_dfs<'a>(
    node: &'a str,
    graph: &HashMap<&'a str, Vec<&'a str>>,
    color: &mut HashMap<&'a str, u8>,
    errors: &mut Vec<ValidationError>,
) -> bool {
    color.insert(node, 1);

    if let Some(deps) = graph.get(node) {
        for &dep in deps {
            match color.get(dep).copied().unwrap_or(0) {
                1 => {
                    errors.push(ValidationError::CircularDependency { step_id: node.to_string() });
                    return true;
                }
                0 => {
                    if detect_cycle_dfs(dep, graph, color, errors) {
                        return true;
                    }
                }
                _ => {}
            }
        }
    }

    color.insert(node, 2);
    false
}

fn check_schemas(plan: &Plan, router: &ToolRouter, errors: &mut Vec<ValidationError>) {
    for step in &plan.steps {
        let Some(tool) = router.get(&step.tool) else { continue };
        let Some(schema) = tool.input_schema() else { continue };

        let compiled = match jsonschema::JSONSchema::compile(&schema) {
            Ok(c) => c,
            Err(e) => {
                errors.push(ValidationError::SchemaValidationFailed {
                    step_id: step.id.clone(),
                    tool: step.tool.clone(),
                    detail: format!("invalid schema: {e}"),
                });
                continue;
            }
        };

        let validation_result = compiled.validate(&step.input);
        if let Err(validation_errors) = validation_result {
            let detail = validation_errors.map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
            errors.push(ValidationError::SchemaValidationFailed {
                step_id: step.id.clone(),
                tool: step.tool.clone(),
                detail,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Step;
    use crate::tools::echo::Echo;
    use serde_json::json;
    use std::sync::Arc;

    fn router() -> ToolRouter {
        let mut r = ToolRouter::new();
        r.register(Arc::new(Echo));
        r
    }

    fn step(id: &str, tool: &str, deps: Vec<&str>) -> Step {
        Step {
            id: id.into(),
            tool: tool.into(),
            input: json!({}),
            success: String::new(),
            deps: deps.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn empty_plan_is_rejected() {
        let plan = Plan { goal: "g".into(), steps: vec![] };
        let errs = validate_plan(&plan, &router()).unwrap_err();
        assert!(matches!(errs[0], ValidationError::EmptyPlan));
    }

    #[test]
    fn unknown_tool_is_reported() {
        let plan = Plan { goal: "g".into(), steps: vec![step("s1", "NoSuchTool", vec![])] };
        let errs = validate_plan(&plan, &router()).unwrap_err();
        assert!(errs.iter().any(|e| matches!(e, ValidationError::UnknownTool { .. })));
    }

    #[test]
    fn duplicate_ids_are_reported() {
        let plan = Plan {
            goal: "g".into(),
            steps: vec![step("s1", "Echo", vec![]), step("s1", "Echo", vec![])],
        };
        let errs = validate_plan(&plan, &router()).unwrap_err();
        assert!(errs.iter().any(|e| matches!(e, ValidationError::DuplicateStepId { .. })));
    }

    #[test]
    fn unknown_dependency_is_reported() {
        let plan = Plan {
            goal: "g".into(),
            steps: vec![step("s1", "Echo", vec!["ghost"])],
        };
        let errs = validate_plan(&plan, &router()).unwrap_err();
        assert!(errs.iter().any(|e| matches!(e, ValidationError::UnknownDependency { .. })));
    }

    #[test]
    fn forward_reference_dependency_is_out_of_order() {
        let plan = Plan {
            goal: "g".into(),
            steps: vec![step("s1", "Echo", vec!["s2"]), step("s2", "Echo", vec![])],
        };
        let errs = validate_plan(&plan, &router()).unwrap_err();
        assert!(errs.iter().any(|e| matches!(e, ValidationError::OutOfOrderDependency { .. })));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let plan = Plan { goal: "g".into(), steps: vec![step("s1", "Echo", vec!["s1"])] };
        let errs = validate_plan(&plan, &router()).unwrap_err();
        assert!(errs.iter().any(|e| matches!(e, ValidationError::CircularDependency { .. })));
    }

    #[test]
    fn well_formed_plan_passes() {
        let plan = Plan {
            goal: "g".into(),
            steps: vec![step("s1", "Echo", vec![]), step("s2", "Echo", vec!["s1"])],
        };
        assert!(validate_plan(&plan, &router()).is_ok());
    }
}
