use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::HashMap;

/// A typed execution plan synthesized by the Planner (C8) and carried out
/// step-by-step by the Executor (C9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
    pub needs_clarification: bool,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarification_question: Option<String>,
    pub rationale: String,
}

impl Plan {
    /// A plan that short-circuits execution with a clarification request.
    pub fn clarification(question: impl Into<String>) -> Self {
        Self {
            steps: Vec::new(),
            needs_clarification: true,
            confidence: 0.0,
            clarification_question: Some(question.into()),
            rationale: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub provider: String,
    pub tool: String,
    pub params: HashMap<String, Json>,
    /// A template reference (e.g. `"{{results[0].events}}"`) resolving to an
    /// array this step should be executed once per element of.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterate_over: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// Outcome of executing one plan step (or one item within an iterated step).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub provider: String,
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl StepResult {
    pub fn ok(provider: &str, tool: &str, data: Json, duration_ms: u64) -> Self {
        Self {
            success: true,
            provider: provider.to_owned(),
            tool: tool.to_owned(),
            data: Some(data),
            error: None,
            duration_ms,
        }
    }

    pub fn err(provider: &str, tool: &str, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            provider: provider.to_owned(),
            tool: tool.to_owned(),
            data: None,
            error: Some(error.into()),
            duration_ms,
        }
    }

    /// Aggregate per-item results of an iterated step into one `StepResult`
    /// whose `data` is `{ iterationCount, successCount, perItem }` and whose
    /// `duration_ms` is the sum of the items'.
    pub fn aggregate(provider: &str, tool: &str, per_item: Vec<StepResult>) -> Self {
        let iteration_count = per_item.len();
        let success_count = per_item.iter().filter(|r| r.success).count();
        let duration_ms = per_item.iter().map(|r| r.duration_ms).sum();
        let data = serde_json::json!({
            "iterationCount": iteration_count,
            "successCount": success_count,
            "perItem": per_item,
        });
        Self {
            success: success_count > 0,
            provider: provider.to_owned(),
            tool: tool.to_owned(),
            data: Some(data),
            error: None,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_success_true_when_any_item_succeeds() {
        let items = vec![
            StepResult::ok("calendar", "delete_event", serde_json::json!({"id": "A"}), 10),
            StepResult::err("calendar", "delete_event", "not found", 5),
        ];
        let agg = StepResult::aggregate("calendar", "delete_event", items);
        assert!(agg.success);
        assert_eq!(agg.duration_ms, 15);
        let data = agg.data.unwrap();
        assert_eq!(data["iterationCount"], 2);
        assert_eq!(data["successCount"], 1);
    }

    #[test]
    fn aggregate_success_false_when_all_items_fail() {
        let items = vec![
            StepResult::err("calendar", "delete_event", "a", 1),
            StepResult::err("calendar", "delete_event", "b", 1),
        ];
        let agg = StepResult::aggregate("calendar", "delete_event", items);
        assert!(!agg.success);
    }

    #[test]
    fn clarification_plan_has_no_steps() {
        let plan = Plan::clarification("Which meeting did you mean?");
        assert!(plan.needs_clarification);
        assert!(plan.steps.is_empty());
    }
}
