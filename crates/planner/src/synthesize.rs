//! Stage B — Plan Synthesizer: turns a query, context, and registry
//! snapshot into a typed `Plan` the Executor can carry out.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value as Json;
use vco_domain::capability::ModelRole;
use vco_domain::plan::{Plan, PlanStep};
use vco_domain::tool::Message;
use vco_domain::Result;
use vco_llm::{ChatRequest, LlmRouter};

const SYSTEM_PROMPT: &str = r#"You are the plan synthesizer for a voice command assistant. You are
given a snapshot of connected services and their tools, the user's query,
and recent conversation context.

Rules:
- "service" must be a key from the registry snapshot. Never invent a service.
- "tool" must be a tool name listed under that service in the snapshot.
- Param values may be literals or template references like "{{results[0].events}}".
- For requests that act on multiple items found by a search (e.g. "delete
  all tomorrow's meetings"), emit two steps: a list/search step, then a
  mutating step with "iterateOver" pointing at the array the first step
  returns.
- Prefer "search, then act" over asking for clarification. Only set
  needsClarification to true when the request cannot be satisfied even
  with a search/list step first.
- When the context refers to something like "the meeting you created",
  pull identifying details (time, title) from the context rather than the
  current query literally.

Respond with strict JSON only, no prose, matching exactly:
{"selectedTools": [{"service": "...", "tool": "...", "params": {...}, "iterateOver": "...", "reasoning": "..."}],
 "executionPlan": "...", "confidence": 0.0, "needsClarification": false, "clarificationQuestion": "..."}

Omit "iterateOver", "reasoning", and "clarificationQuestion" when not applicable."#;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectedTool {
    service: String,
    tool: String,
    #[serde(default)]
    params: HashMap<String, Json>,
    #[serde(default)]
    iterate_over: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanSynthesisResponse {
    selected_tools: Vec<SelectedTool>,
    execution_plan: String,
    confidence: f64,
    needs_clarification: bool,
    #[serde(default)]
    clarification_question: Option<String>,
}

impl From<PlanSynthesisResponse> for Plan {
    fn from(r: PlanSynthesisResponse) -> Self {
        Plan {
            steps: r
                .selected_tools
                .into_iter()
                .map(|t| PlanStep {
                    provider: t.service,
                    tool: t.tool,
                    params: t.params,
                    iterate_over: t.iterate_over,
                    reasoning: t.reasoning,
                })
                .collect(),
            needs_clarification: r.needs_clarification,
            confidence: r.confidence,
            clarification_question: r.clarification_question,
            rationale: r.execution_plan,
        }
    }
}

/// Run Stage B. A parse failure returns a clarification plan with a
/// generic rephrase question rather than being patched up heuristically.
pub async fn synthesize_plan(
    router: &Arc<LlmRouter>,
    registry_snapshot: &Json,
    query: &str,
    context: &str,
) -> Result<Plan> {
    let user_content = format!(
        "Connected services and tools:\n{}\n\n{}Current query: {query}",
        serde_json::to_string(registry_snapshot).unwrap_or_default(),
        if context.is_empty() {
            String::new()
        } else {
            format!("Conversation context:\n{context}\n\n")
        }
    );

    let req = ChatRequest {
        messages: vec![Message::system(SYSTEM_PROMPT), Message::user(user_content)],
        temperature: Some(0.1),
        json_mode: true,
        ..Default::default()
    };

    let resp = router.chat_for_role(ModelRole::Planner, req).await?;

    match serde_json::from_str::<PlanSynthesisResponse>(&resp.content) {
        Ok(parsed) => Ok(parsed.into()),
        Err(e) => {
            tracing::warn!(error = %e, raw = %resp.content, "plan synthesis response failed to parse");
            Ok(Plan::clarification(
                "I didn't quite catch that — could you rephrase your request?",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fan_out_plan() {
        let raw = r#"{
            "selectedTools": [
                {"service": "calendar", "tool": "list_events", "params": {"timeMin": "tomorrow"}},
                {"service": "calendar", "tool": "delete_event", "params": {}, "iterateOver": "{{results[0].events}}"}
            ],
            "executionPlan": "list then delete",
            "confidence": 0.9,
            "needsClarification": false
        }"#;
        let parsed: PlanSynthesisResponse = serde_json::from_str(raw).unwrap();
        let plan: Plan = parsed.into();
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1].iterate_over.as_deref(), Some("{{results[0].events}}"));
        assert!(!plan.needs_clarification);
    }

    #[test]
    fn parses_clarification_plan() {
        let raw = r#"{
            "selectedTools": [],
            "executionPlan": "",
            "confidence": 0.2,
            "needsClarification": true,
            "clarificationQuestion": "Which meeting did you mean?"
        }"#;
        let parsed: PlanSynthesisResponse = serde_json::from_str(raw).unwrap();
        let plan: Plan = parsed.into();
        assert!(plan.needs_clarification);
        assert_eq!(plan.clarification_question.as_deref(), Some("Which meeting did you mean?"));
    }
}
