//! Stage A — Intent Router: classifies a query as conversational chit-chat
//! or an action request before the (expensive) plan synthesis stage runs.

use std::sync::Arc;

use serde::Deserialize;
use vco_domain::capability::ModelRole;
use vco_domain::tool::Message;
use vco_domain::Result;
use vco_llm::{ChatRequest, LlmRouter};

const SYSTEM_PROMPT: &str = r#"You are the intent router for a voice command assistant.

Classify the user's query as one of:
- "conversational": greetings, thanks, capability questions, small talk.
- "action": anything implying a state change or a data retrieval against a
  connected service (calendar, contacts, chat, issue tracker). Affirmations
  like "yes" or "do it" are "action" when the conversation context shows a
  pending action awaiting confirmation.

Respond with strict JSON only, no prose, matching exactly:
{"type": "conversational" | "action", "confidence": <0.0-1.0>, "reasoning": "<short reason>"}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    Conversational,
    Action,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntentResult {
    #[serde(rename = "type")]
    pub intent_type: IntentType,
    pub confidence: f64,
    pub reasoning: String,
}

/// Run Stage A. A parse failure defaults to `Action` — the safe fallback,
/// since the next stage will ask for clarification rather than silently
/// doing nothing.
pub async fn route_intent(router: &Arc<LlmRouter>, query: &str, context: &str) -> Result<IntentResult> {
    let user_content = if context.is_empty() {
        query.to_string()
    } else {
        format!("Conversation context:\n{context}\n\nCurrent query: {query}")
    };

    let req = ChatRequest {
        messages: vec![Message::system(SYSTEM_PROMPT), Message::user(user_content)],
        temperature: Some(0.1),
        json_mode: true,
        ..Default::default()
    };

    let resp = router.chat_for_role(ModelRole::Planner, req).await?;

    match serde_json::from_str::<IntentResult>(&resp.content) {
        Ok(result) => Ok(result),
        Err(e) => {
            tracing::warn!(error = %e, raw = %resp.content, "intent router response failed to parse, defaulting to action");
            Ok(IntentResult {
                intent_type: IntentType::Action,
                confidence: 0.0,
                reasoning: "fallback: intent router response did not parse as JSON".into(),
            })
        }
    }
}

/// A short natural-language reply for a conversational query, always
/// offering to help further. Generated via a third LLM call per the
/// routing contract.
pub async fn conversational_reply(router: &Arc<LlmRouter>, query: &str, context: &str) -> Result<String> {
    let system = "You are a friendly voice assistant. Reply to the user's message in 15 \
                  words or fewer. Always leave the door open to help with a task.";
    let user_content = if context.is_empty() {
        query.to_string()
    } else {
        format!("Conversation context:\n{context}\n\nCurrent query: {query}")
    };

    let req = ChatRequest {
        messages: vec![Message::system(system), Message::user(user_content)],
        temperature: Some(0.5),
        ..Default::default()
    };

    let resp = router.chat_for_role(ModelRole::Planner, req).await?;
    Ok(resp.content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_conversational_response() {
        let raw = r#"{"type": "conversational", "confidence": 0.95, "reasoning": "greeting"}"#;
        let result: IntentResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.intent_type, IntentType::Conversational);
        assert_eq!(result.confidence, 0.95);
    }

    #[test]
    fn parses_action_response() {
        let raw = r#"{"type": "action", "confidence": 0.8, "reasoning": "delete request"}"#;
        let result: IntentResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.intent_type, IntentType::Action);
    }
}
