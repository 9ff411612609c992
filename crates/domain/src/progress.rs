use crate::ids::{ConfirmationId, Provider};
use crate::risk::RiskLevel;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// One increment of the streamed execution timeline sent to the client while
/// a plan is carried out. Terminated by exactly one `Done` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A named facade-level phase marker (`analyzing`, `discovering`,
    /// `selecting`, `executing`) marking progress through the turn before
    /// or between the step-level events below.
    Phase { name: String },
    PlanStarted { step_count: usize },
    StepStarted { step_index: usize, provider: Provider, tool: String },
    StepCompleted { step_index: usize, success: bool, duration_ms: u64 },
    ConfirmationRequired { confirmation_id: ConfirmationId, risk_level: RiskLevel, summary: String },
    Retrying { step_index: usize, attempt: u32, reason: String },
    /// A plan-level failure with no corresponding step: planner parse
    /// failure, registry load failure, or the plan deadline elapsing.
    Error { code: String, message: String },
    Done { result: OrchestrationResult },
}

/// Final outcome returned once a request has finished executing (or been
/// short-circuited by a failure, a clarification, or a pending confirmation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarification_question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_confirmation_id: Option<ConfirmationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Json>,
}

impl OrchestrationResult {
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            success: true,
            reply: Some(text.into()),
            clarification_question: None,
            pending_confirmation_id: None,
            data: None,
        }
    }

    pub fn clarification(question: impl Into<String>) -> Self {
        Self {
            success: true,
            reply: None,
            clarification_question: Some(question.into()),
            pending_confirmation_id: None,
            data: None,
        }
    }

    pub fn pending_confirmation(id: ConfirmationId) -> Self {
        Self {
            success: true,
            reply: None,
            clarification_question: None,
            pending_confirmation_id: Some(id),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_result_is_success() {
        let r = OrchestrationResult::reply("done");
        assert!(r.success);
        assert_eq!(r.reply.as_deref(), Some("done"));
    }

    #[test]
    fn done_event_serializes_with_tag() {
        let ev = ProgressEvent::Done { result: OrchestrationResult::reply("ok") };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["kind"], "done");
    }
}
