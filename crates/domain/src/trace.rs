use crate::ids::{ConfirmationId, Provider, SessionId, UserId};
use crate::risk::RiskLevel;
use serde::Serialize;

/// Structured events emitted at key decision points, logged through
/// `tracing` rather than printed — one `info!` call per event with the
/// serialized event attached as a field.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    LlmRequest {
        provider: String,
        model: String,
        role: String,
        streaming: bool,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    LlmFallback {
        from_provider: String,
        from_model: String,
        to_provider: String,
        to_model: String,
        reason: String,
    },
    SessionResolved {
        user_id: UserId,
        session_id: SessionId,
        is_new: bool,
    },
    SessionReset {
        user_id: UserId,
        old_session_id: SessionId,
        new_session_id: SessionId,
        reason: String,
    },
    ConnectionStateChanged {
        user_id: UserId,
        provider: Provider,
        old_state: String,
        new_state: String,
    },
    PlanSynthesized {
        user_id: UserId,
        step_count: usize,
        needs_clarification: bool,
    },
    ConfirmationRequested {
        confirmation_id: ConfirmationId,
        risk_level: RiskLevel,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_value(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "vco_event");
    }
}
