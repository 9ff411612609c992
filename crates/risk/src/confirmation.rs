//! Confirmation Gate: pauses a plan step until the caller supplies the
//! matching confirmation token, or the pending request expires.
//!
//! Shaped after this codebase's exec-approval workflow: each pending gate
//! holds a `oneshot::Sender` that unblocks the waiting executor call once
//! resolved, with a TTL that ensures the system never blocks indefinitely.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::oneshot;
use vco_domain::ids::ConfirmationId;
use vco_domain::risk::RiskLevel;
use vco_domain::trace::TraceEvent;

/// The outcome delivered to the waiting executor call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationDecision {
    Confirmed,
    Rejected,
    Expired,
}

struct PendingConfirmation {
    level: RiskLevel,
    tool: String,
    created_at: DateTime<Utc>,
    respond: Option<oneshot::Sender<ConfirmationDecision>>,
}

/// Serializable snapshot of a pending confirmation (for API responses).
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationInfo {
    pub confirmation_id: ConfirmationId,
    pub level: RiskLevel,
    pub tool: String,
    pub created_at: DateTime<Utc>,
}

/// Whether the supplied token satisfies the requirement for `level`.
///
/// `Safe`/`Low` never require a token. `Medium` accepts any of the
/// configured confirmation words (case-sensitive exact match, no fuzzy
/// matching). `High` requires the literal approval token, exactly.
pub fn token_satisfies(
    level: RiskLevel,
    token: &str,
    confirmation_tokens: &[String],
    manual_approval_token: &str,
) -> bool {
    match level {
        RiskLevel::Safe | RiskLevel::Low => true,
        RiskLevel::Medium => confirmation_tokens.iter().any(|t| t == token),
        RiskLevel::High => token == manual_approval_token,
    }
}

pub struct ConfirmationGate {
    pending: RwLock<HashMap<ConfirmationId, PendingConfirmation>>,
    ttl: Duration,
    confirmation_tokens: Vec<String>,
    manual_approval_token: String,
}

impl ConfirmationGate {
    pub fn new(ttl_secs: i64, confirmation_tokens: Vec<String>, manual_approval_token: String) -> Self {
        Self {
            pending: RwLock::new(HashMap::new()),
            ttl: Duration::from_secs(ttl_secs.max(0) as u64),
            confirmation_tokens,
            manual_approval_token,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Open a new pending confirmation and return its id plus a receiver the
    /// caller should await (with its own timeout matching `ttl`).
    pub fn request(&self, level: RiskLevel, tool: &str) -> (ConfirmationId, oneshot::Receiver<ConfirmationDecision>) {
        let id = ConfirmationId::default();
        let (tx, rx) = oneshot::channel();
        let pending = PendingConfirmation {
            level,
            tool: tool.to_owned(),
            created_at: Utc::now(),
            respond: Some(tx),
        };

        self.pending.write().insert(id.clone(), pending);

        TraceEvent::ConfirmationRequested {
            confirmation_id: id.clone(),
            risk_level: level,
        }
        .emit();

        (id, rx)
    }

    /// Attempt to resolve a pending confirmation with a caller-supplied
    /// token. Returns `true` if the token satisfied the level's
    /// requirement and the waiter was unblocked, `false` if the token was
    /// wrong (the confirmation stays pending) or the id is unknown.
    pub fn resolve(&self, id: &ConfirmationId, token: &str) -> bool {
        let mut pending = self.pending.write();
        let Some(entry) = pending.get_mut(id) else {
            return false;
        };

        if !token_satisfies(
            entry.level,
            token,
            &self.confirmation_tokens,
            &self.manual_approval_token,
        ) {
            return false;
        }

        if let Some(respond) = entry.respond.take() {
            let _ = respond.send(ConfirmationDecision::Confirmed);
        }
        pending.remove(id);
        true
    }

    /// Explicitly reject a pending confirmation (e.g. the caller declined).
    pub fn reject(&self, id: &ConfirmationId) -> bool {
        if let Some(mut entry) = self.pending.write().remove(id) {
            if let Some(respond) = entry.respond.take() {
                let _ = respond.send(ConfirmationDecision::Rejected);
            }
            return true;
        }
        false
    }

    /// Remove a confirmation that timed out waiting for a response. Called
    /// by the executor after its own TTL-bounded await elapses.
    pub fn expire(&self, id: &ConfirmationId) {
        if let Some(mut entry) = self.pending.write().remove(id) {
            if let Some(respond) = entry.respond.take() {
                let _ = respond.send(ConfirmationDecision::Expired);
            }
        }
    }

    /// List all currently pending confirmations (for dashboard/API use).
    pub fn list_pending(&self) -> Vec<ConfirmationInfo> {
        self.pending
            .read()
            .iter()
            .map(|(id, p)| ConfirmationInfo {
                confirmation_id: id.clone(),
                level: p.level,
                tool: p.tool.clone(),
                created_at: p.created_at,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> ConfirmationGate {
        ConfirmationGate::new(300, vec!["confirm".into(), "yes".into()], "APPROVED".into())
    }

    #[test]
    fn medium_accepts_confirm_or_yes() {
        let tokens = vec!["confirm".to_string(), "yes".to_string()];
        assert!(token_satisfies(RiskLevel::Medium, "confirm", &tokens, "APPROVED"));
        assert!(token_satisfies(RiskLevel::Medium, "yes", &tokens, "APPROVED"));
        assert!(!token_satisfies(RiskLevel::Medium, "sure", &tokens, "APPROVED"));
    }

    #[test]
    fn high_requires_exact_approved() {
        let tokens = vec!["confirm".to_string()];
        assert!(token_satisfies(RiskLevel::High, "APPROVED", &tokens, "APPROVED"));
        assert!(!token_satisfies(RiskLevel::High, "approved", &tokens, "APPROVED"));
        assert!(!token_satisfies(RiskLevel::High, "confirm", &tokens, "APPROVED"));
    }

    #[test]
    fn safe_and_low_need_no_token() {
        let tokens = vec![];
        assert!(token_satisfies(RiskLevel::Safe, "", &tokens, "APPROVED"));
        assert!(token_satisfies(RiskLevel::Low, "anything", &tokens, "APPROVED"));
    }

    #[tokio::test]
    async fn resolve_with_correct_token_unblocks_waiter() {
        let gate = gate();
        let (id, rx) = gate.request(RiskLevel::Medium, "delete_event");

        assert!(gate.resolve(&id, "confirm"));
        let decision = rx.await.unwrap();
        assert_eq!(decision, ConfirmationDecision::Confirmed);
        assert!(gate.list_pending().is_empty());
    }

    #[tokio::test]
    async fn resolve_with_wrong_token_stays_pending() {
        let gate = gate();
        let (id, _rx) = gate.request(RiskLevel::High, "delete_event");

        assert!(!gate.resolve(&id, "confirm"));
        assert_eq!(gate.list_pending().len(), 1);
    }

    #[tokio::test]
    async fn reject_resolves_as_rejected() {
        let gate = gate();
        let (id, rx) = gate.request(RiskLevel::Medium, "delete_event");

        assert!(gate.reject(&id));
        let decision = rx.await.unwrap();
        assert_eq!(decision, ConfirmationDecision::Rejected);
    }

    #[tokio::test]
    async fn expire_resolves_as_expired() {
        let gate = gate();
        let (id, rx) = gate.request(RiskLevel::High, "delete_event");

        gate.expire(&id);
        let decision = rx.await.unwrap();
        assert_eq!(decision, ConfirmationDecision::Expired);
    }

    #[test]
    fn resolve_unknown_id_returns_false() {
        let gate = gate();
        assert!(!gate.resolve(&ConfirmationId::default(), "confirm"));
    }
}
