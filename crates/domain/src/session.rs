use crate::ids::{SessionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Continuous,
    PushToTalk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Timeout,
}

/// A bounded, idle-timed conversation context containing ordered turns.
///
/// Invariant: `turn_count == len(turns)`; at most one `Active` session per
/// user at a time (older actives are closed to `Timeout` after 15 min idle).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub mode: SessionMode,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub turn_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_summarized_turn: Option<u64>,
}

impl Session {
    pub fn new(user_id: UserId, mode: SessionMode, now: DateTime<Utc>) -> Self {
        Self {
            session_id: SessionId(uuid::Uuid::new_v4().to_string()),
            user_id,
            mode,
            status: SessionStatus::Active,
            created_at: now,
            last_activity_at: now,
            turn_count: 0,
            context_summary: None,
            last_summarized_turn: None,
        }
    }

    pub fn is_idle(&self, now: DateTime<Utc>, idle_timeout: chrono::Duration) -> bool {
        self.status == SessionStatus::Active && now - self.last_activity_at >= idle_timeout
    }
}

/// One `(user query, assistant reply)` pair within a session. Turns are
/// appended, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTurn {
    pub turn_number: u64,
    pub user_query: String,
    pub assistant_reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<serde_json::Value>,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn new_session_is_active_with_zero_turns() {
        let now = Utc::now();
        let s = Session::new(UserId::from("u1"), SessionMode::Continuous, now);
        assert_eq!(s.status, SessionStatus::Active);
        assert_eq!(s.turn_count, 0);
    }

    #[test]
    fn session_not_idle_before_timeout() {
        let now = Utc::now();
        let s = Session::new(UserId::from("u1"), SessionMode::Continuous, now);
        assert!(!s.is_idle(now + Duration::minutes(10), Duration::minutes(15)));
    }

    #[test]
    fn session_idle_after_timeout() {
        let now = Utc::now();
        let s = Session::new(UserId::from("u1"), SessionMode::Continuous, now);
        assert!(s.is_idle(now + Duration::minutes(16), Duration::minutes(15)));
    }

    #[test]
    fn completed_session_is_never_idle() {
        let now = Utc::now();
        let mut s = Session::new(UserId::from("u1"), SessionMode::Continuous, now);
        s.status = SessionStatus::Completed;
        assert!(!s.is_idle(now + Duration::hours(1), Duration::minutes(15)));
    }
}
