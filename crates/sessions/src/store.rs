//! Conversation Store.
//!
//! Owns the active/idle session map and each session's append-only turn log,
//! persisted to `sessions/` under the configured state directory. Mirrors the
//! flush-on-write discipline of a file-backed session store: every mutation
//! that changes durable state is followed by a write to disk before the call
//! returns.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;

use vco_domain::error::{Error, Result};
use vco_domain::ids::{SessionId, UserId};
use vco_domain::session::{Session, SessionMode, SessionStatus, SessionTurn};
use vco_domain::trace::TraceEvent;
use vco_llm::{ChatRequest, LlmProvider};

/// Estimate token count from character count. Matches the coarse `chars / 4`
/// heuristic used across the context-budgeting code rather than a real
/// tokenizer, since exactness isn't required — only a stable overflow signal.
fn estimate_tokens(s: &str) -> u32 {
    ((s.chars().count() as f64) / 4.0).ceil() as u32
}

fn format_turn(turn: &SessionTurn) -> String {
    format!("User: {}\nAssistant: {}", turn.user_query, turn.assistant_reply)
}

fn format_turns(turns: &[SessionTurn]) -> String {
    turns.iter().map(format_turn).collect::<Vec<_>>().join("\n\n")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ConversationStore {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
    turns: Arc<RwLock<HashMap<SessionId, Vec<SessionTurn>>>>,
    llm: Arc<dyn LlmProvider>,
    state_dir: PathBuf,
    idle_timeout: ChronoDuration,
    max_context_tokens: u32,
    verbatim_turn_window: usize,
    keep_last_turns_on_summarize: usize,
}

impl ConversationStore {
    /// Load (or initialize) the store at `state_dir/sessions/`, and spawn the
    /// background idle-timeout sweeper. `llm` is used only for summarization
    /// when a session's context overflows the token budget.
    pub fn new(
        state_dir: &Path,
        llm: Arc<dyn LlmProvider>,
        idle_timeout_minutes: i64,
        max_context_tokens: u32,
        verbatim_turn_window: u32,
        keep_last_turns_on_summarize: u32,
    ) -> Result<Self> {
        let dir = state_dir.join("sessions");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;

        let sessions = load_sessions(&dir)?;
        let turns = load_turns(&dir, &sessions)?;

        tracing::info!(
            sessions = sessions.len(),
            path = %dir.display(),
            "conversation store loaded"
        );

        let store = Self {
            sessions: Arc::new(RwLock::new(sessions)),
            turns: Arc::new(RwLock::new(turns)),
            llm,
            state_dir: dir,
            idle_timeout: ChronoDuration::minutes(idle_timeout_minutes),
            max_context_tokens,
            verbatim_turn_window: verbatim_turn_window as usize,
            keep_last_turns_on_summarize: keep_last_turns_on_summarize as usize,
        };

        store.spawn_idle_sweeper();
        Ok(store)
    }

    fn sessions_path(&self) -> PathBuf {
        self.state_dir.join("sessions.json")
    }

    fn turn_path(&self, session_id: &SessionId) -> PathBuf {
        self.state_dir.join(format!("turns-{}.json", session_id.0))
    }

    fn flush_sessions(&self) -> Result<()> {
        let sessions = self.sessions.read();
        let json = serde_json::to_string_pretty(&*sessions)?;
        std::fs::write(self.sessions_path(), json).map_err(Error::Io)
    }

    fn flush_turns(&self, session_id: &SessionId) -> Result<()> {
        let turns = self.turns.read();
        let empty = Vec::new();
        let list = turns.get(session_id).unwrap_or(&empty);
        let json = serde_json::to_string_pretty(list)?;
        std::fs::write(self.turn_path(session_id), json).map_err(Error::Io)
    }

    // ── Public API ──────────────────────────────────────────────────

    /// Return the user's active session, or open one. An active session
    /// idle for longer than the configured timeout is closed as `Timeout`
    /// and a fresh session replaces it.
    pub fn get_or_create_active(&self, user: &UserId, mode: SessionMode) -> Result<Session> {
        let now = Utc::now();

        {
            let mut sessions = self.sessions.write();
            if let Some(existing) = find_active(&sessions, user) {
                if !existing.is_idle(now, self.idle_timeout) {
                    return Ok(existing.clone());
                }

                let old_id = existing.session_id.clone();
                if let Some(entry) = sessions.get_mut(&old_id) {
                    entry.status = SessionStatus::Timeout;
                }

                let fresh = Session::new(user.clone(), mode, now);
                let new_id = fresh.session_id.clone();
                sessions.insert(new_id.clone(), fresh.clone());
                drop(sessions);

                self.flush_sessions()?;
                TraceEvent::SessionReset {
                    user_id: user.clone(),
                    old_session_id: old_id,
                    new_session_id: new_id,
                    reason: "idle_timeout".into(),
                }
                .emit();

                return Ok(fresh);
            }
        }

        let fresh = Session::new(user.clone(), mode, now);
        let session_id = fresh.session_id.clone();
        self.sessions.write().insert(session_id.clone(), fresh.clone());
        self.flush_sessions()?;

        TraceEvent::SessionResolved {
            user_id: user.clone(),
            session_id,
            is_new: true,
        }
        .emit();

        Ok(fresh)
    }

    /// Append a turn, assigning the next `TurnNumber` and bumping the
    /// session's activity counters.
    pub fn append_turn(
        &self,
        session_id: &SessionId,
        user_query: String,
        assistant_reply: String,
        tool_results: Option<serde_json::Value>,
        duration_ms: u64,
    ) -> Result<SessionTurn> {
        let turn_number = {
            let mut sessions = self.sessions.write();
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| Error::Other(format!("no session '{session_id}'")))?;
            session.turn_count += 1;
            session.last_activity_at = Utc::now();
            session.turn_count
        };

        let turn = SessionTurn {
            turn_number,
            user_query,
            assistant_reply,
            tool_results,
            duration_ms,
            created_at: Utc::now(),
        };

        self.turns
            .write()
            .entry(session_id.clone())
            .or_default()
            .push(turn.clone());

        self.flush_sessions()?;
        self.flush_turns(session_id)?;

        Ok(turn)
    }

    /// Build the context block handed to the planner/executor. Returns the
    /// last `verbatim_turn_window` turns verbatim if they fit the token
    /// budget, otherwise a cached summary plus the last
    /// `keep_last_turns_on_summarize` turns (or just those turns if no
    /// summary is cached yet). Schedules a background summarization when the
    /// cached summary doesn't cover everything before the tail window.
    pub fn build_context(self: &Arc<Self>, session_id: &SessionId) -> Result<String> {
        let all_turns = {
            let turns = self.turns.read();
            turns.get(session_id).cloned().unwrap_or_default()
        };

        if all_turns.is_empty() {
            return Ok(String::new());
        }

        let window_start = all_turns.len().saturating_sub(self.verbatim_turn_window);
        let recent = &all_turns[window_start..];
        let verbatim = format_turns(recent);

        if estimate_tokens(&verbatim) <= self.max_context_tokens {
            return Ok(verbatim);
        }

        let tail_start = all_turns.len().saturating_sub(self.keep_last_turns_on_summarize);
        let tail = &all_turns[tail_start..];
        let tail_text = format_turns(tail);

        let (cached_summary, last_summarized_turn) = {
            let sessions = self.sessions.read();
            let session = sessions.get(session_id);
            (
                session.and_then(|s| s.context_summary.clone()),
                session.and_then(|s| s.last_summarized_turn),
            )
        };

        let covers_everything_before_tail =
            last_summarized_turn.is_some_and(|n| n as usize >= tail_start);

        if !covers_everything_before_tail {
            self.schedule_summarization(session_id.clone(), all_turns.clone(), tail_start);
        }

        match cached_summary {
            Some(summary) if !summary.is_empty() => Ok(format!(
                "Previous conversation summary:\n{summary}\n\nRecent conversation:\n{tail_text}"
            )),
            _ => Ok(tail_text),
        }
    }

    /// Mark a session closed with the given terminal status.
    pub fn end_session(&self, session_id: &SessionId, status: SessionStatus) -> Result<()> {
        {
            let mut sessions = self.sessions.write();
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| Error::Other(format!("no session '{session_id}'")))?;
            session.status = status;
        }
        self.flush_sessions()
    }

    // ── Background tasks ────────────────────────────────────────────

    /// Spawn the 10-minute idle sweep. Holds only weak/shared references to
    /// the maps, never `self`, so the store can be dropped freely.
    fn spawn_idle_sweeper(&self) {
        let sessions: Weak<RwLock<HashMap<SessionId, Session>>> = Arc::downgrade(&self.sessions);
        let idle_timeout = self.idle_timeout;
        let sessions_path = self.sessions_path();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(600));
            loop {
                interval.tick().await;
                let Some(sessions) = sessions.upgrade() else {
                    return;
                };

                let now = Utc::now();
                let mut any_timed_out = false;
                {
                    let mut map = sessions.write();
                    for session in map.values_mut() {
                        if session.status == SessionStatus::Active
                            && now - session.last_activity_at >= idle_timeout
                        {
                            session.status = SessionStatus::Timeout;
                            any_timed_out = true;
                        }
                    }
                }

                if any_timed_out {
                    let json = {
                        let map = sessions.read();
                        serde_json::to_string_pretty(&*map)
                    };
                    if let Ok(json) = json {
                        if let Err(e) = std::fs::write(&sessions_path, json) {
                            tracing::warn!(error = %e, "failed to flush sessions after idle sweep");
                        }
                    }
                }
            }
        });
    }

    /// Spawn a background summarization call and overwrite the cached
    /// summary once it returns. Never blocks the caller of `build_context`.
    fn schedule_summarization(
        &self,
        session_id: SessionId,
        all_turns: Vec<SessionTurn>,
        tail_start: usize,
    ) {
        let sessions: Weak<RwLock<HashMap<SessionId, Session>>> = Arc::downgrade(&self.sessions);
        let llm = self.llm.clone();
        let to_summarize = all_turns[..tail_start].to_vec();
        if to_summarize.is_empty() {
            return;
        }
        let last_summarized_turn = to_summarize.last().map(|t| t.turn_number).unwrap_or(0);

        tokio::spawn(async move {
            let transcript = format_turns(&to_summarize);
            let prompt = format!(
                "Summarize the following conversation turns concisely, preserving any \
                 facts, decisions, or open questions a later turn might need:\n\n{transcript}"
            );

            let req = ChatRequest {
                messages: vec![vco_domain::tool::Message::user(prompt)],
                temperature: Some(0.2),
                ..Default::default()
            };

            match llm.chat(req).await {
                Ok(resp) => {
                    if let Some(sessions) = sessions.upgrade() {
                        let mut map = sessions.write();
                        if let Some(session) = map.get_mut(&session_id) {
                            session.context_summary = Some(resp.content);
                            session.last_summarized_turn = Some(last_summarized_turn);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %session_id,
                        error = %e,
                        "background context summarization failed"
                    );
                }
            }
        });
    }
}

fn find_active<'a>(
    sessions: &'a HashMap<SessionId, Session>,
    user: &UserId,
) -> Option<&'a Session> {
    sessions
        .values()
        .filter(|s| &s.user_id == user && s.status == SessionStatus::Active)
        .max_by_key(|s| s.last_activity_at)
}

fn load_sessions(dir: &Path) -> Result<HashMap<SessionId, Session>> {
    let path = dir.join("sessions.json");
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
    Ok(serde_json::from_str(&raw).unwrap_or_default())
}

fn load_turns(
    dir: &Path,
    sessions: &HashMap<SessionId, Session>,
) -> Result<HashMap<SessionId, Vec<SessionTurn>>> {
    let mut turns = HashMap::new();
    for session_id in sessions.keys() {
        let path = dir.join(format!("turns-{}.json", session_id.0));
        if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            let list: Vec<SessionTurn> = serde_json::from_str(&raw).unwrap_or_default();
            turns.insert(session_id.clone(), list);
        }
    }
    Ok(turns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vco_domain::capability::LlmCapabilities;
    use vco_domain::stream::{BoxStream, StreamEvent};
    use vco_llm::{ChatResponse, EmbeddingsRequest, EmbeddingsResponse};

    struct StubLlm {
        capabilities: LlmCapabilities,
    }

    impl StubLlm {
        fn new() -> Self {
            Self {
                capabilities: LlmCapabilities {
                    supports_tools: vco_domain::capability::ToolSupport::None,
                    supports_streaming: false,
                    supports_json_mode: false,
                    supports_vision: false,
                    context_window_tokens: None,
                    max_output_tokens: None,
                },
            }
        }
    }

    #[async_trait]
    impl LlmProvider for StubLlm {
        async fn chat(&self, _req: ChatRequest) -> vco_domain::Result<ChatResponse> {
            Ok(ChatResponse {
                content: "a short summary".into(),
                tool_calls: vec![],
                usage: None,
                model: "stub".into(),
                finish_reason: Some("stop".into()),
            })
        }

        async fn chat_stream(
            &self,
            _req: ChatRequest,
        ) -> vco_domain::Result<BoxStream<'static, vco_domain::Result<StreamEvent>>> {
            unimplemented!("not exercised in these tests")
        }

        async fn embeddings(
            &self,
            _req: EmbeddingsRequest,
        ) -> vco_domain::Result<EmbeddingsResponse> {
            unimplemented!("not exercised in these tests")
        }

        fn capabilities(&self) -> &LlmCapabilities {
            &self.capabilities
        }

        fn provider_id(&self) -> &str {
            "stub"
        }
    }

    fn new_store(dir: &Path) -> Arc<ConversationStore> {
        Arc::new(
            ConversationStore::new(dir, Arc::new(StubLlm::new()), 15, 2_500, 15, 5).unwrap(),
        )
    }

    #[tokio::test]
    async fn get_or_create_active_reuses_existing_session() {
        let tmp = tempfile::tempdir().unwrap();
        let store = new_store(tmp.path());
        let user = UserId::from("u1");

        let s1 = store.get_or_create_active(&user, SessionMode::Continuous).unwrap();
        let s2 = store.get_or_create_active(&user, SessionMode::Continuous).unwrap();
        assert_eq!(s1.session_id, s2.session_id);
    }

    #[tokio::test]
    async fn append_turn_increments_turn_count() {
        let tmp = tempfile::tempdir().unwrap();
        let store = new_store(tmp.path());
        let user = UserId::from("u1");
        let session = store.get_or_create_active(&user, SessionMode::Continuous).unwrap();

        let turn = store
            .append_turn(&session.session_id, "hi".into(), "hello".into(), None, 10)
            .unwrap();
        assert_eq!(turn.turn_number, 1);

        let turn2 = store
            .append_turn(&session.session_id, "again".into(), "again reply".into(), None, 5)
            .unwrap();
        assert_eq!(turn2.turn_number, 2);
    }

    #[tokio::test]
    async fn build_context_returns_verbatim_when_small() {
        let tmp = tempfile::tempdir().unwrap();
        let store = new_store(tmp.path());
        let user = UserId::from("u1");
        let session = store.get_or_create_active(&user, SessionMode::Continuous).unwrap();
        store
            .append_turn(&session.session_id, "hi".into(), "hello".into(), None, 10)
            .unwrap();

        let ctx = store.build_context(&session.session_id).unwrap();
        assert!(ctx.contains("User: hi"));
        assert!(ctx.contains("Assistant: hello"));
    }

    #[tokio::test]
    async fn build_context_empty_session_is_empty_string() {
        let tmp = tempfile::tempdir().unwrap();
        let store = new_store(tmp.path());
        let user = UserId::from("u1");
        let session = store.get_or_create_active(&user, SessionMode::Continuous).unwrap();

        assert_eq!(store.build_context(&session.session_id).unwrap(), "");
    }

    #[tokio::test]
    async fn end_session_persists_status() {
        let tmp = tempfile::tempdir().unwrap();
        let store = new_store(tmp.path());
        let user = UserId::from("u1");
        let session = store.get_or_create_active(&user, SessionMode::Continuous).unwrap();

        store.end_session(&session.session_id, SessionStatus::Completed).unwrap();

        let raw = std::fs::read_to_string(tmp.path().join("sessions").join("sessions.json")).unwrap();
        assert!(raw.contains("\"completed\""));
    }

    #[tokio::test]
    async fn idle_session_is_replaced_on_get_or_create() {
        let tmp = tempfile::tempdir().unwrap();
        let store = new_store(tmp.path());
        let user = UserId::from("u1");
        let session = store.get_or_create_active(&user, SessionMode::Continuous).unwrap();

        // Force the session to look idle by rewriting its last_activity_at.
        {
            let mut sessions = store.sessions.write();
            let s = sessions.get_mut(&session.session_id).unwrap();
            s.last_activity_at = Utc::now() - ChronoDuration::minutes(20);
        }

        let fresh = store.get_or_create_active(&user, SessionMode::Continuous).unwrap();
        assert_ne!(fresh.session_id, session.session_id);
    }
}
