//! Shared application state handed to every axum handler: one `Arc` per
//! subsystem, cloned cheaply per request.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use vco_connections::ConnectionManager;
use vco_domain::capability::{LlmCapabilities, ModelRole, ToolSupport};
use vco_domain::config::Config;
use vco_domain::ids::SessionId;
use vco_domain::stream::{BoxStream, StreamEvent};
use vco_domain::Result;
use vco_executor::Executor;
use vco_llm::{ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider, LlmRouter};
use vco_planner::Planner;
use vco_risk::{ConfirmationGate, RiskAssessor};
use vco_sessions::ConversationStore;

use crate::activity::ActivityLog;
use crate::tokens::FileTokenStore;

/// Routes `LlmProvider::chat` calls through the router's `Summarizer` role so
/// the Conversation Store can treat the whole router as a single provider.
struct SummarizerProvider {
    router: Arc<LlmRouter>,
    capabilities: LlmCapabilities,
}

#[async_trait::async_trait]
impl LlmProvider for SummarizerProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        self.router.chat_for_role(ModelRole::Summarizer, req).await
    }

    async fn chat_stream(&self, _req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        Err(vco_domain::Error::Other("streaming is not used for summarization".into()))
    }

    async fn embeddings(&self, _req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        Err(vco_domain::Error::Other("embeddings are not used for summarization".into()))
    }

    fn capabilities(&self) -> &LlmCapabilities {
        &self.capabilities
    }

    fn provider_id(&self) -> &str {
        "router-summarizer"
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub connections: Arc<ConnectionManager>,
    pub llm: Arc<LlmRouter>,
    pub sessions: Arc<ConversationStore>,
    pub risk: Arc<RiskAssessor>,
    pub confirmations: Arc<ConfirmationGate>,
    pub executor: Arc<Executor>,
    pub planner: Arc<Planner>,
    pub tokens: Arc<FileTokenStore>,
    pub activity: Arc<ActivityLog>,
    /// Sessions with a plan currently in flight, so a second concurrent
    /// `process_query` for the same session is rejected rather than
    /// interleaved with the first.
    pub in_flight_sessions: Arc<Mutex<HashSet<SessionId>>>,
    api_token_hash: Option<[u8; 32]>,
}

impl AppState {
    pub fn build(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.server.state_dir).map_err(vco_domain::Error::Io)?;
        let state_dir = config.server.state_dir.clone();
        let config = Arc::new(config);

        let tokens = Arc::new(FileTokenStore::new(&state_dir)?);
        let connections = Arc::new(ConnectionManager::new(config.connections.clone(), tokens.clone()));

        let llm = Arc::new(LlmRouter::from_config(&config.llm)?);

        let summarizer = Arc::new(SummarizerProvider {
            router: llm.clone(),
            capabilities: LlmCapabilities {
                supports_tools: ToolSupport::None,
                supports_streaming: false,
                supports_json_mode: false,
                supports_vision: false,
                context_window_tokens: None,
                max_output_tokens: None,
            },
        });
        let sessions = Arc::new(ConversationStore::new(
            &state_dir,
            summarizer,
            config.sessions.idle_timeout_minutes,
            config.sessions.max_context_tokens,
            config.sessions.verbatim_turn_window,
            config.sessions.keep_last_turns_on_summarize,
        )?);

        let risk = Arc::new(RiskAssessor::new());
        let confirmations = Arc::new(ConfirmationGate::new(
            config.risk.confirmation_ttl_secs,
            config.risk.confirmation_tokens.clone(),
            config.risk.manual_approval_token.clone(),
        ));

        let executor = Arc::new(Executor::new(
            connections.clone(),
            risk.clone(),
            confirmations.clone(),
            config.executor.clone(),
        ));

        let planner = Arc::new(Planner::new(llm.clone()));

        let activity = Arc::new(ActivityLog::new(&state_dir)?);

        let api_token_hash = std::env::var("VOICE_ORCH_API_TOKEN")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|raw| Sha256::digest(raw.as_bytes()).into());

        Ok(Self {
            config,
            connections,
            llm,
            sessions,
            risk,
            confirmations,
            executor,
            planner,
            tokens,
            activity,
            in_flight_sessions: Arc::new(Mutex::new(HashSet::new())),
            api_token_hash,
        })
    }

    /// `None` means no token is configured and every request is accepted.
    /// Otherwise compares in constant time against the cached digest.
    pub fn api_token_matches(&self, presented: &str) -> bool {
        match &self.api_token_hash {
            None => true,
            Some(expected) => {
                let actual: [u8; 32] = Sha256::digest(presented.as_bytes()).into();
                expected.ct_eq(&actual).into()
            }
        }
    }

    pub fn requires_api_token(&self) -> bool {
        self.api_token_hash.is_some()
    }
}
