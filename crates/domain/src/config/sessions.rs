use serde::{Deserialize, Serialize};

/// Conversation Store tuning: idle timeout and the token-budgeted context
/// window handed to the planner/summarizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "d_idle_timeout_minutes")]
    pub idle_timeout_minutes: i64,
    #[serde(default = "d_max_context_tokens")]
    pub max_context_tokens: u32,
    #[serde(default = "d_verbatim_turn_window")]
    pub verbatim_turn_window: u32,
    #[serde(default = "d_keep_last_turns_on_summarize")]
    pub keep_last_turns_on_summarize: u32,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_minutes: d_idle_timeout_minutes(),
            max_context_tokens: d_max_context_tokens(),
            verbatim_turn_window: d_verbatim_turn_window(),
            keep_last_turns_on_summarize: d_keep_last_turns_on_summarize(),
        }
    }
}

fn d_idle_timeout_minutes() -> i64 {
    15
}
fn d_max_context_tokens() -> u32 {
    2_500
}
fn d_verbatim_turn_window() -> u32 {
    15
}
fn d_keep_last_turns_on_summarize() -> u32 {
    5
}
