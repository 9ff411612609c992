use serde::{Deserialize, Serialize};

/// Confirmation Gate tuning. The risk rule table itself (which tool/verb
/// combinations map to which `RiskLevel`) is code, not config — this only
/// covers the timing and token literals around it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "d_confirmation_ttl_secs")]
    pub confirmation_ttl_secs: i64,
    #[serde(default = "d_confirmation_tokens")]
    pub confirmation_tokens: Vec<String>,
    #[serde(default = "d_manual_approval_token")]
    pub manual_approval_token: String,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            confirmation_ttl_secs: d_confirmation_ttl_secs(),
            confirmation_tokens: d_confirmation_tokens(),
            manual_approval_token: d_manual_approval_token(),
        }
    }
}

fn d_confirmation_ttl_secs() -> i64 {
    300
}
fn d_confirmation_tokens() -> Vec<String> {
    vec!["confirm".into(), "yes".into()]
}
fn d_manual_approval_token() -> String {
    "APPROVED".into()
}
