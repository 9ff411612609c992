/// Shared error type used across all voice-orchestrator crates.
///
/// Variants are the categories from the error taxonomy, not provider-specific
/// messages — callers match on the variant to decide retry/surface behavior.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    /// No token on file for (user, provider). Not retried.
    #[error("no token for provider '{provider}'; connect the service first")]
    AuthMissing { provider: String },

    /// Token expired and refresh failed (or no refresh token present). Not retried.
    #[error("token for provider '{provider}' expired; reconnect required")]
    AuthExpired { provider: String },

    /// Network failure, timeout, connection reset. Retried by the Connection
    /// Manager's health loop with exponential backoff.
    #[error("transport error talking to '{provider}': {message}")]
    TransportError { provider: String, message: String },

    /// Remote adapter returned 404 on a session header; caller must reinitialize.
    #[error("session evicted for provider '{provider}'")]
    SessionEvicted { provider: String },

    /// Adapter rejected parameters as malformed. Surfaced verbatim; no retry.
    #[error("bad argument: {0}")]
    BadArgument(String),

    /// Adapter-reported domain error (e.g. "event not found"). Surfaced verbatim; no retry.
    #[error("tool failure: {0}")]
    ToolFailure(String),

    /// LLM output failed to parse as JSON, or referenced an unknown service/tool.
    #[error("plan malformed: {0}")]
    PlanMalformed(String),

    /// The plan-wide execution deadline elapsed.
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// Step requires confirmation before it can run.
    #[error("confirmation required: {confirmation_id}")]
    ConfirmationRequired { confirmation_id: String },

    /// Step requires the literal `APPROVED` token before it can run.
    #[error("manual approval required: {confirmation_id}")]
    ManualApprovalRequired { confirmation_id: String },

    #[error("provider '{provider}' not connected")]
    NotConnected { provider: String },

    /// LLM call failed (non-2xx, malformed response, provider-side error body).
    #[error("LLM provider '{provider}' error: {message}")]
    Provider { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the Connection Manager's health loop should retry this error.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::TransportError { .. } | Error::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_is_retriable() {
        let err = Error::TransportError {
            provider: "calendar".into(),
            message: "connection reset".into(),
        };
        assert!(err.is_retriable());
    }

    #[test]
    fn auth_missing_is_not_retriable() {
        let err = Error::AuthMissing {
            provider: "calendar".into(),
        };
        assert!(!err.is_retriable());
    }

    #[test]
    fn display_messages_are_stable() {
        let err = Error::SessionEvicted {
            provider: "chat".into(),
        };
        assert_eq!(err.to_string(), "session evicted for provider 'chat'");
    }
}
