use serde::{Deserialize, Serialize};

/// Wire transport a provider's MCP server is reached over. Chosen once at
/// provider registration time, not per-call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Local,
    Remote,
}

/// State machine of a single `(UserId, Provider)` connection handle, owned
/// by the Connection Manager. `Error` and `Closed` are terminal until a
/// caller explicitly reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Error,
    Closed,
}

impl ConnectionState {
    pub fn is_usable(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connected_is_usable() {
        assert!(ConnectionState::Connected.is_usable());
        assert!(!ConnectionState::Connecting.is_usable());
        assert!(!ConnectionState::Error.is_usable());
        assert!(!ConnectionState::Closed.is_usable());
    }
}
