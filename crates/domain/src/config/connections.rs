use crate::connection::Transport;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One configured MCP provider the Connection Manager can open a handle to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConnectionConfig {
    pub id: String,
    pub transport: Transport,
    /// Local transport: command to spawn.
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Remote transport: base URL of the MCP HTTP endpoint.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionsConfig {
    #[serde(default)]
    pub providers: Vec<ProviderConnectionConfig>,
    #[serde(default = "d_health_check_secs")]
    pub health_check_interval_secs: u64,
    #[serde(default = "d_reconnect_base_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "d_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,
}

impl Default for ConnectionsConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            health_check_interval_secs: d_health_check_secs(),
            reconnect_base_delay_ms: d_reconnect_base_ms(),
            reconnect_max_attempts: d_reconnect_max_attempts(),
        }
    }
}

fn d_health_check_secs() -> u64 {
    30
}
fn d_reconnect_base_ms() -> u64 {
    1_000
}
fn d_reconnect_max_attempts() -> u32 {
    3
}
