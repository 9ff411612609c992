//! Factory for opening an MCP transport from a provider's connection
//! config. The Connection Manager (in `vco-connections`) owns the
//! per-`(UserId, Provider)` lifecycle; this module only knows how to
//! stand up one transport given one config and one access token.

use crate::protocol::{self, ToolCallResult, ToolsListResult};
use crate::transport::{McpTransport, SseTransport, StdioTransport, TransportError};
use serde_json::Value;
use vco_domain::config::ProviderConnectionConfig;
use vco_domain::connection::Transport;

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("MCP transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("MCP protocol error: {0}")]
    Protocol(String),
}

impl From<AdapterError> for vco_domain::Error {
    fn from(e: AdapterError) -> Self {
        vco_domain::Error::TransportError { provider: String::new(), message: e.to_string() }
    }
}

/// Open a transport for the given provider config, perform the MCP
/// handshake (`initialize` + `notifications/initialized`), and return it
/// boxed behind the shared trait object.
pub async fn open_transport(
    config: &ProviderConnectionConfig,
    access_token: Option<&str>,
) -> Result<Box<dyn McpTransport>, AdapterError> {
    match config.transport {
        Transport::Local => {
            let transport = StdioTransport::spawn(config)?;
            handshake_local(&transport).await?;
            Ok(Box::new(transport))
        }
        Transport::Remote => {
            let url = config.url.clone().ok_or_else(|| AdapterError::Protocol("remote transport requires url".into()))?;
            let token = access_token.ok_or_else(|| AdapterError::Protocol("remote transport requires an access token".into()))?;
            let transport = SseTransport::new(url, token);
            transport.connect().await?;
            Ok(Box::new(transport))
        }
    }
}

async fn handshake_local(transport: &StdioTransport) -> Result<(), AdapterError> {
    let init_params = protocol::initialize_params();
    let params_value = serde_json::to_value(&init_params)
        .map_err(|e| AdapterError::Protocol(format!("failed to serialize initialize params: {e}")))?;

    let resp = transport.send_request("initialize", Some(params_value)).await?;
    if resp.is_error() {
        let err = resp.error.unwrap();
        return Err(AdapterError::Protocol(format!("initialize failed: {err}")));
    }
    transport.send_notification("notifications/initialized").await?;
    Ok(())
}

/// Discover tools on an already-initialized transport.
pub async fn discover_tools(transport: &dyn McpTransport) -> Result<ToolsListResult, AdapterError> {
    let resp = transport.send_request("tools/list", None).await?;
    if resp.is_error() {
        return Err(AdapterError::Protocol(format!("tools/list failed: {}", resp.error.unwrap())));
    }
    let result_value = resp.result.unwrap_or(Value::Null);
    serde_json::from_value(result_value).map_err(|e| AdapterError::Protocol(format!("failed to parse tools/list result: {e}")))
}

/// Call a tool on an already-initialized transport.
pub async fn call_tool(transport: &dyn McpTransport, tool_name: &str, arguments: Value) -> Result<ToolCallResult, AdapterError> {
    let params = serde_json::json!({ "name": tool_name, "arguments": arguments });
    let resp = transport.send_request("tools/call", Some(params)).await?;
    if resp.is_error() {
        return Err(AdapterError::Protocol(format!("tools/call failed: {}", resp.error.unwrap())));
    }
    let result_value = resp.result.unwrap_or(Value::Null);
    serde_json::from_value(result_value).map_err(|e| AdapterError::Protocol(format!("failed to parse tools/call result: {e}")))
}
