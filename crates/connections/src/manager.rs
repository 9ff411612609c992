//! Single source of truth for "is user U's provider P usable?" — the
//! per-`(UserId, Provider)` handle map, on-demand connect, and the
//! health-ticker/reconnect loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{info, warn};

use vco_adapters::protocol::{McpToolDef, ToolCallResult};
use vco_adapters::{call_tool as adapter_call_tool, discover_tools, open_transport, AdapterError, TransportError};
use vco_domain::config::{ConnectionsConfig, ProviderConnectionConfig};
use vco_domain::connection::ConnectionState;
use vco_domain::ids::{Provider, UserId};
use vco_domain::registry::{ParamSchema, ParamType, ProviderEntry, ToolSchema};
use vco_domain::token::TokenStore;
use vco_domain::{Error, Result};

use crate::handle::ConnectionHandle;

/// `base * 2^(attempt-1)`.
fn backoff_delay(base: StdDuration, attempt: u32) -> StdDuration {
    base.saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
}

pub struct ConnectionManager {
    handles: RwLock<HashMap<(UserId, Provider), Arc<ConnectionHandle>>>,
    tokens: Arc<dyn TokenStore>,
    provider_configs: HashMap<String, ProviderConnectionConfig>,
    config: ConnectionsConfig,
}

impl ConnectionManager {
    pub fn new(config: ConnectionsConfig, tokens: Arc<dyn TokenStore>) -> Self {
        let provider_configs = config.providers.iter().map(|p| (p.id.clone(), p.clone())).collect();
        Self {
            handles: RwLock::new(HashMap::new()),
            tokens,
            provider_configs,
            config,
        }
    }

    fn handle_or_create(self: &Arc<Self>, user: &UserId, provider: &Provider) -> Arc<ConnectionHandle> {
        let key = (user.clone(), provider.clone());
        if let Some(h) = self.handles.read().get(&key) {
            return h.clone();
        }
        let mut handles = self.handles.write();
        handles
            .entry(key)
            .or_insert_with(|| {
                let kind = self
                    .provider_configs
                    .get(provider.as_ref())
                    .map(|c| c.transport)
                    .unwrap_or(vco_domain::connection::Transport::Local);
                Arc::new(ConnectionHandle::new(user.clone(), provider.clone(), kind))
            })
            .clone()
    }

    pub fn get_handle(&self, user: &UserId, provider: &Provider) -> Option<Arc<ConnectionHandle>> {
        self.handles.read().get(&(user.clone(), provider.clone())).cloned()
    }

    pub fn is_connected(&self, user: &UserId, provider: &Provider) -> bool {
        self.get_handle(user, provider).map(|h| h.is_connected()).unwrap_or(false)
    }

    /// `Connect(user, provider)`. Builds the adapter, discovers tools,
    /// starts the health ticker, and caches the result on the handle.
    pub async fn connect(self: &Arc<Self>, user: &UserId, provider: &Provider) -> Result<Vec<ToolSchema>> {
        let handle = self.handle_or_create(user, provider);
        self.connect_handle(&handle).await?;
        self.ensure_ticker(&handle);
        Ok(handle.tools().map(|e| e.tools).unwrap_or_default())
    }

    async fn connect_handle(&self, handle: &Arc<ConnectionHandle>) -> Result<()> {
        handle.set_state(ConnectionState::Connecting);

        let provider_config = self
            .provider_configs
            .get(handle.provider.as_ref())
            .ok_or_else(|| Error::Config(format!("no connection config for provider '{}'", handle.provider)))?
            .clone();

        let token = self
            .tokens
            .get(&handle.user, &handle.provider)
            .await
            .ok_or_else(|| Error::AuthMissing { provider: handle.provider.to_string() })?;

        if token.is_expired(Utc::now()) {
            return Err(Error::AuthExpired { provider: handle.provider.to_string() });
        }

        let access_token = token
            .access_token()
            .map_err(|e| Error::Other(format!("token for '{}' is not valid utf-8: {e}", handle.provider)))?;

        let effective_config = match provider_config.transport {
            vco_domain::connection::Transport::Local => {
                let mut cfg = provider_config.clone();
                cfg.env.insert("MCP_ACCESS_TOKEN".into(), access_token.clone());
                cfg
            }
            vco_domain::connection::Transport::Remote => provider_config.clone(),
        };

        let transport = open_transport(&effective_config, Some(access_token.as_str())).await.map_err(|e| {
            let err: Error = e.into();
            handle.mark_error(err.to_string());
            err
        })?;
        let transport: Arc<dyn vco_adapters::McpTransport> = Arc::from(transport);

        let discovered = discover_tools(transport.as_ref()).await.map_err(|e| {
            let err: Error = e.into();
            handle.mark_error(err.to_string());
            err
        })?;

        handle.set_transport(transport);
        handle.set_tools(ProviderEntry {
            provider: handle.provider.clone(),
            tools: discovered.tools.iter().map(to_tool_schema).collect(),
            discovered_at: Utc::now(),
        });
        handle.mark_healthy(Utc::now());
        info!(user = %handle.user, provider = %handle.provider, "connected");
        Ok(())
    }

    /// `Disconnect(user, provider)`.
    pub async fn disconnect(&self, user: &UserId, provider: &Provider) {
        let key = (user.clone(), provider.clone());
        let handle = self.handles.write().remove(&key);
        if let Some(handle) = handle {
            if let Some(abort) = handle.ticker.lock().take() {
                abort.abort();
            }
            if let Some(transport) = handle.take_transport() {
                transport.shutdown().await;
            }
            handle.set_state(ConnectionState::Closed);
        }
    }

    /// `CallTool(user, provider, name, args)`. Connects on demand if the
    /// handle is absent or not currently usable; retries once in place on
    /// a `SessionNotFound` (HTTP 404) error, per the forced
    /// disconnect-then-connect rule.
    pub async fn call_tool(
        self: &Arc<Self>,
        user: &UserId,
        provider: &Provider,
        name: &str,
        args: Value,
    ) -> Result<ToolCallResult> {
        let handle = self.handle_or_create(user, provider);
        if !handle.is_connected() {
            self.connect_handle(&handle).await?;
            self.ensure_ticker(&handle);
        }

        let Some(transport) = handle.transport() else {
            return Err(Error::NotConnected { provider: provider.to_string() });
        };

        match adapter_call_tool(transport.as_ref(), name, args.clone()).await {
            Ok(result) => Ok(result),
            Err(AdapterError::Transport(TransportError::SessionNotFound)) => {
                warn!(user = %user, provider = %provider, "session evicted, reinitializing");
                self.connect_handle(&handle).await?;
                let transport = handle
                    .transport()
                    .ok_or_else(|| Error::NotConnected { provider: provider.to_string() })?;
                adapter_call_tool(transport.as_ref(), name, args).await.map_err(Into::into)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn ensure_ticker(self: &Arc<Self>, handle: &Arc<ConnectionHandle>) {
        let mut slot = handle.ticker.lock();
        if slot.is_some() {
            return;
        }
        let manager = self.clone();
        let handle = handle.clone();
        let interval = StdDuration::from_secs(self.config.health_check_interval_secs);
        let join = tokio::spawn(async move { manager.health_tick_loop(handle, interval).await });
        *slot = Some(join.abort_handle());
    }

    async fn health_tick_loop(self: Arc<Self>, handle: Arc<ConnectionHandle>, interval: StdDuration) {
        let base_delay = StdDuration::from_millis(self.config.reconnect_base_delay_ms);
        let max_attempts = self.config.reconnect_max_attempts;
        loop {
            tokio::time::sleep(interval).await;

            if handle.is_connected() {
                match self.ping(&handle).await {
                    Ok(()) => handle.mark_healthy(Utc::now()),
                    Err(e) => {
                        warn!(user = %handle.user, provider = %handle.provider, error = %e, "health check failed");
                        handle.mark_error(e.to_string());
                    }
                }
                continue;
            }

            if handle.state() == ConnectionState::Closed {
                return;
            }

            if handle.backoff_attempt() >= max_attempts {
                // Stays `error`; only an explicit `CallTool` retries from here.
                continue;
            }
            let attempt = handle.next_backoff_attempt();
            tokio::time::sleep(backoff_delay(base_delay, attempt)).await;
            if let Err(e) = self.connect_handle(&handle).await {
                warn!(user = %handle.user, provider = %handle.provider, attempt, error = %e, "reconnect failed");
            }
        }
    }

    /// Liveness probe. The transport contract has no dedicated `ping`
    /// method, so this reuses `tools/list`, which doubles as a cache
    /// refresh on success.
    async fn ping(&self, handle: &Arc<ConnectionHandle>) -> Result<()> {
        let transport = handle.transport().ok_or_else(|| Error::NotConnected { provider: handle.provider.to_string() })?;
        let discovered = discover_tools(transport.as_ref()).await?;
        handle.set_tools(ProviderEntry {
            provider: handle.provider.clone(),
            tools: discovered.tools.iter().map(to_tool_schema).collect(),
            discovered_at: Utc::now(),
        });
        Ok(())
    }
}

fn to_tool_schema(def: &McpToolDef) -> ToolSchema {
    let params = def
        .input_schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            let required: Vec<&str> = def
                .input_schema
                .get("required")
                .and_then(Value::as_array)
                .map(|r| r.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            props
                .iter()
                .map(|(name, schema)| ParamSchema {
                    name: name.clone(),
                    param_type: json_schema_type(schema),
                    required: required.contains(&name.as_str()),
                    description: schema.get("description").and_then(Value::as_str).unwrap_or_default().to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    ToolSchema { name: def.name.clone(), description: def.description.clone(), params }
}

fn json_schema_type(schema: &Value) -> ParamType {
    match schema.get("type").and_then(Value::as_str) {
        Some("number") | Some("integer") => ParamType::Number,
        Some("boolean") => ParamType::Boolean,
        Some("array") => ParamType::Array,
        Some("object") => ParamType::Object,
        _ => ParamType::String,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delay_doubles_per_attempt() {
        let base = StdDuration::from_secs(1);
        assert_eq!(backoff_delay(base, 1), StdDuration::from_secs(1));
        assert_eq!(backoff_delay(base, 2), StdDuration::from_secs(2));
        assert_eq!(backoff_delay(base, 3), StdDuration::from_secs(4));
    }

    #[test]
    fn json_schema_type_maps_known_types() {
        assert_eq!(json_schema_type(&serde_json::json!({"type": "integer"})), ParamType::Number);
        assert_eq!(json_schema_type(&serde_json::json!({"type": "boolean"})), ParamType::Boolean);
        assert_eq!(json_schema_type(&serde_json::json!({})), ParamType::String);
    }

    #[test]
    fn to_tool_schema_reads_required_and_description() {
        let def = McpToolDef {
            name: "create_event".into(),
            description: "creates a calendar event".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string", "description": "event title"},
                    "attendees": {"type": "array"}
                },
                "required": ["title"]
            }),
        };
        let schema = to_tool_schema(&def);
        assert_eq!(schema.params.len(), 2);
        let title = schema.params.iter().find(|p| p.name == "title").unwrap();
        assert!(title.required);
        assert_eq!(title.description, "event title");
        let attendees = schema.params.iter().find(|p| p.name == "attendees").unwrap();
        assert!(!attendees.required);
        assert_eq!(attendees.param_type, ParamType::Array);
    }
}
