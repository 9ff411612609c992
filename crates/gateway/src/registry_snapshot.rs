//! Builds the compact `provider -> tools` JSON snapshot handed to the
//! Planner's Stage B and returned from `GET /voice/capabilities`. Ensures
//! each configured provider has a live handle (connecting on demand) so the
//! snapshot reflects what's actually callable, not just what's configured.

use std::sync::Arc;

use serde_json::{json, Value as Json};
use vco_connections::ConnectionManager;
use vco_domain::config::ConnectionsConfig;
use vco_domain::ids::{Provider, UserId};
use vco_domain::registry::ToolSchema;

fn tool_to_json(tool: &ToolSchema) -> Json {
    json!({
        "name": tool.name,
        "description": tool.description,
        "params": tool.params.iter().map(|p| json!({
            "name": p.name,
            "type": p.param_type,
            "required": p.required,
            "description": p.description,
        })).collect::<Vec<_>>(),
    })
}

/// Snapshot for one user across every configured provider, plus the count
/// of providers that are actually connected (used for the zero-providers
/// clarification check).
pub async fn build(
    connections: &Arc<ConnectionManager>,
    config: &ConnectionsConfig,
    user: &UserId,
) -> (Json, usize) {
    let mut snapshot = serde_json::Map::new();
    let mut connected = 0usize;

    for provider_config in &config.providers {
        let provider = Provider::from(provider_config.id.as_str());

        if !connections.is_connected(user, &provider) {
            if let Err(e) = connections.connect(user, &provider).await {
                tracing::debug!(provider = %provider, error = %e, "provider unavailable for registry snapshot");
                continue;
            }
        }

        let Some(handle) = connections.get_handle(user, &provider) else { continue };
        let Some(entry) = handle.tools() else { continue };

        connected += 1;
        let tools: Vec<Json> = entry.tools.iter().map(tool_to_json).collect();
        snapshot.insert(provider.0.clone(), Json::Array(tools));
    }

    (Json::Object(snapshot), connected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_to_json_carries_param_shape() {
        let tool = ToolSchema {
            name: "create_event".into(),
            description: "Create a calendar event".into(),
            params: vec![vco_domain::registry::ParamSchema {
                name: "summary".into(),
                param_type: vco_domain::registry::ParamType::String,
                required: true,
                description: "Event title".into(),
            }],
        };
        let json = tool_to_json(&tool);
        assert_eq!(json["name"], "create_event");
        assert_eq!(json["params"][0]["required"], true);
    }
}
