use crate::ids::Provider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tool parameter's JSON-compatible type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub required: bool,
    pub description: String,
}

/// The LLM-friendly flattened form of a tool's schema — a projection of the
/// richer JSON-Schema the adapter itself exposes over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSchema>,
}

/// Cache-line in the Tool Registry: one provider's discovered tools, with the
/// timestamp the discovery happened so the 5-minute TTL can be enforced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub provider: Provider,
    pub tools: Vec<ToolSchema>,
    pub discovered_at: DateTime<Utc>,
}

impl ProviderEntry {
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        self.discovered_at + ttl < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(discovered_at: DateTime<Utc>) -> ProviderEntry {
        ProviderEntry {
            provider: Provider::from("calendar"),
            tools: vec![],
            discovered_at,
        }
    }

    #[test]
    fn fresh_entry_is_not_stale() {
        let now = Utc::now();
        let e = entry(now);
        assert!(!e.is_stale(now, Duration::minutes(5)));
    }

    #[test]
    fn entry_past_ttl_is_stale() {
        let now = Utc::now();
        let e = entry(now - Duration::minutes(6));
        assert!(e.is_stale(now, Duration::minutes(5)));
    }

    #[test]
    fn entry_exactly_at_ttl_boundary_is_stale() {
        // discovered_at + ttl == now -> `< now` is false, so not stale; the
        // invariant is `discovered_at + TTL >= now`.
        let now = Utc::now();
        let e = entry(now - Duration::minutes(5));
        assert!(!e.is_stale(now, Duration::minutes(5)));
    }
}
