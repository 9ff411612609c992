//! Risk assessment: maps a plan step's tool name and arguments to the
//! `RiskLevel` that gates its execution.

use std::collections::HashMap;

use regex::RegexSet;
use serde_json::Value as Json;
use vco_domain::risk::RiskLevel;

/// Everything the rule table needs to know about one step.
pub struct RiskContext<'a> {
    /// The tool name as it appears in the plan (e.g. `"delete_event"`).
    pub tool: &'a str,
    pub params: &'a HashMap<String, Json>,
    /// The original user query text, for fan-out phrase detection.
    pub query_text: &'a str,
}

const SAFE_VERBS: &[&str] = &["list", "get", "read", "view", "search", "find"];
const LOW_VERBS: &[&str] = &["create", "add", "new", "post", "send", "schedule"];
const MEDIUM_VERBS: &[&str] = &["update", "edit", "modify", "change", "move", "rename"];
const DESTRUCTIVE_VERBS: &[&str] = &["delete", "remove", "cancel", "clear", "purge", "wipe"];
const NOTIFICATION_VERBS: &[&str] = &["send", "post", "message", "email"];
const FAN_OUT_WORDS: &[&str] = &["all", "every", "bulk", "multiple"];

/// Extract the leading action verb from a tool name, e.g.
/// `delete_event` -> `delete`, `chat.send_message` -> `chat`.
///
/// Per the rule table, the tool is split on `_`/`.` and the first token is
/// taken as the verb.
fn action_verb(tool: &str) -> &str {
    tool.split(|c| c == '_' || c == '.').next().unwrap_or(tool)
}

/// Outcome of risk assessment, including the `destructive` flag the
/// confirmation gate surfaces back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    pub level: RiskLevel,
    pub destructive: bool,
}

pub struct RiskAssessor {
    secret_patterns: RegexSet,
}

impl RiskAssessor {
    /// Precompile the secret-material patterns once at startup, mirroring
    /// this codebase's habit of building its regex denylists up front
    /// rather than per call.
    pub fn new() -> Self {
        let secret_patterns = RegexSet::new([
            r"[A-Za-z0-9]{32,}",
            r"\b\d{13,16}\b",
            r"(?i)password",
        ])
        .expect("secret-material patterns are fixed and known to compile");

        Self { secret_patterns }
    }

    /// Evaluate the ordered rule table against a step, taking the maximum
    /// contribution across all matching signals.
    pub fn assess(&self, ctx: &RiskContext<'_>) -> Assessment {
        let mut level = RiskLevel::Safe;
        let mut destructive = false;

        let verb = action_verb(ctx.tool);

        if SAFE_VERBS.contains(&verb) {
            level = level.max(RiskLevel::Safe);
        }
        if LOW_VERBS.contains(&verb) {
            level = level.max(RiskLevel::Low);
        }
        if MEDIUM_VERBS.contains(&verb) {
            level = level.max(RiskLevel::Medium);
        }
        if DESTRUCTIVE_VERBS.contains(&verb) {
            level = level.max(RiskLevel::Medium);
            destructive = true;
        }

        let query_lower = ctx.query_text.to_lowercase();
        if FAN_OUT_WORDS.iter().any(|w| query_lower.contains(w)) {
            level = level.max(RiskLevel::High);
        }

        if self.exceeds_fan_out_threshold(ctx.params) {
            level = level.max(RiskLevel::High);
        }

        if self.targets_external_notification(verb, ctx.params) {
            level = level.max(RiskLevel::Low);
        }

        if self.contains_secret_material(ctx.params) {
            level = level.max(RiskLevel::Medium);
        }

        Assessment { level, destructive }
    }

    fn exceeds_fan_out_threshold(&self, params: &HashMap<String, Json>) -> bool {
        if let Some(count) = params.get("count").and_then(Json::as_i64) {
            if count > 5 {
                return true;
            }
        }
        if let Some(ids) = params.get("ids").and_then(Json::as_array) {
            if ids.len() > 5 {
                return true;
            }
        }
        false
    }

    fn targets_external_notification(&self, verb: &str, params: &HashMap<String, Json>) -> bool {
        if NOTIFICATION_VERBS.contains(&verb) {
            return true;
        }
        params.contains_key("attendees") || params.contains_key("recipients")
    }

    fn contains_secret_material(&self, params: &HashMap<String, Json>) -> bool {
        params.values().any(|v| self.value_matches_secret(v))
    }

    fn value_matches_secret(&self, value: &Json) -> bool {
        match value {
            Json::String(s) => self.secret_patterns.is_match(s),
            Json::Array(items) => items.iter().any(|v| self.value_matches_secret(v)),
            Json::Object(map) => map.values().any(|v| self.value_matches_secret(v)),
            _ => false,
        }
    }
}

impl Default for RiskAssessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx<'a>(
        tool: &'a str,
        params: &'a HashMap<String, Json>,
        query_text: &'a str,
    ) -> RiskContext<'a> {
        RiskContext { tool, params, query_text }
    }

    #[test]
    fn read_verbs_are_safe() {
        let assessor = RiskAssessor::new();
        let params = HashMap::new();
        let a = assessor.assess(&ctx("list_events", &params, "what's on my calendar"));
        assert_eq!(a.level, RiskLevel::Safe);
        assert!(!a.destructive);
    }

    #[test]
    fn create_verbs_are_low() {
        let assessor = RiskAssessor::new();
        let params = HashMap::new();
        let a = assessor.assess(&ctx("create_event", &params, "schedule a meeting"));
        assert_eq!(a.level, RiskLevel::Low);
    }

    #[test]
    fn delete_verbs_are_medium_and_destructive() {
        let assessor = RiskAssessor::new();
        let params = HashMap::new();
        let a = assessor.assess(&ctx("delete_event", &params, "cancel my 3pm"));
        assert_eq!(a.level, RiskLevel::Medium);
        assert!(a.destructive);
    }

    #[test]
    fn fan_out_phrase_in_query_is_high() {
        let assessor = RiskAssessor::new();
        let params = HashMap::new();
        let a = assessor.assess(&ctx("delete_event", &params, "delete all my meetings today"));
        assert_eq!(a.level, RiskLevel::High);
    }

    #[test]
    fn large_ids_array_is_high() {
        let assessor = RiskAssessor::new();
        let mut params = HashMap::new();
        params.insert("ids".to_string(), json!(["1", "2", "3", "4", "5", "6"]));
        let a = assessor.assess(&ctx("update_event", &params, "update these events"));
        assert_eq!(a.level, RiskLevel::High);
    }

    #[test]
    fn count_over_five_is_high() {
        let assessor = RiskAssessor::new();
        let mut params = HashMap::new();
        params.insert("count".to_string(), json!(10));
        let a = assessor.assess(&ctx("get_messages", &params, "get my last messages"));
        assert_eq!(a.level, RiskLevel::High);
    }

    #[test]
    fn attendees_param_is_at_least_low() {
        let assessor = RiskAssessor::new();
        let mut params = HashMap::new();
        params.insert("attendees".to_string(), json!(["a@example.com"]));
        let a = assessor.assess(&ctx("create_event", &params, "invite alice"));
        assert_eq!(a.level, RiskLevel::Low);
    }

    #[test]
    fn secret_like_value_is_at_least_medium() {
        let assessor = RiskAssessor::new();
        let mut params = HashMap::new();
        params.insert(
            "body".to_string(),
            json!("token: abcdefghijklmnopqrstuvwxyz012345"),
        );
        let a = assessor.assess(&ctx("send_message", &params, "post this"));
        assert_eq!(a.level, RiskLevel::Medium);
    }

    #[test]
    fn password_mention_is_at_least_medium() {
        let assessor = RiskAssessor::new();
        let mut params = HashMap::new();
        params.insert("body".to_string(), json!("my password is hunter2"));
        let a = assessor.assess(&ctx("create_event", &params, "note it down"));
        assert_eq!(a.level, RiskLevel::Medium);
    }

    #[test]
    fn unknown_verb_defaults_to_safe() {
        let assessor = RiskAssessor::new();
        let params = HashMap::new();
        let a = assessor.assess(&ctx("ping", &params, "ping the server"));
        assert_eq!(a.level, RiskLevel::Safe);
    }
}
