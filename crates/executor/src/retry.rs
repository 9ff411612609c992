//! Smart retry: a single broadened re-issue of a list/search call that came
//! back empty, when the conversation suggests the item should exist.

use std::collections::HashMap;

use serde_json::Value as Json;

const LIST_VERBS: &[&str] = &["list", "search", "find", "get"];
const RECENT_ITEM_MARKERS: &[&str] = &["created", "scheduled", "added", "found", "just made"];

fn action_verb(tool: &str) -> &str {
    tool.split(|c| c == '_' || c == '.').next().unwrap_or(tool)
}

/// Whether `tool` is a list/search-shaped call eligible for smart retry.
pub fn is_retriable_lookup(tool: &str) -> bool {
    LIST_VERBS.contains(&action_verb(tool))
}

/// Whether the conversation context hints the caller expects the item to
/// already exist (e.g. "the meeting you just created").
pub fn context_suggests_recent_item(context: &str) -> bool {
    let lower = context.to_lowercase();
    RECENT_ITEM_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Count the items in a known list-result shape. `None` when the shape
/// isn't recognized as a list result at all (so retry logic is skipped
/// rather than guessing).
pub fn list_item_count(data: &Json) -> Option<usize> {
    match data {
        Json::Array(items) => Some(items.len()),
        Json::Object(map) => {
            for key in ["events", "items", "results", "messages", "issues", "contacts"] {
                if let Some(Json::Array(items)) = map.get(key) {
                    return Some(items.len());
                }
            }
            None
        }
        _ => None,
    }
}

/// Broaden `timeMin`/`timeMax` in place if present. Returns whether
/// anything was actually widened (so the caller can skip a pointless
/// re-issue otherwise).
pub fn broaden_time_window(params: &mut HashMap<String, Json>) -> bool {
    let mut broadened = false;
    if params.contains_key("timeMin") {
        params.insert("timeMin".to_string(), Json::String("today".to_string()));
        broadened = true;
    }
    if params.contains_key("timeMax") {
        params.insert("timeMax".to_string(), Json::String("in 7 days".to_string()));
        broadened = true;
    }
    broadened
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_and_search_verbs_are_retriable() {
        assert!(is_retriable_lookup("list_events"));
        assert!(is_retriable_lookup("search_messages"));
        assert!(!is_retriable_lookup("delete_event"));
    }

    #[test]
    fn recent_item_markers_are_detected_case_insensitively() {
        assert!(context_suggests_recent_item("The meeting you JUST CREATED starts at 3pm"));
        assert!(!context_suggests_recent_item("What's on my calendar today"));
    }

    #[test]
    fn counts_items_in_known_list_shapes() {
        assert_eq!(list_item_count(&json!([1, 2, 3])), Some(3));
        assert_eq!(list_item_count(&json!({"events": []})), Some(0));
        assert_eq!(list_item_count(&json!({"unrelated": "shape"})), None);
    }

    #[test]
    fn broadening_only_touches_present_keys() {
        let mut params = HashMap::new();
        params.insert("timeMin".to_string(), json!("tomorrow"));
        assert!(broaden_time_window(&mut params));
        assert_eq!(params["timeMin"], json!("today"));
        assert!(!params.contains_key("timeMax"));
    }

    #[test]
    fn no_time_keys_means_nothing_to_broaden() {
        let mut params = HashMap::new();
        params.insert("query".to_string(), json!("standup"));
        assert!(!broaden_time_window(&mut params));
    }
}
