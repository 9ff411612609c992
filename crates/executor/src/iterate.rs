//! Per-item param construction for an iterated step.

use std::collections::HashMap;

use serde_json::Value as Json;

/// Build the effective params for one iteration item: item fields first,
/// then base params override them, then `id` is aliased to `eventId` if the
/// item carries an `id` and the effective params don't already have one.
pub fn effective_params(base: &HashMap<String, Json>, item: &Json) -> HashMap<String, Json> {
    let mut merged: HashMap<String, Json> = HashMap::new();

    if let Json::Object(fields) = item {
        for (k, v) in fields {
            merged.insert(k.clone(), v.clone());
        }
    }
    for (k, v) in base {
        merged.insert(k.clone(), v.clone());
    }

    if let Json::Object(fields) = item {
        if let Some(id) = fields.get("id") {
            merged.entry("eventId".to_string()).or_insert_with(|| id.clone());
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn item_fields_fill_in_around_base_params() {
        let mut base = HashMap::new();
        base.insert("calendarId".to_string(), json!("primary"));
        let item = json!({"id": "evt-1", "title": "Standup"});

        let merged = effective_params(&base, &item);
        assert_eq!(merged["calendarId"], json!("primary"));
        assert_eq!(merged["title"], json!("Standup"));
        assert_eq!(merged["eventId"], json!("evt-1"));
    }

    #[test]
    fn base_params_override_item_fields_of_the_same_name() {
        let mut base = HashMap::new();
        base.insert("title".to_string(), json!("Renamed"));
        let item = json!({"id": "evt-1", "title": "Standup"});

        let merged = effective_params(&base, &item);
        assert_eq!(merged["title"], json!("Renamed"));
    }

    #[test]
    fn existing_event_id_is_not_overwritten_by_alias() {
        let mut base = HashMap::new();
        base.insert("eventId".to_string(), json!("explicit-id"));
        let item = json!({"id": "evt-1"});

        let merged = effective_params(&base, &item);
        assert_eq!(merged["eventId"], json!("explicit-id"));
    }

    #[test]
    fn non_object_item_contributes_nothing() {
        let base = HashMap::new();
        let item = json!("evt-1");

        let merged = effective_params(&base, &item);
        assert!(merged.is_empty());
    }
}
