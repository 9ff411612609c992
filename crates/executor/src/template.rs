//! Template-reference resolution: `{{results[j].p.q[k].r}}` and
//! `{{_currentItem.p.q[k]}}` references inside a step's params.
//!
//! Resolution is whole-value, not string interpolation: a param value must
//! match the reference pattern exactly to be replaced. Any other string is
//! left alone. Missing intermediate keys resolve to `null`, not an error.

use std::collections::HashMap;

use serde_json::Value as Json;
use vco_domain::plan::StepResult;

enum TemplateRef<'a> {
    Results { index: usize, path: &'a str },
    CurrentItem { path: &'a str },
}

fn parse_template(s: &str) -> Option<TemplateRef<'_>> {
    let inner = s.strip_prefix("{{")?.strip_suffix("}}")?;
    if let Some(rest) = inner.strip_prefix("results[") {
        let close = rest.find(']')?;
        let index: usize = rest[..close].parse().ok()?;
        let path = rest[close + 1..].strip_prefix('.').unwrap_or(&rest[close + 1..]);
        Some(TemplateRef::Results { index, path })
    } else if let Some(rest) = inner.strip_prefix("_currentItem") {
        let path = rest.strip_prefix('.').unwrap_or(rest);
        Some(TemplateRef::CurrentItem { path })
    } else {
        None
    }
}

/// Walk dot/bracket path segments (`p.q[2].r`) over a JSON value. A missing
/// key or out-of-range index yields `null` and short-circuits the rest of
/// the path.
fn navigate(root: &Json, path: &str) -> Json {
    let mut current = root.clone();
    for segment in path.split('.') {
        if segment.is_empty() {
            continue;
        }
        let bracket_start = segment.find('[');
        let key = match bracket_start {
            Some(i) => &segment[..i],
            None => segment,
        };
        if !key.is_empty() {
            current = current.get(key).cloned().unwrap_or(Json::Null);
        }
        if let Some(start) = bracket_start {
            for index_part in segment[start..].split(']') {
                let index_part = index_part.trim_start_matches('[');
                if index_part.is_empty() {
                    continue;
                }
                current = match index_part.parse::<usize>() {
                    Ok(i) => current.get(i).cloned().unwrap_or(Json::Null),
                    Err(_) => Json::Null,
                };
            }
        }
        if current.is_null() {
            return Json::Null;
        }
    }
    current
}

/// Resolve a single JSON value, recursing into objects/arrays and replacing
/// any string that is entirely a template reference.
pub fn resolve_value(value: &Json, results: &[StepResult], current_item: Option<&Json>) -> Json {
    match value {
        Json::String(s) => match parse_template(s) {
            Some(TemplateRef::Results { index, path }) => match results.get(index) {
                Some(r) => {
                    let base = r.data.clone().unwrap_or(Json::Null);
                    if path.is_empty() {
                        base
                    } else {
                        navigate(&base, path)
                    }
                }
                None => Json::Null,
            },
            Some(TemplateRef::CurrentItem { path }) => match current_item {
                Some(item) if path.is_empty() => item.clone(),
                Some(item) => navigate(item, path),
                None => Json::Null,
            },
            None => value.clone(),
        },
        Json::Array(items) => Json::Array(
            items
                .iter()
                .map(|v| resolve_value(v, results, current_item))
                .collect(),
        ),
        Json::Object(map) => Json::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, results, current_item)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Resolve every param in a step's param map against the results collected
/// so far (and, inside an iteration, the current item).
pub fn resolve_params(
    params: &HashMap<String, Json>,
    results: &[StepResult],
    current_item: Option<&Json>,
) -> HashMap<String, Json> {
    params
        .iter()
        .map(|(k, v)| (k.clone(), resolve_value(v, results, current_item)))
        .collect()
}

/// Resolve an `iterateOver` reference to the array it should produce. A
/// reference that resolves to anything other than a JSON array yields an
/// empty iteration (the step is skipped, not treated as an error).
pub fn resolve_iteration_source(reference: &str, results: &[StepResult]) -> Vec<Json> {
    match resolve_value(&Json::String(reference.to_owned()), results, None) {
        Json::Array(items) => items,
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn results_fixture() -> Vec<StepResult> {
        vec![StepResult::ok(
            "calendar",
            "list_events",
            json!({"events": [{"id": "a1", "title": "Standup"}, {"id": "a2", "title": "Review"}]}),
            10,
        )]
    }

    #[test]
    fn resolves_whole_array_reference() {
        let results = results_fixture();
        let resolved = resolve_value(&json!("{{results[0].events}}"), &results, None);
        assert_eq!(resolved.as_array().unwrap().len(), 2);
    }

    #[test]
    fn resolves_nested_index_and_field() {
        let results = results_fixture();
        let resolved = resolve_value(&json!("{{results[0].events[1].title}}"), &results, None);
        assert_eq!(resolved, json!("Review"));
    }

    #[test]
    fn missing_index_resolves_to_null() {
        let results = results_fixture();
        let resolved = resolve_value(&json!("{{results[0].events[9].title}}"), &results, None);
        assert!(resolved.is_null());
    }

    #[test]
    fn unknown_step_index_resolves_to_null() {
        let results = results_fixture();
        let resolved = resolve_value(&json!("{{results[3].events}}"), &results, None);
        assert!(resolved.is_null());
    }

    #[test]
    fn non_template_strings_pass_through() {
        let results = results_fixture();
        let resolved = resolve_value(&json!("tomorrow"), &results, None);
        assert_eq!(resolved, json!("tomorrow"));
    }

    #[test]
    fn current_item_field_resolves_against_item() {
        let item = json!({"id": "a1", "title": "Standup"});
        let resolved = resolve_value(&json!("{{_currentItem.title}}"), &[], Some(&item));
        assert_eq!(resolved, json!("Standup"));
    }

    #[test]
    fn nested_params_resolve_recursively() {
        let results = results_fixture();
        let mut params = HashMap::new();
        params.insert("filter".to_string(), json!({"title": "{{results[0].events[0].title}}"}));
        let resolved = resolve_params(&params, &results, None);
        assert_eq!(resolved["filter"]["title"], json!("Standup"));
    }
}
