//! Adapter result unwrapping: MCP tool results carry their payload as a
//! text content block; this pulls the JSON out and normalizes the
//! `{success, data}` convention some adapters use.

use serde_json::Value as Json;
use vco_adapters::protocol::ToolCallResult;

/// Parse the tool's text payload and resolve it to either the step's data
/// or a failure message.
pub fn unwrap_tool_result(result: &ToolCallResult) -> Result<Json, String> {
    let text = result
        .content
        .iter()
        .find(|c| c.content_type == "text")
        .map(|c| c.text.as_str())
        .unwrap_or("");

    let parsed: Json = serde_json::from_str(text).unwrap_or_else(|_| Json::String(text.to_owned()));

    if result.is_error {
        let message = parsed
            .get("error")
            .and_then(Json::as_str)
            .map(str::to_owned)
            .or_else(|| parsed.as_str().map(str::to_owned))
            .unwrap_or_else(|| text.to_owned());
        return Err(message);
    }

    if let Json::Object(map) = &parsed {
        if let Some(success) = map.get("success").and_then(Json::as_bool) {
            if !success {
                let message = map
                    .get("error")
                    .and_then(Json::as_str)
                    .unwrap_or("tool reported failure")
                    .to_owned();
                return Err(message);
            }
            return Ok(map.get("data").cloned().unwrap_or(Json::Null));
        }
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vco_adapters::protocol::ToolCallContent;

    fn result_with(text: &str, is_error: bool) -> ToolCallResult {
        ToolCallResult {
            content: vec![ToolCallContent { content_type: "text".to_string(), text: text.to_string() }],
            is_error,
        }
    }

    #[test]
    fn unwraps_success_envelope() {
        let result = result_with(r#"{"success": true, "data": {"id": "evt-1"}}"#, false);
        let data = unwrap_tool_result(&result).unwrap();
        assert_eq!(data["id"], "evt-1");
    }

    #[test]
    fn success_false_is_an_error() {
        let result = result_with(r#"{"success": false, "error": "event not found"}"#, false);
        let err = unwrap_tool_result(&result).unwrap_err();
        assert_eq!(err, "event not found");
    }

    #[test]
    fn is_error_flag_takes_precedence() {
        let result = result_with(r#"{"error": "bad argument"}"#, true);
        let err = unwrap_tool_result(&result).unwrap_err();
        assert_eq!(err, "bad argument");
    }

    #[test]
    fn raw_payloads_without_envelope_pass_through() {
        let result = result_with(r#"{"events": []}"#, false);
        let data = unwrap_tool_result(&result).unwrap();
        assert_eq!(data["events"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn non_json_text_becomes_a_string_value() {
        let result = result_with("ok", false);
        let data = unwrap_tool_result(&result).unwrap();
        assert_eq!(data, Json::String("ok".to_string()));
    }
}
