use anyhow::Context;
use serde_json::Value;

pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        // Remove Markdown fences (```json ... ``` or ``` ... ```).
        let mut inner = trimmed;
        if let Some(after_first) = inner.splitn(2, '\n').nth(1) {
            inner = after_first;
        }
        if let Some(end) = inner.rfind("```") {
            inner = &inner[..end];
        }
        return Some(inner.trim().to_string());
    }

    // Best-effort extraction: first '{' to last '}'.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].trim().to_string())
}

/// Decode a tool-call argument string into a JSON object. Some models wrap
/// arguments in fences or prose, and some send nothing for no-arg tools.
pub fn parse_tool_arguments(text: &str) -> anyhow::Result<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Value::Object(Default::default()));
    }

    let value = match serde_json::from_str::<Value>(trimmed) {
        Ok(v) => v,
        Err(_) => {
            let json_str = extract_json(trimmed).unwrap_or_else(|| trimmed.to_string());
            serde_json::from_str::<Value>(&json_str)
                .with_context(|| format!("tool arguments are not valid JSON: {json_str}"))?
        }
    };

    // Double-encoded: "{\"symbol\":\"AAPL\"}"
    let value = match value {
        Value::String(inner) => serde_json::from_str::<Value>(&inner)
            .with_context(|| format!("tool arguments string is not valid JSON: {inner}"))?,
        other => other,
    };

    anyhow::ensure!(value.is_object(), "tool arguments must be a JSON object, got: {value}");
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_json_handles_fenced_blocks() {
        let body = "{\"a\":1}";
        let fenced = format!("```json\n{body}\n```\n");
        assert_eq!(extract_json(&fenced), Some(body.to_string()));
    }

    #[test]
    fn extract_json_falls_back_to_braces() {
        let s = "prefix {\"a\":1} suffix";
        assert_eq!(extract_json(s), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn tool_arguments_accept_plain_objects() {
        let v = parse_tool_arguments(r#"{"symbol": "AAPL", "period": "6mo"}"#).unwrap();
        assert_eq!(v, json!({"symbol": "AAPL", "period": "6mo"}));
    }

    #[test]
    fn tool_arguments_strip_fences_and_prose() {
        let v = parse_tool_arguments("```json\n{\"symbol\": \"MSFT\"}\n```").unwrap();
        assert_eq!(v["symbol"], "MSFT");

        let v = parse_tool_arguments("Sure, here you go: {\"symbol\": \"MSFT\"}.").unwrap();
        assert_eq!(v["symbol"], "MSFT");
    }

    #[test]
    fn tool_arguments_empty_means_no_args() {
        assert_eq!(parse_tool_arguments("").unwrap(), json!({}));
        assert_eq!(parse_tool_arguments("  null ").unwrap(), json!({}));
    }

    #[test]
    fn tool_arguments_unwrap_double_encoding() {
        let v = parse_tool_arguments(r#""{\"symbol\":\"NVDA\"}""#).unwrap();
        assert_eq!(v, json!({"symbol": "NVDA"}));
    }

    #[test]
    fn tool_arguments_reject_non_objects() {
        assert!(parse_tool_arguments("[1, 2]").is_err());
        assert!(parse_tool_arguments("not json at all").is_err());
    }
}
