//! Recovering structured output from noisy model responses.
//!
//! Even with `response_format` set, LLM endpoints sometimes wrap their JSON in
//! commentary ("Sure! Here's the result: ..."), markdown fences, or trailing
//! pleasantries, and gateways occasionally pass through plain refusals. This
//! module recovers the embedded object when there is one, and reports "no
//! structure found" otherwise, so callers get a uniform two-branch decision:
//! use the structured result, or invoke the fallback evaluator.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Leftmost greedy `{...}` span. Greedy matching grabs everything from the
/// first `{` to the last `}`, which handles nested objects without a real
/// brace-counting parser. If the text contains several separate objects, only
/// this single outer span is attempted.
static OBJECT_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{.*\}").expect("object span pattern should be valid")
});

/// Try to extract a JSON object from a model response.
///
/// Attempts, in order:
///
/// 1. Parsing the entire input directly. This is the common path when the
///    endpoint honors the requested response format.
/// 2. Parsing the leftmost greedy `{...}` span, which strips surrounding
///    prose and markdown fences.
///
/// Returns `None` if neither attempt yields a JSON object. Never fails and
/// never panics, no matter how malformed the input is.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if value.is_object() {
            return Some(value);
        }
    }
    let span = OBJECT_SPAN.find(text)?;
    match serde_json::from_str::<Value>(span.as_str()) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_clean_json_directly() {
        let text = r#"{"grammar": 8, "summary": "Good work."}"#;
        let expected = json!({ "grammar": 8, "summary": "Good work." });
        assert_eq!(extract_json(text), Some(expected));
    }

    #[test]
    fn parses_pretty_printed_json() {
        let text = "{\n  \"criteria\": [],\n  \"summary\": \"ok\"\n}";
        assert_eq!(
            extract_json(text),
            Some(json!({ "criteria": [], "summary": "ok" }))
        );
    }

    #[test]
    fn recovers_object_embedded_in_prose() {
        let text = "Sure! Here's the result: {\"grammar\":8} Hope that helps!";
        assert_eq!(extract_json(text), Some(json!({ "grammar": 8 })));
    }

    #[test]
    fn recovers_object_from_markdown_fence() {
        let text = "```json\n{\"score\": 7, \"nested\": {\"a\": 1}}\n```";
        assert_eq!(
            extract_json(text),
            Some(json!({ "score": 7, "nested": { "a": 1 } }))
        );
    }

    #[test]
    fn returns_none_for_text_without_braces() {
        assert_eq!(extract_json("I cannot process this request."), None);
    }

    #[test]
    fn returns_none_for_empty_input() {
        assert_eq!(extract_json(""), None);
    }

    #[test]
    fn returns_none_for_unparseable_span() {
        // Has braces, but the greedy span never parses.
        assert_eq!(extract_json("set x = {1; 2; 3} and y = {4; 5}"), None);
    }

    #[test]
    fn returns_none_for_truncated_object() {
        assert_eq!(extract_json(r#"{"grammar": 8, "vocab"#), None);
    }

    #[test]
    fn ignores_bare_non_object_json() {
        // A bare array or scalar is valid JSON but not a usable mapping.
        assert_eq!(extract_json("[1, 2, 3]"), None);
        assert_eq!(extract_json("42"), None);
    }
}
