//! Robust JSON extraction from model output text.
//!
//! Models asked for JSON-only responses still wrap the object in Markdown
//! fences, prepend prose, or emit several JSON blobs back to back. This
//! module strips fences, tries a direct parse, then scans for the first
//! syntactically complete JSON object anywhere in the text.

use labelscan_core::{Error, Result};
use serde_json::Value;

/// Remove a surrounding Markdown code fence (```json ... ```), if present.
pub fn strip_code_fence(text: &str) -> &str {
    let value = text.trim();
    let Some(rest) = value.strip_prefix("```") else {
        return value;
    };
    // Drop the language tag up to the first newline.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
    };
    rest.trim_end().trim_end_matches("```").trim()
}

/// Extract the first JSON object from model text.
///
/// Fails only if no complete object is found at all.
pub fn extract_first_json_object(text: &str) -> Result<Value> {
    let cleaned = strip_code_fence(text);

    if let Ok(parsed) = serde_json::from_str::<Value>(cleaned) {
        if parsed.is_object() {
            return Ok(parsed);
        }
    }

    let bytes = cleaned.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() {
        let Some(start) = cleaned[idx..].find('{').map(|p| idx + p) else {
            break;
        };
        if let Some(end) = complete_object_end(cleaned, start) {
            if let Ok(parsed) = serde_json::from_str::<Value>(&cleaned[start..end]) {
                if parsed.is_object() {
                    return Ok(parsed);
                }
            }
        }
        idx = start + 1;
    }

    Err(Error::Serialization(
        "JSON object not found in model response".to_string(),
    ))
}

/// Find the byte offset one past the matching close brace of the object
/// starting at `start`, tracking string literals and escapes.
fn complete_object_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_code_fence_with_language() {
        let text = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fence(text), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_code_fence_plain() {
        let text = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fence(text), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_code_fence_absent() {
        assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_direct_parse() {
        let value = extract_first_json_object("{\"decision\": \"READ\"}").unwrap();
        assert_eq!(value, json!({"decision": "READ"}));
    }

    #[test]
    fn test_fenced_object() {
        let value = extract_first_json_object("```json\n{\"ok\": true}\n```").unwrap();
        assert_eq!(value, json!({"ok": true}));
    }

    #[test]
    fn test_object_with_surrounding_prose() {
        let text = "분석 결과는 다음과 같습니다.\n{\"score\": 80}\n이상입니다.";
        let value = extract_first_json_object(text).unwrap();
        assert_eq!(value, json!({"score": 80}));
    }

    #[test]
    fn test_first_of_multiple_objects() {
        let text = "{\"first\": 1}\n{\"second\": 2}";
        let value = extract_first_json_object(text).unwrap();
        assert_eq!(value, json!({"first": 1}));
    }

    #[test]
    fn test_nested_object_and_braces_in_strings() {
        let text = "note: {\"text\": \"has } brace and \\\" quote\", \"inner\": {\"n\": 2}}";
        let value = extract_first_json_object(text).unwrap();
        assert_eq!(value["inner"]["n"], 2);
    }

    #[test]
    fn test_skips_incomplete_prefix_object() {
        let text = "{broken {\"valid\": true}";
        let value = extract_first_json_object(text).unwrap();
        assert_eq!(value, json!({"valid": true}));
    }

    #[test]
    fn test_top_level_array_is_not_an_object() {
        // A bare array fails the object requirement; an object inside it wins.
        let value = extract_first_json_object("[{\"a\": 1}]").unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn test_no_object_at_all() {
        let err = extract_first_json_object("no json here").unwrap_err();
        assert!(err.to_string().contains("JSON object not found"));
    }
}
