//! Structured-output extraction from free-form model text.
//!
//! Models wrap JSON in code fences, preamble it with prose, and trail it with
//! commentary. `extract_json` tolerates all three; anything else is an
//! invalid-structured-output failure, never a silent default.

use serde_json::Value;

use crate::error::{Error, Result};

/// Extract a JSON value from model output.
///
/// 1. Strips fenced code blocks (the fence content wins over surrounding
///    prose).
/// 2. Scans from the first `{` or `[` with balanced-delimiter matching,
///    discarding anything after the outermost closing delimiter.
/// 3. Returns the parsed value or fails with an invalid-output error.
pub fn extract_json(text: &str) -> Result<Value> {
    let candidate = strip_fences(text);

    let slice = balanced_json_slice(&candidate)
        .ok_or_else(|| Error::invalid_output("no JSON object or array in model output"))?;

    serde_json::from_str(slice)
        .map_err(|e| Error::invalid_output(format!("malformed JSON in model output: {}", e)))
}

/// If the text contains a fenced code block, return its content; otherwise
/// return the text unchanged.
fn strip_fences(text: &str) -> String {
    let Some(open) = text.find("```") else {
        return text.to_string();
    };

    // Skip the fence line itself (possibly tagged, e.g. ```json)
    let after_open = &text[open + 3..];
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];

    match body.find("```") {
        Some(close) => body[..close].to_string(),
        // Unterminated fence: take everything after the opener
        None => body.to_string(),
    }
}

/// Locate the first balanced JSON object or array in `text`.
///
/// Delimiters inside string literals (including escaped quotes) are ignored.
fn balanced_json_slice(text: &str) -> Option<&str> {
    let start = text.find(|c| c == '{' || c == '[')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
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
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=i]);
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
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_bare_object() {
        let value = extract_json(r#"{"verdict": "TRUE"}"#).unwrap();
        assert_eq!(value["verdict"], "TRUE");
    }

    #[test]
    fn test_fenced_object() {
        let text = "Here is my answer:\n```json\n{\"claim_text\": \"Luke used Mark\"}\n```\nLet me know!";
        let value = extract_json(text).unwrap();
        assert_eq!(value["claim_text"], "Luke used Mark");
    }

    #[test]
    fn test_trailing_prose_discarded() {
        let text = r#"{"sources": []} I hope this helps."#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["sources"], json!([]));
    }

    #[test]
    fn test_leading_prose_tolerated() {
        let text = r#"Sure, the structured output is: {"mode": "CONTEXTUAL"}"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["mode"], "CONTEXTUAL");
    }

    #[test]
    fn test_array_output() {
        let value = extract_json("[1, 2, 3] trailing").unwrap();
        assert_eq!(value, json!([1, 2, 3]));
    }

    #[test]
    fn test_nested_and_string_delimiters() {
        let text = r#"{"quote": "He said \"Noah built {an ark}\"", "tags": ["a", "b"]}"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["tags"], json!(["a", "b"]));
        assert!(value["quote"].as_str().unwrap().contains("{an ark}"));
    }

    #[test]
    fn test_no_json_is_error() {
        let err = extract_json("I could not produce an answer.").unwrap_err();
        assert!(matches!(err, Error::InvalidOutput(_)));
    }

    #[test]
    fn test_unbalanced_is_error() {
        assert!(extract_json(r#"{"truncated": [1, 2"#).is_err());
    }

    #[test]
    fn test_unterminated_fence() {
        let text = "```json\n{\"ok\": true}";
        let value = extract_json(text).unwrap();
        assert_eq!(value["ok"], true);
    }

    fn arb_json(depth: u32) -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 {}\\[\\]\"]*".prop_map(Value::from),
        ];
        leaf.prop_recursive(depth, 32, 8, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
                prop::collection::hash_map("[a-z]{1,8}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        // Round-trip law: a fenced JSON value with trailing free text
        // extracts back to itself.
        #[test]
        fn prop_fenced_roundtrip(value in arb_json(3)) {
            // Only objects and arrays are extractable roots
            prop_assume!(value.is_object() || value.is_array());
            let fenced = format!(
                "```json\n{}\n```\nAnything else I can help with?",
                serde_json::to_string(&value).unwrap()
            );
            let extracted = extract_json(&fenced).unwrap();
            prop_assert_eq!(extracted, value);
        }

        #[test]
        fn prop_bare_roundtrip_with_trailing_text(value in arb_json(3)) {
            prop_assume!(value.is_object() || value.is_array());
            let text = format!("{} - end of output", serde_json::to_string(&value).unwrap());
            let extracted = extract_json(&text).unwrap();
            prop_assert_eq!(extracted, value);
        }
    }
}
