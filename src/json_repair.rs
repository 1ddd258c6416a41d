//! Parse-and-repair chain for JSON produced by a text generator.
//!
//! Generators are asked for a single JSON object but routinely wrap it in
//! markdown fences, surround it with prose, or put raw newlines inside string
//! values. [`parse_generated`] tries progressively more aggressive repairs:
//!
//! 1. strip a wrapping code fence and parse directly
//! 2. cut out the first balanced top-level object (quote and escape aware)
//! 3. escape raw control characters inside string literals of that object
//!
//! and only then gives up with a typed [`RepairError`].

use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::error::RepairError;
use crate::utils::{looks_truncated, truncate_for_log};

/// Remove a leading ```` ``` ```` / ```` ```json ```` line and a trailing
/// ```` ``` ````. Fences inside the payload are left alone.
pub fn strip_fences(text: &str) -> &str {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```") {
        s = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
        };
    }
    if let Some(rest) = s.trim_end().strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Return the first balanced `{ ... }` in `text`.
///
/// Braces inside string literals are ignored, and a backslash escapes the
/// next character inside a string.
pub fn extract_balanced_object(text: &str) -> Result<&str, RepairError> {
    let start = text.find('{').ok_or(RepairError::NoObject)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in text.as_bytes()[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    Err(RepairError::Unbalanced)
}

/// Escape raw control characters that appear inside JSON string literals.
/// Whitespace between tokens is left untouched.
pub fn escape_control_chars(json: &str) -> String {
    let mut out = String::with_capacity(json.len() + 16);
    let mut in_string = false;
    let mut escaped = false;

    for c in json.chars() {
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            continue;
        }
        if escaped {
            escaped = false;
            out.push(c);
            continue;
        }
        match c {
            '\\' => {
                escaped = true;
                out.push(c);
            }
            '"' => {
                in_string = false;
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Parse generator output into `T`, repairing it on the way if needed.
pub fn parse_generated<T: DeserializeOwned>(raw: &str) -> Result<T, RepairError> {
    let cleaned = strip_fences(raw);
    match serde_json::from_str::<T>(cleaned) {
        Ok(value) => return Ok(value),
        Err(e) => debug!(error = %e, "Direct parse failed; trying brace-balanced extraction"),
    }

    let candidate = extract_balanced_object(cleaned).inspect_err(|e| {
        error!(
            error = %e,
            payload_preview = %truncate_for_log(cleaned, 500),
            "No usable JSON object in generator output"
        );
    })?;

    match serde_json::from_str::<T>(candidate) {
        Ok(value) => return Ok(value),
        Err(e) => debug!(error = %e, "Extracted object failed to parse; escaping control characters"),
    }

    serde_json::from_str::<T>(&escape_control_chars(candidate)).map_err(|e| {
        error!(
            error = %e,
            truncated = looks_truncated(&e),
            payload_preview = %truncate_for_log(candidate, 500),
            "Generator JSON could not be repaired"
        );
        RepairError::Invalid(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        title: String,
        html: String,
    }

    fn clean() -> Sample {
        serde_json::from_str(r#"{"title":"Hello","html":"<p>a\nb</p>"}"#).unwrap()
    }

    #[test]
    fn parses_clean_response() {
        let parsed: Sample = parse_generated(r#"{"title":"Hello","html":"<p>a\nb</p>"}"#).unwrap();
        assert_eq!(parsed, clean());
    }

    #[test]
    fn parses_fenced_response() {
        let raw = "```json\n{\"title\":\"Hello\",\"html\":\"<p>a\\nb</p>\"}\n```";
        let parsed: Sample = parse_generated(raw).unwrap();
        assert_eq!(parsed, clean());
    }

    #[test]
    fn parses_raw_newline_inside_string() {
        let raw = "{\"title\":\"Hello\",\"html\":\"<p>a\nb</p>\"}";
        let parsed: Sample = parse_generated(raw).unwrap();
        assert_eq!(parsed, clean());
    }

    #[test]
    fn parses_object_surrounded_by_prose() {
        let raw = "Sure! Here is the post:\n{\"title\":\"Hello\",\"html\":\"<p>a\\nb</p>\"}\nLet me know if you need changes {ok}.";
        let parsed: Sample = parse_generated(raw).unwrap();
        assert_eq!(parsed, clean());
    }

    #[test]
    fn fenced_with_prose_and_control_chars() {
        let raw = "Here you go\n```json\n{\"title\":\"Hello\",\n \"html\":\"<p>a\nb</p>\"}\n```";
        let parsed: Sample = parse_generated(raw).unwrap();
        assert_eq!(parsed, clean());
    }

    #[test]
    fn strip_fences_leaves_inner_fences() {
        let raw = "```json\n{\"html\":\"use ```code``` here\"}\n```";
        assert_eq!(strip_fences(raw), "{\"html\":\"use ```code``` here\"}");
        assert_eq!(strip_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn extraction_ignores_braces_in_strings_and_escaped_quotes() {
        let text = r#"noise {"a":"}{ \" }","b":{"c":1}} trailing }"#;
        assert_eq!(
            extract_balanced_object(text).unwrap(),
            r#"{"a":"}{ \" }","b":{"c":1}}"#
        );
    }

    #[test]
    fn extraction_reports_missing_and_unbalanced_objects() {
        assert!(matches!(
            extract_balanced_object("no json here"),
            Err(RepairError::NoObject)
        ));
        assert!(matches!(
            extract_balanced_object(r#"{"a":{"b":1}"#),
            Err(RepairError::Unbalanced)
        ));
    }

    #[test]
    fn escape_control_chars_only_touches_strings() {
        let input = "{\n\t\"a\": \"x\ty\u{1}\"\n}";
        let escaped = escape_control_chars(input);
        assert_eq!(escaped, "{\n\t\"a\": \"x\\ty\\u0001\"\n}");
        let value: serde_json::Value = serde_json::from_str(&escaped).unwrap();
        assert_eq!(value["a"], "x\ty\u{1}");
    }

    #[test]
    fn unrepairable_output_is_a_typed_error() {
        let result: Result<Sample, _> = parse_generated(r#"{"title": "Hello", "html": }"#);
        assert!(matches!(result, Err(RepairError::Invalid(_))));

        let result: Result<Sample, _> = parse_generated("I cannot help with that.");
        assert!(matches!(result, Err(RepairError::NoObject)));
    }
}
