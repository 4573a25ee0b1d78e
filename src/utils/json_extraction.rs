//! JSON extraction from generation backend responses.
//!
//! Backends are asked for bare JSON, but responses sometimes arrive
//! wrapped in markdown code fences or surrounded by prose. Extraction
//! tries, in order: the whole trimmed content, a fenced code block, and a
//! brace-matched object found anywhere in the text.

use std::sync::OnceLock;

use regex::Regex;

fn fence_pattern() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"```(?:json)?\s*([\s\S]*?)```").expect("fence pattern is valid")
    })
}

/// Extracts the first JSON object or array from `content`.
///
/// Returns `None` when no balanced JSON document can be found. The result
/// is not guaranteed to parse; callers still run it through serde.
pub fn extract_json(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Some(trimmed.to_string());
    }

    if let Some(captures) = fence_pattern().captures(content) {
        let inner = captures[1].trim();
        if inner.starts_with('{') || inner.starts_with('[') {
            return Some(inner.to_string());
        }
    }

    balanced_document(content)
}

/// Finds the first brace- or bracket-balanced span, ignoring delimiters
/// inside string literals.
fn balanced_document(content: &str) -> Option<String> {
    let start = content.find(['{', '['])?;
    let open = content.as_bytes()[start] as char;
    let close = if open == '{' { '}' } else { ']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in content[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(content[start..start + offset + ch.len_utf8()].to_string());
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

    #[test]
    fn test_extract_direct_object() {
        let content = r#"{"quiz": []}"#;
        assert_eq!(extract_json(content), Some(r#"{"quiz": []}"#.to_string()));
    }

    #[test]
    fn test_extract_direct_array() {
        assert_eq!(extract_json(" [1, 2, 3] "), Some("[1, 2, 3]".to_string()));
    }

    #[test]
    fn test_extract_from_json_fence() {
        let content = "Here you go:\n```json\n{\"quiz\": []}\n```\nEnjoy!";
        assert_eq!(extract_json(content), Some(r#"{"quiz": []}"#.to_string()));
    }

    #[test]
    fn test_extract_from_bare_fence() {
        let content = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json(content), Some(r#"{"a": 1}"#.to_string()));
    }

    #[test]
    fn test_extract_embedded_in_prose() {
        let content = "The result is {\"a\": {\"b\": 2}} as requested.";
        assert_eq!(extract_json(content), Some(r#"{"a": {"b": 2}}"#.to_string()));
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let content = r#"answer: {"text": "closing } inside"} trailing"#;
        assert_eq!(
            extract_json(content),
            Some(r#"{"text": "closing } inside"}"#.to_string())
        );
    }

    #[test]
    fn test_no_json_returns_none() {
        assert_eq!(extract_json("no structured content here"), None);
    }

    #[test]
    fn test_truncated_json_returns_none() {
        assert_eq!(extract_json(r#"{"quiz": ["#), None);
    }
}
