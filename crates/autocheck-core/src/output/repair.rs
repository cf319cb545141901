//! Tolerant repair of near-JSON model replies.
//!
//! Only two defect classes are handled:
//! - a Markdown code fence wrapped around the object
//! - trailing commas before a closing brace or bracket
//!
//! Anything else is left for the strict parser to reject.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Opening fence, with or without a `json` language tag.
    static ref LEADING_FENCE: Regex = Regex::new(r"(?i)\A\s*```(?:json)?[ \t]*\r?\n?").unwrap();

    /// Closing fence at the very end of the reply.
    static ref TRAILING_FENCE: Regex = Regex::new(r"\r?\n?[ \t]*```\s*\z").unwrap();

    /// A comma followed only by whitespace and then `}` or `]`.
    static ref TRAILING_COMMA: Regex = Regex::new(r",(\s*[}\]])").unwrap();
}

/// Apply the repair pass to a raw reply.
pub fn repair(raw: &str) -> String {
    let unfenced = LEADING_FENCE.replace(raw, "");
    let unfenced = TRAILING_FENCE.replace(&unfenced, "");
    TRAILING_COMMA.replace_all(&unfenced, "$1").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_strips_json_fence_and_trailing_comma() {
        let raw = "```json\n{\"score\": 42, \"narrative\": \"ok\",}\n```";
        let repaired = repair(raw);
        let value: serde_json::Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(value["score"], 42);
        assert_eq!(value["narrative"], "ok");
    }

    #[test]
    fn test_strips_untagged_fence() {
        let repaired = repair("```\n{\"a\": 1}\n```\n");
        assert_eq!(repaired.trim(), "{\"a\": 1}");
    }

    #[test]
    fn test_uppercase_tag() {
        let repaired = repair("```JSON\n{\"a\": [1, 2,]}```");
        let value: serde_json::Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(value["a"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_trailing_comma_in_nested_array() {
        let raw = "{\"recommendations\": [{\"tool\": \"a\", \"reason\": \"b\",},\n],}";
        let value: serde_json::Value = serde_json::from_str(&repair(raw)).unwrap();
        assert_eq!(value["recommendations"][0]["tool"], "a");
    }

    #[test]
    fn test_prose_is_untouched() {
        let raw = "I think this process is fine.";
        assert_eq!(repair(raw), raw);
        assert!(serde_json::from_str::<serde_json::Value>(&repair(raw)).is_err());
    }

    proptest! {
        #[test]
        fn prop_fenced_object_with_trailing_comma_parses(
            key in "[a-z]{1,12}",
            text in "[A-Za-z0-9 ]{0,40}",
            n in any::<i32>(),
        ) {
            let raw = format!("```json\n{{\"{key}\": {n}, \"text\": \"{text}\",}}\n```");
            let value: serde_json::Value = serde_json::from_str(&repair(&raw)).unwrap();
            prop_assert_eq!(value["text"].as_str(), Some(text.as_str()));
        }

        #[test]
        fn prop_valid_compact_json_unchanged(
            key in "[a-z]{1,12}",
            n in any::<i64>(),
        ) {
            let raw = format!("{{\"{key}\":{n}}}");
            prop_assert_eq!(repair(&raw), raw);
        }
    }
}
