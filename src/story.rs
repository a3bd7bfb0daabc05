//! Story response parsing
//!
//! The text model answers with a JSON object keyed by 1-based page-number
//! strings. Two shapes exist: the plain shape maps page numbers straight to
//! text, the winkified shape wraps text together with an illustration note.
//! Both normalize to [`PageText`]; the `is_winkify_enabled` flag picks which
//! schema is validated.

use crate::error::{PipelineError, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Normalized per-page story output
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub text: String,
    pub illustration_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WinkifiedEntry {
    text: String,
    #[serde(rename = "illustrationNotes")]
    illustration_notes: Option<String>,
}

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^```(?:json)?\s*(.*?)\s*```$").expect("valid regex"))
}

/// Strip a surrounding markdown code fence, if any
///
/// Models sometimes wrap JSON output in ``` fences despite being asked for
/// raw JSON; parsing is defensive about it.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    match fence_regex().captures(trimmed) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(trimmed),
        None => trimmed,
    }
}

/// Parse and validate a story completion into per-page text
///
/// Keys must be numeric page-number strings and every text must be
/// non-empty. A plain response is normalized into the winkified shape with
/// `illustration_notes = None`.
pub fn parse_story_response(raw: &str, is_winkify_enabled: bool) -> Result<BTreeMap<u32, PageText>> {
    let json = strip_code_fences(raw);

    let mut pages = BTreeMap::new();

    if is_winkify_enabled {
        let parsed: BTreeMap<String, WinkifiedEntry> = serde_json::from_str(json)
            .map_err(|e| PipelineError::StoryParseError(e.to_string()))?;
        for (key, entry) in parsed {
            let number = parse_page_key(&key)?;
            if entry.text.trim().is_empty() {
                return Err(PipelineError::StoryParseError(format!(
                    "empty text for page {}",
                    number
                )));
            }
            pages.insert(
                number,
                PageText {
                    text: entry.text,
                    illustration_notes: entry
                        .illustration_notes
                        .filter(|n| !n.trim().is_empty()),
                },
            );
        }
    } else {
        let parsed: BTreeMap<String, String> = serde_json::from_str(json)
            .map_err(|e| PipelineError::StoryParseError(e.to_string()))?;
        for (key, text) in parsed {
            let number = parse_page_key(&key)?;
            if text.trim().is_empty() {
                return Err(PipelineError::StoryParseError(format!(
                    "empty text for page {}",
                    number
                )));
            }
            pages.insert(
                number,
                PageText {
                    text,
                    illustration_notes: None,
                },
            );
        }
    }

    if pages.is_empty() {
        return Err(PipelineError::StoryParseError(
            "response contained no pages".to_string(),
        ));
    }

    Ok(pages)
}

fn parse_page_key(key: &str) -> Result<u32> {
    key.parse::<u32>().map_err(|_| {
        PipelineError::StoryParseError(format!("non-numeric page key: {:?}", key))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_plain_fence() {
        let raw = "```\n{\"1\": \"hi\"}\n```";
        assert_eq!(strip_code_fences(raw), "{\"1\": \"hi\"}");
    }

    #[test]
    fn test_strip_json_fence() {
        let raw = "```json\n{\"1\": \"hi\"}\n```";
        assert_eq!(strip_code_fences(raw), "{\"1\": \"hi\"}");
    }

    #[test]
    fn test_strip_no_fence_is_identity() {
        let raw = "  {\"1\": \"hi\"}  ";
        assert_eq!(strip_code_fences(raw), "{\"1\": \"hi\"}");
    }

    #[test]
    fn test_parse_plain_response() {
        let raw = r#"{"1": "Maya wakes up.", "2": "Off to the beach!"}"#;
        let pages = parse_story_response(raw, false).unwrap();

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[&1].text, "Maya wakes up.");
        assert_eq!(pages[&1].illustration_notes, None);
    }

    #[test]
    fn test_parse_winkified_response() {
        let raw = r#"{
            "1": {"text": "Maya wakes up.", "illustrationNotes": "sunbeam sparkles"},
            "2": {"text": "Off to the beach!", "illustrationNotes": null}
        }"#;
        let pages = parse_story_response(raw, true).unwrap();

        assert_eq!(
            pages[&1].illustration_notes.as_deref(),
            Some("sunbeam sparkles")
        );
        assert_eq!(pages[&2].illustration_notes, None);
    }

    #[test]
    fn test_parse_winkified_blank_notes_dropped() {
        let raw = r#"{"1": {"text": "Hi.", "illustrationNotes": "  "}}"#;
        let pages = parse_story_response(raw, true).unwrap();
        assert_eq!(pages[&1].illustration_notes, None);
    }

    #[test]
    fn test_fenced_response_parses() {
        let raw = "```json\n{\"1\": \"Maya wakes up.\"}\n```";
        let pages = parse_story_response(raw, false).unwrap();
        assert_eq!(pages[&1].text, "Maya wakes up.");
    }

    #[test]
    fn test_schema_mismatch_is_error() {
        // Winkified payload validated against the plain schema must fail.
        let raw = r#"{"1": {"text": "Hi.", "illustrationNotes": null}}"#;
        assert!(parse_story_response(raw, false).is_err());
    }

    #[test]
    fn test_non_numeric_key_is_error() {
        let raw = r#"{"cover": "Hi."}"#;
        assert!(parse_story_response(raw, false).is_err());
    }

    #[test]
    fn test_empty_text_is_error() {
        let raw = r#"{"1": ""}"#;
        assert!(parse_story_response(raw, false).is_err());
    }

    #[test]
    fn test_malformed_json_is_error() {
        assert!(parse_story_response("not json", false).is_err());
    }

    #[test]
    fn test_empty_object_is_error() {
        assert!(parse_story_response("{}", false).is_err());
    }
}
