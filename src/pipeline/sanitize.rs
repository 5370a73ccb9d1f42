//! Sanitising model replies into parseable JSON text.
//!
//! Even when told "JSON only, no prose", chat models regularly wrap their
//! answer in a ```` ```json ```` fence or prefix it with a sentence. Two
//! operations live here:
//!
//! * [`clean`]: text in, text out. Total: never fails, never parses.
//! * [`parse_model_output`]: `clean` followed by a `serde_json` parse; a
//!   parse failure becomes an [`ExtractionResult::InvalidJson`] record
//!   holding the *original* reply, so display code always gets a value.
//!
//! ## Rule Order
//!
//! 1. A fence labelled `json` wins over any other fence.
//! 2. Otherwise the first fenced block (any or no label) is used.
//! 3. Otherwise stray fence markers (a truncated reply) are removed.
//! 4. Otherwise the trimmed input is returned unchanged.

use crate::output::{ExtractedDocument, ExtractionResult};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```json\b[ \t]*\r?\n?(.*?)```").unwrap());

static RE_ANY_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:[A-Za-z0-9_+.-]*[ \t]*\r?\n)?(.*?)```").unwrap());

static RE_STRAY_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)```(?:json\b)?").unwrap());

/// Strip markdown code fences from a model reply.
///
/// Returns the trimmed interior of the `json`-labelled fence if there is
/// one, else of the first fenced block, else the trimmed input.
pub fn clean(raw: &str) -> String {
    if let Some(caps) = RE_JSON_FENCE.captures(raw) {
        return caps[1].trim().to_string();
    }
    if let Some(caps) = RE_ANY_FENCE.captures(raw) {
        return caps[1].trim().to_string();
    }
    if raw.contains("```") {
        return RE_STRAY_FENCE.replace_all(raw, "").trim().to_string();
    }
    raw.trim().to_string()
}

/// Clean a model reply and parse it as JSON.
///
/// Never fails: text that is not valid JSON after [`clean`] yields
/// `ExtractionResult::InvalidJson { raw }` with the unmodified reply.
pub fn parse_model_output(raw: &str) -> ExtractionResult {
    let cleaned = clean(raw);
    match serde_json::from_str::<serde_json::Value>(&cleaned) {
        Ok(value) => ExtractionResult::Document(ExtractedDocument::from_value(value)),
        Err(e) => {
            debug!("Model reply is not valid JSON ({}): {} bytes", e, raw.len());
            ExtractionResult::InvalidJson {
                raw: raw.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn json_fence_with_preamble() {
        let raw = "Here you go:\n```json\n{\"a\": 1}\n```";
        assert_eq!(clean(raw), "{\"a\": 1}");
        let parsed: Value = serde_json::from_str(&clean(raw)).unwrap();
        assert_eq!(parsed, json!({"a": 1}));
    }

    #[test]
    fn no_fence_is_identity() {
        assert_eq!(clean("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn no_fence_is_trimmed() {
        assert_eq!(clean("  \n{\"a\": 1}\n\t "), "{\"a\": 1}");
        assert_eq!(clean(""), "");
    }

    #[test]
    fn json_fence_preferred_over_earlier_plain_fence() {
        let raw = "```\nnot this\n```\nbut:\n```json\n[1, 2]\n```";
        assert_eq!(clean(raw), "[1, 2]");
    }

    #[test]
    fn json_label_is_case_insensitive() {
        assert_eq!(clean("```JSON\n{}\n```"), "{}");
    }

    #[test]
    fn unlabeled_fence_first_block() {
        let raw = "text\n```\n{\"first\": true}\n```\nmore\n```\n{\"second\": true}\n```";
        assert_eq!(clean(raw), "{\"first\": true}");
    }

    #[test]
    fn inline_unlabeled_fence() {
        assert_eq!(clean("```{\"a\": 1}```"), "{\"a\": 1}");
    }

    #[test]
    fn other_label_is_dropped() {
        assert_eq!(clean("```javascript\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn jsonl_label_is_not_json_label() {
        // "jsonl" is a different label; handled by the generic fence rule.
        assert_eq!(clean("```jsonl\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn truncated_fence_is_stripped() {
        assert_eq!(clean("```json\n{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn crlf_fences() {
        assert_eq!(clean("```json\r\n{\"a\": 1}\r\n```"), "{\"a\": 1}");
    }

    #[test]
    fn fenced_values_survive_parse() {
        let values = [
            json!({"name": "ACME", "total": 12.5, "items": [{"sku": "x", "qty": 2}]}),
            json!([{"a": null}, {"b": false}]),
            json!({"unicode": "Société Générale — reçu", "nested": {"deep": [1, 2, 3]}}),
        ];
        for v in values {
            let raw = format!("```json\n{}\n```", serde_json::to_string(&v).unwrap());
            let parsed: Value = serde_json::from_str(&clean(&raw)).unwrap();
            assert_eq!(parsed, v);
        }
    }

    #[test]
    fn parse_model_output_object() {
        let result = parse_model_output("```json\n{\"a\": 1}\n```");
        assert_eq!(result.to_value(), json!({"a": 1}));
    }

    #[test]
    fn parse_model_output_invalid_keeps_original_text() {
        let raw = "Sorry, I cannot read this document.";
        assert_eq!(
            parse_model_output(raw),
            ExtractionResult::InvalidJson {
                raw: raw.to_string()
            }
        );
    }

    #[test]
    fn parse_model_output_list() {
        let result = parse_model_output("[{\"a\": 1}, {\"a\": 2}]");
        match result {
            ExtractionResult::Document(ExtractedDocument::Many(items)) => {
                assert_eq!(items.len(), 2)
            }
            other => panic!("expected Many, got {other:?}"),
        }
    }
}
