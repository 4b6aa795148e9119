//! Structured output parsing for language model responses
//!
//! Models wrap JSON in markdown fences or chatter around it. Parsing happens in
//! two stages: a lenient text extraction that isolates the outermost JSON
//! value, then a strict typed `serde_json` parse.

use crate::errors::{AppError, Result};
use serde::de::DeserializeOwned;

/// Stage one: strip fences and slice out the outermost `{...}` or `[...]`
pub fn extract_json_candidate(raw: &str) -> Result<&str> {
    let trimmed = strip_fences(raw);

    let start = trimmed
        .find(['{', '['])
        .ok_or_else(|| AppError::llm_parse("no JSON opening bracket found", raw))?;

    let closer = if trimmed.as_bytes()[start] == b'{' { '}' } else { ']' };
    let end = trimmed
        .rfind(closer)
        .ok_or_else(|| AppError::llm_parse(format!("no closing '{}' found", closer), raw))?;

    if end < start {
        return Err(AppError::llm_parse("JSON closes before it opens", raw));
    }

    Ok(&trimmed[start..=end])
}

/// Stage two: strict typed parse of the extracted candidate
pub fn parse_llm_json<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let candidate = extract_json_candidate(raw)?;
    serde_json::from_str(candidate).map_err(|e| AppError::llm_parse(e.to_string(), raw))
}

fn strip_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    for prefix in ["```json", "```JSON", "```"] {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest;
            break;
        }
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EvaluationResult;

    #[test]
    fn test_extract_fenced_object() {
        let raw = "```json\n{\"score\": 0.8, \"reason\": \"ok\"}\n```";
        assert_eq!(
            extract_json_candidate(raw).unwrap(),
            "{\"score\": 0.8, \"reason\": \"ok\"}"
        );
    }

    #[test]
    fn test_extract_with_surrounding_chatter() {
        let raw = "Sure! Here you go: [\"Son\", \"LAFC\"] Hope this helps.";
        assert_eq!(extract_json_candidate(raw).unwrap(), "[\"Son\", \"LAFC\"]");
    }

    #[test]
    fn test_extract_keeps_nested_brackets() {
        let raw = "{\"a\": [1, 2], \"b\": {\"c\": 3}}";
        assert_eq!(extract_json_candidate(raw).unwrap(), raw);
    }

    #[test]
    fn test_missing_bracket_is_parse_error() {
        let err = extract_json_candidate("I cannot answer that").unwrap_err();
        assert!(matches!(err, AppError::LlmResponseParse { .. }));
    }

    #[test]
    fn test_close_before_open_is_parse_error() {
        let err = extract_json_candidate("} then {").unwrap_err();
        assert!(matches!(err, AppError::LlmResponseParse { .. }));
    }

    #[test]
    fn test_parse_evaluation() {
        let raw = "```json\n{\"score\": 0.85, \"reason\": \"highly relevant\"}\n```";
        let result: EvaluationResult = parse_llm_json(raw).unwrap();
        assert_eq!(result.score, 0.85);
        assert_eq!(result.reason, "highly relevant");
    }

    #[test]
    fn test_parse_string_array() {
        let names: Vec<String> = parse_llm_json("```\n[\"손흥민\", \"LA FC\"]\n```").unwrap();
        assert_eq!(names, vec!["손흥민", "LA FC"]);
    }

    #[test]
    fn test_strict_stage_rejects_wrong_shape() {
        let err = parse_llm_json::<EvaluationResult>("{\"reason\": \"no score\"}").unwrap_err();
        match err {
            AppError::LlmResponseParse { excerpt, .. } => assert!(excerpt.contains("no score")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
