//! Response parsing: model text → [`AnalysisResult`].
//!
//! Even when asked for bare JSON, models regularly wrap their answer in a
//! fenced code block (```` ```json … ``` ````). One leading and one trailing
//! fence are stripped before the text is handed to `serde_json`. Anything
//! that still fails to parse is an [`LensError::InvalidResponse`], kept
//! distinct from transport failures so the user sees the right message.

use crate::analysis::AnalysisResult;
use crate::error::LensError;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static RE_LEADING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z0-9_-]*[ \t]*\r?\n?").unwrap());

static RE_TRAILING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n?```$").unwrap());

/// Remove one leading and one trailing code fence, if present.
pub fn strip_fences(input: &str) -> &str {
    let trimmed = input.trim();
    let start = RE_LEADING_FENCE
        .find(trimmed)
        .map(|m| m.end())
        .unwrap_or(0);
    let body = &trimmed[start..];
    let end = RE_TRAILING_FENCE
        .find(body)
        .map(|m| m.start())
        .unwrap_or(body.len());
    body[..end].trim()
}

/// Parse the model's raw reply into a report.
pub fn parse_response(raw: &str) -> Result<AnalysisResult, LensError> {
    if raw.trim().is_empty() {
        return Err(LensError::EmptyResponse);
    }

    let body = strip_fences(raw);
    let result: AnalysisResult =
        serde_json::from_str(body).map_err(|e| LensError::InvalidResponse {
            detail: e.to_string(),
        })?;

    debug!(
        "Parsed report: estimate={:?} confidence={:?} cues={}",
        result.estimated_range,
        result.confidence_level,
        result.visual_cues.len()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{"estimatedRange":"12-15%","confidenceLevel":"High","visualCues":["visible abs"],"muscleDefinitionAnalysis":"Lean.","healthTips":["Sleep"],"disclaimer":"Not medical advice."}"#;

    #[test]
    fn strips_json_tagged_fence() {
        let input = format!("```json\n{BODY}\n```");
        assert_eq!(strip_fences(&input), BODY);
    }

    #[test]
    fn strips_bare_fence_with_crlf() {
        let input = format!("```\r\n{BODY}\r\n```\n");
        assert_eq!(strip_fences(&input), BODY);
    }

    #[test]
    fn unfenced_passthrough() {
        assert_eq!(strip_fences(BODY), BODY);
    }

    #[test]
    fn parses_fenced_report() {
        let r = parse_response(&format!("```json\n{BODY}\n```")).unwrap();
        assert_eq!(r.estimated_range, "12-15%");
        assert_eq!(r.health_tips, vec!["Sleep".to_string()]);
    }

    #[test]
    fn parses_not_applicable_with_suggestions() {
        let raw = r#"{"estimatedRange":"N/A","confidenceLevel":"Low","visualCues":[],"muscleDefinitionAnalysis":"Too dark.","healthTips":[],"disclaimer":"d","suggestions":["Use daylight"]}"#;
        let r = parse_response(raw).unwrap();
        assert!(r.is_not_applicable());
        assert_eq!(r.suggestions(), ["Use daylight".to_string()]);
    }

    #[test]
    fn empty_text_is_empty_response() {
        assert!(matches!(parse_response("  \n"), Err(LensError::EmptyResponse)));
    }

    #[test]
    fn prose_is_invalid_response() {
        let err = parse_response("I cannot help with that.").unwrap_err();
        assert!(matches!(err, LensError::InvalidResponse { .. }));
    }

    #[test]
    fn missing_required_field_is_invalid_response() {
        let err = parse_response(r#"{"estimatedRange":"10%"}"#).unwrap_err();
        assert!(matches!(err, LensError::InvalidResponse { .. }));
    }
}
