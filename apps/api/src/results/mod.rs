//! Structured analysis results: the wire schema shared by the screening and
//! matching agents, and the unwrap-then-parse step applied to raw model text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::evidence::EvidenceSnippet;

#[derive(Debug, Error)]
pub enum MalformedResultError {
    #[error("Result is empty after removing the code fence")]
    Empty,

    #[error("Result is not valid JSON for the claims schema: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Overall status reported by an analysis agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisStatus {
    Success,
    /// The agent found a required document missing or empty in session memory.
    InsufficientDocument,
}

/// Hiring decision. Screening uses the first three, matching the last two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Approve,
    ApproveWithRecommendations,
    Reject,
    ProceedToInterview,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub text: String,
    #[serde(default)]
    pub evidence: Vec<EvidenceSnippet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<String>,
}

/// ScreeningResult and MatchingResult share this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AnalysisStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub claims: Vec<Claim>,
}

impl AnalysisResult {
    /// All cited snippets in claim order.
    pub fn citations(&self) -> impl Iterator<Item = &EvidenceSnippet> {
        self.claims.iter().flat_map(|c| c.evidence.iter())
    }
}

/// Strips a leading ```` ``` ```` / ```` ```json ```` fence and its closing
/// marker. Text without a fence is returned trimmed.
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };

    // Drop an info string such as `json` on the opening line.
    let body = match rest.find('\n') {
        Some(newline) if rest[..newline].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
            &rest[newline + 1..]
        }
        _ => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };

    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Unwraps the fence envelope and parses the claims schema.
pub fn parse_result(raw: &str) -> Result<AnalysisResult, MalformedResultError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(MalformedResultError::Empty);
    }
    Ok(serde_json::from_str(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{"claims": [{"text": "Candidate has Go experience", "evidence": [{"snippet": "Go experience", "source": "pdf_resume_text", "offset": 11}]}]}"#;

    #[test]
    fn test_strip_code_fence_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_code_fence(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_code_fence_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_code_fence(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_code_fence_single_line() {
        let input = "```json{\"key\": \"value\"}```";
        assert_eq!(strip_code_fence(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_code_fence_no_fences() {
        let input = "  {\"key\": \"value\"}\n";
        assert_eq!(strip_code_fence(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_parse_fenced_result() {
        let raw = format!("```json\n{VALID}\n```");
        let result = parse_result(&raw).unwrap();
        assert_eq!(result.claims.len(), 1);
        assert_eq!(result.claims[0].evidence[0].snippet, "Go experience");
        assert_eq!(result.claims[0].evidence[0].offset, Some(11));
    }

    #[test]
    fn test_parse_optional_fields() {
        let raw = r#"{
            "status": "SUCCESS",
            "decision": "PROCEED_TO_INTERVIEW",
            "summary": "Strong backend match",
            "claims": [{"text": "Knows Go", "evidence": [{"snippet": "Go", "source": "pdf_resume_text"}], "verdict": "match"}]
        }"#;
        let result = parse_result(raw).unwrap();
        assert_eq!(result.status, Some(AnalysisStatus::Success));
        assert_eq!(result.decision, Some(Decision::ProceedToInterview));
        assert_eq!(result.claims[0].verdict.as_deref(), Some("match"));
        assert_eq!(result.claims[0].evidence[0].offset, None);
    }

    #[test]
    fn test_claim_without_evidence_field_defaults_to_empty() {
        let result = parse_result(r#"{"claims": [{"text": "Unsupported"}]}"#).unwrap();
        assert!(result.claims[0].evidence.is_empty());
    }

    #[test]
    fn test_missing_claims_is_malformed() {
        let err = parse_result(r#"{"decision": "APPROVE"}"#).unwrap_err();
        assert!(matches!(err, MalformedResultError::Parse(_)));
    }

    #[test]
    fn test_fence_only_is_empty() {
        let err = parse_result("```json\n```").unwrap_err();
        assert!(matches!(err, MalformedResultError::Empty));
    }

    #[test]
    fn test_prose_is_malformed() {
        assert!(parse_result("The candidate looks great!").is_err());
    }
}
