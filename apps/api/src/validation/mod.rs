//! Result validation: independently re-confirms every cited snippet against
//! the session text it claims to come from.
//!
//! The validator trusts nothing in the agent's output: it re-runs the same
//! deterministic search the agent had access to and compares offsets. A claim
//! without evidence is never dropped; it is reported as unverifiable and
//! whether that fails the report depends on `EvidenceStrictness`.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::evidence::{EvidenceSearchTool, EvidenceSnippet};
use crate::results::{parse_result, AnalysisResult, Claim, MalformedResultError};
use crate::session::{Session, SessionError};

/// Policy for claims that carry no evidence at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStrictness {
    /// Unverifiable claims fail the report.
    #[default]
    Strict,
    /// Unverifiable claims are reported but do not fail the report.
    Lenient,
}

impl FromStr for EvidenceStrictness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(EvidenceStrictness::Strict),
            "lenient" => Ok(EvidenceStrictness::Lenient),
            other => Err(format!("unknown evidence strictness '{other}' (expected strict|lenient)")),
        }
    }
}

/// Why a cited snippet could not be confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidenceMismatch {
    EmptySnippet,
    /// The declared source is not a document the agent was allowed to read.
    ForbiddenSource,
    /// The declared source key does not exist in the session.
    MissingSource,
    /// The snippet does not occur anywhere in the source.
    NotFound,
    /// The snippet occurs, but not at the recorded offset.
    OffsetMismatch { found_at: Vec<usize> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceCheck {
    #[serde(flatten)]
    pub evidence: EvidenceSnippet,
    pub confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mismatch: Option<EvidenceMismatch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    /// Every attached snippet was found verbatim.
    Confirmed,
    /// At least one attached snippet failed.
    Unconfirmed,
    /// No evidence was attached.
    Unverifiable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimCheck {
    pub index: usize,
    pub text: String,
    pub status: ClaimStatus,
    pub evidence: Vec<EvidenceCheck>,
}

impl ClaimCheck {
    pub fn evidence_confirmed(&self) -> bool {
        self.status == ClaimStatus::Confirmed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub passed: bool,
    pub strictness: EvidenceStrictness,
    pub claims: Vec<ClaimCheck>,
}

impl ValidationReport {
    pub fn count(&self, status: ClaimStatus) -> usize {
        self.claims.iter().filter(|c| c.status == status).count()
    }

    /// Claims that count against the report under its strictness.
    pub fn failing_claims(&self) -> usize {
        match self.strictness {
            EvidenceStrictness::Strict => self.claims.len() - self.count(ClaimStatus::Confirmed),
            EvidenceStrictness::Lenient => self.count(ClaimStatus::Unconfirmed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResultValidator {
    search: EvidenceSearchTool,
    strictness: EvidenceStrictness,
}

impl ResultValidator {
    pub fn new(strictness: EvidenceStrictness) -> Self {
        Self {
            search: EvidenceSearchTool,
            strictness,
        }
    }

    /// Checks every citation in `result`. Only keys listed in `sources` may be
    /// cited; anything else, including the agent's own output, is rejected.
    pub fn validate(
        &self,
        session: &Session,
        sources: &[&str],
        result: &AnalysisResult,
    ) -> ValidationReport {
        let claims: Vec<ClaimCheck> = result
            .claims
            .iter()
            .enumerate()
            .map(|(index, claim)| self.check_claim(session, sources, index, claim))
            .collect();

        let mut report = ValidationReport {
            passed: false,
            strictness: self.strictness,
            claims,
        };
        report.passed = report.failing_claims() == 0;
        report
    }

    /// Strips the formatting envelope, parses, then validates.
    pub fn validate_raw(
        &self,
        session: &Session,
        sources: &[&str],
        raw: &str,
    ) -> Result<(AnalysisResult, ValidationReport), MalformedResultError> {
        let result = parse_result(raw)?;
        let report = self.validate(session, sources, &result);
        Ok((result, report))
    }

    fn check_claim(
        &self,
        session: &Session,
        sources: &[&str],
        index: usize,
        claim: &Claim,
    ) -> ClaimCheck {
        let evidence: Vec<EvidenceCheck> = claim
            .evidence
            .iter()
            .map(|snippet| self.check_snippet(session, sources, snippet))
            .collect();

        let status = if evidence.is_empty() {
            ClaimStatus::Unverifiable
        } else if evidence.iter().all(|e| e.confirmed) {
            ClaimStatus::Confirmed
        } else {
            ClaimStatus::Unconfirmed
        };

        ClaimCheck {
            index,
            text: claim.text.clone(),
            status,
            evidence,
        }
    }

    fn check_snippet(
        &self,
        session: &Session,
        sources: &[&str],
        snippet: &EvidenceSnippet,
    ) -> EvidenceCheck {
        let mismatch = match self.locate(session, sources, snippet) {
            Ok(()) => None,
            Err(mismatch) => Some(mismatch),
        };
        EvidenceCheck {
            evidence: snippet.clone(),
            confirmed: mismatch.is_none(),
            mismatch,
        }
    }

    fn locate(
        &self,
        session: &Session,
        sources: &[&str],
        snippet: &EvidenceSnippet,
    ) -> Result<(), EvidenceMismatch> {
        if snippet.snippet.is_empty() {
            return Err(EvidenceMismatch::EmptySnippet);
        }
        if !sources.contains(&snippet.source.as_str()) {
            return Err(EvidenceMismatch::ForbiddenSource);
        }

        let found = match self.search.search(session, &snippet.source, &snippet.snippet) {
            Ok(found) => found,
            Err(SessionError::MissingKey(_)) => return Err(EvidenceMismatch::MissingSource),
            Err(_) => return Err(EvidenceMismatch::NotFound),
        };

        let found_at: Vec<usize> = found.iter().filter_map(|s| s.offset).collect();
        match snippet.offset {
            _ if found_at.is_empty() => Err(EvidenceMismatch::NotFound),
            Some(offset) if !found_at.contains(&offset) => {
                Err(EvidenceMismatch::OffsetMismatch { found_at })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionId, CV_TEXT_KEY, JD_TEXT_KEY, SCREENING_RESULT_KEY};

    const CV_ONLY: &[&str] = &[CV_TEXT_KEY];

    fn session() -> Session {
        let session = Session::new(SessionId::new());
        session.put(CV_TEXT_KEY, "5 years of Go experience");
        session
    }

    fn claim(text: &str, evidence: Vec<EvidenceSnippet>) -> Claim {
        Claim {
            text: text.to_string(),
            evidence,
            verdict: None,
        }
    }

    fn snippet(text: &str, offset: Option<usize>) -> EvidenceSnippet {
        EvidenceSnippet {
            snippet: text.to_string(),
            source: CV_TEXT_KEY.to_string(),
            offset,
        }
    }

    fn result(claims: Vec<Claim>) -> AnalysisResult {
        AnalysisResult {
            status: None,
            decision: None,
            summary: None,
            claims,
        }
    }

    #[test]
    fn test_go_experience_claim_is_confirmed() {
        let report = ResultValidator::default().validate(
            &session(),
            CV_ONLY,
            &result(vec![claim(
                "Candidate has Go experience",
                vec![snippet("Go experience", Some(11))],
            )]),
        );

        assert!(report.passed);
        assert!(report.claims[0].evidence_confirmed());
        assert_eq!(report.claims[0].evidence[0].evidence.source, CV_TEXT_KEY);
    }

    #[test]
    fn test_rust_experience_claim_is_unconfirmed() {
        let report = ResultValidator::default().validate(
            &session(),
            CV_ONLY,
            &result(vec![
                claim("Candidate has Go experience", vec![snippet("Go experience", None)]),
                claim("Candidate has Rust experience", vec![snippet("Rust experience", None)]),
            ]),
        );

        assert!(!report.passed);
        assert_eq!(report.claims[0].status, ClaimStatus::Confirmed);
        assert_eq!(report.claims[1].status, ClaimStatus::Unconfirmed);
        assert_eq!(
            report.claims[1].evidence[0].mismatch,
            Some(EvidenceMismatch::NotFound)
        );
    }

    #[test]
    fn test_single_character_mutation_is_unconfirmed() {
        let report = ResultValidator::default().validate(
            &session(),
            CV_ONLY,
            &result(vec![claim(
                "Candidate has Go experience",
                vec![snippet("Go experiance", Some(11))],
            )]),
        );
        assert!(!report.passed);
        assert!(!report.claims[0].evidence_confirmed());
    }

    #[test]
    fn test_agent_produced_snippets_round_trip() {
        let session = session();
        let found = EvidenceSearchTool
            .search(&session, CV_TEXT_KEY, "years of Go")
            .unwrap();
        let report = ResultValidator::default()
            .validate(&session, CV_ONLY, &result(vec![claim("Has years of Go", found)]));
        assert!(report.passed);
    }

    #[test]
    fn test_wrong_offset_is_offset_mismatch() {
        let report = ResultValidator::default().validate(
            &session(),
            CV_ONLY,
            &result(vec![claim("Go", vec![snippet("Go", Some(3))])]),
        );
        assert_eq!(
            report.claims[0].evidence[0].mismatch,
            Some(EvidenceMismatch::OffsetMismatch { found_at: vec![11] })
        );
        assert!(!report.passed);
    }

    #[test]
    fn test_missing_source_is_reported_not_raised() {
        let mut cited = snippet("Go", None);
        cited.source = JD_TEXT_KEY.to_string();
        let report = ResultValidator::default().validate(
            &session(),
            &[CV_TEXT_KEY, JD_TEXT_KEY],
            &result(vec![claim("Go", vec![cited])]),
        );
        assert_eq!(
            report.claims[0].evidence[0].mismatch,
            Some(EvidenceMismatch::MissingSource)
        );
    }

    #[test]
    fn test_citing_own_output_is_forbidden() {
        let session = session();
        let raw = r#"{"claims": [{"text": "Candidate has 10 years of Rust experience", "evidence": [{"snippet": "Candidate has 10 years of Rust experience", "source": "cv_screening_result"}]}]}"#;
        session.put(SCREENING_RESULT_KEY, raw);
        session.put("pdf_resume_text.source", "inline-text");

        let (_, report) = ResultValidator::default()
            .validate_raw(&session, CV_ONLY, raw)
            .unwrap();
        assert!(!report.passed);
        assert_eq!(
            report.claims[0].evidence[0].mismatch,
            Some(EvidenceMismatch::ForbiddenSource)
        );

        let mut metadata = snippet("inline-text", None);
        metadata.source = "pdf_resume_text.source".to_string();
        let report = ResultValidator::default().validate(
            &session,
            CV_ONLY,
            &result(vec![claim("Loaded inline", vec![metadata])]),
        );
        assert_eq!(report.claims[0].status, ClaimStatus::Unconfirmed);
        assert_eq!(
            report.claims[0].evidence[0].mismatch,
            Some(EvidenceMismatch::ForbiddenSource)
        );
    }

    #[test]
    fn test_empty_snippet_is_rejected() {
        let report = ResultValidator::default()
            .validate(&session(), CV_ONLY, &result(vec![claim("Go", vec![snippet("", None)])]));
        assert_eq!(
            report.claims[0].evidence[0].mismatch,
            Some(EvidenceMismatch::EmptySnippet)
        );
    }

    #[test]
    fn test_one_bad_snippet_fails_the_claim() {
        let report = ResultValidator::default().validate(
            &session(),
            CV_ONLY,
            &result(vec![claim(
                "Go and Rust",
                vec![snippet("Go", Some(11)), snippet("Rust", None)],
            )]),
        );
        assert_eq!(report.claims[0].status, ClaimStatus::Unconfirmed);
        assert!(report.claims[0].evidence[0].confirmed);
    }

    #[test]
    fn test_claim_without_evidence_fails_when_strict() {
        let report = ResultValidator::new(EvidenceStrictness::Strict)
            .validate(&session(), CV_ONLY, &result(vec![claim("Great communicator", vec![])]));
        assert!(!report.passed);
        assert_eq!(report.count(ClaimStatus::Unverifiable), 1);
    }

    #[test]
    fn test_claim_without_evidence_is_kept_but_passes_when_lenient() {
        let report = ResultValidator::new(EvidenceStrictness::Lenient)
            .validate(&session(), CV_ONLY, &result(vec![claim("Great communicator", vec![])]));
        assert!(report.passed);
        assert_eq!(report.claims.len(), 1);
        assert_eq!(report.claims[0].status, ClaimStatus::Unverifiable);
    }

    #[test]
    fn test_lenient_still_fails_on_mismatch() {
        let report = ResultValidator::new(EvidenceStrictness::Lenient).validate(
            &session(),
            CV_ONLY,
            &result(vec![claim("Rust", vec![snippet("Rust", None)])]),
        );
        assert!(!report.passed);
    }

    #[test]
    fn test_validate_raw_strips_fence() {
        let raw = "```json\n{\"claims\": [{\"text\": \"Candidate has Go experience\", \"evidence\": [{\"snippet\": \"Go experience\", \"source\": \"pdf_resume_text\", \"offset\": 11}]}]}\n```";
        let (parsed, report) = ResultValidator::default()
            .validate_raw(&session(), CV_ONLY, raw)
            .unwrap();
        assert_eq!(parsed.claims.len(), 1);
        assert!(report.passed);
    }

    #[test]
    fn test_validate_raw_malformed() {
        let err = ResultValidator::default()
            .validate_raw(&session(), CV_ONLY, "```json\nnot json\n```")
            .unwrap_err();
        assert!(matches!(err, MalformedResultError::Parse(_)));
    }

    #[test]
    fn test_strictness_from_str() {
        assert_eq!("Lenient".parse::<EvidenceStrictness>().unwrap(), EvidenceStrictness::Lenient);
        assert_eq!(" strict ".parse::<EvidenceStrictness>().unwrap(), EvidenceStrictness::Strict);
        assert!("warn".parse::<EvidenceStrictness>().is_err());
    }
}
