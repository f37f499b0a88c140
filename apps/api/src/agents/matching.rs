use std::sync::Arc;

use async_trait::async_trait;

use super::analysis::{run_analysis, AnalysisOptions, AnalysisTask};
use super::backend::GenerationBackend;
use super::prompts::{MATCHING_PROMPT_TEMPLATE, MATCHING_SYSTEM};
use super::{Agent, AgentError, AgentKind, AgentOutput, CapabilitySet};
use crate::llm_client::prompts::{EVIDENCE_INSTRUCTION, JSON_INSTRUCTION};
use crate::session::{Session, CV_TEXT_KEY, JD_TEXT_KEY, MATCHING_RESULT_KEY};

/// Matches the resume against the job description and returns a fit verdict
/// with rationale. May search both documents.
pub struct MatchingAgent {
    backend: Arc<dyn GenerationBackend>,
    options: AnalysisOptions,
}

impl MatchingAgent {
    pub fn new(backend: Arc<dyn GenerationBackend>, options: AnalysisOptions) -> Self {
        Self { backend, options }
    }
}

#[async_trait]
impl Agent for MatchingAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Matching
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::ANALYSIS
    }

    async fn run(&self, session: &Session) -> Result<AgentOutput, AgentError> {
        let cv_text = session.get(CV_TEXT_KEY)?;
        let jd_text = session.get(JD_TEXT_KEY)?;
        let prompt = MATCHING_PROMPT_TEMPLATE
            .replace("{evidence_instruction}", EVIDENCE_INSTRUCTION)
            .replace("{json_instruction}", JSON_INSTRUCTION)
            .replace("{cv_key}", CV_TEXT_KEY)
            .replace("{jd_key}", JD_TEXT_KEY)
            .replace("{cv_text}", &cv_text)
            .replace("{jd_text}", &jd_text);

        run_analysis(
            self.backend.as_ref(),
            session,
            AnalysisTask {
                agent: self.kind(),
                capabilities: self.capabilities(),
                system: MATCHING_SYSTEM,
                prompt,
                readable_keys: self
                    .kind()
                    .readable_keys()
                    .iter()
                    .map(|k| k.to_string())
                    .collect(),
                result_key: MATCHING_RESULT_KEY,
            },
            self.options,
        )
        .await
    }
}
