use std::sync::Arc;

use async_trait::async_trait;

use super::analysis::{run_analysis, AnalysisOptions, AnalysisTask};
use super::backend::GenerationBackend;
use super::prompts::{SCREENING_PROMPT_TEMPLATE, SCREENING_SYSTEM};
use super::{Agent, AgentError, AgentKind, AgentOutput, CapabilitySet};
use crate::llm_client::prompts::{EVIDENCE_INSTRUCTION, JSON_INSTRUCTION};
use crate::session::{Session, CV_TEXT_KEY, SCREENING_RESULT_KEY};

/// Checks the resume for sufficient, consistent information. Reads only the
/// CV text and may only search it.
pub struct ScreeningAgent {
    backend: Arc<dyn GenerationBackend>,
    options: AnalysisOptions,
}

impl ScreeningAgent {
    pub fn new(backend: Arc<dyn GenerationBackend>, options: AnalysisOptions) -> Self {
        Self { backend, options }
    }
}

#[async_trait]
impl Agent for ScreeningAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Screening
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::ANALYSIS
    }

    async fn run(&self, session: &Session) -> Result<AgentOutput, AgentError> {
        let cv_text = session.get(CV_TEXT_KEY)?;
        let prompt = SCREENING_PROMPT_TEMPLATE
            .replace("{evidence_instruction}", EVIDENCE_INSTRUCTION)
            .replace("{json_instruction}", JSON_INSTRUCTION)
            .replace("{cv_key}", CV_TEXT_KEY)
            .replace("{cv_text}", &cv_text);

        run_analysis(
            self.backend.as_ref(),
            session,
            AnalysisTask {
                agent: self.kind(),
                capabilities: self.capabilities(),
                system: SCREENING_SYSTEM,
                prompt,
                readable_keys: self
                    .kind()
                    .readable_keys()
                    .iter()
                    .map(|k| k.to_string())
                    .collect(),
                result_key: SCREENING_RESULT_KEY,
            },
            self.options,
        )
        .await
    }
}
