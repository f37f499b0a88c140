//! Agents: the units of work the orchestrator schedules.
//!
//! Every agent declares a finite capability set up front. Each tool
//! invocation is checked against that set before it runs; asking for anything
//! else is a `CapabilityViolation`, never a silent allowance.
//!
//! Loaders populate session memory from the text-extraction collaborator and
//! are granted no tools.
//! Screening and matching agents drive the generation backend through a
//! bounded tool loop and write the model's raw output back to the session.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{Session, SessionError, CV_TEXT_KEY, JD_TEXT_KEY};

pub mod analysis;
pub mod backend;
pub mod extraction;
pub mod loader;
pub mod matching;
pub mod prompts;
pub mod screening;

pub use backend::{GenerationBackend, GenerationError};
pub use extraction::{DocumentSource, ExtractionError, PdfTextExtractor, TextExtractor};
pub use loader::{LoaderAgent, LoaderOptions};
pub use matching::MatchingAgent;
pub use screening::ScreeningAgent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    CvLoader,
    JdLoader,
    Screening,
    Matching,
}

impl AgentKind {
    /// Session keys whose text this agent may read and cite.
    pub fn readable_keys(self) -> &'static [&'static str] {
        match self {
            AgentKind::CvLoader | AgentKind::JdLoader => &[],
            AgentKind::Screening => &[CV_TEXT_KEY],
            AgentKind::Matching => &[CV_TEXT_KEY, JD_TEXT_KEY],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AgentKind::CvLoader => "cv_loader_agent",
            AgentKind::JdLoader => "jd_loader_agent",
            AgentKind::Screening => "cv_screening_agent",
            AgentKind::Matching => "talent_matching_agent",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tools an agent may be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Exact-substring search over session memory.
    SearchEvidence,
}

impl ToolKind {
    pub const ALL: [ToolKind; 1] = [ToolKind::SearchEvidence];

    /// Name the generation backend sees and calls the tool by.
    pub fn name(self) -> &'static str {
        match self {
            ToolKind::SearchEvidence => "search_memory",
        }
    }

    pub fn from_name(name: &str) -> Option<ToolKind> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }
}

/// The fixed set of tools granted to one agent variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilitySet(&'static [ToolKind]);

impl CapabilitySet {
    pub const ANALYSIS: CapabilitySet = CapabilitySet(&[ToolKind::SearchEvidence]);
    pub const NONE: CapabilitySet = CapabilitySet(&[]);

    pub fn allows(self, tool: ToolKind) -> bool {
        self.0.contains(&tool)
    }

    pub fn tools(self) -> &'static [ToolKind] {
        self.0
    }

    /// Checks a tool request by name. Unknown names are violations too.
    pub fn require(self, agent: AgentKind, tool_name: &str) -> Result<ToolKind, AgentError> {
        match ToolKind::from_name(tool_name) {
            Some(tool) if self.allows(tool) => Ok(tool),
            _ => Err(AgentError::CapabilityViolation {
                agent,
                tool: tool_name.to_string(),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("{agent} invoked '{tool}', which is outside its declared capabilities")]
    CapabilityViolation { agent: AgentKind, tool: String },

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("{agent} did not finish within {}s", .after.as_secs())]
    Timeout { agent: AgentKind, after: Duration },

    #[error("{agent} was still calling tools after {turns} turns")]
    ToolLoopExhausted { agent: AgentKind, turns: usize },
}

impl AgentError {
    /// Failures that end the whole run immediately.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AgentError::Extraction(_) | AgentError::CapabilityViolation { .. }
        )
    }
}

/// What an agent hands back to the orchestrator.
#[derive(Debug, Clone)]
pub struct AgentOutput {
    pub agent: AgentKind,
    /// The agent's raw text. Structure is imposed later by parsing.
    pub text: String,
    /// Session keys written by this invocation.
    pub writes: Vec<String>,
    /// Citations whose snippet never came back from one of this agent's searches.
    pub unsourced_citations: usize,
}

/// The capability "given a session and a declared tool set, produce text and
/// apply zero or more writes to the session".
#[async_trait]
pub trait Agent: Send + Sync {
    fn kind(&self) -> AgentKind;

    fn capabilities(&self) -> CapabilitySet;

    async fn run(&self, session: &Session) -> Result<AgentOutput, AgentError>;
}
