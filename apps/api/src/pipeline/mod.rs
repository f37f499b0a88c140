//! Screening pipeline: loads both documents, fans out to the analysis agents,
//! joins them, and validates every result.
//!
//! State machine:
//!
//! ```text
//! Idle → Loading → Analyzing → Validating → Done
//!   └──────┴──────────┴────────────┴──────→ Failed(reason)
//! ```
//!
//! Loading is a barrier: analysis never starts unless both loaders wrote their
//! text. A capability violation aborts the sibling agent; any other agent
//! failure is recorded and the sibling runs to completion. Evidence mismatch is
//! a separate failure from execution failure.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::agents::{
    Agent, AgentError, AgentKind, AgentOutput, DocumentSource, GenerationError, LoaderAgent,
    LoaderOptions, TextExtractor,
};
use crate::results::AnalysisResult;
use crate::session::{Session, SessionError, SessionId, SessionStore};
use crate::validation::{ResultValidator, ValidationReport};

pub mod handlers;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The run never started.
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// A loader's collaborator produced no text.
    Extraction { agent: AgentKind, message: String },
    /// An agent asked for a tool outside its declared set.
    CapabilityViolation { agent: AgentKind, message: String },
    /// Session sequencing error, e.g. a key missing when it must exist.
    Session { message: String },
    /// One or both analysis agents failed or produced a malformed result.
    AgentExecution { agents: Vec<AgentKind> },
    /// Execution succeeded but cited evidence did not check out.
    EvidenceMismatch { failing_claims: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Loading,
    Analyzing,
    Validating,
    Done,
    Failed(FailureReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Completed,
    MalformedResult,
    GenerationUnavailable,
    TimedOut,
    Failed,
    /// Aborted because its sibling hit a fatal error.
    Cancelled,
}

/// One analysis agent's contribution to the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRun {
    pub agent: AgentKind,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    pub unsourced_citations: usize,
}

impl AgentRun {
    fn completed(output: AgentOutput) -> Self {
        Self {
            agent: output.agent,
            status: AgentStatus::Completed,
            error: None,
            raw_output: Some(output.text),
            result: None,
            validation: None,
            unsourced_citations: output.unsourced_citations,
        }
    }

    fn failed(agent: AgentKind, status: AgentStatus, error: String) -> Self {
        Self {
            agent,
            status,
            error: Some(error),
            raw_output: None,
            result: None,
            validation: None,
            unsourced_citations: 0,
        }
    }

    fn from_error(agent: AgentKind, error: &AgentError) -> Self {
        let status = match error {
            AgentError::Timeout { .. } => AgentStatus::TimedOut,
            AgentError::Generation(GenerationError::Unavailable(_)) => {
                AgentStatus::GenerationUnavailable
            }
            _ => AgentStatus::Failed,
        };
        Self::failed(agent, status, error.to_string())
    }
}

/// Everything a caller learns about one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub session_id: SessionId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub transitions: Vec<PipelineState>,
    pub final_state: PipelineState,
    /// All agents ran to completion with parseable output.
    pub execution_succeeded: bool,
    /// Every cited snippet was confirmed verbatim in a readable document.
    pub evidence_trusted: bool,
    pub screening: Option<AgentRun>,
    pub matching: Option<AgentRun>,
    /// Session keys at the end of the run.
    pub session_keys: Vec<String>,
}

fn execution_succeeded(state: &PipelineState) -> bool {
    matches!(
        state,
        PipelineState::Done | PipelineState::Failed(FailureReason::EvidenceMismatch { .. })
    )
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub loader: LoaderOptions,
    pub agent_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            loader: LoaderOptions::default(),
            agent_timeout: Duration::from_secs(120),
        }
    }
}

/// Input documents for one run.
#[derive(Debug, Clone)]
pub struct ScreeningInput {
    pub session_id: SessionId,
    pub cv: DocumentSource,
    pub jd: DocumentSource,
}

#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn SessionStore>,
    extractor: Arc<dyn TextExtractor>,
    screening: Arc<dyn Agent>,
    matching: Arc<dyn Agent>,
    validator: ResultValidator,
    options: PipelineOptions,
}

/// Records transitions and logs them.
struct StateTracker {
    session_id: SessionId,
    transitions: Vec<PipelineState>,
}

impl StateTracker {
    fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            transitions: vec![PipelineState::Idle],
        }
    }

    fn enter(&mut self, state: PipelineState) {
        match &state {
            PipelineState::Failed(reason) => {
                warn!("Session {} → failed: {reason:?}", self.session_id)
            }
            other => info!("Session {} → {other:?}", self.session_id),
        }
        self.transitions.push(state);
    }

    fn current(&self) -> &PipelineState {
        self.transitions.last().unwrap_or(&PipelineState::Idle)
    }
}

/// Owns a live session for the duration of one run. Closes it on drop as well,
/// so a cancelled run never leaves its id locked.
struct SessionLease {
    store: Arc<dyn SessionStore>,
    id: SessionId,
    released: bool,
}

impl SessionLease {
    fn new(store: Arc<dyn SessionStore>, id: SessionId) -> Self {
        Self {
            store,
            id,
            released: false,
        }
    }

    async fn release(mut self) {
        if let Err(e) = self.store.close(self.id).await {
            warn!("Failed to close session {}: {e}", self.id);
        }
        self.released = true;
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!("Run for session {} was dropped before finishing", self.id);

        let store = self.store.clone();
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = store.close(id).await {
                        warn!("Failed to close session {id}: {e}");
                    }
                });
            }
            Err(_) => warn!("No runtime left to close session {id}"),
        }
    }
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        extractor: Arc<dyn TextExtractor>,
        screening: Arc<dyn Agent>,
        matching: Arc<dyn Agent>,
        validator: ResultValidator,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            extractor,
            screening,
            matching,
            validator,
            options,
        }
    }

    /// Runs the pipeline once. `Err` only when the session could not be
    /// opened; every in-run failure ends in `PipelineState::Failed`.
    pub async fn run(&self, input: ScreeningInput) -> Result<PipelineRun, PipelineError> {
        let started_at = Utc::now();
        let session = self.store.create(input.session_id).await?;
        let lease = SessionLease::new(self.store.clone(), session.id());
        let mut tracker = StateTracker::new(input.session_id);

        info!(
            "Starting screening run {} (cv: {}, jd: {})",
            input.session_id,
            input.cv.identifier(),
            input.jd.identifier()
        );

        let (screening, matching) = self.execute(&session, input, &mut tracker).await;
        lease.release().await;

        let final_state = tracker.current().clone();
        Ok(PipelineRun {
            session_id: session.id(),
            started_at,
            finished_at: Utc::now(),
            transitions: tracker.transitions,
            execution_succeeded: execution_succeeded(&final_state),
            evidence_trusted: final_state == PipelineState::Done,
            final_state,
            screening,
            matching,
            session_keys: session.keys(),
        })
    }

    async fn execute(
        &self,
        session: &Arc<Session>,
        input: ScreeningInput,
        tracker: &mut StateTracker,
    ) -> (Option<AgentRun>, Option<AgentRun>) {
        tracker.enter(PipelineState::Loading);
        if let Err(reason) = self.load_documents(session, input).await {
            tracker.enter(PipelineState::Failed(reason));
            return (None, None);
        }

        tracker.enter(PipelineState::Analyzing);
        let (mut screening, mut matching) = match self.analyze(session).await {
            Ok(runs) => runs,
            Err((reason, screening, matching)) => {
                tracker.enter(PipelineState::Failed(reason));
                return (screening, matching);
            }
        };

        tracker.enter(PipelineState::Validating);
        for run in [&mut screening, &mut matching] {
            self.validate_run(session, run);
        }

        let failed_agents: Vec<AgentKind> = [&screening, &matching]
            .into_iter()
            .filter(|run| run.status != AgentStatus::Completed)
            .map(|run| run.agent)
            .collect();
        let failing_claims: usize = [&screening, &matching]
            .into_iter()
            .filter_map(|run| run.validation.as_ref())
            .map(|report| report.failing_claims())
            .sum();

        let final_state = if !failed_agents.is_empty() {
            PipelineState::Failed(FailureReason::AgentExecution {
                agents: failed_agents,
            })
        } else if failing_claims > 0 {
            PipelineState::Failed(FailureReason::EvidenceMismatch { failing_claims })
        } else {
            PipelineState::Done
        };
        tracker.enter(final_state);

        (Some(screening), Some(matching))
    }

    /// Runs both loaders concurrently. The first failure drops the other.
    async fn load_documents(
        &self,
        session: &Session,
        input: ScreeningInput,
    ) -> Result<(), FailureReason> {
        let cv = LoaderAgent::cv(input.cv, self.extractor.clone(), self.options.loader);
        let jd = LoaderAgent::jd(input.jd, self.extractor.clone(), self.options.loader);

        tokio::try_join!(
            async { cv.run(session).await.map_err(|e| (cv.kind(), e)) },
            async { jd.run(session).await.map_err(|e| (jd.kind(), e)) },
        )
        .map(|_| ())
        .map_err(|(agent, e)| failure_reason(agent, &e))
    }

    /// Fans out to both analysis agents and joins them.
    #[allow(clippy::type_complexity)]
    async fn analyze(
        &self,
        session: &Arc<Session>,
    ) -> Result<(AgentRun, AgentRun), (FailureReason, Option<AgentRun>, Option<AgentRun>)> {
        let mut tasks = JoinSet::new();
        for agent in [self.screening.clone(), self.matching.clone()] {
            let session = session.clone();
            let timeout = self.options.agent_timeout;
            tasks.spawn(async move {
                let kind = agent.kind();
                let result = tokio::time::timeout(timeout, agent.run(&session))
                    .await
                    .unwrap_or(Err(AgentError::Timeout {
                        agent: kind,
                        after: timeout,
                    }));
                (kind, result)
            });
        }

        let mut screening = None;
        let mut matching = None;
        while let Some(joined) = tasks.join_next().await {
            let (kind, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    warn!("Analysis task did not complete: {e}");
                    continue;
                }
            };

            let run = match result {
                Ok(output) => AgentRun::completed(output),
                Err(e) if e.is_fatal() => {
                    tasks.abort_all();
                    let reason = failure_reason(kind, &e);
                    let failed = AgentRun::from_error(kind, &e);
                    let cancelled = |other: AgentKind| {
                        AgentRun::failed(
                            other,
                            AgentStatus::Cancelled,
                            format!("cancelled after {kind} failed"),
                        )
                    };
                    let (screening, matching) = match kind {
                        AgentKind::Matching => (
                            screening.or_else(|| Some(cancelled(self.screening.kind()))),
                            Some(failed),
                        ),
                        _ => (
                            Some(failed),
                            matching.or_else(|| Some(cancelled(self.matching.kind()))),
                        ),
                    };
                    return Err((reason, screening, matching));
                }
                Err(e) => {
                    warn!("{kind} failed: {e}");
                    AgentRun::from_error(kind, &e)
                }
            };

            match kind {
                AgentKind::Matching => matching = Some(run),
                _ => screening = Some(run),
            }
        }

        let missing = |agent: AgentKind| {
            AgentRun::failed(agent, AgentStatus::Failed, "task panicked".to_string())
        };
        Ok((
            screening.unwrap_or_else(|| missing(self.screening.kind())),
            matching.unwrap_or_else(|| missing(self.matching.kind())),
        ))
    }

    fn validate_run(&self, session: &Session, run: &mut AgentRun) {
        let Some(raw) = run.raw_output.as_deref() else {
            return;
        };

        match self
            .validator
            .validate_raw(session, run.agent.readable_keys(), raw)
        {
            Ok((result, report)) => {
                info!(
                    "{}: {}/{} claims confirmed",
                    run.agent,
                    report.claims.len() - report.failing_claims(),
                    report.claims.len()
                );
                run.result = Some(result);
                run.validation = Some(report);
            }
            Err(e) => {
                warn!("{} produced a malformed result: {e}", run.agent);
                run.status = AgentStatus::MalformedResult;
                run.error = Some(e.to_string());
            }
        }
    }
}

fn failure_reason(agent: AgentKind, error: &AgentError) -> FailureReason {
    match error {
        AgentError::Extraction(e) => FailureReason::Extraction {
            agent,
            message: e.to_string(),
        },
        AgentError::CapabilityViolation { .. } => FailureReason::CapabilityViolation {
            agent,
            message: error.to_string(),
        },
        AgentError::Session(e) => FailureReason::Session {
            message: e.to_string(),
        },
        _ => FailureReason::AgentExecution {
            agents: vec![agent],
        },
    }
}
