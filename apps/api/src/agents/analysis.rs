//! Shared tool loop for the screening and matching agents.
//!
//! The model answers with either final text or tool requests. Each request is
//! checked against the agent's capability set, executed against session
//! memory, and fed back. Every snippet the search returns is remembered so the
//! final answer's citations can be traced to a real search.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::backend::{GenerationBackend, GenerationError, GenerationRequest, Message, ToolCall, ToolResult};
use super::{AgentError, AgentKind, AgentOutput, CapabilitySet, ToolKind};
use crate::evidence::{EvidenceSearchTool, EvidenceSnippet, SearchOptions};
use crate::results::parse_result;
use crate::session::Session;

pub const DEFAULT_MAX_TOOL_TURNS: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct AnalysisOptions {
    pub max_tool_turns: usize,
    pub search: SearchOptions,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            max_tool_turns: DEFAULT_MAX_TOOL_TURNS,
            search: SearchOptions::default(),
        }
    }
}

/// Everything one analysis run needs besides the backend.
pub struct AnalysisTask<'a> {
    pub agent: AgentKind,
    pub capabilities: CapabilitySet,
    pub system: &'a str,
    pub prompt: String,
    /// Session keys the agent may search.
    pub readable_keys: Vec<String>,
    /// Where the raw output is written.
    pub result_key: &'static str,
}

#[derive(Debug, Deserialize)]
struct SearchInput {
    query: String,
    #[serde(default)]
    memory_keys: Option<Vec<String>>,
}

/// Per-run tool state: capability gate plus the provenance log of search hits.
pub struct ToolContext<'a> {
    agent: AgentKind,
    capabilities: CapabilitySet,
    session: &'a Session,
    readable_keys: &'a [String],
    search: SearchOptions,
    provenance: HashSet<(String, String, usize)>,
}

impl<'a> ToolContext<'a> {
    pub fn new(
        agent: AgentKind,
        capabilities: CapabilitySet,
        session: &'a Session,
        readable_keys: &'a [String],
        search: SearchOptions,
    ) -> Self {
        Self {
            agent,
            capabilities,
            session,
            readable_keys,
            search,
            provenance: HashSet::new(),
        }
    }

    /// Runs one tool request. Capability violations abort; bad input is
    /// reported back to the model as a tool error.
    pub fn invoke(&mut self, call: &ToolCall) -> Result<ToolResult, AgentError> {
        let tool = self.capabilities.require(self.agent, &call.name)?;
        debug!("[{}] tool call {} {}", self.agent, call.name, call.input);

        match tool {
            ToolKind::SearchEvidence => self.search_evidence(call),
        }
    }

    fn search_evidence(&mut self, call: &ToolCall) -> Result<ToolResult, AgentError> {
        let input: SearchInput = match serde_json::from_value(call.input.clone()) {
            Ok(input) => input,
            Err(e) => return Ok(tool_error(call, &format!("invalid input: {e}"))),
        };

        let query = input.query.trim();
        if query.is_empty() {
            return Ok(tool_error(call, "Query string is empty"));
        }

        let keys = input
            .memory_keys
            .unwrap_or_else(|| self.readable_keys.to_vec());
        if let Some(denied) = keys.iter().find(|k| !self.readable_keys.contains(k)) {
            return Ok(tool_error(
                call,
                &format!("memory key '{denied}' is not readable by {}", self.agent),
            ));
        }

        let matches = EvidenceSearchTool.search_many(self.session, &keys, query, self.search)?;
        for hit in matches.iter().flat_map(|m| m.hits.iter()) {
            if let Some(offset) = hit.evidence.offset {
                self.provenance.insert((
                    hit.evidence.source.clone(),
                    hit.evidence.snippet.clone(),
                    offset,
                ));
            }
        }

        let content = json!({
            "status": "success",
            "query": query,
            "matches": matches,
        });
        Ok(ToolResult {
            call_id: call.id.clone(),
            content: content.to_string(),
            is_error: false,
        })
    }

    /// Whether `snippet` was returned by a search during this run.
    pub fn was_returned(&self, snippet: &EvidenceSnippet) -> bool {
        match snippet.offset {
            Some(offset) => self.provenance.contains(&(
                snippet.source.clone(),
                snippet.snippet.clone(),
                offset,
            )),
            None => self
                .provenance
                .iter()
                .any(|(source, text, _)| *source == snippet.source && *text == snippet.snippet),
        }
    }
}

fn tool_error(call: &ToolCall, message: &str) -> ToolResult {
    ToolResult {
        call_id: call.id.clone(),
        content: json!({"status": "error", "error_message": message}).to_string(),
        is_error: true,
    }
}

/// Drives the model until it produces final text, then writes that text to
/// the session under the task's result key.
pub async fn run_analysis(
    backend: &dyn GenerationBackend,
    session: &Session,
    task: AnalysisTask<'_>,
    options: AnalysisOptions,
) -> Result<AgentOutput, AgentError> {
    let mut tools = ToolContext::new(
        task.agent,
        task.capabilities,
        session,
        &task.readable_keys,
        options.search,
    );
    let mut messages = vec![Message::User(task.prompt)];

    for turn in 0..options.max_tool_turns {
        let generation = backend
            .generate(GenerationRequest {
                system: task.system,
                messages: &messages,
                tools: task.capabilities.tools(),
            })
            .await?;

        if generation.tool_calls.is_empty() {
            let text = generation
                .text
                .filter(|t| !t.trim().is_empty())
                .ok_or(GenerationError::EmptyContent)?;
            let unsourced_citations = count_unsourced(task.agent, &tools, &text);

            session.put_once(task.result_key, text.clone())?;
            debug!("[{}] finished after {} turns", task.agent, turn + 1);

            return Ok(AgentOutput {
                agent: task.agent,
                text,
                writes: vec![task.result_key.to_string()],
                unsourced_citations,
            });
        }

        let mut results = Vec::with_capacity(generation.tool_calls.len());
        for call in &generation.tool_calls {
            results.push(tools.invoke(call)?);
        }
        messages.push(Message::Assistant {
            text: generation.text,
            tool_calls: generation.tool_calls,
        });
        messages.push(Message::ToolResults(results));
    }

    Err(AgentError::ToolLoopExhausted {
        agent: task.agent,
        turns: options.max_tool_turns,
    })
}

/// Counts citations the model wrote without a backing search hit. Output that
/// does not parse is left for the validator to reject.
fn count_unsourced(agent: AgentKind, tools: &ToolContext<'_>, text: &str) -> usize {
    let Ok(result) = parse_result(text) else {
        warn!("[{agent}] output does not match the claims schema");
        return 0;
    };

    let unsourced = result.citations().filter(|s| !tools.was_returned(s)).count();
    if unsourced > 0 {
        warn!("[{agent}] {unsourced} citation(s) were not returned by any search_memory call");
    }
    unsourced
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted generation backend shared by agent and pipeline tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::agents::backend::Generation;

    /// Replays a fixed sequence of generations and records every request.
    pub struct ScriptedBackend {
        script: Mutex<VecDeque<Result<Generation, GenerationError>>>,
        pub requests: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedBackend {
        pub fn new(script: Vec<Result<Generation, GenerationError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                requests: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedBackend {
        async fn generate(&self, request: GenerationRequest<'_>) -> Result<Generation, GenerationError> {
            self.requests.lock().unwrap().push(request.messages.to_vec());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(GenerationError::EmptyContent))
        }
    }

    pub fn call(id: &str, name: &str, input: Value) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            input,
        }
    }

    pub fn search(id: &str, query: &str) -> Generation {
        Generation::tool_calls(vec![call(id, "search_memory", json!({ "query": query }))])
    }
}
