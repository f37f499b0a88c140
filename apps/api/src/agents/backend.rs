//! Generation backend port: a black-box producer of text and tool requests.
//!
//! `LlmClient` implements this against the Anthropic Messages API; tests
//! script it directly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use super::ToolKind;

#[derive(Debug, Error)]
pub enum GenerationError {
    /// Quota exhausted or backend down. Retryable by the caller with backoff.
    #[error("Generation backend unavailable: {0}")]
    Unavailable(String),

    #[error("Generation backend error: {0}")]
    Backend(String),

    #[error("Generation backend returned no text and no tool calls")]
    EmptyContent,
}

/// A tool request emitted by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    User(String),
    Assistant {
        text: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    ToolResults(Vec<ToolResult>),
}

pub struct GenerationRequest<'a> {
    pub system: &'a str,
    pub messages: &'a [Message],
    /// Tools the model is told about. Only the caller's permitted set.
    pub tools: &'a [ToolKind],
}

/// One model turn: final text, tool requests, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generation {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl Generation {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: vec![],
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            text: None,
            tool_calls: calls,
        }
    }
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<Generation, GenerationError>;
}

/// Tool description and JSON input schema advertised to the model.
pub fn tool_definition(tool: ToolKind) -> Value {
    match tool {
        ToolKind::SearchEvidence => json!({
            "name": tool.name(),
            "description": "Searches session memory for an exact, case-sensitive substring and \
                returns every match with its character offset and surrounding context. \
                Cite only snippets returned by this tool.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Exact text to find."},
                    "memory_keys": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Session keys to search. Defaults to every document the agent may read."
                    }
                },
                "required": ["query"]
            }
        }),
    }
}
