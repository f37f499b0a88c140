use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::agents::loader::DEFAULT_MAX_DOCUMENT_CHARS;
use crate::agents::analysis::DEFAULT_MAX_TOOL_TURNS;
use crate::validation::EvidenceStrictness;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    pub agent_timeout: Duration,
    pub extraction_timeout: Duration,
    pub max_document_chars: usize,
    pub max_tool_turns: usize,
    pub evidence_strictness: EvidenceStrictness,
    /// Accept `{"path": ...}` document sources over HTTP.
    pub allow_local_paths: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            agent_timeout: Duration::from_secs(parse_env("AGENT_TIMEOUT_SECS", 120)?),
            extraction_timeout: Duration::from_secs(parse_env("EXTRACTION_TIMEOUT_SECS", 30)?),
            max_document_chars: parse_env("MAX_DOCUMENT_CHARS", DEFAULT_MAX_DOCUMENT_CHARS)?,
            max_tool_turns: parse_env("MAX_TOOL_TURNS", DEFAULT_MAX_TOOL_TURNS)?,
            evidence_strictness: match std::env::var("EVIDENCE_STRICTNESS") {
                Ok(value) => value
                    .parse()
                    .map_err(|e: String| anyhow!(e))
                    .context("EVIDENCE_STRICTNESS must be 'strict' or 'lenient'")?,
                Err(_) => EvidenceStrictness::default(),
            },
            allow_local_paths: parse_env("ALLOW_LOCAL_PATHS", false)?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => Ok(default),
    }
}
