//! Evidence retrieval: deterministic, exact-substring search over session text.
//!
//! Every snippet an agent may cite originates here, and the validator re-runs
//! the same search to confirm it. Matching is case-sensitive and offsets are
//! counted in characters, not bytes.

use serde::{Deserialize, Serialize};

use crate::session::{Session, SessionError};

/// Characters of surrounding text returned with each hit.
pub const DEFAULT_SNIPPET_RADIUS: usize = 80;
/// Hits returned per source key by a context search.
pub const DEFAULT_MAX_MATCHES: usize = 5;

/// A literal substring of a session value, cited as proof for a claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvidenceSnippet {
    pub snippet: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

/// A search hit plus the text around it, as shown to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextualHit {
    #[serde(flatten)]
    pub evidence: EvidenceSnippet,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceHits {
    pub source: String,
    pub hits: Vec<ContextualHit>,
}

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub snippet_radius: usize,
    pub max_matches: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            snippet_radius: DEFAULT_SNIPPET_RADIUS,
            max_matches: DEFAULT_MAX_MATCHES,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EvidenceSearchTool;

impl EvidenceSearchTool {
    /// Returns every non-overlapping occurrence of `query` in the text stored
    /// under `source_key`, left to right. No match (or an empty query) yields
    /// an empty vec.
    pub fn search(
        &self,
        session: &Session,
        source_key: &str,
        query: &str,
    ) -> Result<Vec<EvidenceSnippet>, SessionError> {
        let text = session.get(source_key)?;
        Ok(find_matches(&text, query)
            .into_iter()
            .map(|offset| EvidenceSnippet {
                snippet: query.to_string(),
                source: source_key.to_string(),
                offset: Some(offset),
            })
            .collect())
    }

    /// Like `search`, but capped at `max_matches` hits and carrying a context
    /// window of `snippet_radius` characters on each side.
    pub fn search_with_context(
        &self,
        session: &Session,
        source_key: &str,
        query: &str,
        options: SearchOptions,
    ) -> Result<SourceHits, SessionError> {
        let text = session.get(source_key)?;
        let chars: Vec<char> = text.chars().collect();
        let query_len = query.chars().count();

        let hits = find_matches(&text, query)
            .into_iter()
            .take(options.max_matches)
            .map(|offset| {
                let start = offset.saturating_sub(options.snippet_radius);
                let end = (offset + query_len + options.snippet_radius).min(chars.len());
                ContextualHit {
                    evidence: EvidenceSnippet {
                        snippet: query.to_string(),
                        source: source_key.to_string(),
                        offset: Some(offset),
                    },
                    context: chars[start..end].iter().collect(),
                }
            })
            .collect();

        Ok(SourceHits {
            source: source_key.to_string(),
            hits,
        })
    }

    /// Searches several keys in order, omitting keys with no hits.
    pub fn search_many(
        &self,
        session: &Session,
        source_keys: &[String],
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<SourceHits>, SessionError> {
        let mut results = Vec::new();
        for key in source_keys {
            let found = self.search_with_context(session, key, query, options)?;
            if !found.hits.is_empty() {
                results.push(found);
            }
        }
        Ok(results)
    }
}

/// Character offset of each non-overlapping match.
fn find_matches(text: &str, query: &str) -> Vec<usize> {
    if query.is_empty() {
        return Vec::new();
    }

    let mut matches = Vec::new();
    let mut chars_seen = 0;
    let mut bytes_seen = 0;
    for (byte_offset, _) in text.match_indices(query) {
        chars_seen += text[bytes_seen..byte_offset].chars().count();
        bytes_seen = byte_offset;
        matches.push(chars_seen);
    }
    matches
}
