//! Session memory: the key/value scope of one screening run.
//!
//! Loaders write document text here, analysis agents read it and write their
//! raw results back, and the validator re-reads everything afterwards.
//! A `Session` is handed around explicitly as `Arc<Session>`; there is no
//! process-wide default session.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod store;

pub use store::{InMemorySessionStore, SessionStore};

/// Resume text written by the CV loader.
pub const CV_TEXT_KEY: &str = "pdf_resume_text";
/// Job description text written by the JD loader.
pub const JD_TEXT_KEY: &str = "job_description_text";
/// Raw output of the screening agent.
pub const SCREENING_RESULT_KEY: &str = "cv_screening_result";
/// Raw output of the matching agent.
pub const MATCHING_RESULT_KEY: &str = "talent_matching_result";

/// Key under which a document's source identifier is recorded.
pub fn source_key(text_key: &str) -> String {
    format!("{text_key}.source")
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session key '{0}' is not set")]
    MissingKey(String),

    #[error("Session key '{0}' was already written in this run")]
    AlreadyWritten(String),

    #[error("Session '{0}' is already in use by another run")]
    SessionInUse(SessionId),

    #[error("Session '{0}' does not exist")]
    UnknownSession(SessionId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One run's memory. Values are plain text; structured results are stored as
/// the raw text the agent produced and parsed on read.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    entries: RwLock<BTreeMap<String, String>>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.into(), value.into());
    }

    /// Stores `value` under `key` only if the key has not been written yet.
    pub fn put_once(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), SessionError> {
        let key = key.into();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.contains_key(&key) {
            return Err(SessionError::AlreadyWritten(key));
        }
        entries.insert(key, value.into());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<String, SessionError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .cloned()
            .ok_or_else(|| SessionError::MissingKey(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.contains_key(key)
    }

    /// Current key set in sorted order.
    pub fn keys(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_key_fails() {
        let session = Session::new(SessionId::new());
        assert_eq!(
            session.get(CV_TEXT_KEY),
            Err(SessionError::MissingKey(CV_TEXT_KEY.to_string()))
        );
    }

    #[test]
    fn test_put_overwrites() {
        let session = Session::new(SessionId::new());
        session.put("k", "first");
        session.put("k", "second");
        assert_eq!(session.get("k").unwrap(), "second");
    }

    #[test]
    fn test_put_once_rejects_second_write() {
        let session = Session::new(SessionId::new());
        session.put_once(CV_TEXT_KEY, "5 years of Go experience").unwrap();
        let err = session.put_once(CV_TEXT_KEY, "tampered").unwrap_err();
        assert_eq!(err, SessionError::AlreadyWritten(CV_TEXT_KEY.to_string()));
        assert_eq!(session.get(CV_TEXT_KEY).unwrap(), "5 years of Go experience");
    }

    #[test]
    fn test_keys_are_sorted() {
        let session = Session::new(SessionId::new());
        session.put(JD_TEXT_KEY, "jd");
        session.put(CV_TEXT_KEY, "cv");
        assert_eq!(session.keys(), vec![JD_TEXT_KEY, CV_TEXT_KEY]);
    }

    #[test]
    fn test_source_key_suffix() {
        assert_eq!(source_key(CV_TEXT_KEY), "pdf_resume_text.source");
    }
}
