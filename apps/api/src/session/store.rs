use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Session, SessionError, SessionId};

/// Process-wide registry of live sessions.
///
/// Implement this to move session memory somewhere durable without touching
/// the orchestrator. Carried in `AppState` as `Arc<dyn SessionStore>`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Opens a fresh session. Fails if a run currently owns `id`.
    async fn create(&self, id: SessionId) -> Result<Arc<Session>, SessionError>;

    /// Ends the session's lifetime and hands the final state back to the caller.
    async fn close(&self, id: SessionId) -> Result<Arc<Session>, SessionError>;
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, id: SessionId) -> Result<Arc<Session>, SessionError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            return Err(SessionError::SessionInUse(id));
        }
        let session = Arc::new(Session::new(id));
        sessions.insert(id, session.clone());
        debug!("Opened session {id}");
        Ok(session)
    }

    async fn close(&self, id: SessionId) -> Result<Arc<Session>, SessionError> {
        let session = self
            .sessions
            .write()
            .await
            .remove(&id)
            .ok_or(SessionError::UnknownSession(id))?;
        debug!(
            "Closed session {id} with {} keys after {}ms",
            session.keys().len(),
            (Utc::now() - session.created_at()).num_milliseconds()
        );
        Ok(session)
    }
}
