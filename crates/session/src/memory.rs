use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use waffle_core::{Error, Result, ReviewScope, ReviewSession, Sentinel, SessionStatus};

use crate::{new_session, sort_newest_first, SessionStore};

/// In-process store for ephemeral runs and tests.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, ReviewSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(session_id: &str) -> Error {
    Error::from(Sentinel::SessionNotFound).context(format!("session {session_id}"))
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, workload_id: &str, aws_workload_id: &str, scope: ReviewScope) -> Result<ReviewSession> {
        let session = new_session(workload_id, aws_workload_id, scope);
        self.save_session(&session).await?;
        Ok(session)
    }

    async fn save_session(&self, session: &ReviewSession) -> Result<()> {
        self.sessions.write().await.insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn load_session(&self, session_id: &str) -> Result<ReviewSession> {
        self.sessions.read().await.get(session_id).cloned().ok_or_else(|| not_found(session_id))
    }

    async fn list_sessions(&self) -> Result<Vec<ReviewSession>> {
        let mut all: Vec<_> = self.sessions.read().await.values().cloned().collect();
        sort_newest_first(&mut all);
        Ok(all)
    }

    async fn update_session_status(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        let mut guard = self.sessions.write().await;
        let session = guard.get_mut(session_id).ok_or_else(|| not_found(session_id))?;
        session.status = status;
        session.touch();
        Ok(())
    }

    async fn get_aws_workload_id(&self, session_id: &str) -> Result<String> {
        Ok(self.load_session(session_id).await?.aws_workload_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waffle_core::{Checkpoint, Pillar};

    #[tokio::test]
    async fn create_load_update() {
        let store = MemorySessionStore::new();
        let s = store.create_session("shop", "wl-123", ReviewScope::Pillar(Pillar::Security)).await.unwrap();
        assert_eq!(s.status, SessionStatus::Created);
        assert_eq!(s.checkpoint, Checkpoint::Created);
        assert_eq!(s.session_id.len(), 36);

        let loaded = store.load_session(&s.session_id).await.unwrap();
        assert_eq!(loaded.scope, ReviewScope::Pillar(Pillar::Security));
        assert_eq!(store.get_aws_workload_id(&s.session_id).await.unwrap(), "wl-123");

        store.update_session_status(&s.session_id, SessionStatus::InProgress).await.unwrap();
        assert_eq!(store.load_session(&s.session_id).await.unwrap().status, SessionStatus::InProgress);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let store = MemorySessionStore::new();
        assert!(store.load_session("missing").await.unwrap_err().is(Sentinel::SessionNotFound));
        assert!(store
            .update_session_status("missing", SessionStatus::Failed)
            .await
            .unwrap_err()
            .is(Sentinel::SessionNotFound));
    }
}
