//! Review session persistence.

use async_trait::async_trait;
use uuid::Uuid;
use waffle_core::{Result, ReviewScope, ReviewSession, SessionStatus};

pub mod file;
pub mod memory;
pub mod seal;

pub use file::FileSessionStore;
pub use memory::MemorySessionStore;
pub use seal::{Sealer, SESSION_KEY_ENV};

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates and persists a fresh session in the `created` state.
    async fn create_session(&self, workload_id: &str, aws_workload_id: &str, scope: ReviewScope) -> Result<ReviewSession>;
    async fn save_session(&self, session: &ReviewSession) -> Result<()>;
    async fn load_session(&self, session_id: &str) -> Result<ReviewSession>;
    /// Newest first.
    async fn list_sessions(&self) -> Result<Vec<ReviewSession>>;
    async fn update_session_status(&self, session_id: &str, status: SessionStatus) -> Result<()>;
    async fn get_aws_workload_id(&self, session_id: &str) -> Result<String>;
}

pub(crate) fn new_session(workload_id: &str, aws_workload_id: &str, scope: ReviewScope) -> ReviewSession {
    ReviewSession::new(Uuid::new_v4().to_string(), workload_id, aws_workload_id, scope)
}

pub(crate) fn sort_newest_first(sessions: &mut [ReviewSession]) {
    sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.session_id.cmp(&b.session_id)));
}
