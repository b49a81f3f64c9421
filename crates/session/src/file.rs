use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use waffle_core::{Error, Result, ReviewScope, ReviewSession, Sentinel, SessionStatus};

use crate::seal::Sealer;
use crate::{new_session, sort_newest_first, SessionStore};

/// One JSON document per session under `dir`, optionally sealed.
pub struct FileSessionStore {
    dir: PathBuf,
    sealer: Option<Arc<Sealer>>,
    // serializes read-modify-write in update_session_status
    write_lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), sealer: None, write_lock: Mutex::new(()) }
    }

    pub fn with_sealer(mut self, sealer: Sealer) -> Self {
        self.sealer = Some(Arc::new(sealer));
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf> {
        let valid = !session_id.is_empty()
            && session_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(Error::validation("session_id", session_id, "must be alphanumeric with dashes"));
        }
        Ok(self.dir.join(format!("{session_id}.json")))
    }

    fn encode(&self, session: &ReviewSession) -> Result<Vec<u8>> {
        let json = serde_json::to_vec_pretty(session)?;
        match &self.sealer {
            Some(s) => s.seal(&json),
            None => Ok(json),
        }
    }

    fn decode(&self, path: &Path, bytes: &[u8]) -> Result<ReviewSession> {
        if Sealer::is_sealed(bytes) {
            let sealer = self.sealer.as_ref().ok_or_else(|| {
                Error::file(path, "decrypt", Error::Message(format!("session is encrypted; set {}", crate::SESSION_KEY_ENV)))
            })?;
            let plain = sealer.open(bytes).map_err(|e| Error::file(path, "decrypt", e))?;
            return serde_json::from_slice(&plain).map_err(|e| Error::file(path, "decode", e));
        }
        serde_json::from_slice(bytes).map_err(|e| Error::file(path, "decode", e))
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| Error::directory(&self.dir, e))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(|e| Error::file(&tmp, "write", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| Error::file(&tmp, "chmod", e))?;
        }
        tokio::fs::rename(&tmp, path).await.map_err(|e| Error::file(path, "rename", e))?;
        Ok(())
    }

    async fn read(&self, session_id: &str) -> Result<ReviewSession> {
        let path = self.path_for(session_id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::from(Sentinel::SessionNotFound).context(format!("session {session_id}")))
            }
            Err(e) => return Err(Error::file(&path, "read", e)),
        };
        self.decode(&path, &bytes)
    }

    async fn session_files(&self) -> Result<Vec<PathBuf>> {
        let mut rd = match tokio::fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::directory(&self.dir, e)),
        };
        let mut out = Vec::new();
        while let Some(entry) = rd.next_entry().await.map_err(|e| Error::directory(&self.dir, e))? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                out.push(path);
            }
        }
        out.sort();
        Ok(out)
    }

    /// Deletes sessions last updated more than `retention_days` ago.
    /// Returns the number removed.
    pub async fn prune(&self, retention_days: i64) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(retention_days.max(0));
        let mut removed = 0;
        for path in self.session_files().await? {
            let bytes = match tokio::fs::read(&path).await {
                Ok(b) => b,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping unreadable session file");
                    continue;
                }
            };
            let session = match self.decode(&path, &bytes) {
                Ok(s) => s,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping undecodable session file");
                    continue;
                }
            };
            if session.updated_at < cutoff {
                tokio::fs::remove_file(&path).await.map_err(|e| Error::file(&path, "remove", e))?;
                debug!(session_id = %session.session_id, "pruned session");
                removed += 1;
            }
        }
        info!(removed, retention_days, "session cleanup finished");
        Ok(removed)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn create_session(&self, workload_id: &str, aws_workload_id: &str, scope: ReviewScope) -> Result<ReviewSession> {
        let session = new_session(workload_id, aws_workload_id, scope);
        self.save_session(&session).await?;
        debug!(session_id = %session.session_id, "created session");
        Ok(session)
    }

    async fn save_session(&self, session: &ReviewSession) -> Result<()> {
        let path = self.path_for(&session.session_id)?;
        let bytes = self.encode(session)?;
        self.write_atomic(&path, &bytes).await
    }

    async fn load_session(&self, session_id: &str) -> Result<ReviewSession> {
        self.read(session_id).await
    }

    async fn list_sessions(&self) -> Result<Vec<ReviewSession>> {
        let mut sessions = Vec::new();
        for path in self.session_files().await? {
            let loaded = match tokio::fs::read(&path).await {
                Ok(bytes) => self.decode(&path, &bytes),
                Err(e) => Err(Error::file(&path, "read", e)),
            };
            match loaded {
                Ok(s) => sessions.push(s),
                Err(e) => warn!(error = %e, "skipping session file"),
            }
        }
        sort_newest_first(&mut sessions);
        Ok(sessions)
    }

    async fn update_session_status(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut session = self.read(session_id).await?;
        session.status = status;
        session.touch();
        self.save_session(&session).await
    }

    async fn get_aws_workload_id(&self, session_id: &str) -> Result<String> {
        Ok(self.read(session_id).await?.aws_workload_id)
    }
}
