//! Conversation persistence.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::warn;

use super::model::{ConversationSession, SessionId};
use crate::error::{ComposerError, Result};

/// Where sessions live between turns.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn load(&self, id: SessionId) -> Result<Option<ConversationSession>>;

    async fn save(&self, session: &ConversationSession) -> Result<()>;

    async fn delete(&self, id: SessionId) -> Result<bool>;

    async fn list_ids(&self) -> Result<Vec<SessionId>>;
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    sessions: RwLock<HashMap<SessionId, ConversationSession>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn load(&self, id: SessionId) -> Result<Option<ConversationSession>> {
        Ok(self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }

    async fn save(&self, session: &ConversationSession) -> Result<()> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.id, session.clone());
        Ok(())
    }

    async fn delete(&self, id: SessionId) -> Result<bool> {
        Ok(self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some())
    }

    async fn list_ids(&self) -> Result<Vec<SessionId>> {
        Ok(self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect())
    }
}

/// One JSON file per session under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: SessionId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl ConversationStore for FileStore {
    async fn load(&self, id: SessionId) -> Result<Option<ConversationSession>> {
        match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, session: &ConversationSession) -> Result<()> {
        let data = serde_json::to_vec_pretty(session)?;
        let path = self.path_for(session.id);
        tokio::task::spawn_blocking(move || atomic_write(&path, &data))
            .await
            .map_err(|e| ComposerError::Io(std::io::Error::other(e)))?
    }

    async fn delete(&self, id: SessionId) -> Result<bool> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_ids(&self) -> Result<Vec<SessionId>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()).map(str::parse::<SessionId>) {
                Some(Ok(id)) => ids.push(id),
                _ => warn!(path = %path.display(), "ignoring unexpected file in session store"),
            }
        }
        Ok(ids)
    }
}

/// Write through a temp file in the same directory, then rename over
/// `path`, so readers never see a partial file.
fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path.file_name().ok_or_else(|| {
        ComposerError::Configuration(format!("session path {} has no file name", path.display()))
    })?;

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let temp_name = format!(
        ".{}.tmp-{}-{nonce}",
        file_name.to_string_lossy(),
        std::process::id()
    );
    let temp_path = path.with_file_name(temp_name);

    let write_result = (|| -> std::io::Result<()> {
        let mut temp_file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        temp_file.write_all(data)?;
        temp_file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(ComposerError::Io(err));
    }

    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(ComposerError::Io(err));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::StrategyKind;
    use crate::types::ChatMessage;

    #[tokio::test]
    async fn file_store_round_trips_and_lists_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("sessions"));

        let mut session = ConversationSession::new("parent-1", StrategyKind::Workflow);
        session.messages.push(ChatMessage::user("hello"));
        store.save(&session).await.unwrap();
        session.messages.push(ChatMessage::assistant("hi"));
        store.save(&session).await.unwrap();

        let loaded = store.load(session.id).await.unwrap().unwrap();
        assert_eq!(loaded, session);
        assert_eq!(store.list_ids().await.unwrap(), vec![session.id]);

        let leftovers: Vec<_> = fs::read_dir(store.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());

        assert!(store.delete(session.id).await.unwrap());
        assert!(store.load(session.id).await.unwrap().is_none());
        assert!(!store.delete(session.id).await.unwrap());
    }

    #[tokio::test]
    async fn missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("absent"));
        assert!(store.list_ids().await.unwrap().is_empty());
    }
}
