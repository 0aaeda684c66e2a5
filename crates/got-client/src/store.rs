//! Persistence of the participant id and the active game id.
//!
//! The controller receives an [`IdentityStore`] instead of reaching for
//! global state, so a frontend picks where ids live ([`FileStore`] for the
//! terminal client, [`MemoryStore`] for tests and throwaway sessions).

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session file i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("session file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Ids that survive a restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    #[serde(default)]
    pub player_id: Option<String>,
    #[serde(default)]
    pub game_id: Option<String>,
}

/// Abstraction over session storage so the lifecycle logic stays
/// platform-agnostic.
///
/// Implementations only provide [`load`](IdentityStore::load) and
/// [`save`](IdentityStore::save); the accessors are read-modify-write
/// helpers on top.
pub trait IdentityStore: Send + Sync {
    fn load(&self) -> StoredSession;
    fn save(&self, session: &StoredSession);

    fn player_id(&self) -> Option<String> {
        self.load().player_id
    }

    fn game_id(&self) -> Option<String> {
        self.load().game_id
    }

    fn set_player_id(&self, player_id: &str) {
        let mut session = self.load();
        session.player_id = Some(player_id.to_string());
        self.save(&session);
    }

    fn set_game_id(&self, game_id: &str) {
        let mut session = self.load();
        session.game_id = Some(game_id.to_string());
        self.save(&session);
    }

    /// Forget the active game but keep the participant.
    fn clear_game(&self) {
        let mut session = self.load();
        session.game_id = None;
        self.save(&session);
    }

    /// Forget everything.
    fn clear(&self) {
        self.save(&StoredSession::default());
    }
}

impl<T: IdentityStore + ?Sized> IdentityStore for Arc<T> {
    fn load(&self) -> StoredSession {
        (**self).load()
    }

    fn save(&self, session: &StoredSession) {
        (**self).save(session)
    }
}

/// In-process store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<StoredSession>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: StoredSession) -> Self {
        Self {
            inner: Mutex::new(session),
        }
    }
}

impl IdentityStore for MemoryStore {
    fn load(&self) -> StoredSession {
        self.inner
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn save(&self, session: &StoredSession) {
        match self.inner.lock() {
            Ok(mut guard) => *guard = session.clone(),
            Err(poisoned) => *poisoned.into_inner() = session.clone(),
        }
    }
}

/// JSON document on disk.
///
/// Read failures are treated as "nothing stored"; write failures are
/// logged and otherwise ignored, since losing the ids only costs a new
/// registration.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn try_load(&self) -> Result<StoredSession, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(StoredSession::default()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoredSession::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn try_save(&self, session: &StoredSession) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl IdentityStore for FileStore {
    fn load(&self) -> StoredSession {
        self.try_load().unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "ignoring unreadable session file");
            StoredSession::default()
        })
    }

    fn save(&self, session: &StoredSession) {
        if let Err(e) = self.try_save(session) {
            warn!(path = %self.path.display(), error = %e, "failed to persist session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn scratch_path(tag: &str) -> PathBuf {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir()
            .join(format!("got-store-{}-{tag}-{n}", std::process::id()))
            .join("session.json")
    }

    #[test]
    fn memory_store_lifecycle() {
        let store = MemoryStore::new();
        assert_eq!(store.player_id(), None);

        store.set_player_id("P1");
        store.set_game_id("g1");
        assert_eq!(store.player_id().as_deref(), Some("P1"));
        assert_eq!(store.game_id().as_deref(), Some("g1"));

        store.clear_game();
        assert_eq!(store.player_id().as_deref(), Some("P1"));
        assert_eq!(store.game_id(), None);

        store.clear();
        assert_eq!(store.load(), StoredSession::default());
    }

    #[test]
    fn file_store_round_trips_through_disk() {
        let path = scratch_path("roundtrip");
        let store = FileStore::new(&path);
        assert_eq!(store.load(), StoredSession::default());

        store.set_player_id("P1");
        store.set_game_id("g1");

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.player_id().as_deref(), Some("P1"));
        assert_eq!(reopened.game_id().as_deref(), Some("g1"));

        reopened.clear();
        assert_eq!(store.load(), StoredSession::default());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let path = scratch_path("corrupt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(store.try_load(), Err(StoreError::Json(_))));
        assert_eq!(store.load(), StoredSession::default());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
