//! Local persistence for the client: one state blob holding the task set,
//! the active-task pointer, the pull watermark, and the auth session.
//!
//! The drivers are deliberately dumb; everything derived (the tag index) is
//! rebuilt from the records on load.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::TokenBundle;
use crate::tasks::Task;

/// Persisted auth state: a pending session handle while a login attempt is
/// open, then the token bundle once it resolves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAuth {
    pub phone: String,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub tokens: Option<TokenBundle>,
}

/// Everything the client persists between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientState {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub active_task_id: Option<String>,
    /// Watermark: server records with `updatedAt` at or below this are
    /// assumed already applied. Advanced only after a pulled batch is merged.
    #[serde(default)]
    pub last_sync_at: i64,
    #[serde(default)]
    pub auth: Option<StoredAuth>,
}

pub trait StateStore: Send + Sync {
    fn load(&self) -> Result<Option<ClientState>>;
    fn save(&self, state: &ClientState) -> Result<()>;
}

/// JSON-file-backed store.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<Option<ClientState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading state file {}", self.path.display()))?;
        let state = serde_json::from_str(&raw)
            .with_context(|| format!("parsing state file {}", self.path.display()))?;
        Ok(Some(state))
    }

    fn save(&self, state: &ClientState) -> Result<()> {
        let raw = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.path, raw)
            .with_context(|| format!("writing state file {}", self.path.display()))?;
        Ok(())
    }
}

/// In-memory store, used by tests and as a fallback.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<Option<ClientState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<ClientState>> {
        Ok(self.data.lock().unwrap().clone())
    }

    fn save(&self, state: &ClientState) -> Result<()> {
        *self.data.lock().unwrap() = Some(state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));

        assert!(store.load().unwrap().is_none());

        let state = ClientState {
            tasks: vec![],
            active_task_id: Some("t1".into()),
            last_sync_at: 42,
            auth: Some(StoredAuth {
                phone: "+15551234567".into(),
                session: None,
                tokens: None,
            }),
        };
        store.save(&state).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.active_task_id.as_deref(), Some("t1"));
        assert_eq!(loaded.last_sync_at, 42);
        assert_eq!(loaded.auth.unwrap().phone, "+15551234567");
    }
}
