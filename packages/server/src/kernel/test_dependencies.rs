//! In-memory implementations of the service and store traits.
//!
//! Kept as a regular module (not `#[cfg(test)]`) so the integration tests
//! under `tests/` can drive the full router without Postgres or Twilio.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::domains::auth::directory::UserDirectory;
use crate::domains::auth::store::{LoginSession, SessionStore};
use crate::domains::tasks::models::TaskRecord;
use crate::domains::tasks::store::{TaskStore, UpsertOutcome};
use crate::kernel::traits::{SmsSender, StoreError};

/// Records every message instead of delivering it; can be switched into a
/// failing mode to exercise the delivery-failure path.
#[derive(Default)]
pub struct RecordingSmsSender {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: AtomicBool,
}

impl RecordingSmsSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// The code embedded in the most recent message to `phone`.
    pub fn last_code_for(&self, phone: &str) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        sent.iter().rev().find(|(to, _)| to == phone).map(|(_, body)| {
            body.chars().filter(|c| c.is_ascii_digit()).collect()
        })
    }
}

#[async_trait]
impl SmsSender for RecordingSmsSender {
    async fn send_sms(&self, to: &str, body: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("simulated delivery failure");
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        Ok(())
    }
}

/// In-memory login session store with the same lazy-expiry behavior as the
/// Postgres one.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<Uuid, LoginSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: &LoginSession) -> Result<(), StoreError> {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id, session.clone());
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<LoginSession>, StoreError> {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.get(&id) {
            Some(session) if session.expires_at <= Utc::now() => {
                sessions.remove(&id);
                Ok(None)
            }
            Some(session) => Ok(Some(session.clone())),
            None => Ok(None),
        }
    }

    async fn update(&self, session: &LoginSession) -> Result<(), StoreError> {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id, session.clone());
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> Result<(), StoreError> {
        self.sessions.lock().unwrap().remove(&id);
        Ok(())
    }
}

/// In-memory task store implementing the same conditional-write contract as
/// the Postgres one.
#[derive(Default)]
pub struct MemoryTaskStore {
    records: Mutex<HashMap<(String, String), TaskRecord>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn upsert(&self, owner: &str, task: &TaskRecord) -> Result<UpsertOutcome, StoreError> {
        let mut records = self.records.lock().unwrap();
        let key = (owner.to_string(), task.id.clone());
        let version = match records.get(&key) {
            None => 1,
            Some(existing) if existing.version == task.version => existing.version + 1,
            Some(_) => return Ok(UpsertOutcome::Conflict),
        };
        let mut stored = task.clone();
        stored.version = version;
        records.insert(key, stored);
        Ok(UpsertOutcome::Accepted { version })
    }

    async fn changed_since(
        &self,
        owner: &str,
        since_ms: i64,
    ) -> Result<Vec<TaskRecord>, StoreError> {
        let records = self.records.lock().unwrap();
        let mut changed: Vec<TaskRecord> = records
            .iter()
            .filter(|((o, _), record)| o.as_str() == owner && record.updated_at > since_ms)
            .map(|(_, record)| record.clone())
            .collect();
        changed.sort_by_key(|record| record.updated_at);
        Ok(changed)
    }

    async fn delete_many(&self, owner: &str, ids: &[String]) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        for id in ids {
            records.remove(&(owner.to_string(), id.clone()));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// In-memory user directory seeded with registered phone numbers.
#[derive(Default)]
pub struct MemoryUserDirectory {
    users: Mutex<HashSet<String>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, phone: &str) {
        self.users.lock().unwrap().insert(phone.to_string());
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn is_registered(&self, phone: &str) -> Result<bool, StoreError> {
        Ok(self.users.lock().unwrap().contains(phone))
    }
}
