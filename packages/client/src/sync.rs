//! Sync engine: incremental pull with a client-held watermark, and debounced
//! pushes of local mutations.
//!
//! Push discipline (one identity, possibly many rapid edits):
//! - every mutation restarts the debounce wait instead of stacking timers;
//! - the debounce timer is cancellable, an in-flight push is not — once the
//!   upload is issued it runs to completion, and pushes are serialized so a
//!   second batch never races the first;
//! - push is at-least-once: a transport failure puts the records back on the
//!   dirty set and a later mutation's debounce cycle retries. Re-sending an
//!   unchanged record asserts the same version and re-accepts harmlessly.
//!
//! Conflict policy: a push conflict defers to the server — the next pull
//! either overwrites the local copy (server newer) or refreshes the local
//! record's version so the kept-local copy can be pushed with the right
//! assertion (local newer).

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::storage::StateStore;
use crate::tasks::{Task, TaskManager};

/// Quiet window between the last local mutation and the outgoing push.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1200);

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned status {0}")]
    Status(u16),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Per-record answer to an upload.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResult {
    pub id: String,
    pub ok: bool,
    #[serde(default)]
    pub conflict: Option<bool>,
}

/// The sync service surface, behind a trait so the reconciler can be
/// exercised without a network.
#[async_trait]
pub trait SyncApi: Send + Sync {
    async fn download_since(&self, since_ms: i64) -> Result<Vec<Task>, SyncError>;
    async fn upload(&self, tasks: Vec<Task>) -> Result<Vec<UploadResult>, SyncError>;
    async fn delete(&self, ids: Vec<String>) -> Result<(), SyncError>;
}

/// HTTP implementation against the Tempo sync endpoints.
pub struct HttpSyncApi {
    http: Client,
    base_url: String,
    bearer: String,
}

impl HttpSyncApi {
    pub fn new(base_url: impl Into<String>, bearer: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            bearer: bearer.into(),
        }
    }
}

#[derive(Deserialize)]
struct DownloadResponse {
    tasks: Vec<Task>,
}

#[derive(Deserialize)]
struct UploadResponse {
    results: Vec<UploadResult>,
}

#[async_trait]
impl SyncApi for HttpSyncApi {
    async fn download_since(&self, since_ms: i64) -> Result<Vec<Task>, SyncError> {
        let response = self
            .http
            .get(format!("{}/sync/download", self.base_url))
            .query(&[("since", since_ms)])
            .bearer_auth(&self.bearer)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SyncError::Status(response.status().as_u16()));
        }
        Ok(response.json::<DownloadResponse>().await?.tasks)
    }

    async fn upload(&self, tasks: Vec<Task>) -> Result<Vec<UploadResult>, SyncError> {
        let response = self
            .http
            .post(format!("{}/sync/upload", self.base_url))
            .bearer_auth(&self.bearer)
            .json(&serde_json::json!({ "tasks": tasks }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SyncError::Status(response.status().as_u16()));
        }
        Ok(response.json::<UploadResponse>().await?.results)
    }

    async fn delete(&self, ids: Vec<String>) -> Result<(), SyncError> {
        let response = self
            .http
            .post(format!("{}/tasks/delete", self.base_url))
            .bearer_auth(&self.bearer)
            .json(&serde_json::json!({ "ids": ids }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SyncError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

struct Inner {
    api: Arc<dyn SyncApi>,
    store: Arc<dyn StateStore>,
    debounce: Duration,
    manager: Mutex<TaskManager>,
    /// Ids mutated locally since their last accepted push.
    dirty: Mutex<HashSet<String>>,
    /// Ids removed locally and not yet deleted server-side.
    deleted: Mutex<HashSet<String>>,
    /// The armed debounce timer, if any.
    pending: Mutex<Option<JoinHandle<()>>>,
    /// Serializes outgoing pushes for this identity.
    push_lock: tokio::sync::Mutex<()>,
    last_sync_at: AtomicI64,
}

impl Inner {
    /// Flush pending deletions and dirty records. Drained ids go back on
    /// their sets if the request fails, so a later cycle retries them.
    async fn push(inner: &Arc<Inner>) -> Result<(), SyncError> {
        let _guard = inner.push_lock.lock().await;

        let deleted: Vec<String> = {
            let mut deleted = inner.deleted.lock();
            deleted.drain().collect()
        };
        if !deleted.is_empty() {
            if let Err(err) = inner.api.delete(deleted.clone()).await {
                let mut set = inner.deleted.lock();
                set.extend(deleted);
                return Err(err);
            }
        }

        let dirty: Vec<String> = {
            let mut dirty = inner.dirty.lock();
            dirty.drain().collect()
        };
        if dirty.is_empty() {
            return Ok(());
        }
        let batch: Vec<Task> = {
            let manager = inner.manager.lock();
            dirty.iter().filter_map(|id| manager.get(id).cloned()).collect()
        };
        if batch.is_empty() {
            return Ok(());
        }

        match inner.api.upload(batch.clone()).await {
            Ok(results) => {
                let mut manager = inner.manager.lock();
                for result in &results {
                    if result.ok {
                        // The server set stored = asserted + 1.
                        if let Some(asserted) =
                            batch.iter().find(|t| t.id == result.id).map(|t| t.version)
                        {
                            manager.refresh_version(&result.id, asserted + 1);
                        }
                    } else {
                        // Conflict: leave it off the dirty set and let the
                        // next pull resolve which side is newer.
                        debug!(id = %result.id, "push conflict, deferring to pull");
                    }
                }
                drop(manager);
                Self::persist(inner);
                Ok(())
            }
            Err(err) => {
                let mut set = inner.dirty.lock();
                set.extend(dirty);
                Err(err)
            }
        }
    }

    fn persist(inner: &Arc<Inner>) {
        let (tasks, active_task_id) = inner.manager.lock().snapshot();
        let mut state = inner.store.load().ok().flatten().unwrap_or_default();
        state.tasks = tasks;
        state.active_task_id = active_task_id;
        state.last_sync_at = inner.last_sync_at.load(Ordering::SeqCst);
        if let Err(err) = inner.store.save(&state) {
            warn!(error = %err, "persisting client state failed");
        }
    }
}

/// Merges pulled server records into local state and schedules debounced
/// pushes of local mutations. Mutations must happen on a tokio runtime (the
/// debounce timer is a spawned task).
pub struct Reconciler {
    inner: Arc<Inner>,
}

impl Reconciler {
    pub fn new(
        api: Arc<dyn SyncApi>,
        store: Arc<dyn StateStore>,
        debounce: Duration,
    ) -> anyhow::Result<Self> {
        let state = store.load()?.unwrap_or_default();
        let manager = TaskManager::from_saved(state.tasks, state.active_task_id);
        Ok(Self {
            inner: Arc::new(Inner {
                api,
                store,
                debounce,
                manager: Mutex::new(manager),
                dirty: Mutex::new(HashSet::new()),
                deleted: Mutex::new(HashSet::new()),
                pending: Mutex::new(None),
                push_lock: tokio::sync::Mutex::new(()),
                last_sync_at: AtomicI64::new(state.last_sync_at),
            }),
        })
    }

    fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    /// Read access to the local record set.
    pub fn with_tasks<R>(&self, f: impl FnOnce(&TaskManager) -> R) -> R {
        f(&self.inner.manager.lock())
    }

    pub fn create_task(&self, title: &str) -> String {
        let id = self.inner.manager.lock().create(title, Self::now_ms());
        self.mark_dirty(std::iter::once(id.clone()));
        self.after_mutation();
        id
    }

    pub fn toggle_run(&self, id: &str) {
        let affected = {
            let mut manager = self.inner.manager.lock();
            // Whatever was running gets paused as a side effect, so it is
            // part of the outgoing batch too.
            let mut ids: Vec<String> = manager
                .tasks()
                .iter()
                .filter(|t| t.is_running())
                .map(|t| t.id.clone())
                .collect();
            manager.toggle_run(id, Self::now_ms());
            if manager.get(id).is_some() {
                ids.push(id.to_string());
            }
            ids
        };
        self.mark_dirty(affected);
        self.after_mutation();
    }

    pub fn archive(&self, id: &str) {
        let affected = {
            let mut manager = self.inner.manager.lock();
            let mut ids: Vec<String> = manager
                .tasks()
                .iter()
                .filter(|t| t.is_running())
                .map(|t| t.id.clone())
                .collect();
            manager.archive(id, Self::now_ms());
            if manager.get(id).is_some() {
                ids.push(id.to_string());
            }
            ids
        };
        self.mark_dirty(affected);
        self.after_mutation();
    }

    pub fn unarchive(&self, id: &str) {
        self.inner.manager.lock().unarchive(id, Self::now_ms());
        self.mark_dirty(std::iter::once(id.to_string()));
        self.after_mutation();
    }

    pub fn add_tag(&self, id: &str, tag: &str) {
        self.inner.manager.lock().add_tag(id, tag, Self::now_ms());
        self.mark_dirty(std::iter::once(id.to_string()));
        self.after_mutation();
    }

    pub fn remove_tag(&self, id: &str, tag: &str) {
        self.inner.manager.lock().remove_tag(id, tag, Self::now_ms());
        self.mark_dirty(std::iter::once(id.to_string()));
        self.after_mutation();
    }

    pub fn remove_task(&self, id: &str) {
        let removed = self.inner.manager.lock().remove(id);
        if removed {
            self.inner.dirty.lock().remove(id);
            self.inner.deleted.lock().insert(id.to_string());
            self.after_mutation();
        }
    }

    /// Pull records changed since the watermark and merge them in. The
    /// watermark only advances after the batch is applied, so a crash in
    /// between costs a redundant re-pull, never data.
    pub async fn pull(&self) -> Result<(), SyncError> {
        let since = self.inner.last_sync_at.load(Ordering::SeqCst);
        let records = self.inner.api.download_since(since).await?;
        let outcome = self.inner.manager.lock().merge_remote(&records);

        {
            let mut dirty = self.inner.dirty.lock();
            for id in &outcome.adopted {
                // The server side won; a pending local push would be stale.
                dirty.remove(id);
            }
            for id in &outcome.kept_local {
                dirty.insert(id.clone());
            }
        }

        self.inner.last_sync_at.store(Self::now_ms(), Ordering::SeqCst);
        Inner::persist(&self.inner);

        if !outcome.kept_local.is_empty() {
            self.schedule_push();
        }
        Ok(())
    }

    /// Push immediately, bypassing the debounce (login, shutdown).
    pub async fn push_now(&self) -> Result<(), SyncError> {
        Inner::push(&self.inner).await
    }

    fn mark_dirty(&self, ids: impl IntoIterator<Item = String>) {
        self.inner.dirty.lock().extend(ids);
    }

    fn after_mutation(&self) {
        Inner::persist(&self.inner);
        self.schedule_push();
    }

    /// Arm (or re-arm) the debounce timer. A fresh mutation restarts the
    /// wait; only the timer is cancelled, never a push already in flight.
    fn schedule_push(&self) {
        let mut pending = self.inner.pending.lock();
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        let inner = self.inner.clone();
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            // Detached so a re-arm cannot cancel the push mid-request.
            let inner = inner.clone();
            tokio::spawn(async move {
                if let Err(err) = Inner::push(&inner).await {
                    warn!(error = %err, "debounced push failed, will retry on a later cycle");
                }
            });
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct MockApi {
        uploads: Mutex<Vec<Vec<Task>>>,
        deletes: Mutex<Vec<Vec<String>>>,
        pull_batch: Mutex<Vec<Task>>,
        conflicts: Mutex<HashSet<String>>,
        fail_uploads: AtomicBool,
    }

    impl MockApi {
        fn upload_count(&self) -> usize {
            self.uploads.lock().len()
        }
    }

    #[async_trait]
    impl SyncApi for MockApi {
        async fn download_since(&self, _since_ms: i64) -> Result<Vec<Task>, SyncError> {
            Ok(self.pull_batch.lock().clone())
        }

        async fn upload(&self, tasks: Vec<Task>) -> Result<Vec<UploadResult>, SyncError> {
            if self.fail_uploads.load(Ordering::SeqCst) {
                return Err(SyncError::Status(503));
            }
            let conflicts = self.conflicts.lock();
            let results = tasks
                .iter()
                .map(|t| UploadResult {
                    id: t.id.clone(),
                    ok: !conflicts.contains(&t.id),
                    conflict: conflicts.contains(&t.id).then_some(true),
                })
                .collect();
            self.uploads.lock().push(tasks);
            Ok(results)
        }

        async fn delete(&self, ids: Vec<String>) -> Result<(), SyncError> {
            self.deletes.lock().push(ids);
            Ok(())
        }
    }

    fn reconciler(api: Arc<MockApi>) -> Reconciler {
        Reconciler::new(api, Arc::new(MemoryStore::new()), DEFAULT_DEBOUNCE).unwrap()
    }

    async fn settle() {
        // Let the detached push task run to completion.
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_mutations_collapse_into_one_push() {
        let api = Arc::new(MockApi::default());
        let r = reconciler(api.clone());

        r.create_task("a");
        r.create_task("b");
        r.create_task("c");
        assert_eq!(api.upload_count(), 0);

        tokio::task::yield_now().await;
        tokio::time::advance(DEFAULT_DEBOUNCE).await;
        settle().await;

        assert_eq!(api.upload_count(), 1);
        assert_eq!(api.uploads.lock()[0].len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn a_fresh_mutation_restarts_the_wait() {
        let api = Arc::new(MockApi::default());
        let r = reconciler(api.clone());

        let id = r.create_task("a");
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(1000)).await;
        assert_eq!(api.upload_count(), 0);

        // Restarts the 1200ms window; 1000ms more is still not enough.
        r.add_tag(&id, "work");
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(1000)).await;
        settle().await;
        assert_eq!(api.upload_count(), 0);

        tokio::time::advance(Duration::from_millis(200)).await;
        settle().await;
        assert_eq!(api.upload_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_keeps_records_for_the_next_cycle() {
        let api = Arc::new(MockApi::default());
        let r = reconciler(api.clone());

        api.fail_uploads.store(true, Ordering::SeqCst);
        r.create_task("a");
        tokio::task::yield_now().await;
        tokio::time::advance(DEFAULT_DEBOUNCE).await;
        settle().await;
        assert_eq!(api.upload_count(), 0);

        // The next mutation's cycle retries the stranded record too.
        api.fail_uploads.store(false, Ordering::SeqCst);
        r.create_task("b");
        tokio::task::yield_now().await;
        tokio::time::advance(DEFAULT_DEBOUNCE).await;
        settle().await;

        assert_eq!(api.upload_count(), 1);
        assert_eq!(api.uploads.lock()[0].len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_push_advances_the_local_version() {
        let api = Arc::new(MockApi::default());
        let r = reconciler(api.clone());

        let id = r.create_task("a");
        tokio::task::yield_now().await;
        tokio::time::advance(DEFAULT_DEBOUNCE).await;
        settle().await;

        assert_eq!(r.with_tasks(|m| m.get(&id).unwrap().version), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn conflict_defers_to_the_next_pull() {
        let api = Arc::new(MockApi::default());
        let r = reconciler(api.clone());

        let id = r.create_task("a");
        api.conflicts.lock().insert(id.clone());
        tokio::task::yield_now().await;
        tokio::time::advance(DEFAULT_DEBOUNCE).await;
        settle().await;
        assert_eq!(api.upload_count(), 1);

        // Server has a newer copy; the pull adopts it and nothing re-pushes.
        let server_copy = Task {
            id: id.clone(),
            title: "server title".into(),
            intervals: vec![],
            archived: false,
            tags: vec![],
            updated_at: Reconciler::now_ms() + 60_000,
            version: 5,
        };
        *api.pull_batch.lock() = vec![server_copy];
        r.pull().await.unwrap();

        assert_eq!(r.with_tasks(|m| m.get(&id).unwrap().title.clone()), "server title");
        assert_eq!(r.with_tasks(|m| m.get(&id).unwrap().version), 5);

        tokio::time::advance(DEFAULT_DEBOUNCE * 2).await;
        settle().await;
        assert_eq!(api.upload_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn kept_local_copy_is_repushed_with_the_refreshed_version() {
        let api = Arc::new(MockApi::default());
        let r = reconciler(api.clone());

        let id = r.create_task("local wins");
        // A push already went out and conflicted on another device's write;
        // the server copy is older than our local edit but carries the
        // authoritative version.
        let server_copy = Task {
            id: id.clone(),
            title: "older server".into(),
            intervals: vec![],
            archived: false,
            tags: vec![],
            updated_at: 1,
            version: 7,
        };
        *api.pull_batch.lock() = vec![server_copy];
        r.pull().await.unwrap();

        // Local fields stand, but the next push asserts the server version.
        tokio::task::yield_now().await;
        tokio::time::advance(DEFAULT_DEBOUNCE).await;
        settle().await;

        let uploads = api.uploads.lock();
        let last = uploads.last().unwrap();
        let pushed = last.iter().find(|t| t.id == id).unwrap();
        assert_eq!(pushed.title, "local wins");
        assert_eq!(pushed.version, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn removal_flushes_a_server_delete() {
        let api = Arc::new(MockApi::default());
        let r = reconciler(api.clone());

        let id = r.create_task("doomed");
        tokio::task::yield_now().await;
        tokio::time::advance(DEFAULT_DEBOUNCE).await;
        settle().await;

        r.remove_task(&id);
        tokio::task::yield_now().await;
        tokio::time::advance(DEFAULT_DEBOUNCE).await;
        settle().await;

        assert_eq!(api.deletes.lock().len(), 1);
        assert_eq!(api.deletes.lock()[0], vec![id]);
    }

    #[tokio::test(start_paused = true)]
    async fn pull_advances_the_watermark_only_after_applying() {
        let api = Arc::new(MockApi::default());
        let store = Arc::new(MemoryStore::new());
        let r = Reconciler::new(api.clone(), store.clone(), DEFAULT_DEBOUNCE).unwrap();

        assert_eq!(store.load().unwrap().map(|s| s.last_sync_at), None);
        r.pull().await.unwrap();

        let persisted = store.load().unwrap().unwrap();
        assert!(persisted.last_sync_at > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn push_now_with_nothing_pending_is_a_noop() {
        let api = Arc::new(MockApi::default());
        let r = reconciler(api.clone());

        r.push_now().await.unwrap();
        assert_eq!(api.upload_count(), 0);
        assert!(api.deletes.lock().is_empty());
    }
}
