//! Local task model and manager. No I/O here; the manager owns the in-memory
//! record set, the single-active-timer rule, and the derived tag index.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One run/pause span. `end` is `None` while the span is open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
}

/// A task record: the same shape locally, in persisted state, and on the
/// wire. `updated_at` is the last local mutation time in epoch milliseconds;
/// `version` is whatever the server last told us and gates the next push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub intervals: Vec<Interval>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(rename = "updatedAt")]
    pub updated_at: i64,
    #[serde(default)]
    pub version: i64,
}

impl Task {
    fn new(id: String, title: &str, now_ms: i64) -> Self {
        Self {
            id,
            title: title.trim().to_string(),
            intervals: Vec::new(),
            archived: false,
            tags: Vec::new(),
            updated_at: now_ms,
            version: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.intervals.last().is_some_and(|itv| itv.end.is_none())
    }

    fn start(&mut self, at_ms: i64) {
        if self.is_running() {
            return;
        }
        self.intervals.push(Interval {
            start: at_ms,
            end: None,
        });
        self.updated_at = at_ms;
    }

    fn pause(&mut self, at_ms: i64) {
        if !self.is_running() {
            return;
        }
        if let Some(last) = self.intervals.last_mut() {
            last.end = Some(at_ms.max(last.start));
        }
        self.updated_at = at_ms;
    }

    /// Total tracked milliseconds, counting an open interval up to `at_ms`.
    pub fn elapsed(&self, at_ms: i64) -> i64 {
        self.intervals
            .iter()
            .map(|itv| (itv.end.unwrap_or(at_ms) - itv.start).max(0))
            .sum()
    }
}

/// Canonical form of a tag: trimmed and lowercased.
pub fn normalize_tag(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Normalize a tag list in place: canonical form, empties dropped, dedup in
/// first-seen order.
fn normalize_tags(tags: &mut Vec<String>) {
    let mut seen = Vec::with_capacity(tags.len());
    for raw in tags.drain(..) {
        let tag = normalize_tag(&raw);
        if !tag.is_empty() && !seen.contains(&tag) {
            seen.push(tag);
        }
    }
    *tags = seen;
}

/// What merging one pulled batch did, so the reconciler can fix up its dirty
/// bookkeeping.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Records adopted from the server (created locally or overwritten).
    pub adopted: Vec<String>,
    /// Records where the local copy was newer and kept; their version was
    /// refreshed from the server, and they still need a push.
    pub kept_local: Vec<String>,
}

/// In-memory record set with the derived tag index.
///
/// The tag index is never authoritative: it is rebuilt from the per-record
/// tag lists on load and after merges.
#[derive(Debug, Default)]
pub struct TaskManager {
    tasks: Vec<Task>,
    active_task_id: Option<String>,
    tags_index: HashMap<String, Vec<String>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a manager from persisted records. Tags are re-normalized and
    /// the index reconstructed from the records, never trusted from storage.
    pub fn from_saved(tasks: Vec<Task>, active_task_id: Option<String>) -> Self {
        let mut manager = Self {
            tasks,
            active_task_id,
            tags_index: HashMap::new(),
        };
        for task in &mut manager.tasks {
            normalize_tags(&mut task.tags);
        }
        manager.rebuild_index();
        manager
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub fn active_task_id(&self) -> Option<&str> {
        self.active_task_id.as_deref()
    }

    pub fn active_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| !t.archived)
    }

    pub fn archived_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.archived)
    }

    /// Create a task and return its id. New tasks go to the front of the
    /// list.
    pub fn create(&mut self, title: &str, now_ms: i64) -> String {
        let id = Uuid::new_v4().to_string();
        self.tasks.insert(0, Task::new(id.clone(), title, now_ms));
        id
    }

    /// Remove a task entirely. Returns true when something was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(idx) = self.tasks.iter().position(|t| t.id == id) else {
            return false;
        };
        if self.active_task_id.as_deref() == Some(id) {
            self.active_task_id = None;
        }
        let removed = self.tasks.remove(idx);
        for tag in &removed.tags {
            self.index_remove(tag, id);
        }
        true
    }

    /// Start or pause one task. Starting pauses any other running task so at
    /// most one record in the whole set has an open interval; the active
    /// pointer follows.
    pub fn toggle_run(&mut self, id: &str, now_ms: i64) {
        let (archived, running) = match self.get(id) {
            Some(task) => (task.archived, task.is_running()),
            None => return,
        };
        if archived {
            // archived tasks cannot run
            return;
        }

        if running {
            if let Some(task) = self.get_mut(id) {
                task.pause(now_ms);
            }
            if self.active_task_id.as_deref() == Some(id) {
                self.active_task_id = None;
            }
        } else {
            for task in &mut self.tasks {
                if task.is_running() {
                    task.pause(now_ms);
                }
            }
            if let Some(task) = self.get_mut(id) {
                task.start(now_ms);
            }
            self.active_task_id = Some(id.to_string());
        }
    }

    /// Archive a task: stop every running timer, then mark it archived.
    pub fn archive(&mut self, id: &str, now_ms: i64) {
        if self.get(id).is_none() {
            return;
        }
        for task in &mut self.tasks {
            if task.is_running() {
                task.pause(now_ms);
            }
        }
        self.active_task_id = None;
        if let Some(task) = self.get_mut(id) {
            task.archived = true;
            task.updated_at = now_ms;
        }
    }

    pub fn unarchive(&mut self, id: &str, now_ms: i64) {
        if let Some(task) = self.get_mut(id) {
            task.archived = false;
            task.updated_at = now_ms;
        }
    }

    pub fn add_tag(&mut self, id: &str, tag: &str, now_ms: i64) {
        let norm = normalize_tag(tag);
        if norm.is_empty() {
            return;
        }
        let Some(task) = self.get_mut(id) else { return };
        if !task.tags.contains(&norm) {
            task.tags.push(norm.clone());
        }
        task.updated_at = now_ms;
        self.index_add(&norm, id);
    }

    pub fn remove_tag(&mut self, id: &str, tag: &str, now_ms: i64) {
        let norm = normalize_tag(tag);
        let Some(task) = self.get_mut(id) else { return };
        if let Some(pos) = task.tags.iter().position(|t| t == &norm) {
            task.tags.remove(pos);
        }
        task.updated_at = now_ms;
        self.index_remove(&norm, id);
    }

    pub fn ids_by_tag(&self, tag: &str) -> Vec<String> {
        self.tags_index
            .get(&normalize_tag(tag))
            .cloned()
            .unwrap_or_default()
    }

    pub fn tasks_by_tag(&self, tag: &str) -> Vec<&Task> {
        self.ids_by_tag(tag)
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// Merge one pulled batch into local state.
    ///
    /// Unknown records are adopted verbatim. For known records the strictly
    /// newer side wins by `updated_at`: the server copy replaces the local
    /// one only when newer. When the local copy is kept, the server-assigned
    /// version is still adopted (version is bookkeeping, not user data), and
    /// a strictly-newer local copy is reported back so the caller can push
    /// it with the right version assertion. Applying the same batch twice is
    /// a no-op the second time.
    pub fn merge_remote(&mut self, records: &[Task]) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        for record in records {
            if let Some(pos) = self.tasks.iter().position(|t| t.id == record.id) {
                let local = &mut self.tasks[pos];
                if record.updated_at > local.updated_at {
                    *local = record.clone();
                    normalize_tags(&mut local.tags);
                    outcome.adopted.push(record.id.clone());
                } else {
                    let stale_version = local.version != record.version;
                    local.version = record.version;
                    if stale_version && local.updated_at > record.updated_at {
                        outcome.kept_local.push(record.id.clone());
                    }
                }
            } else {
                let mut adopted = record.clone();
                normalize_tags(&mut adopted.tags);
                self.tasks.push(adopted);
                outcome.adopted.push(record.id.clone());
            }
        }
        self.rebuild_index();
        self.repair_active();
        outcome
    }

    /// Snapshot for persistence or pushing.
    pub fn snapshot(&self) -> (Vec<Task>, Option<String>) {
        (self.tasks.clone(), self.active_task_id.clone())
    }

    /// Adopt a server-assigned version for a record. Version is server
    /// bookkeeping, not user data: refreshing it is not a mutation and does
    /// not touch `updated_at`.
    pub fn refresh_version(&mut self, id: &str, version: i64) {
        if let Some(task) = self.get_mut(id) {
            task.version = version;
        }
    }

    fn index_add(&mut self, tag: &str, id: &str) {
        let ids = self.tags_index.entry(tag.to_string()).or_default();
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
    }

    fn index_remove(&mut self, tag: &str, id: &str) {
        if let Some(ids) = self.tags_index.get_mut(tag) {
            ids.retain(|existing| existing != id);
            if ids.is_empty() {
                self.tags_index.remove(tag);
            }
        }
    }

    fn rebuild_index(&mut self) {
        let mut index: HashMap<String, Vec<String>> = HashMap::new();
        for task in &self.tasks {
            for tag in &task.tags {
                let ids = index.entry(tag.clone()).or_default();
                if !ids.iter().any(|existing| existing == &task.id) {
                    ids.push(task.id.clone());
                }
            }
        }
        self.tags_index = index;
    }

    /// Cross-device merges can leave more than one record with an open
    /// interval. Keep the one whose open span started last running, close
    /// the others at that start, and point the active pointer at it.
    fn repair_active(&mut self) {
        let mut running: Vec<(String, i64)> = self
            .tasks
            .iter()
            .filter(|t| t.is_running())
            .map(|t| (t.id.clone(), t.intervals.last().map(|i| i.start).unwrap_or(0)))
            .collect();
        running.sort_by_key(|(_, start)| *start);

        if running.len() > 1 {
            if let Some((winner_id, winner_start)) = running.last().cloned() {
                for (id, _) in &running {
                    if id != &winner_id {
                        if let Some(task) = self.get_mut(id) {
                            task.pause(winner_start);
                        }
                    }
                }
            }
        }
        self.active_task_id = running.pop().map(|(id, _)| id);
    }
}

/// Render a millisecond duration as `HH:MM:SS`.
pub fn format_hms(ms: i64) -> String {
    let total = (ms / 1000).max(0);
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}
