use serde::{Deserialize, Serialize};

/// One run/pause span of a task. `end` is absent while the span is open;
/// at most one interval per record may be open, and it is always the last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
}

/// A synchronized task record, as stored and as carried on the wire.
///
/// `id` is client-assigned once at creation and never reused. `version` is
/// server-authoritative: it advances on every accepted write and gates the
/// next one. `updated_at` is the client's mutation timestamp in epoch
/// milliseconds and drives the incremental pull watermark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
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

impl TaskRecord {
    /// True when the record's last interval is open.
    pub fn is_running(&self) -> bool {
        self.intervals.last().is_some_and(|itv| itv.end.is_none())
    }

    /// Normalize tags in place: trim, lowercase, drop empties, dedup while
    /// keeping first-seen order.
    pub fn normalize(&mut self) {
        let mut seen = Vec::with_capacity(self.tags.len());
        for raw in self.tags.drain(..) {
            let tag = normalize_tag(&raw);
            if !tag.is_empty() && !seen.contains(&tag) {
                seen.push(tag);
            }
        }
        self.tags = seen;
    }
}

/// Canonical form of a tag: trimmed and lowercased.
pub fn normalize_tag(raw: &str) -> String {
    raw.trim().to_lowercase()
}
