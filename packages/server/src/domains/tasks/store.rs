//! Task record persistence.
//!
//! Records are keyed by (owner phone, record id). The conditional upsert is
//! the single concurrency-control point of the sync protocol: it must be
//! atomic compare-and-swap on the stored version. Pull and delete carry no
//! consistency requirement beyond read-your-writes on the same store.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row};

use crate::domains::tasks::models::TaskRecord;
use crate::kernel::traits::StoreError;

/// Outcome of one conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Write adopted; the stored version advanced to `version`.
    Accepted { version: i64 },
    /// A record exists and its version differs from the asserted one.
    Conflict,
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Conditional write: succeeds iff no record exists at
    /// (owner, task.id) or the stored version equals `task.version`.
    async fn upsert(&self, owner: &str, task: &TaskRecord) -> Result<UpsertOutcome, StoreError>;

    /// Every record owned by `owner` with `updated_at` strictly greater
    /// than `since_ms` (the watermark boundary is exclusive).
    async fn changed_since(&self, owner: &str, since_ms: i64)
        -> Result<Vec<TaskRecord>, StoreError>;

    /// Unconditional removal; missing ids are a no-op, not an error.
    async fn delete_many(&self, owner: &str, ids: &[String]) -> Result<(), StoreError>;

    /// Liveness probe for the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Postgres-backed task store.
///
/// The compare-and-swap the upsert needs is one statement: the insert path
/// covers "no record yet", and the update path only fires when the stored
/// version matches the asserted one.
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<TaskRecord, StoreError> {
        let intervals: Value = row.try_get("intervals")?;
        let tags: Value = row.try_get("tags")?;
        Ok(TaskRecord {
            id: row.try_get("task_id")?,
            title: row.try_get("title")?,
            intervals: serde_json::from_value(intervals)?,
            archived: row.try_get("archived")?,
            tags: serde_json::from_value(tags)?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        })
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn upsert(&self, owner: &str, task: &TaskRecord) -> Result<UpsertOutcome, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO tasks (owner_phone, task_id, title, intervals, archived, tags, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 1)
            ON CONFLICT (owner_phone, task_id) DO UPDATE
            SET title = EXCLUDED.title,
                intervals = EXCLUDED.intervals,
                archived = EXCLUDED.archived,
                tags = EXCLUDED.tags,
                updated_at = EXCLUDED.updated_at,
                version = tasks.version + 1
            WHERE tasks.version = $8
            RETURNING version
            "#,
        )
        .bind(owner)
        .bind(&task.id)
        .bind(&task.title)
        .bind(serde_json::to_value(&task.intervals)?)
        .bind(task.archived)
        .bind(serde_json::to_value(&task.tags)?)
        .bind(task.updated_at)
        .bind(task.version)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(UpsertOutcome::Accepted {
                version: row.try_get("version")?,
            }),
            None => Ok(UpsertOutcome::Conflict),
        }
    }

    async fn changed_since(
        &self,
        owner: &str,
        since_ms: i64,
    ) -> Result<Vec<TaskRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT task_id, title, intervals, archived, tags, updated_at, version
            FROM tasks
            WHERE owner_phone = $1 AND updated_at > $2
            ORDER BY updated_at ASC
            "#,
        )
        .bind(owner)
        .bind(since_ms)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::record_from_row).collect()
    }

    async fn delete_many(&self, owner: &str, ids: &[String]) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM tasks WHERE owner_phone = $1 AND task_id = ANY($2)")
            .bind(owner)
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
