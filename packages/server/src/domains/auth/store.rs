//! Login session persistence.
//!
//! A login session row is the externally-owned coordination state of one
//! login attempt: the current challenge record and the transcript of prior
//! rounds, addressed by the opaque handle returned to the client. Handlers
//! read it fresh on every round and never cache it, so any worker instance
//! can serve any round of the attempt.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domains::auth::challenge::ChallengeRecord;
use crate::domains::auth::session::ChallengeRound;
use crate::kernel::traits::StoreError;

/// Minutes a login attempt may stay open before the handle goes dead.
pub const LOGIN_SESSION_TTL_MINUTES: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginSession {
    pub id: Uuid,
    pub phone: String,
    pub challenge: ChallengeRecord,
    pub transcript: Vec<ChallengeRound>,
    pub expires_at: DateTime<Utc>,
}

impl LoginSession {
    pub fn new(phone: &str, challenge: ChallengeRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            phone: phone.to_string(),
            challenge,
            transcript: Vec::new(),
            expires_at: Utc::now() + Duration::minutes(LOGIN_SESSION_TTL_MINUTES),
        }
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &LoginSession) -> Result<(), StoreError>;

    /// Load a live session. Expired sessions are treated as missing.
    async fn fetch(&self, id: Uuid) -> Result<Option<LoginSession>, StoreError>;

    async fn update(&self, session: &LoginSession) -> Result<(), StoreError>;

    async fn remove(&self, id: Uuid) -> Result<(), StoreError>;
}

/// Postgres-backed session store.
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn session_from_row(row: &sqlx::postgres::PgRow) -> Result<LoginSession, StoreError> {
        let transcript: serde_json::Value = row.try_get("transcript")?;
        Ok(LoginSession {
            id: row.try_get("id")?,
            phone: row.try_get("phone")?,
            challenge: ChallengeRecord {
                code: row.try_get("code")?,
                expires_at: row.try_get("code_expires_at")?,
            },
            transcript: serde_json::from_value(transcript)?,
            expires_at: row.try_get("expires_at")?,
        })
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, session: &LoginSession) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO auth_sessions (id, phone, code, code_expires_at, transcript, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(session.id)
        .bind(&session.phone)
        .bind(&session.challenge.code)
        .bind(session.challenge.expires_at)
        .bind(serde_json::to_value(&session.transcript)?)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<LoginSession>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, phone, code, code_expires_at, transcript, expires_at
            FROM auth_sessions WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let session = Self::session_from_row(&row)?;

        if session.expires_at <= Utc::now() {
            // Lazy cleanup; a dead handle is indistinguishable from a missing one.
            self.remove(id).await?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    async fn update(&self, session: &LoginSession) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE auth_sessions
            SET code = $2, code_expires_at = $3, transcript = $4
            WHERE id = $1
            "#,
        )
        .bind(session.id)
        .bind(&session.challenge.code)
        .bind(session.challenge.expires_at)
        .bind(serde_json::to_value(&session.transcript)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
