//! Registered-user lookup.
//!
//! Registration is out of band in V1 (a manually approved row); the auth
//! flow only ever asks whether a phone number exists. Unknown identities
//! surface as the same opaque initiate failure as anything else, so the
//! endpoint cannot be used to enumerate accounts.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::kernel::traits::StoreError;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn is_registered(&self, phone: &str) -> Result<bool, StoreError>;
}

/// Postgres-backed user directory.
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn is_registered(&self, phone: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 AS one FROM users WHERE phone = $1")
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}
