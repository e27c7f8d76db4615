//! Service trait abstractions used by the dependency container.
//!
//! External services sit behind traits so handlers can be exercised against
//! in-memory implementations (see test_dependencies.rs).

use anyhow::Result;
use async_trait::async_trait;

/// Out-of-band delivery of a human-readable message to a phone number.
///
/// Implementations must surface delivery failure as an error; the auth flow
/// relies on it to refuse handing out sessions whose code never left the
/// building.
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_sms(&self, to: &str, body: &str) -> Result<()>;
}

/// Errors common to all store implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
