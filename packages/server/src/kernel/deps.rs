//! Server dependencies (using traits for testability)
//!
//! The central dependency container shared by all request handlers. All
//! external services and stores are trait objects so the integration tests
//! can swap in the in-memory implementations.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use twilio::TwilioService;

use crate::domains::auth::directory::UserDirectory;
use crate::domains::auth::jwt::JwtService;
use crate::domains::auth::store::SessionStore;
use crate::domains::tasks::store::TaskStore;
use crate::kernel::traits::SmsSender;

// =============================================================================
// TwilioService Adapter (implements SmsSender trait)
// =============================================================================

/// Wrapper around TwilioService that implements the SmsSender trait
pub struct TwilioSmsSender(pub Arc<TwilioService>);

impl TwilioSmsSender {
    pub fn new(service: Arc<TwilioService>) -> Self {
        Self(service)
    }
}

#[async_trait]
impl SmsSender for TwilioSmsSender {
    async fn send_sms(&self, to: &str, body: &str) -> Result<()> {
        self.0
            .send_message(to, body)
            .await
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!("{}", e))
    }
}

// =============================================================================
// ServerDeps
// =============================================================================

/// Server dependencies accessible to request handlers
#[derive(Clone)]
pub struct ServerDeps {
    pub sms: Arc<dyn SmsSender>,
    pub sessions: Arc<dyn SessionStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub users: Arc<dyn UserDirectory>,
    /// JWT service for token creation and bearer verification
    pub jwt_service: Arc<JwtService>,
    /// Minutes a one-time code stays valid after delivery.
    pub otp_ttl_minutes: i64,
}

impl ServerDeps {
    pub fn new(
        sms: Arc<dyn SmsSender>,
        sessions: Arc<dyn SessionStore>,
        tasks: Arc<dyn TaskStore>,
        users: Arc<dyn UserDirectory>,
        jwt_service: Arc<JwtService>,
        otp_ttl_minutes: i64,
    ) -> Self {
        Self {
            sms,
            sessions,
            tasks,
            users,
            jwt_service,
            otp_ttl_minutes,
        }
    }
}
