//! Client for the auth gateway: initiate a login attempt, then answer the
//! delivered code to obtain a token bundle.
//!
//! The gateway is opaque about failures on purpose; this client mirrors
//! that and only distinguishes transport errors from rejections.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AuthClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("initiate failed")]
    InitiateFailed,

    #[error("respond failed")]
    RespondFailed,
}

/// Gateway answer to an initiate call.
#[derive(Debug, Clone, Deserialize)]
pub struct ChallengeStarted {
    pub session: String,
    #[serde(rename = "challengeName")]
    pub challenge_name: Option<String>,
}

/// The token bundle a successful login returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBundle {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: String,
}

pub struct AuthClient {
    http: Client,
    base_url: String,
}

impl AuthClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Start a login attempt for `phone`. On success the code is on its way
    /// out of band and the returned session handle identifies the attempt.
    pub async fn initiate(&self, phone: &str) -> Result<ChallengeStarted, AuthClientError> {
        let response = self
            .http
            .post(format!("{}/auth/initiate", self.base_url))
            .json(&json!({ "phone": phone }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthClientError::InitiateFailed);
        }
        Ok(response.json().await?)
    }

    /// Answer the current challenge round with the code the user received.
    pub async fn respond(
        &self,
        phone: &str,
        session: &str,
        code: &str,
    ) -> Result<TokenBundle, AuthClientError> {
        let response = self
            .http
            .post(format!("{}/auth/respond", self.base_url))
            .json(&json!({ "phone": phone, "session": session, "code": code }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthClientError::RespondFailed);
        }
        Ok(response.json().await?)
    }
}
