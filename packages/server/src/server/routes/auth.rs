//! Auth gateway endpoints.
//!
//! Failures are opaque on the wire by design: initiate never reveals whether
//! the identity exists or delivery broke, and respond never reveals whether
//! the code was wrong, expired, or the attempt budget ran out. The flow
//! errors stay distinguishable in the logs.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};
use uuid::Uuid;

use crate::domains::auth::flow;
use crate::server::app::AppState;

#[derive(Debug, Deserialize)]
pub struct InitiateRequest {
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct InitiateResponse {
    pub session: String,
    #[serde(rename = "challengeName")]
    pub challenge_name: Option<String>,
}

/// POST /auth/initiate
pub async fn initiate_handler(
    State(state): State<AppState>,
    Json(request): Json<InitiateRequest>,
) -> Response {
    match flow::initiate(&request.phone, &state.deps).await {
        Ok(started) => Json(InitiateResponse {
            session: started.session.to_string(),
            challenge_name: started.challenge_name.map(str::to_string),
        })
        .into_response(),
        Err(err) => {
            error!(error = %err, "auth initiate failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "initiate_failed" })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub phone: String,
    pub session: String,
    pub code: String,
}

/// POST /auth/respond
pub async fn respond_handler(
    State(state): State<AppState>,
    Json(request): Json<RespondRequest>,
) -> Response {
    let Ok(session_id) = Uuid::parse_str(&request.session) else {
        warn!("auth respond with malformed session handle");
        return respond_failed();
    };

    match flow::respond(&request.phone, session_id, &request.code, &state.deps).await {
        Ok(bundle) => Json(bundle).into_response(),
        Err(err) => {
            warn!(error = %err, "auth respond rejected");
            respond_failed()
        }
    }
}

fn respond_failed() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "respond_failed" })),
    )
        .into_response()
}
