use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::debug;

use crate::domains::auth::jwt::JwtService;
use crate::server::app::AppState;

/// Authenticated user information from the bearer JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub phone: String,
}

/// Bearer authentication middleware for the sync endpoints.
///
/// Extracts the JWT from the Authorization header, verifies it, and adds
/// AuthUser to request extensions. Unlike a public-access extractor this one
/// fails closed: no valid token with a phone claim means 401 and the request
/// never reaches a handler, so no store access happens for unauthenticated
/// callers.
pub async fn require_bearer(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match bearer_user(&request, &state.deps.jwt_service) {
        Some(user) => {
            debug!(phone = %user.phone, "authenticated request");
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => {
            debug!("missing or invalid bearer credential");
            unauthorized_response()
        }
    }
}

/// Extract and verify the bearer token from a request
fn bearer_user(request: &Request, jwt_service: &JwtService) -> Option<AuthUser> {
    let auth_header = request.headers().get(AUTHORIZATION)?;
    let auth_str = auth_header.to_str().ok()?;
    let token = auth_str.strip_prefix("Bearer ")?;

    // verify_bearer refuses refresh tokens and tokens without a phone claim
    let claims = jwt_service.verify_bearer(token).ok()?;
    Some(AuthUser {
        phone: claims.phone_number,
    })
}

/// Error response for unauthenticated requests
pub fn unauthorized_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "unauthorized" })),
    )
        .into_response()
}
