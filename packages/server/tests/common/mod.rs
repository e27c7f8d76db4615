//! Test harness: the full router over in-memory dependencies.
//!
//! Requests are driven through `tower::ServiceExt::oneshot`, so no sockets,
//! database, or SMS provider are involved; the recording SMS sender stands
//! in for delivery and lets tests read the code a round would have sent.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use server_core::domains::auth::jwt::JwtService;
use server_core::kernel::test_dependencies::{
    MemorySessionStore, MemoryTaskStore, MemoryUserDirectory, RecordingSmsSender,
};
use server_core::kernel::ServerDeps;
use server_core::server::build_app;

/// The one registered identity the tests log in with.
pub const PHONE: &str = "+15551234567";

pub struct TestHarness {
    pub app: Router,
    pub sms: Arc<RecordingSmsSender>,
    pub jwt_service: Arc<JwtService>,
}

pub fn harness() -> TestHarness {
    harness_with_ttl(10)
}

/// Harness with a configurable code TTL; `0` makes every code expired on
/// arrival, which is the only way to exercise the expiry path end to end.
pub fn harness_with_ttl(otp_ttl_minutes: i64) -> TestHarness {
    let sms = Arc::new(RecordingSmsSender::new());
    let users = Arc::new(MemoryUserDirectory::new());
    users.register(PHONE);
    let jwt_service = Arc::new(JwtService::new("test_secret_key", "test_issuer".to_string()));

    let deps = Arc::new(ServerDeps::new(
        sms.clone(),
        Arc::new(MemorySessionStore::new()),
        Arc::new(MemoryTaskStore::new()),
        users,
        jwt_service.clone(),
        otp_ttl_minutes,
    ));

    TestHarness {
        // Rate limiting off: oneshot requests carry no peer address.
        app: build_app(deps, false),
        sms,
        jwt_service,
    }
}

pub async fn post_json(
    app: &Router,
    path: &str,
    bearer: Option<&str>,
    body: Value,
) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = request
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    send(app, request).await
}

pub async fn get_json(app: &Router, path: &str, bearer: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::builder().method("GET").uri(path);
    if let Some(token) = bearer {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = request.body(Body::empty()).unwrap();
    send(app, request).await
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        // Rejections (e.g. a malformed-JSON extractor error) come back as a
        // plain-text body; keep the raw text rather than assuming JSON.
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}

/// Run the whole login flow and return the token bundle.
pub async fn login(h: &TestHarness) -> Value {
    let (status, body) = post_json(&h.app, "/auth/initiate", None, json!({ "phone": PHONE })).await;
    assert_eq!(status, StatusCode::OK, "initiate failed: {body}");
    let session = body["session"].as_str().unwrap().to_string();

    let code = h.sms.last_code_for(PHONE).expect("code was delivered");
    let (status, bundle) = post_json(
        &h.app,
        "/auth/respond",
        None,
        json!({ "phone": PHONE, "session": session, "code": code }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "respond failed: {bundle}");
    bundle
}

/// Log in and return a bearer access token.
pub async fn bearer(h: &TestHarness) -> String {
    login(h).await["accessToken"].as_str().unwrap().to_string()
}
