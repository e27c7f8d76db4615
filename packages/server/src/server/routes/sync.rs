//! Sync endpoints: batch upload with per-record optimistic concurrency,
//! incremental download from a client-held watermark, and unconditional
//! batch delete.
//!
//! All three sit behind the bearer middleware; the owning identity comes
//! from the verified token claims, never from the request body.

use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::domains::tasks::models::TaskRecord;
use crate::domains::tasks::store::UpsertOutcome;
use crate::kernel::traits::StoreError;
use crate::server::app::AppState;
use crate::server::middleware::AuthUser;

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub tasks: Vec<TaskRecord>,
}

#[derive(Debug, Serialize)]
pub struct UploadResult {
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub results: Vec<UploadResult>,
}

/// POST /sync/upload
///
/// The batch is not atomic: each record independently succeeds or conflicts,
/// so unrelated records go through even when one is stale.
pub async fn upload_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<UploadRequest>,
) -> Response {
    let mut results = Vec::with_capacity(request.tasks.len());
    for mut task in request.tasks {
        task.normalize();
        match state.deps.tasks.upsert(&user.phone, &task).await {
            Ok(UpsertOutcome::Accepted { .. }) => results.push(UploadResult {
                id: task.id,
                ok: true,
                conflict: None,
            }),
            Ok(UpsertOutcome::Conflict) => results.push(UploadResult {
                id: task.id,
                ok: false,
                conflict: Some(true),
            }),
            Err(err) => return store_failure(err),
        }
    }
    Json(UploadResponse { results }).into_response()
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub since: i64,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub tasks: Vec<TaskRecord>,
    /// Pagination slot kept for wire compatibility; null while responses fit
    /// one page.
    #[serde(rename = "lastEvaluatedKey")]
    pub last_evaluated_key: Option<String>,
}

/// GET /sync/download?since=<ms>
///
/// Returns records with `updatedAt` strictly greater than the watermark.
/// Advancing the watermark is the client's job, after it has applied the
/// batch.
pub async fn download_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<DownloadQuery>,
) -> Response {
    match state.deps.tasks.changed_since(&user.phone, query.since).await {
        Ok(tasks) => Json(DownloadResponse {
            tasks,
            last_evaluated_key: None,
        })
        .into_response(),
        Err(err) => store_failure(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub ids: Vec<String>,
}

/// POST /tasks/delete
///
/// Unconditional, idempotent: no version gate, and deleting a missing record
/// is a no-op.
pub async fn delete_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<DeleteRequest>,
) -> Response {
    match state.deps.tasks.delete_many(&user.phone, &request.ids).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(err) => store_failure(err),
    }
}

fn store_failure(err: StoreError) -> Response {
    error!(error = %err, "task store failure");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "store_failure" })),
    )
        .into_response()
}
