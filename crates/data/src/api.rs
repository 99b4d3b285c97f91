//! File API endpoints.
//!
//! - `POST   /files`         — upload (JSON body, base64 content)
//! - `GET    /files`         — list own files
//! - `GET    /files/:id`     — metadata
//! - `GET    /files/:id/raw` — raw bytes (unauthenticated; consumed by
//!   model providers via URL)
//! - `DELETE /files/:id`     — delete metadata + object

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::Engine;
use serde::Deserialize;
use uuid::Uuid;

use px_auth::{ApiError, AuthUser};
use px_domain::{Error, Principal};

use crate::object_store::content_key;
use crate::state::AppState;
use crate::store::StoredFile;

/// Upload cap (base64-decoded): 32 MiB.
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/files", get(list).post(upload))
        .route("/files/:id", get(detail).delete(delete_file))
        .route("/files/:id/raw", get(raw))
        .with_state(state)
}

fn file_json(f: &StoredFile) -> serde_json::Value {
    serde_json::json!({
        "id": f.id,
        "owner_id": f.owner_id,
        "project_id": f.project_id,
        "filename": f.filename,
        "mimetype": f.mimetype,
        "size_bytes": f.size_bytes,
        "created_at": f.created_at,
    })
}

async fn owned_file(state: &AppState, id: Uuid, principal: Principal) -> Result<StoredFile, Error> {
    let file = state
        .files
        .find(id)
        .await?
        .ok_or_else(|| Error::not_found("file not found"))?;
    if file.owner_id != principal.id && !principal.is_staff {
        return Err(Error::not_found("file not found"));
    }
    Ok(file)
}

// ── POST /files ────────────────────────────────────────────────────

#[derive(Deserialize)]
struct UploadRequest {
    project_id: Uuid,
    filename: String,
    mimetype: String,
    /// Base64-encoded file bytes.
    content: String,
}

async fn upload(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(req): Json<UploadRequest>,
) -> Result<Response, ApiError> {
    if req.filename.trim().is_empty() {
        return Err(Error::invalid_argument("filename is required").into());
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&req.content)
        .map_err(|_| Error::invalid_argument("content must be valid base64"))?;
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(Error::invalid_argument(format!(
            "file exceeds the {MAX_UPLOAD_BYTES} byte upload cap"
        ))
        .into());
    }

    let key = content_key(&bytes);
    state.objects.put(&key, &bytes).await?;
    let file = state
        .files
        .create(
            principal.id,
            req.project_id,
            &req.filename,
            &req.mimetype,
            bytes.len() as i64,
            &key,
        )
        .await?;

    tracing::info!(file_id = %file.id, size = bytes.len(), "file stored");
    Ok((StatusCode::CREATED, Json(file_json(&file))).into_response())
}

// ── GET /files ─────────────────────────────────────────────────────

async fn list(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Response, ApiError> {
    let files = state.files.list_for_owner(principal.id).await?;
    let body: Vec<_> = files.iter().map(file_json).collect();
    Ok(Json(body).into_response())
}

// ── GET /files/:id ─────────────────────────────────────────────────

async fn detail(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let file = owned_file(&state, id, principal).await?;
    Ok(Json(file_json(&file)).into_response())
}

// ── GET /files/:id/raw ─────────────────────────────────────────────

async fn raw(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Response, ApiError> {
    let file = state
        .files
        .find(id)
        .await?
        .ok_or_else(|| Error::not_found("file not found"))?;
    let bytes = state
        .objects
        .get(&file.storage_path)
        .await?
        .ok_or_else(|| Error::not_found("file object is not available"))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, file.mimetype)],
        bytes,
    )
        .into_response())
}

// ── DELETE /files/:id ──────────────────────────────────────────────

async fn delete_file(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let file = owned_file(&state, id, principal).await?;
    state.files.delete(file.id).await?;
    state.objects.delete(&file.storage_path).await?;
    tracing::info!(file_id = %id, "file deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}
