//! Memory bucket endpoints.
//!
//! - `POST   /buckets`     — create (validates project ownership upstream)
//! - `GET    /buckets`     — list own buckets
//! - `GET    /buckets/:id` — detail
//! - `DELETE /buckets/:id` — delete + `memory.bucket.deleted` event
//! - `POST   /internal/buckets/validate` — batch visibility probe

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use px_auth::{ApiError, AuthUser, RawBearer};
use px_bus::ExchangeKind;
use px_domain::{Error, Principal};
use px_proto::events;

use crate::state::AppState;
use crate::store::MemoryBucket;

const MEMORY_TYPES: [&str; 2] = ["conversation_buffer_window", "conversation_summary"];

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/buckets", get(list).post(create))
        .route("/buckets/:id", get(detail).delete(delete_bucket))
        .route("/internal/buckets/validate", post(validate))
        .with_state(state)
}

fn bucket_json(b: &MemoryBucket) -> serde_json::Value {
    serde_json::json!({
        "id": b.id,
        "name": b.name,
        "owner_id": b.owner_id,
        "project_id": b.project_id,
        "memory_type": b.memory_type,
        "config": b.config,
        "message_count": b.message_count,
        "token_count": b.token_count,
        "created_at": b.created_at,
        "updated_at": b.updated_at,
    })
}

async fn owned_bucket(
    state: &AppState,
    id: Uuid,
    principal: Principal,
) -> Result<MemoryBucket, Error> {
    let bucket = state
        .memory
        .find_bucket(id)
        .await?
        .ok_or_else(|| Error::not_found("memory bucket not found"))?;
    if bucket.owner_id != principal.id && !principal.is_staff {
        return Err(Error::not_found("memory bucket not found"));
    }
    Ok(bucket)
}

/// Ownership probe against the project service's internal endpoint,
/// forwarding the caller's token.
async fn authorize_project(state: &AppState, token: &str, project_id: Uuid) -> Result<(), Error> {
    let url = format!(
        "{}/internal/projects/{project_id}/authorize",
        state.settings.projects_http_url
    );
    let resp = state
        .http
        .get(&url)
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| Error::unavailable(format!("project service: {e}")))?;

    match resp.status().as_u16() {
        204 => Ok(()),
        404 => Err(Error::not_found("project not found")),
        403 => Err(Error::permission_denied("not the project owner")),
        s => Err(Error::unavailable(format!(
            "project authorize returned HTTP {s}"
        ))),
    }
}

// ── POST /buckets ──────────────────────────────────────────────────

#[derive(Deserialize)]
struct CreateRequest {
    name: String,
    project_id: Uuid,
    #[serde(default = "default_memory_type")]
    memory_type: String,
    #[serde(default)]
    config: serde_json::Value,
}

fn default_memory_type() -> String {
    "conversation_buffer_window".into()
}

async fn create(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    RawBearer(token): RawBearer,
    Json(req): Json<CreateRequest>,
) -> Result<Response, ApiError> {
    if req.name.trim().is_empty() {
        return Err(Error::invalid_argument("bucket name is required").into());
    }
    if !MEMORY_TYPES.contains(&req.memory_type.as_str()) {
        return Err(Error::invalid_argument(format!(
            "memory_type must be one of {MEMORY_TYPES:?}"
        ))
        .into());
    }

    authorize_project(&state, &token, req.project_id).await?;

    let config = if req.config.is_null() {
        serde_json::json!({})
    } else {
        req.config
    };
    let bucket = state
        .memory
        .create_bucket(
            principal.id,
            req.project_id,
            &req.name,
            &req.memory_type,
            config,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(bucket_json(&bucket))).into_response())
}

// ── GET /buckets ───────────────────────────────────────────────────

async fn list(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Response, ApiError> {
    let buckets = state.memory.list_for_owner(principal.id).await?;
    let body: Vec<_> = buckets.iter().map(bucket_json).collect();
    Ok(Json(body).into_response())
}

// ── GET /buckets/:id ───────────────────────────────────────────────

async fn detail(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let bucket = owned_bucket(&state, id, principal).await?;
    Ok(Json(bucket_json(&bucket)).into_response())
}

// ── DELETE /buckets/:id ────────────────────────────────────────────

async fn delete_bucket(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let bucket = owned_bucket(&state, id, principal).await?;
    state.memory.delete_bucket(bucket.id).await?;
    state
        .publisher
        .publish(
            events::RESOURCE_EVENTS,
            events::MEMORY_BUCKET_DELETED,
            &events::MemoryBucketDeleted { bucket_id: id },
            ExchangeKind::Topic,
        )
        .await?;
    tracing::info!(bucket_id = %id, "memory bucket deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ── POST /internal/buckets/validate ────────────────────────────────

#[derive(Deserialize)]
struct ValidateRequest {
    bucket_ids: Vec<Uuid>,
}

async fn validate(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(req): Json<ValidateRequest>,
) -> Result<Response, ApiError> {
    let found = state.memory.find_buckets(&req.bucket_ids).await?;
    for id in &req.bucket_ids {
        let bucket = found
            .iter()
            .find(|b| b.id == *id)
            .ok_or_else(|| Error::not_found(format!("bucket {id} not found")))?;
        if bucket.owner_id != principal.id && !principal.is_staff {
            return Err(Error::permission_denied(format!(
                "bucket {id} is not accessible"
            ))
            .into());
        }
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}
