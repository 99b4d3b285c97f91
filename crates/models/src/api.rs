//! Model registry endpoints.
//!
//! - `POST   /models`      — register a model (staff may register system models)
//! - `GET    /models`      — list own + system models
//! - `GET    /models/:id`  — detail (credentials stripped)
//! - `PUT    /models/:id`  — update; capability changes fan out to the healer
//! - `DELETE /models/:id`  — delete + `model.deleted` event
//! - `POST   /internal/models/validate` — visibility probe for other services

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use px_auth::{ApiError, AuthUser};
use px_bus::ExchangeKind;
use px_domain::{Error, Principal};
use px_proto::events;

use crate::state::AppState;
use crate::store::AiModel;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/models", get(list).post(create))
        .route("/models/:id", get(detail).put(update).delete(delete_model))
        .route("/internal/models/validate", post(validate))
        .with_state(state)
}

/// Public JSON rendering. The credentials block never leaves the service
/// over the public API; it is released only to the executor over the
/// internal RPC.
fn model_json(m: &AiModel) -> serde_json::Value {
    let mut configuration = m.configuration.clone();
    if let Some(obj) = configuration.as_object_mut() {
        obj.remove("credentials");
    }
    serde_json::json!({
        "id": m.id,
        "is_system_model": m.is_system_model,
        "owner_id": m.owner_id,
        "provider": m.provider,
        "name": m.name,
        "configuration": configuration,
        "capabilities": m.capabilities,
        "created_at": m.created_at,
        "updated_at": m.updated_at,
    })
}

async fn visible_model(
    state: &AppState,
    id: Uuid,
    principal: Principal,
) -> Result<AiModel, Error> {
    let model = state
        .models
        .find(id)
        .await?
        .ok_or_else(|| Error::not_found("model not found"))?;
    if !model.visible_to(principal) {
        // Invisible rows read as missing.
        return Err(Error::not_found("model not found"));
    }
    Ok(model)
}

// ── POST /models ───────────────────────────────────────────────────

#[derive(Deserialize)]
struct CreateRequest {
    provider: String,
    name: String,
    #[serde(default)]
    configuration: serde_json::Value,
    #[serde(default)]
    capabilities: Vec<String>,
    /// Staff only: register a system model (no owner).
    #[serde(default)]
    is_system_model: bool,
}

async fn create(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(req): Json<CreateRequest>,
) -> Result<Response, ApiError> {
    if req.name.trim().is_empty() || req.provider.trim().is_empty() {
        return Err(Error::invalid_argument("provider and name are required").into());
    }
    if req.is_system_model && !principal.is_staff {
        return Err(Error::permission_denied("only staff may register system models").into());
    }

    let owner_id = if req.is_system_model {
        None
    } else {
        Some(principal.id)
    };
    let configuration = if req.configuration.is_null() {
        serde_json::json!({})
    } else {
        req.configuration
    };

    let model = state
        .models
        .create(
            owner_id,
            &req.provider,
            &req.name,
            configuration,
            &req.capabilities,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(model_json(&model))).into_response())
}

// ── GET /models ────────────────────────────────────────────────────

async fn list(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Response, ApiError> {
    let models = state.models.list_visible(principal).await?;
    let body: Vec<_> = models.iter().map(model_json).collect();
    Ok(Json(body).into_response())
}

// ── GET /models/:id ────────────────────────────────────────────────

async fn detail(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let model = visible_model(&state, id, principal).await?;
    Ok(Json(model_json(&model)).into_response())
}

// ── PUT /models/:id ────────────────────────────────────────────────

#[derive(Deserialize)]
struct UpdateRequest {
    name: String,
    #[serde(default)]
    configuration: Option<serde_json::Value>,
    #[serde(default)]
    capabilities: Option<Vec<String>>,
}

async fn update(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRequest>,
) -> Result<Response, ApiError> {
    let model = visible_model(&state, id, principal).await?;
    if !model.writable_by(principal) {
        return Err(Error::permission_denied("system models are read-only").into());
    }

    let configuration = req.configuration.unwrap_or_else(|| model.configuration.clone());
    let capabilities = req.capabilities.unwrap_or_else(|| model.capabilities.clone());
    let capabilities_changed = capabilities != model.capabilities;

    let updated = state
        .models
        .update(id, &req.name, configuration, &capabilities)
        .await?;

    if capabilities_changed {
        state
            .publisher
            .publish(
                events::RESOURCE_EVENTS,
                events::MODEL_CAPABILITIES_UPDATED,
                &events::ModelCapabilitiesUpdated {
                    model_id: id,
                    new_capabilities: capabilities,
                },
                ExchangeKind::Topic,
            )
            .await?;
        tracing::info!(model_id = %id, "capability change published");
    }

    Ok(Json(model_json(&updated)).into_response())
}

// ── DELETE /models/:id ─────────────────────────────────────────────

async fn delete_model(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let model = visible_model(&state, id, principal).await?;
    if !model.writable_by(principal) {
        return Err(Error::permission_denied("system models are read-only").into());
    }

    state.models.delete(id).await?;
    state
        .publisher
        .publish(
            events::RESOURCE_EVENTS,
            events::MODEL_DELETED,
            &events::ModelDeleted { model_id: id },
            ExchangeKind::Topic,
        )
        .await?;

    tracing::info!(model_id = %id, "model deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ── POST /internal/models/validate ─────────────────────────────────

#[derive(Deserialize)]
struct ValidateRequest {
    model_id: Uuid,
}

/// 204 when the model exists and is visible to the caller.
async fn validate(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(req): Json<ValidateRequest>,
) -> Result<Response, ApiError> {
    visible_model(&state, req.model_id, principal).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
