//! Node API endpoints.
//!
//! - `POST   /nodes/draft`              — stage 1: named, unconfigured node
//! - `POST   /nodes/:id/configure-model`— stage 2: bind model + template
//! - `PUT    /nodes/:id`                — values-only update
//! - `GET    /nodes/:id`                — detail
//! - `DELETE /nodes/:id`                — delete
//! - `GET    /projects/:id/nodes`       — list a project's nodes

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use px_auth::{ApiError, AuthUser, RawBearer};
use px_domain::{Error, Principal};

use crate::state::AppState;
use crate::store::Node;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/nodes/draft", post(create_draft))
        .route("/nodes/:id/configure-model", post(configure_model))
        .route("/nodes/:id", get(detail).put(update).delete(delete_node))
        .route("/projects/:id/nodes", get(list_for_project))
        .with_state(state)
}

fn node_json(n: &Node) -> serde_json::Value {
    serde_json::json!({
        "id": n.id,
        "project_id": n.project_id,
        "owner_id": n.owner_id,
        "name": n.name,
        "status": n.status.as_str(),
        "configuration": n.configuration,
        "created_at": n.created_at,
        "updated_at": n.updated_at,
    })
}

async fn owned_node(state: &AppState, id: Uuid, principal: Principal) -> Result<Node, Error> {
    let node = state
        .service
        .store
        .find(id)
        .await?
        .ok_or_else(|| Error::not_found("node not found"))?;
    if node.owner_id != principal.id && !principal.is_staff {
        return Err(Error::not_found("node not found"));
    }
    Ok(node)
}

// ── POST /nodes/draft ──────────────────────────────────────────────

#[derive(Deserialize)]
struct DraftRequest {
    project_id: Uuid,
    name: String,
}

async fn create_draft(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    RawBearer(token): RawBearer,
    Json(req): Json<DraftRequest>,
) -> Result<Response, ApiError> {
    if req.name.trim().is_empty() {
        return Err(Error::invalid_argument("node name is required").into());
    }
    let node = state
        .service
        .create_draft(&token, principal, req.project_id, &req.name)
        .await?;
    tracing::info!(node_id = %node.id, "draft node created");
    Ok((StatusCode::CREATED, Json(node_json(&node))).into_response())
}

// ── POST /nodes/:id/configure-model ────────────────────────────────

#[derive(Deserialize)]
struct ConfigureModelRequest {
    model_id: Uuid,
}

async fn configure_model(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ConfigureModelRequest>,
) -> Result<Response, ApiError> {
    let node = owned_node(&state, id, principal).await?;
    let node = state
        .service
        .configure_model(principal, &node, req.model_id)
        .await?;
    tracing::info!(node_id = %id, model_id = %req.model_id, "node model configured");
    Ok(Json(node_json(&node)).into_response())
}

// ── PUT /nodes/:id ─────────────────────────────────────────────────

#[derive(Deserialize)]
struct UpdateRequest {
    #[serde(default)]
    name: Option<String>,
    configuration: serde_json::Value,
}

async fn update(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    RawBearer(token): RawBearer,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRequest>,
) -> Result<Response, ApiError> {
    let node = owned_node(&state, id, principal).await?;
    if node.status == px_proto::rpc::NodeStatus::Draft {
        return Err(Error::invalid_argument(
            "node has no model yet; use configure-model first",
        )
        .into());
    }
    let name = req.name.as_deref().unwrap_or(&node.name);
    let node = state
        .service
        .update(&token, &node, name, &req.configuration)
        .await?;
    Ok(Json(node_json(&node)).into_response())
}

// ── GET /nodes/:id ─────────────────────────────────────────────────

async fn detail(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let node = owned_node(&state, id, principal).await?;
    Ok(Json(node_json(&node)).into_response())
}

// ── DELETE /nodes/:id ──────────────────────────────────────────────

async fn delete_node(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let node = owned_node(&state, id, principal).await?;
    state.service.store.delete(node.id).await?;
    tracing::info!(node_id = %id, "node deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ── GET /projects/:id/nodes ────────────────────────────────────────

async fn list_for_project(
    State(state): State<AppState>,
    AuthUser(_principal): AuthUser,
    RawBearer(token): RawBearer,
    Path(project_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    // Project-level access check, then the local rows.
    state
        .service
        .validation
        .authorize_project(&token, project_id)
        .await?;
    let nodes = state.service.store.list_for_project(project_id).await?;
    let body: Vec<_> = nodes.iter().map(node_json).collect();
    Ok(Json(body).into_response())
}
