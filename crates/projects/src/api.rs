//! Project API endpoints.
//!
//! - `POST   /projects`       — create
//! - `GET    /projects`       — list own projects
//! - `GET    /projects/:id`   — detail
//! - `PUT    /projects/:id`   — update name/metadata (refused while pending deletion)
//! - `DELETE /projects/:id`   — start the project-deletion saga
//! - `GET    /internal/projects/:id/authorize` — 204 owner / 403 / 404

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use px_auth::{api_error, ApiError, AuthUser};
use px_domain::{Error, Principal};

use crate::saga_init;
use crate::state::AppState;
use crate::store::{Project, ProjectStatus};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/projects", get(list).post(create))
        .route(
            "/projects/:id",
            get(detail).put(update).delete(delete_project),
        )
        .route("/internal/projects/:id/authorize", get(authorize))
        .with_state(state)
}

fn project_json(p: &Project) -> serde_json::Value {
    serde_json::json!({
        "id": p.id,
        "name": p.name,
        "owner_id": p.owner_id,
        "status": p.status.as_str(),
        "metadata": p.metadata,
        "created_at": p.created_at,
        "updated_at": p.updated_at,
    })
}

/// Fetch a project, mapping missing rows and foreign owners to the same
/// errors everywhere.
async fn owned_project(
    state: &AppState,
    id: Uuid,
    principal: Principal,
) -> Result<Project, Error> {
    let project = state
        .projects
        .find(id)
        .await?
        .ok_or_else(|| Error::not_found("project not found"))?;
    if project.owner_id != principal.id && !principal.is_staff {
        return Err(Error::permission_denied("not the project owner"));
    }
    Ok(project)
}

// ── POST /projects ─────────────────────────────────────────────────

#[derive(Deserialize)]
struct CreateRequest {
    name: String,
    #[serde(default)]
    metadata: serde_json::Value,
}

async fn create(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(req): Json<CreateRequest>,
) -> Result<Response, ApiError> {
    if req.name.trim().is_empty() {
        return Err(Error::invalid_argument("project name is required").into());
    }
    let metadata = if req.metadata.is_null() {
        serde_json::json!({})
    } else {
        req.metadata
    };
    let project = state.projects.create(&req.name, principal.id, metadata).await?;
    Ok((StatusCode::CREATED, Json(project_json(&project))).into_response())
}

// ── GET /projects ──────────────────────────────────────────────────

async fn list(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Response, ApiError> {
    let projects = state.projects.list_for_owner(principal.id).await?;
    let body: Vec<_> = projects.iter().map(project_json).collect();
    Ok(Json(body).into_response())
}

// ── GET /projects/:id ──────────────────────────────────────────────

async fn detail(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let project = owned_project(&state, id, principal).await?;
    Ok(Json(project_json(&project)).into_response())
}

// ── PUT /projects/:id ──────────────────────────────────────────────

#[derive(Deserialize)]
struct UpdateRequest {
    name: String,
    #[serde(default)]
    metadata: serde_json::Value,
}

async fn update(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRequest>,
) -> Result<Response, ApiError> {
    let project = owned_project(&state, id, principal).await?;
    if project.status == ProjectStatus::PendingDeletion {
        return Err(Error::conflict("project is pending deletion").into());
    }
    let metadata = if req.metadata.is_null() {
        project.metadata.clone()
    } else {
        req.metadata
    };
    let updated = state.projects.update(id, &req.name, metadata).await?;
    Ok(Json(project_json(&updated)).into_response())
}

// ── DELETE /projects/:id ───────────────────────────────────────────

async fn delete_project(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let project = owned_project(&state, id, principal).await?;
    if project.status == ProjectStatus::PendingDeletion {
        return Err(Error::conflict("project deletion is already in progress").into());
    }

    saga_init::initiate(
        &state.projects,
        &state.publisher,
        &state.settings.project_saga_services,
        &project,
    )
    .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "message": "project deletion has been initiated",
        })),
    )
        .into_response())
}

// ── GET /internal/projects/:id/authorize ───────────────────────────

/// Internal ownership probe used by other services (node creation, etc.).
/// 204 when the caller owns an ACTIVE project, 403 otherwise, 404 when
/// the project does not exist.
async fn authorize(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Response {
    let project = match state.projects.find(id).await {
        Ok(Some(p)) => p,
        Ok(None) => return api_error(&Error::not_found("project not found")),
        Err(e) => return api_error(&e),
    };

    if project.owner_id != principal.id {
        return api_error(&Error::permission_denied("not the project owner"));
    }
    if project.status == ProjectStatus::PendingDeletion {
        return api_error(&Error::permission_denied("project is pending deletion"));
    }
    StatusCode::NO_CONTENT.into_response()
}
