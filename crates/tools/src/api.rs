//! Tool API endpoints.
//!
//! - `POST   /tools`      — register a tool
//! - `GET    /tools`      — list own + system tools
//! - `GET    /tools/:id`  — detail
//! - `DELETE /tools/:id`  — delete + `tool.deleted` event
//! - `POST   /internal/tools/validate` — batch visibility probe

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
use crate::store::{Tool, ToolType};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/tools", get(list).post(create))
        .route("/tools/:id", get(detail).delete(delete_tool))
        .route("/internal/tools/validate", post(validate))
        .with_state(state)
}

fn tool_json(t: &Tool) -> serde_json::Value {
    serde_json::json!({
        "id": t.id,
        "name": t.name,
        "is_system_tool": t.is_system_tool,
        "owner_id": t.owner_id,
        "tool_type": t.tool_type.as_str(),
        "definition": t.definition,
        "created_at": t.created_at,
        "updated_at": t.updated_at,
    })
}

async fn visible_tool(state: &AppState, id: Uuid, principal: Principal) -> Result<Tool, Error> {
    let tool = state
        .tools
        .find(id)
        .await?
        .ok_or_else(|| Error::not_found("tool not found"))?;
    if !tool.visible_to(principal) {
        return Err(Error::not_found("tool not found"));
    }
    Ok(tool)
}

// ── POST /tools ────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CreateRequest {
    name: String,
    #[serde(default = "default_tool_type")]
    tool_type: String,
    definition: serde_json::Value,
    #[serde(default)]
    is_system_tool: bool,
}

fn default_tool_type() -> String {
    "standard".into()
}

async fn create(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(req): Json<CreateRequest>,
) -> Result<Response, ApiError> {
    if req.name.trim().is_empty() {
        return Err(Error::invalid_argument("tool name is required").into());
    }
    let tool_type = ToolType::parse(&req.tool_type)
        .ok_or_else(|| Error::invalid_argument("tool_type must be 'standard' or 'mcp'"))?;
    if !req.definition.is_object() {
        return Err(Error::invalid_argument("definition must be a JSON object").into());
    }
    if req.is_system_tool && !principal.is_staff {
        return Err(Error::permission_denied("only staff may register system tools").into());
    }

    // User-owned tools must not point into the process: internal
    // functions are reserved for the system catalogue.
    let exec_type = req
        .definition
        .get("execution")
        .and_then(|e| e.get("type"))
        .and_then(|t| t.as_str())
        .unwrap_or("");
    if !req.is_system_tool && exec_type == "internal_function" {
        return Err(Error::invalid_argument(
            "user tools may not use internal_function execution",
        )
        .into());
    }

    let owner_id = if req.is_system_tool {
        None
    } else {
        Some(principal.id)
    };
    let tool = state
        .tools
        .create(&req.name, owner_id, tool_type, req.definition)
        .await?;
    Ok((StatusCode::CREATED, Json(tool_json(&tool))).into_response())
}

// ── GET /tools ─────────────────────────────────────────────────────

async fn list(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Response, ApiError> {
    let tools = state.tools.list_visible(principal).await?;
    let body: Vec<_> = tools.iter().map(tool_json).collect();
    Ok(Json(body).into_response())
}

// ── GET /tools/:id ─────────────────────────────────────────────────

async fn detail(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let tool = visible_tool(&state, id, principal).await?;
    Ok(Json(tool_json(&tool)).into_response())
}

// ── DELETE /tools/:id ──────────────────────────────────────────────

async fn delete_tool(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let tool = visible_tool(&state, id, principal).await?;
    if !tool.writable_by(principal) {
        return Err(Error::permission_denied("system tools are read-only").into());
    }

    state.tools.delete(id).await?;
    state
        .publisher
        .publish(
            events::RESOURCE_EVENTS,
            events::TOOL_DELETED,
            &events::ToolDeleted { tool_id: id },
            ExchangeKind::Topic,
        )
        .await?;

    tracing::info!(tool_id = %id, "tool deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ── POST /internal/tools/validate ──────────────────────────────────

#[derive(Deserialize)]
struct ValidateRequest {
    tool_ids: Vec<Uuid>,
}

/// 204 when every id resolves to a tool visible to the caller.
async fn validate(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(req): Json<ValidateRequest>,
) -> Result<Response, ApiError> {
    let found = state.tools.find_many(&req.tool_ids).await?;
    for id in &req.tool_ids {
        let tool = found
            .iter()
            .find(|t| t.id == *id)
            .ok_or_else(|| Error::not_found(format!("tool {id} not found")))?;
        if !tool.visible_to(principal) {
            return Err(Error::permission_denied(format!(
                "tool {id} is not accessible"
            ))
            .into());
        }
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}
