//! Inference endpoints.
//!
//! - `POST   /nodes/:id/infer` — submit a job (202 + job_id + ticket)
//! - `DELETE /jobs/:id`        — broadcast a cancellation (202)

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, post};
use axum::{Json, Router};
use chrono::Utc;
use uuid::Uuid;

use px_auth::{ApiError, AuthUser};
use px_bus::ExchangeKind;
use px_domain::Error;
use px_proto::events;
use px_proto::job::{InferenceRequest, JobPayload};

use crate::collect;
use crate::gauntlet;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/nodes/:id/infer", post(infer))
        .route("/jobs/:id", delete(cancel))
        .with_state(state)
}

// ── POST /nodes/:id/infer ──────────────────────────────────────────

/// The five-stage pipeline: metadata fetch, validation gauntlet,
/// resource collection, job assembly, then ownership record + ticket +
/// publish.
async fn infer(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(node_id): Path<Uuid>,
    Json(request): Json<InferenceRequest>,
) -> Result<Response, ApiError> {
    // Stage 1 — node details and input file metadata, in parallel.
    let (node, file_metadata) = tokio::try_join!(
        collect::fetch_node(&state, node_id, principal),
        collect::fetch_file_metadata(&state, &request.inputs, principal),
    )?;

    // Stage 2 — node-level gauntlet; resolves the resource switches.
    let resolved = gauntlet::validate_node_request(&node, &request)?;
    let model_id = node
        .configuration
        .get("model_config")
        .and_then(|m| m.get("model_id"))
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| Error::invalid_argument("node configuration is missing a model_id"))?;

    // Stage 3 — parallel resource collection (model config included).
    let resources = collect::collect(&state, model_id, &resolved, principal).await?;

    // Input compatibility needs the capability set fetched above.
    gauntlet::validate_inputs(&resources.model_config.capabilities, &request, &file_metadata)?;

    // Stage 4 — assemble the self-contained job.
    let job_id = Uuid::new_v4();
    let default_parameters = node
        .configuration
        .get("model_config")
        .and_then(|m| m.get("parameters"))
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();

    let payload = JobPayload {
        job_id,
        user_id: principal.id,
        timestamp: Utc::now(),
        query: request,
        default_parameters,
        resources,
    };

    // Stage 5 — ownership record, single-use ticket, persistent publish.
    state.tickets.store_job_owner(job_id, principal.id).await?;
    let websocket_ticket = state.tickets.mint_ticket(job_id, principal.id).await?;
    state
        .publisher
        .publish(
            events::INFERENCE_EXCHANGE,
            events::INFERENCE_JOB_START,
            &payload,
            ExchangeKind::Topic,
        )
        .await?;

    tracing::info!(%job_id, node_id = %node_id, "inference job submitted");
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "job_id": job_id,
            "status": "submitted",
            "websocket_ticket": websocket_ticket,
        })),
    )
        .into_response())
}

// ── DELETE /jobs/:id ───────────────────────────────────────────────

/// Cancellation: ownership check against the ephemeral record, then a
/// fanout broadcast every executor instance hears.
async fn cancel(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(job_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let owner = state
        .tickets
        .job_owner(job_id)
        .await?
        .ok_or_else(|| Error::not_found("job not found or already finished"))?;

    if owner != principal.id {
        return Err(Error::permission_denied("only the job owner may cancel it").into());
    }

    state
        .publisher
        .publish(
            events::JOB_CONTROL_FANOUT,
            "",
            &events::JobCancel {
                job_id,
                user_id: principal.id,
            },
            ExchangeKind::Fanout,
        )
        .await?;
    state.tickets.delete_job_owner(job_id).await?;

    tracing::info!(%job_id, "cancellation broadcast");
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "job_id": job_id, "status": "cancellation_requested" })),
    )
        .into_response())
}
