//! Account API endpoints.
//!
//! - `POST   /auth/register` — create a user
//! - `POST   /auth/token`    — obtain a bearer token
//! - `GET    /auth/me`       — current user details
//! - `PUT    /auth/me`       — change password
//! - `DELETE /auth/me`       — start the user-deletion saga

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Duration;
use serde::Deserialize;

use px_auth::{api_error, ApiError, AuthUser};
use px_bus::ExchangeKind;
use px_domain::Error;
use px_proto::events;
use px_saga::{SagaStore, SagaType};

use crate::password::{hash_password, verify_password};
use crate::state::AppState;
use crate::store::User;

const TOKEN_TTL_HOURS: i64 = 12;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/token", post(token))
        .route("/auth/me", get(me).put(change_password).delete(delete_me))
        .with_state(state)
}

fn user_json(user: &User) -> serde_json::Value {
    serde_json::json!({
        "id": user.id,
        "email": user.email,
        "username": user.username,
        "is_active": user.is_active,
        "is_staff": user.is_staff,
        "date_joined": user.date_joined,
    })
}

// ── POST /auth/register ────────────────────────────────────────────

#[derive(Deserialize)]
struct RegisterRequest {
    email: String,
    username: String,
    password: String,
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Response, ApiError> {
    if req.username.trim().is_empty() || req.password.len() < 8 || !req.email.contains('@') {
        return Err(Error::invalid_argument(
            "username required, valid email required, password must be at least 8 characters",
        )
        .into());
    }

    let user = state
        .users
        .create(&req.email, &req.username, &hash_password(&req.password))
        .await?;

    tracing::info!(user_id = %user.id, "user registered");
    Ok((StatusCode::CREATED, Json(user_json(&user))).into_response())
}

// ── POST /auth/token ───────────────────────────────────────────────

#[derive(Deserialize)]
struct TokenRequest {
    username: String,
    password: String,
}

async fn token(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> Result<Response, ApiError> {
    let unauthorized = || {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "invalid credentials" })),
        )
            .into_response()
    };

    let user = match state.users.find_by_username(&req.username).await? {
        Some(u) if u.is_active => u,
        _ => return Ok(unauthorized()),
    };
    if !verify_password(&user.password_hash, &req.password) {
        return Ok(unauthorized());
    }

    let access = state
        .issuer
        .issue(user.id, user.is_staff, Duration::hours(TOKEN_TTL_HOURS))?;
    Ok(Json(serde_json::json!({
        "access": access,
        "token_type": "bearer",
    }))
    .into_response())
}

// ── GET /auth/me ───────────────────────────────────────────────────

async fn me(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Response, ApiError> {
    let user = state
        .users
        .find_by_id(principal.id)
        .await?
        .ok_or_else(|| Error::not_found("user no longer exists"))?;
    Ok(Json(user_json(&user)).into_response())
}

// ── PUT /auth/me ───────────────────────────────────────────────────

#[derive(Deserialize)]
struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
}

async fn change_password(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Response, ApiError> {
    let user = state
        .users
        .find_by_id(principal.id)
        .await?
        .ok_or_else(|| Error::not_found("user no longer exists"))?;

    if !verify_password(&user.password_hash, &req.current_password) {
        return Err(Error::permission_denied("current password does not match").into());
    }
    if req.new_password.len() < 8 {
        return Err(Error::invalid_argument("password must be at least 8 characters").into());
    }

    state
        .users
        .set_password(user.id, &hash_password(&req.new_password))
        .await?;
    Ok(Json(serde_json::json!({ "detail": "password updated" })).into_response())
}

// ── DELETE /auth/me ────────────────────────────────────────────────

/// Start the user-deletion saga.
///
/// One transaction: soft-deactivate the user, create the saga and its
/// PENDING steps, then publish `user.deletion.initiated`. A publish
/// failure rolls everything back so the deactivation is never observable
/// without the saga in flight.
async fn delete_me(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Response, ApiError> {
    if state
        .sagas
        .is_running(SagaType::UserDeletion, principal.id)
        .await?
    {
        return Ok(api_error(&Error::conflict(
            "account deletion is already in progress",
        )));
    }

    let mut tx = state
        .sagas
        .pool()
        .begin()
        .await
        .map_err(|e| Error::unavailable(format!("begin tx: {e}")))?;

    crate::store::UserStore::deactivate_in_tx(&mut tx, principal.id).await?;
    SagaStore::begin_in_tx(
        &mut tx,
        SagaType::UserDeletion,
        principal.id,
        &state.settings.user_saga_services,
    )
    .await?;

    state
        .publisher
        .publish(
            events::USER_EVENTS,
            events::USER_DELETION_INITIATED,
            &events::UserDeletionInitiated {
                user_id: principal.id,
            },
            ExchangeKind::Topic,
        )
        .await?;

    tx.commit()
        .await
        .map_err(|e| Error::unavailable(format!("commit: {e}")))?;

    tracing::info!(user_id = %principal.id, "user-deletion saga initiated");
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "message": "account deletion has been initiated",
        })),
    )
        .into_response())
}
