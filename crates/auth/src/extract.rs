//! Axum-side boundary pieces: the `AuthUser` extractor and the shared
//! error → HTTP response mapping used by every service surface.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use px_domain::{Error, Principal};

use crate::TokenVerifier;

/// Implemented by each service's `AppState` so the extractor can reach
/// the shared verifier.
pub trait HasVerifier {
    fn verifier(&self) -> &TokenVerifier;
}

/// Extracts and verifies the `Authorization: Bearer <jwt>` header,
/// yielding the synthesized principal. No database involved.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Principal);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: HasVerifier + Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({ "error": "missing bearer token" })),
                )
                    .into_response()
            })?;

        match state.verifier().verify(token) {
            Ok(principal) => Ok(AuthUser(principal)),
            Err(e) => Err((
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": e.message })),
            )
                .into_response()),
        }
    }
}

/// The raw bearer token, for forwarding to internal endpoints of other
/// services (which authenticate the original caller, not this service).
#[derive(Debug, Clone)]
pub struct RawBearer(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for RawBearer
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| RawBearer(t.to_string()))
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({ "error": "missing bearer token" })),
                )
                    .into_response()
            })
    }
}

/// Build a standardized JSON error response:
/// `{ "error": "<message>", "kind": "<kind>" }` with the kind's status.
pub fn api_error(err: &Error) -> Response {
    let status =
        StatusCode::from_u16(err.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(serde_json::json!({
            "error": err.message,
            "kind": err.kind.as_str(),
        })),
    )
        .into_response()
}

/// `Result`-friendly wrapper so handlers can `?` a domain error straight
/// into the HTTP mapping.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        api_error(&self.0)
    }
}
