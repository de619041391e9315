//! HTTP request handlers.

use crate::error::ResponseError;
use crate::response::CheckUpgradeRequest;
use crate::server::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use std::sync::Arc;

/// Handle GET /v1/healthcheck.
///
/// Always 200 with an empty body, regardless of catalog or sink state.
pub async fn handle_health_check() -> StatusCode {
    StatusCode::OK
}

/// Handle POST /v1/checkupgrade.
///
/// The body is decoded by hand so a malformed payload is reported back
/// with the decode error text, and never reaches the telemetry pipeline.
/// Telemetry runs before response generation and cannot affect it.
pub async fn handle_check_upgrade(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let request: CheckUpgradeRequest =
        serde_json::from_slice(&body).map_err(|err| AppError::BadRequest(err.to_string()))?;

    state.telemetry().record(&headers, &request);

    let response = state.generator().generate(&request)?;
    Ok(Json(response).into_response())
}

/// Application-level error type for HTTP handlers.
///
/// Every client-visible failure maps to 400 with a plain-text message,
/// including post-startup catalog lookup failures (those are logged as
/// bugs where they occur).
#[derive(Debug)]
pub enum AppError {
    /// Request body could not be decoded (400)
    BadRequest(String),

    /// Response generation failed (400)
    Generate(ResponseError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match self {
            Self::BadRequest(message) => message,
            Self::Generate(err) => err.to_string(),
        };

        (StatusCode::BAD_REQUEST, message).into_response()
    }
}

impl From<ResponseError> for AppError {
    fn from(err: ResponseError) -> Self {
        Self::Generate(err)
    }
}
