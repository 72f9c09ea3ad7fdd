//! Axum route handlers for the challenge endpoint.

use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    Json,
};

use crate::challenge::pipeline::SubmissionResult;
use crate::errors::AppError;
use crate::intake::multipart::{read_body, require_multipart};
use crate::state::AppState;

/// POST /api/generate-challenge
///
/// Multipart upload of `resume` + `job_description` (plus optional metadata).
/// Returns the challenge's editor link and repository branch link.
pub async fn handle_generate_challenge(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<SubmissionResult>, AppError> {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    // Reject before reading a byte of the body.
    require_multipart(content_type)?;

    // The body is buffered in full, bounded by the intake deadline; see
    // intake::multipart.
    let intake = &state.config.intake;
    let source = read_body(
        body.into_data_stream(),
        Duration::from_secs(intake.timeout_secs),
        intake.max_body_bytes(),
    )
    .await?;

    let result = state.pipeline.run(source, content_type).await?;

    Ok(Json(result))
}

/// OPTIONS /api/generate-challenge
pub async fn handle_preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Any other method on the challenge route.
pub async fn handle_method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}
