use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::intake::multipart::ExtractError;
use crate::llm_client::CompletionError;
use crate::provisioning::ProvisionError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
/// Every pipeline failure is mapped into one of these variants before it leaves
/// the orchestrator.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Unsupported content type: {0}")]
    BadContentType(String),

    #[error("Missing file: {0}")]
    MissingFile(String),

    #[error("Invalid file: {0}")]
    InvalidFile(String),

    #[error("Malformed multipart body: {0}")]
    MalformedBody(String),

    #[error("File too large: {0}")]
    FileTooLarge(String),

    #[error("Too many files: {0}")]
    TooManyFiles(String),

    #[error("Upstream not found: {0}")]
    UpstreamNotFound(String),

    #[error("Upstream unauthorized: {0}")]
    UpstreamUnauthorized(String),

    #[error("Upstream rate limited: {0}")]
    UpstreamRateLimited(String),

    #[error("Upstream error: {0}")]
    UpstreamError(String),

    #[error("Repository provisioning failed: {0}")]
    Provisioning(#[from] ProvisionError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::BadContentType(_)
            | AppError::MissingFile(_)
            | AppError::InvalidFile(_)
            | AppError::MalformedBody(_)
            | AppError::FileTooLarge(_)
            | AppError::TooManyFiles(_) => StatusCode::BAD_REQUEST,
            AppError::UpstreamNotFound(_) => StatusCode::NOT_FOUND,
            AppError::UpstreamUnauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::UpstreamRateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::UpstreamError(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Provisioning(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            AppError::BadContentType(_) => "BAD_CONTENT_TYPE",
            AppError::MissingFile(_) => "MISSING_FILE",
            AppError::InvalidFile(_) => "INVALID_FILE",
            AppError::MalformedBody(_) => "MALFORMED_BODY",
            AppError::FileTooLarge(_) => "FILE_TOO_LARGE",
            AppError::TooManyFiles(_) => "TOO_MANY_FILES",
            AppError::UpstreamNotFound(_) => "UPSTREAM_NOT_FOUND",
            AppError::UpstreamUnauthorized(_) => "UPSTREAM_UNAUTHORIZED",
            AppError::UpstreamRateLimited(_) => "UPSTREAM_RATE_LIMITED",
            AppError::UpstreamError(_) => "UPSTREAM_ERROR",
            AppError::Provisioning(_) => "PROVISIONING_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn is_upstream(&self) -> bool {
        matches!(
            self,
            AppError::UpstreamNotFound(_)
                | AppError::UpstreamUnauthorized(_)
                | AppError::UpstreamRateLimited(_)
                | AppError::UpstreamError(_)
        )
    }
}

impl From<ExtractError> for AppError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::BadContentType(ct) => AppError::BadContentType(ct),
            ExtractError::Malformed(msg) => AppError::MalformedBody(msg),
            e @ (ExtractError::FileTooLarge { .. } | ExtractError::BodyTooLarge { .. }) => {
                AppError::FileTooLarge(e.to_string())
            }
            e @ ExtractError::TooManyFiles { .. } => AppError::TooManyFiles(e.to_string()),
        }
    }
}

impl From<CompletionError> for AppError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::NotFound(msg) => AppError::UpstreamNotFound(msg),
            CompletionError::Unauthorized(msg) => AppError::UpstreamUnauthorized(msg),
            CompletionError::RateLimited(msg) => AppError::UpstreamRateLimited(msg),
            e @ (CompletionError::Upstream { .. } | CompletionError::EmptyCompletion) => {
                AppError::UpstreamError(e.to_string())
            }
            e @ (CompletionError::Http(_) | CompletionError::Parse(_)) => {
                AppError::Internal(anyhow::Error::new(e))
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let (message, details) = match &self {
            AppError::MethodNotAllowed => (
                "Method not allowed. Use POST with multipart/form-data.".to_string(),
                None,
            ),
            AppError::BadContentType(ct) => (
                format!("Content-Type must be multipart/form-data (got '{ct}')"),
                None,
            ),
            AppError::MissingFile(msg)
            | AppError::InvalidFile(msg)
            | AppError::MalformedBody(msg)
            | AppError::FileTooLarge(msg)
            | AppError::TooManyFiles(msg) => (msg.clone(), None),
            AppError::UpstreamNotFound(msg) => {
                tracing::error!("Completion endpoint not found: {msg}");
                (
                    "Completion endpoint or model not found".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::UpstreamUnauthorized(msg) => {
                tracing::error!("Completion provider rejected credentials: {msg}");
                (
                    "Authentication with the completion provider failed".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::UpstreamRateLimited(msg) => {
                tracing::warn!("Completion provider rate limited the request: {msg}");
                (
                    "Rate limit exceeded. Please wait a moment and try again.".to_string(),
                    None,
                )
            }
            AppError::UpstreamError(msg) => {
                tracing::error!("Completion provider error: {msg}");
                (format!("Completion provider error: {msg}"), None)
            }
            AppError::Provisioning(e) => {
                tracing::error!("Provisioning error: {e}");
                (
                    "Failed to create the challenge repository".to_string(),
                    Some(e.to_string()),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    "An internal server error occurred".to_string(),
                    Some(e.to_string()),
                )
            }
        };

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if self.is_upstream() {
            body["status"] = json!(status.as_u16());
        }
        if let Some(details) = details {
            body["details"] = json!(details);
        }

        (status, Json(body)).into_response()
    }
}
