//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use rin_core::validate::ValidationError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  /// The admission calendar does not allow the action today.
  #[error("forbidden: {0}")]
  Forbidden(String),

  /// A user-correctable form problem, rendered next to the field.
  #[error("{0}")]
  Validation(ValidationError),

  #[error("internal error: {0}")]
  Internal(#[source] rin_core::Error),
}

impl From<rin_core::Error> for ApiError {
  fn from(e: rin_core::Error) -> Self {
    use rin_core::Error as E;
    match e {
      E::ApplicationNotFound(_) | E::DocumentNotFound { .. } => Self::NotFound(e.to_string()),
      E::UnknownSection(_) | E::PayloadMismatch { .. } | E::Serialization(_) => {
        Self::BadRequest(e.to_string())
      }
      E::InvalidTransition { .. } | E::DuplicateApplication(_) | E::StaleApplication(_) => {
        Self::Conflict(e.to_string())
      }
      E::ActionNotAllowed { message, .. } => Self::Forbidden(message),
      E::MissingMilestone(_) | E::InvariantViolation(_) | E::Persistence(_) => Self::Internal(e),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, body) = match &self {
      ApiError::Validation(v) => (
        StatusCode::UNPROCESSABLE_ENTITY,
        json!({ "status": "error", "message": v.to_string(), "field": v.field, "section": v.section }),
      ),
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, json!({ "error": m })),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, json!({ "error": m })),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, json!({ "error": m })),
      ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, json!({ "error": m })),
      ApiError::Internal(e) => {
        // Storage and invariant details stay in the log.
        error!(error = %e, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "internal server error" }))
      }
    };
    (status, Json(body)).into_response()
  }
}
