//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use entitle_core::{ErrorKind, StoreError, availability::AvailabilityResult};
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

  /// Identity headers missing or malformed.
  #[error("unauthorized: {0}")]
  Unauthorized(String),

  #[error("forbidden: {0}")]
  Forbidden(String),

  /// A state or precondition refusal. Availability refusals carry the full
  /// computation so callers can explain them.
  #[error("conflict: {message}")]
  Conflict {
    message:      String,
    availability: Option<Box<AvailabilityResult>>,
  },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Classify a backend error by the domain error it wraps, if any.
  pub fn from_store<E: StoreError>(e: E) -> Self {
    let Some(core) = e.as_core() else {
      return Self::Store(Box::new(e));
    };
    let message = core.to_string();
    match core.kind() {
      ErrorKind::Validation => Self::BadRequest(message),
      ErrorKind::NotFound => Self::NotFound(message),
      ErrorKind::Forbidden => Self::Forbidden(message),
      ErrorKind::Conflict => Self::Conflict {
        message,
        availability: core.availability().cloned().map(Box::new),
      },
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, body) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, json!({ "error": m })),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, json!({ "error": m })),
      ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, json!({ "error": m })),
      ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, json!({ "error": m })),
      ApiError::Conflict { message, availability } => (
        StatusCode::CONFLICT,
        json!({ "error": message, "availability": availability }),
      ),
      ApiError::Store(e) => {
        error!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": e.to_string() }))
      }
    };
    (status, Json(body)).into_response()
  }
}
