//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error leaves as `{ "error": "<message>" }`. Dependency failures are
//! logged in full and reported with a generic message.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use henrietta_core::register::RegisterError;
use serde_json::json;
use thiserror::Error;

pub const GENERIC_FAILURE: &str = "Something went wrong";
pub const RATE_LIMITED: &str = "Too many requests. Try again later.";

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  /// The message is shown to the user as-is.
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("rate limited")]
  RateLimited,

  #[error("internal error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  pub fn internal(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Internal(Box::new(e))
  }
}

impl From<RegisterError> for ApiError {
  fn from(e: RegisterError) -> Self {
    match e {
      RegisterError::Validation(errors) => Self::BadRequest(errors.to_string()),
      RegisterError::RateLimited => Self::RateLimited,
      RegisterError::Dependency(e) => Self::internal(e),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED.to_string()),
      ApiError::Internal(e) => {
        tracing::error!(error = %e, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
