//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Response bodies carry fixed messages only. The underlying error is logged
//! (sanitized) and never echoed back to the caller.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use steward_engine::redact::sanitize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Engine(#[from] steward_engine::Error),
}

impl ApiError {
  fn status_and_message(&self) -> (StatusCode, &'static str) {
    use steward_engine::Error as E;
    match self {
      ApiError::BadRequest(_) | ApiError::Engine(E::Validation(_)) => {
        (StatusCode::BAD_REQUEST, "invalid request")
      }
      ApiError::Engine(E::RateLimited { .. }) => {
        (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded")
      }
      ApiError::Engine(E::NotFound(_)) => (StatusCode::NOT_FOUND, "not found"),
      ApiError::Engine(E::Unavailable(_)) => {
        (StatusCode::SERVICE_UNAVAILABLE, "service temporarily unavailable")
      }
      ApiError::Engine(E::Store(_) | E::Context(_)) => {
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
      }
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = self.status_and_message();
    if status.is_server_error() {
      tracing::error!(error = %sanitize(&self.to_string()), "request failed");
    } else {
      tracing::debug!(error = %sanitize(&self.to_string()), "request rejected");
    }

    let mut res = (status, Json(json!({ "error": message }))).into_response();
    if let ApiError::Engine(steward_engine::Error::RateLimited { retry_after_secs }) = self
      && let Ok(v) = HeaderValue::from_str(&retry_after_secs.to_string())
    {
      res.headers_mut().insert(header::RETRY_AFTER, v);
    }
    res
  }
}
