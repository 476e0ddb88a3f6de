//! Route handlers, one module per resource.

pub mod notifications;
pub mod policy;
pub mod preferences;
pub mod risk_flags;
pub mod runs;
pub mod scores;

use serde::Deserialize;

use crate::error::ApiError;

/// Default page size for list endpoints.
const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Debug, Default, Deserialize)]
pub struct LimitParams {
  pub limit: Option<usize>,
}

impl LimitParams {
  fn resolve(&self) -> usize { self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT) }
}

/// Reject blank identifiers before they reach the engine.
fn require(field: &str, value: &str) -> Result<(), ApiError> {
  if value.trim().is_empty() {
    return Err(ApiError::BadRequest(format!("{field} must not be empty")));
  }
  Ok(())
}
