//! Error type for `steward-engine`.

use steward_core::store::StoreFailure;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  /// Malformed context or score input. Nothing was written.
  #[error("validation failed: {0}")]
  Validation(String),

  #[error("rate limit exceeded; retry in {retry_after_secs}s")]
  RateLimited { retry_after_secs: u64 },

  #[error("not found: {0}")]
  NotFound(String),

  /// The store could not be reached; the run was abandoned.
  #[error("store unavailable: {0}")]
  Unavailable(#[source] BoxError),

  #[error("store error: {0}")]
  Store(#[source] BoxError),

  #[error("context provider error: {0}")]
  Context(#[source] BoxError),
}

impl Error {
  /// Box a backend error, keeping unavailability distinguishable.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + StoreFailure + Send + Sync + 'static,
  {
    if e.is_unavailable() { Self::Unavailable(Box::new(e)) } else { Self::Store(Box::new(e)) }
  }
}

impl From<steward_core::Error> for Error {
  fn from(e: steward_core::Error) -> Self {
    match e {
      steward_core::Error::InvalidContext(_)
      | steward_core::Error::InvalidScoreInput(_)
      | steward_core::Error::InvalidStatusChange(_) => {
        Self::Validation(e.to_string())
      }
      other => Self::Store(Box::new(other)),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
