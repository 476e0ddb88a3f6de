//! Error type for `steward-store-sqlite`.

use rusqlite::ErrorCode;
use steward_core::store::StoreFailure;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] steward_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("stored value out of range: {0}")]
  OutOfRange(String),
}

impl StoreFailure for Error {
  fn is_unavailable(&self) -> bool {
    let Self::Database(e) = self else { return false };
    match e {
      tokio_rusqlite::Error::ConnectionClosed | tokio_rusqlite::Error::Close(_) => true,
      tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(f, _)) => matches!(
        f.code,
        ErrorCode::DatabaseBusy
          | ErrorCode::DatabaseLocked
          | ErrorCode::CannotOpen
          | ErrorCode::SystemIoFailure
          | ErrorCode::DiskFull
          | ErrorCode::DatabaseCorrupt
          | ErrorCode::NotADatabase
          | ErrorCode::ReadOnly
      ),
      _ => false,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
