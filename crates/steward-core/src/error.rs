//! Error types for `steward-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The business context failed validation; nothing may be scored or
  /// written from it.
  #[error("invalid context: {0}")]
  InvalidContext(String),

  #[error("invalid score input: {0}")]
  InvalidScoreInput(String),

  #[error("invalid status change: {0}")]
  InvalidStatusChange(String),

  #[error("unknown {kind} value: {value:?}")]
  UnknownVariant { kind: &'static str, value: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

/// A failure raised by a single rule predicate.
///
/// Recovered by the rule engine: the rule is skipped and the message is
/// surfaced as a run warning.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct RuleError(pub String);

pub type Result<T, E = Error> = std::result::Result<T, E>;
