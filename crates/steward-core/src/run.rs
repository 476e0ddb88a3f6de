//! The run ledger: an audit record per actor, scope and day.
//!
//! The run key is deterministic, so re-invoking the pipeline on the same day
//! overwrites the latest counts rather than adding a row. It is not a lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Scope;

/// `nba:{actor}:{entity_type}:{entity_id}:{yyyy-mm-dd}`
pub fn run_key(actor: &str, scope: &Scope, at: DateTime<Utc>) -> String {
  format!("nba:{actor}:{scope}:{}", at.format("%Y-%m-%d"))
}

/// Result counts for one pipeline invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
  pub candidates: usize,
  pub suppressed: usize,
  pub created:    usize,
  pub updated:    usize,
  pub unchanged:  usize,
  pub errors:     usize,
  pub warnings:   usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
  pub run_key:      String,
  pub triggered_by: String,
  pub counts:       RunCounts,
  /// Invocations recorded under this key.
  pub run_count:    u32,
  pub first_run_at: DateTime<Utc>,
  pub last_run_at:  DateTime<Utc>,
}
