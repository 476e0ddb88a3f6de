//! Deduplicated, severity-ranked risk flags.
//!
//! A flag is identified by its `dedupe_key`. Re-firing an open or snoozed
//! flag refreshes `last_seen_at` and may raise, but never lower, its severity.
//! Dismissed and resolved flags are terminal: a repeat match on the same key
//! is a no-op, and a genuinely new occurrence must arrive under a fresh
//! (typically date-scoped) dedupe key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
  Low      = 1,
  Medium   = 2,
  High     = 3,
  Critical = 4,
}

impl Severity {
  /// Numeric rank, stored alongside the name so the store can take a max.
  pub fn rank(self) -> i64 { self as i64 }

  pub fn from_rank(rank: i64) -> Option<Self> {
    match rank {
      1 => Some(Self::Low),
      2 => Some(Self::Medium),
      3 => Some(Self::High),
      4 => Some(Self::Critical),
      _ => None,
    }
  }

  /// Severity after a re-fire: escalate only.
  pub fn merge(self, incoming: Self) -> Self { self.max(incoming) }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RiskStatus {
  Open,
  Snoozed,
  Dismissed,
  Resolved,
}

impl RiskStatus {
  pub fn is_terminal(self) -> bool { matches!(self, Self::Dismissed | Self::Resolved) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRiskFlag {
  pub rule_key:    String,
  pub severity:    Severity,
  pub dedupe_key:  String,
  pub title:       String,
  pub description: String,
  #[serde(default)]
  pub entity_type: Option<String>,
  #[serde(default)]
  pub entity_id:   Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFlag {
  pub risk_flag_id:      Uuid,
  pub rule_key:          String,
  pub dedupe_key:        String,
  pub severity:          Severity,
  pub title:             String,
  pub description:       String,
  pub entity_type:       Option<String>,
  pub entity_id:         Option<String>,
  pub status:            RiskStatus,
  pub snoozed_until:     Option<DateTime<Utc>>,
  pub first_seen_at:     DateTime<Utc>,
  pub last_seen_at:      DateTime<Utc>,
  pub status_changed_at: DateTime<Utc>,
}

/// What a create-or-update did to the flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskOutcome {
  Created,
  /// Existing open/snoozed flag; `last_seen_at` refreshed, severity unchanged.
  Refreshed,
  /// Existing open/snoozed flag whose severity was raised.
  Escalated,
  /// Existing dismissed/resolved flag; left untouched.
  Terminal,
}

impl RiskOutcome {
  /// Whether the change is worth telling someone about.
  pub fn is_notable(self) -> bool { matches!(self, Self::Created | Self::Escalated) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskUpsert {
  pub risk_flag_id: Uuid,
  pub outcome:      RiskOutcome,
  pub flag:         RiskFlag,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn merge_never_de_escalates() {
    assert_eq!(Severity::High.merge(Severity::Low), Severity::High);
    assert_eq!(Severity::Low.merge(Severity::Critical), Severity::Critical);
    assert_eq!(Severity::Medium.merge(Severity::Medium), Severity::Medium);
  }

  #[test]
  fn rank_round_trips() {
    for s in [Severity::Low, Severity::Medium, Severity::High, Severity::Critical] {
      assert_eq!(Severity::from_rank(s.rank()), Some(s));
    }
    assert_eq!(Severity::from_rank(0), None);
  }

  #[test]
  fn terminal_states() {
    assert!(RiskStatus::Dismissed.is_terminal());
    assert!(RiskStatus::Resolved.is_terminal());
    assert!(!RiskStatus::Snoozed.is_terminal());
  }
}
