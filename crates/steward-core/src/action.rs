//! Candidate and stored recommendations ("next best actions").
//!
//! A [`Candidate`] is ephemeral: the rule engine produces it, the preference
//! filter may drop it, and the store upserts it into a [`StoredAction`] keyed
//! by `(entity_type, entity_id, dedupe_key)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Priority ────────────────────────────────────────────────────────────────

/// Recommendation priority, derived from the final score.
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
pub enum Priority {
  Low,
  Medium,
  High,
  Critical,
}

impl Priority {
  /// Fixed score thresholds: ≥80 critical, ≥60 high, ≥35 medium, else low.
  pub fn from_score(score: u8) -> Self {
    match score {
      80.. => Self::Critical,
      60..=79 => Self::High,
      35..=59 => Self::Medium,
      _ => Self::Low,
    }
  }
}

// ─── Candidate ───────────────────────────────────────────────────────────────

/// A recommendation produced by one run of the rule engine. Never persisted
/// as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
  pub rule_key:     String,
  pub dedupe_key:   String,
  pub entity_type:  String,
  pub entity_id:    String,
  /// The sub-entity (proposal, lead, …) the rule fired for, if any.
  pub subject_id:   Option<String>,
  pub title:        String,
  pub reason:       String,
  pub score:        u8,
  pub priority:     Priority,
  /// The learned multiplier applied to the rule's base score.
  pub weight:       f64,
  /// Historical success rate of the rule, when known.
  pub success_rate: Option<f64>,
}

// ─── Stored action ───────────────────────────────────────────────────────────

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
pub enum ActionStatus {
  Queued,
  Done,
  Dismissed,
  Snoozed,
}

impl ActionStatus {
  /// Done and dismissed actions are never reopened by a re-fire.
  pub fn is_terminal(self) -> bool { matches!(self, Self::Done | Self::Dismissed) }
}

/// What happened after the user acted on a recommendation.
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
pub enum Outcome {
  Success,
  Failure,
}

/// A persisted recommendation. Unique per `(entity_type, entity_id,
/// dedupe_key)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAction {
  pub action_id:         Uuid,
  pub owner_user_id:     String,
  pub entity_type:       String,
  pub entity_id:         String,
  pub dedupe_key:        String,
  pub rule_key:          String,
  pub title:             String,
  pub reason:            String,
  pub score:             u8,
  pub priority:          Priority,
  pub status:            ActionStatus,
  pub outcome:           Option<Outcome>,
  pub snoozed_until:     Option<DateTime<Utc>>,
  /// How many runs have emitted this recommendation.
  pub fire_count:        u32,
  pub created_at:        DateTime<Utc>,
  pub last_fired_at:     DateTime<Utc>,
  pub status_changed_at: DateTime<Utc>,
}

/// Append-only record of a status transition on a stored action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEvent {
  pub event_id:    Uuid,
  pub action_id:   Uuid,
  pub status:      ActionStatus,
  pub outcome:     Option<Outcome>,
  pub recorded_at: DateTime<Utc>,
}

/// A requested status change, applied by
/// [`DecisionStore::set_action_status`](crate::store::DecisionStore::set_action_status).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
  pub status:        ActionStatus,
  #[serde(default)]
  pub outcome:       Option<Outcome>,
  #[serde(default)]
  pub snoozed_until: Option<DateTime<Utc>>,
}

impl StatusChange {
  /// A snooze needs an end, and only a done action carries an outcome.
  pub fn validate(&self) -> Result<()> {
    match self.status {
      ActionStatus::Snoozed if self.snoozed_until.is_none() => {
        return Err(Error::InvalidStatusChange("snoozed requires snoozed_until".into()));
      }
      ActionStatus::Snoozed => {}
      _ if self.snoozed_until.is_some() => {
        return Err(Error::InvalidStatusChange(format!(
          "snoozed_until is only valid when snoozed, not {}",
          self.status
        )));
      }
      _ => {}
    }
    if self.outcome.is_some() && self.status != ActionStatus::Done {
      return Err(Error::InvalidStatusChange(format!("{} cannot carry an outcome", self.status)));
    }
    Ok(())
  }
}

// ─── Upsert results ──────────────────────────────────────────────────────────

/// The effect of upserting a single candidate.
#[derive(Debug, Clone)]
pub enum UpsertOutcome {
  Created(StoredAction),
  /// An existing queued or snoozed action was refreshed in place.
  Updated(StoredAction),
  /// The existing action is done or dismissed and was left untouched.
  Unchanged(StoredAction),
}

impl UpsertOutcome {
  pub fn action(&self) -> &StoredAction {
    match self {
      Self::Created(a) | Self::Updated(a) | Self::Unchanged(a) => a,
    }
  }
}

/// A per-item failure that did not abort the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertItemError {
  pub dedupe_key: String,
  pub message:    String,
}

/// Aggregate result of upserting one run's candidates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpsertReport {
  pub created:   usize,
  pub updated:   usize,
  pub unchanged: usize,
  pub errors:    Vec<UpsertItemError>,
}

impl UpsertReport {
  pub fn record(&mut self, outcome: &UpsertOutcome) {
    match outcome {
      UpsertOutcome::Created(_) => self.created += 1,
      UpsertOutcome::Updated(_) => self.updated += 1,
      UpsertOutcome::Unchanged(_) => self.unchanged += 1,
    }
  }
}

// ─── Query ───────────────────────────────────────────────────────────────────

/// Parameters for
/// [`DecisionStore::list_actions`](crate::store::DecisionStore::list_actions).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionQuery {
  pub owner_user_id: Option<String>,
  pub entity_type:   Option<String>,
  pub entity_id:     Option<String>,
  pub rule_key:      Option<String>,
  pub status:        Option<ActionStatus>,
  pub limit:         Option<usize>,
  pub offset:        Option<usize>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn priority_thresholds() {
    assert_eq!(Priority::from_score(100), Priority::Critical);
    assert_eq!(Priority::from_score(80), Priority::Critical);
    assert_eq!(Priority::from_score(79), Priority::High);
    assert_eq!(Priority::from_score(60), Priority::High);
    assert_eq!(Priority::from_score(59), Priority::Medium);
    assert_eq!(Priority::from_score(35), Priority::Medium);
    assert_eq!(Priority::from_score(34), Priority::Low);
    assert_eq!(Priority::from_score(0), Priority::Low);
  }

  #[test]
  fn priority_is_monotone_in_score() {
    let mut last = Priority::Low;
    for s in 0..=100u8 {
      let p = Priority::from_score(s);
      assert!(p >= last);
      last = p;
    }
  }

  #[test]
  fn status_change_shapes() {
    let change = |status, outcome, snoozed_until| StatusChange { status, outcome, snoozed_until };
    let later = Some(Utc::now());

    assert!(change(ActionStatus::Snoozed, None, later).validate().is_ok());
    assert!(change(ActionStatus::Done, Some(Outcome::Success), None).validate().is_ok());
    assert!(change(ActionStatus::Done, None, None).validate().is_ok());
    assert!(change(ActionStatus::Dismissed, None, None).validate().is_ok());

    assert!(matches!(
      change(ActionStatus::Snoozed, None, None).validate(),
      Err(Error::InvalidStatusChange(_))
    ));
    assert!(change(ActionStatus::Dismissed, Some(Outcome::Failure), None).validate().is_err());
    assert!(change(ActionStatus::Queued, None, later).validate().is_err());
  }

  #[test]
  fn status_strings_match_column_values() {
    assert_eq!(ActionStatus::Snoozed.as_ref(), "snoozed");
    assert_eq!("dismissed".parse::<ActionStatus>().unwrap(), ActionStatus::Dismissed);
    assert!("archived".parse::<ActionStatus>().is_err());
  }
}
