//! The `DecisionStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `steward-store-sqlite`).
//! `steward-engine` depends on this abstraction, not on any concrete backend.
//!
//! Every write that must be idempotent under concurrent runs is expressed as a
//! single atomic upsert on a natural unique key. Implementations must not
//! read-then-write across separate statements for these operations.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  action::{ActionQuery, Candidate, StatusChange, StoredAction, UpsertOutcome},
  notification::{NewNotification, NotificationEvent, NotificationStatus},
  policy::RuleActivity,
  preference::{NewPreference, Preference},
  risk::{NewRiskFlag, RiskFlag, RiskStatus, RiskUpsert},
  run::{RunCounts, RunRecord},
  score::{NewScoreSnapshot, ScoreEvent, ScoreSnapshot},
  weights::{EffectivenessMap, LearnedWeight},
};

/// Lets callers tell an unreachable store apart from a single bad write.
///
/// The pipeline aborts on the former and records the latter as a per-item
/// error.
pub trait StoreFailure {
  fn is_unavailable(&self) -> bool;
}

/// Abstraction over a Steward decision store backend.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait DecisionStore: Send + Sync {
  type Error: std::error::Error + StoreFailure + Send + Sync + 'static;

  // ── Actions ───────────────────────────────────────────────────────────

  /// Atomically insert or refresh the action keyed by the candidate's
  /// `(entity_type, entity_id, dedupe_key)`, and append a firing record.
  ///
  /// Queued and snoozed actions are refreshed in place; a snoozed action whose
  /// snooze has lapsed returns to queued. Done and dismissed actions are left
  /// untouched.
  fn upsert_action<'a>(
    &'a self,
    owner_user_id: &'a str,
    candidate: &'a Candidate,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<UpsertOutcome, Self::Error>> + Send + 'a;

  fn get_action(
    &self,
    action_id: Uuid,
  ) -> impl Future<Output = Result<Option<StoredAction>, Self::Error>> + Send + '_;

  fn list_actions<'a>(
    &'a self,
    query: &'a ActionQuery,
  ) -> impl Future<Output = Result<Vec<StoredAction>, Self::Error>> + Send + 'a;

  /// Change an action's status and append the matching event, atomically.
  /// Returns `None` if the action does not exist.
  fn set_action_status(
    &self,
    action_id: Uuid,
    change: StatusChange,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<StoredAction>, Self::Error>> + Send + '_;

  // ── Learning ──────────────────────────────────────────────────────────

  /// Per-rule outcome counts over all of the owner's actions.
  fn load_effectiveness<'a>(
    &'a self,
    owner_user_id: &'a str,
  ) -> impl Future<Output = Result<EffectivenessMap, Self::Error>> + Send + 'a;

  fn load_weights<'a>(
    &'a self,
    owner_user_id: &'a str,
  ) -> impl Future<Output = Result<Vec<LearnedWeight>, Self::Error>> + Send + 'a;

  fn upsert_weight<'a>(
    &'a self,
    weight: &'a LearnedWeight,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Firings and outcomes for the owner's rules recorded at or after `since`.
  fn rule_activity<'a>(
    &'a self,
    owner_user_id: &'a str,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<RuleActivity>, Self::Error>> + Send + 'a;

  // ── Preferences ───────────────────────────────────────────────────────

  fn upsert_preference(
    &self,
    input: NewPreference,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Preference, Self::Error>> + Send + '_;

  /// All preferences (including expired ones) that apply to the scope:
  /// those recorded for it and the owner's scope-wide ones.
  fn preferences_for<'a>(
    &'a self,
    owner_user_id: &'a str,
    entity_type: &'a str,
    entity_id: &'a str,
  ) -> impl Future<Output = Result<Vec<Preference>, Self::Error>> + Send + 'a;

  /// Mark a preference inactive. Returns `false` if it does not exist.
  fn deactivate_preference(
    &self,
    preference_id: Uuid,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Scores ────────────────────────────────────────────────────────────

  /// Append a snapshot and return it together with the snapshot that
  /// immediately preceded it for the same scope. Both are determined in one
  /// transaction.
  fn insert_score_snapshot(
    &self,
    input: NewScoreSnapshot,
  ) -> impl Future<Output = Result<(ScoreSnapshot, Option<ScoreSnapshot>), Self::Error>>
  + Send
  + '_;

  fn insert_score_events<'a>(
    &'a self,
    events: &'a [ScoreEvent],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn latest_score<'a>(
    &'a self,
    entity_type: &'a str,
    entity_id: &'a str,
  ) -> impl Future<Output = Result<Option<ScoreSnapshot>, Self::Error>> + Send + 'a;

  /// Most recent events first.
  fn list_score_events<'a>(
    &'a self,
    entity_type: &'a str,
    entity_id: &'a str,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<ScoreEvent>, Self::Error>> + Send + 'a;

  // ── Risk flags ────────────────────────────────────────────────────────

  /// Atomic create-or-update keyed by `dedupe_key`. See [`crate::risk`].
  fn upsert_risk_flag(
    &self,
    input: NewRiskFlag,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<RiskUpsert, Self::Error>> + Send + '_;

  fn get_risk_flag(
    &self,
    risk_flag_id: Uuid,
  ) -> impl Future<Output = Result<Option<RiskFlag>, Self::Error>> + Send + '_;

  /// Only open or snoozed flags move. Returns `None` if the flag does not
  /// exist or is already closed.
  fn set_risk_status(
    &self,
    risk_flag_id: Uuid,
    status: RiskStatus,
    snoozed_until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<RiskFlag>, Self::Error>> + Send + '_;

  /// Flags in any of `statuses`, most severe and most recently seen first.
  fn list_risk_flags<'a>(
    &'a self,
    statuses: &'a [RiskStatus],
    limit: usize,
  ) -> impl Future<Output = Result<Vec<RiskFlag>, Self::Error>> + Send + 'a;

  // ── Notifications ─────────────────────────────────────────────────────

  fn insert_notification(
    &self,
    input: NewNotification,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<NotificationEvent, Self::Error>> + Send + '_;

  /// The most recent notification for `dedupe_key` created at or after
  /// `since` whose status is one of `statuses`.
  fn last_notification<'a>(
    &'a self,
    dedupe_key: &'a str,
    since: DateTime<Utc>,
    statuses: &'a [NotificationStatus],
  ) -> impl Future<Output = Result<Option<NotificationEvent>, Self::Error>> + Send + 'a;

  /// Oldest pending notifications first.
  fn pending_notifications(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<NotificationEvent>, Self::Error>> + Send + '_;

  fn mark_notification(
    &self,
    notification_id: Uuid,
    status: NotificationStatus,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<NotificationEvent>, Self::Error>> + Send + '_;

  // ── Run ledger ────────────────────────────────────────────────────────

  /// Insert or overwrite the ledger row for `run_key`.
  fn record_run<'a>(
    &'a self,
    run_key: &'a str,
    triggered_by: &'a str,
    counts: &'a RunCounts,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<RunRecord, Self::Error>> + Send + 'a;

  fn get_run<'a>(
    &'a self,
    run_key: &'a str,
  ) -> impl Future<Output = Result<Option<RunRecord>, Self::Error>> + Send + 'a;
}
