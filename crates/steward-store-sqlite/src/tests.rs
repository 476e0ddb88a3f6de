//! Integration tests for `SqliteStore` against an in-memory database.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use steward_core::{
  action::{ActionQuery, ActionStatus, Candidate, Outcome, Priority, StatusChange, UpsertOutcome},
  notification::{NewNotification, NotificationKey, NotificationStatus},
  policy::ActivityKind,
  preference::{NewPreference, PreferenceSource, PreferenceStatus, PreferenceTarget},
  risk::{NewRiskFlag, RiskOutcome, RiskStatus, Severity},
  run::RunCounts,
  score::{Band, Factor, NewScoreSnapshot, ScoreInput, compute, detect_events},
  store::DecisionStore,
  ttl::TtlStore,
  weights::LearnedWeight,
};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap() }

fn candidate(rule: &str, subject: &str, score: u8) -> Candidate {
  Candidate {
    rule_key:     rule.into(),
    dedupe_key:   format!("{rule}:workspace:acme:{subject}"),
    entity_type:  "workspace".into(),
    entity_id:    "acme".into(),
    subject_id:   Some(subject.into()),
    title:        format!("{rule} for {subject}"),
    reason:       "because".into(),
    score,
    priority:     Priority::from_score(score),
    weight:       1.0,
    success_rate: None,
  }
}

fn done(outcome: Outcome) -> StatusChange {
  StatusChange { status: ActionStatus::Done, outcome: Some(outcome), snoozed_until: None }
}

// ─── Actions ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_is_idempotent_per_dedupe_key() {
  let s = store().await;
  let c = candidate("lead_uncontacted", "l1", 60);

  let first = s.upsert_action("u1", &c, t0()).await.unwrap();
  assert!(matches!(first, UpsertOutcome::Created(_)));

  let mut again = c.clone();
  again.score = 70;
  let second = s.upsert_action("u1", &again, t0() + Duration::hours(1)).await.unwrap();
  let UpsertOutcome::Updated(a) = second else { panic!("expected update") };
  assert_eq!(a.action_id, first.action().action_id);
  assert_eq!(a.score, 70);
  assert_eq!(a.fire_count, 2);
  assert_eq!(a.created_at, t0());

  let all = s.list_actions(&ActionQuery::default()).await.unwrap();
  assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn terminal_actions_are_not_reopened() {
  let s = store().await;
  let c = candidate("delivery_overdue", "d1", 80);
  let created = s.upsert_action("u1", &c, t0()).await.unwrap();
  let id = created.action().action_id;

  let dismissed = StatusChange { status: ActionStatus::Dismissed, outcome: None, snoozed_until: None };
  s.set_action_status(id, dismissed, t0()).await.unwrap().unwrap();

  let again = s.upsert_action("u1", &c, t0() + Duration::hours(2)).await.unwrap();
  let UpsertOutcome::Unchanged(a) = again else { panic!("expected unchanged") };
  assert_eq!(a.status, ActionStatus::Dismissed);
  assert_eq!(a.fire_count, 1);
}

#[tokio::test]
async fn lapsed_snooze_returns_to_queue() {
  let s = store().await;
  let c = candidate("proposal_expiring", "p1", 50);
  let id = s.upsert_action("u1", &c, t0()).await.unwrap().action().action_id;

  let snooze = StatusChange {
    status:        ActionStatus::Snoozed,
    outcome:       None,
    snoozed_until: Some(t0() + Duration::days(1)),
  };
  s.set_action_status(id, snooze, t0()).await.unwrap();

  let during = s.upsert_action("u1", &c, t0() + Duration::hours(3)).await.unwrap();
  assert_eq!(during.action().status, ActionStatus::Snoozed);

  let after = s.upsert_action("u1", &c, t0() + Duration::days(2)).await.unwrap();
  assert!(matches!(after, UpsertOutcome::Updated(_)));
  assert_eq!(after.action().status, ActionStatus::Queued);
  assert_eq!(after.action().snoozed_until, None);
}

#[tokio::test]
async fn set_status_on_missing_action_is_none() {
  let s = store().await;
  let r = s.set_action_status(Uuid::new_v4(), done(Outcome::Success), t0()).await.unwrap();
  assert!(r.is_none());
}

#[tokio::test]
async fn malformed_status_changes_are_rejected() {
  let s = store().await;
  let c = candidate("lead_uncontacted", "l9", 40);
  let id = s.upsert_action("u1", &c, t0()).await.unwrap().action().action_id;

  let open_ended = StatusChange { status: ActionStatus::Snoozed, outcome: None, snoozed_until: None };
  let err = s.set_action_status(id, open_ended, t0()).await.unwrap_err();
  assert!(matches!(err, crate::Error::Core(steward_core::Error::InvalidStatusChange(_))));

  let dismissed_with_outcome = StatusChange {
    status:        ActionStatus::Dismissed,
    outcome:       Some(Outcome::Success),
    snoozed_until: None,
  };
  assert!(s.set_action_status(id, dismissed_with_outcome, t0()).await.is_err());

  let all = s.list_actions(&ActionQuery::default()).await.unwrap();
  assert_eq!(all[0].status, ActionStatus::Queued);
  assert_eq!(all[0].outcome, None);
}

#[tokio::test]
async fn list_actions_filters_by_status() {
  let s = store().await;
  let a = s.upsert_action("u1", &candidate("r", "a", 40), t0()).await.unwrap();
  s.upsert_action("u1", &candidate("r", "b", 90), t0()).await.unwrap();
  s.set_action_status(a.action().action_id, done(Outcome::Success), t0()).await.unwrap();

  let q = ActionQuery { status: Some(ActionStatus::Queued), ..Default::default() };
  let queued = s.list_actions(&q).await.unwrap();
  assert_eq!(queued.len(), 1);
  assert_eq!(queued[0].score, 90);
}

// ─── Learning ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn effectiveness_counts_outcomes() {
  let s = store().await;
  let a = s.upsert_action("u1", &candidate("r", "a", 40), t0()).await.unwrap();
  let b = s.upsert_action("u1", &candidate("r", "b", 40), t0()).await.unwrap();
  s.upsert_action("u1", &candidate("r", "c", 40), t0()).await.unwrap();
  s.upsert_action("u2", &candidate("other", "z", 40), t0()).await.unwrap();

  s.set_action_status(a.action().action_id, done(Outcome::Success), t0()).await.unwrap();
  let dismissed = StatusChange { status: ActionStatus::Dismissed, outcome: None, snoozed_until: None };
  s.set_action_status(b.action().action_id, dismissed, t0()).await.unwrap();

  let eff = s.load_effectiveness("u1").await.unwrap();
  assert_eq!(eff.len(), 1);
  let r = &eff["r"];
  assert_eq!((r.fired, r.applied, r.dismissed, r.succeeded), (3, 1, 1, 1));
}

#[tokio::test]
async fn rule_activity_merges_firings_and_outcomes() {
  let s = store().await;
  let c = candidate("r", "a", 40);
  let id = s.upsert_action("u1", &c, t0()).await.unwrap().action().action_id;
  s.upsert_action("u1", &c, t0() + Duration::hours(1)).await.unwrap();
  s.set_action_status(id, done(Outcome::Success), t0() + Duration::hours(2)).await.unwrap();

  let all = s.rule_activity("u1", t0() - Duration::days(1)).await.unwrap();
  let kinds: Vec<_> = all.iter().map(|a| a.kind).collect();
  assert_eq!(kinds, [
    ActivityKind::Fired,
    ActivityKind::Fired,
    ActivityKind::Applied,
    ActivityKind::Succeeded,
  ]);

  let recent = s.rule_activity("u1", t0() + Duration::minutes(30)).await.unwrap();
  assert_eq!(recent.len(), 3);
}

#[tokio::test]
async fn weights_upsert_overwrites() {
  let s = store().await;
  let mut w = LearnedWeight {
    rule_key:      "r".into(),
    owner_user_id: "u1".into(),
    multiplier:    1.1,
    updated_at:    t0(),
  };
  s.upsert_weight(&w).await.unwrap();
  w.multiplier = 1.2;
  s.upsert_weight(&w).await.unwrap();

  let loaded = s.load_weights("u1").await.unwrap();
  assert_eq!(loaded.len(), 1);
  assert!((loaded[0].multiplier - 1.2).abs() < 1e-9);
  assert!(s.load_weights("u2").await.unwrap().is_empty());
}

// ─── Preferences ─────────────────────────────────────────────────────────────

fn pref(entity: Option<&str>, target: PreferenceTarget) -> NewPreference {
  NewPreference {
    owner_user_id:    "u1".into(),
    entity_type:      entity.map(|_| "workspace".into()),
    entity_id:        entity.map(str::to_owned),
    target,
    suppressed_until: None,
    source:           PreferenceSource::User,
    reason:           None,
  }
}

#[tokio::test]
async fn preferences_cover_scope_and_owner_wide() {
  let s = store().await;
  s.upsert_preference(pref(Some("acme"), PreferenceTarget::RuleKey("a".into())), t0())
    .await
    .unwrap();
  s.upsert_preference(pref(None, PreferenceTarget::RuleKey("b".into())), t0())
    .await
    .unwrap();
  s.upsert_preference(pref(Some("globex"), PreferenceTarget::RuleKey("c".into())), t0())
    .await
    .unwrap();

  let found = s.preferences_for("u1", "workspace", "acme").await.unwrap();
  let keys: Vec<_> = found.iter().map(|p| p.target.key().to_owned()).collect();
  assert_eq!(keys.len(), 2);
  assert!(keys.contains(&"a".to_owned()) && keys.contains(&"b".to_owned()));
  let wide = found.iter().find(|p| p.target.key() == "b").unwrap();
  assert_eq!(wide.entity_type, None);
}

#[tokio::test]
async fn preference_upsert_reactivates() {
  let s = store().await;
  let target = PreferenceTarget::DedupeKey("r:workspace:acme".into());
  let p = s.upsert_preference(pref(Some("acme"), target.clone()), t0()).await.unwrap();
  assert!(s.deactivate_preference(p.preference_id, t0()).await.unwrap());

  let again = s
    .upsert_preference(pref(Some("acme"), target), t0() + Duration::hours(1))
    .await
    .unwrap();
  assert_eq!(again.preference_id, p.preference_id);
  assert_eq!(again.status, PreferenceStatus::Active);
  assert!(!s.deactivate_preference(Uuid::new_v4(), t0()).await.unwrap());
}

// ─── Scores ──────────────────────────────────────────────────────────────────

fn snapshot_input(value: f64, at: DateTime<Utc>) -> NewScoreSnapshot {
  let input = ScoreInput {
    factors: vec![Factor { key: "health".into(), label: None, weight: 1.0, value }],
  };
  NewScoreSnapshot {
    entity_type: "workspace".into(),
    entity_id:   "acme".into(),
    computation: compute(&input).unwrap(),
    computed_at: at,
  }
}

#[tokio::test]
async fn snapshots_return_their_predecessor() {
  let s = store().await;
  let (first, prev) = s.insert_score_snapshot(snapshot_input(0.7, t0())).await.unwrap();
  assert!(prev.is_none());

  let (second, prev) = s
    .insert_score_snapshot(snapshot_input(0.4, t0() + Duration::hours(1)))
    .await
    .unwrap();
  let prev = prev.unwrap();
  assert_eq!(prev.snapshot_id, first.snapshot_id);
  assert_eq!(second.band, Band::Critical);

  let events = detect_events(&prev, &second, 15);
  assert_eq!(events.len(), 2);
  s.insert_score_events(&events).await.unwrap();
  s.insert_score_events(&events).await.unwrap();

  let stored = s.list_score_events("workspace", "acme", 10).await.unwrap();
  assert_eq!(stored.len(), 2);
  let latest = s.latest_score("workspace", "acme").await.unwrap().unwrap();
  assert_eq!(latest.snapshot_id, second.snapshot_id);
  assert_eq!(latest.reasons, second.reasons);
}

// ─── Risk flags ──────────────────────────────────────────────────────────────

fn flag(severity: Severity) -> NewRiskFlag {
  NewRiskFlag {
    rule_key: "score_drop".into(),
    severity,
    dedupe_key: "risk:score_drop:workspace:acme".into(),
    title: "Score dropped".into(),
    description: "Score fell sharply".into(),
    entity_type: Some("workspace".into()),
    entity_id: Some("acme".into()),
  }
}

#[tokio::test]
async fn risk_flags_refresh_escalate_and_stay_terminal() {
  let s = store().await;
  let created = s.upsert_risk_flag(flag(Severity::Medium), t0()).await.unwrap();
  assert_eq!(created.outcome, RiskOutcome::Created);

  let later = t0() + Duration::hours(1);
  let refreshed = s.upsert_risk_flag(flag(Severity::Low), later).await.unwrap();
  assert_eq!(refreshed.outcome, RiskOutcome::Refreshed);
  assert_eq!(refreshed.flag.severity, Severity::Medium);
  assert_eq!(refreshed.flag.last_seen_at, later);
  assert_eq!(refreshed.risk_flag_id, created.risk_flag_id);

  let escalated = s.upsert_risk_flag(flag(Severity::Critical), later).await.unwrap();
  assert_eq!(escalated.outcome, RiskOutcome::Escalated);
  assert_eq!(escalated.flag.severity, Severity::Critical);

  s.set_risk_status(created.risk_flag_id, RiskStatus::Resolved, None, later)
    .await
    .unwrap()
    .unwrap();
  let terminal = s
    .upsert_risk_flag(flag(Severity::Critical), later + Duration::hours(1))
    .await
    .unwrap();
  assert_eq!(terminal.outcome, RiskOutcome::Terminal);
  assert_eq!(terminal.flag.status, RiskStatus::Resolved);
  assert_eq!(terminal.flag.last_seen_at, later);

  let open = s.list_risk_flags(&[RiskStatus::Open], 10).await.unwrap();
  assert!(open.is_empty());
  let resolved = s.list_risk_flags(&[RiskStatus::Resolved], 10).await.unwrap();
  assert_eq!(resolved.len(), 1);
}

#[tokio::test]
async fn risk_flag_reopens_after_snooze_lapses() {
  let s = store().await;
  let id = s.upsert_risk_flag(flag(Severity::High), t0()).await.unwrap().risk_flag_id;
  let until = t0() + Duration::hours(1);
  s.set_risk_status(id, RiskStatus::Snoozed, Some(until), t0())
    .await
    .unwrap()
    .unwrap();

  let during = s.upsert_risk_flag(flag(Severity::High), t0() + Duration::minutes(30)).await.unwrap();
  assert_eq!(during.flag.status, RiskStatus::Snoozed);
  assert_eq!(during.flag.snoozed_until, Some(until));

  let after = t0() + Duration::days(10);
  let refired = s.upsert_risk_flag(flag(Severity::High), after).await.unwrap();
  assert_eq!(refired.outcome, RiskOutcome::Refreshed);
  assert_eq!(refired.flag.status, RiskStatus::Open);
  assert_eq!(refired.flag.snoozed_until, None);
  assert_eq!(refired.flag.status_changed_at, after);

  let open = s.list_risk_flags(&[RiskStatus::Open], 10).await.unwrap();
  assert_eq!(open.len(), 1);
}

#[tokio::test]
async fn closed_risk_flags_do_not_change_status() {
  let s = store().await;
  let id = s.upsert_risk_flag(flag(Severity::Medium), t0()).await.unwrap().risk_flag_id;
  s.set_risk_status(id, RiskStatus::Dismissed, None, t0())
    .await
    .unwrap()
    .unwrap();

  let later = t0() + Duration::hours(1);
  let resolved = s.set_risk_status(id, RiskStatus::Resolved, None, later).await.unwrap();
  assert!(resolved.is_none());
  let snoozed = s
    .set_risk_status(id, RiskStatus::Snoozed, Some(later + Duration::days(1)), later)
    .await
    .unwrap();
  assert!(snoozed.is_none());

  let current = s.get_risk_flag(id).await.unwrap().unwrap();
  assert_eq!(current.status, RiskStatus::Dismissed);
  assert_eq!(current.snoozed_until, None);
}

// ─── Notifications ───────────────────────────────────────────────────────────

fn notification(status: NotificationStatus) -> NewNotification {
  NewNotification {
    key: NotificationKey::new("score", "workspace", "acme", "sharp_drop"),
    title: "Score dropped".into(),
    body: "70 → 40".into(),
    status,
  }
}

#[tokio::test]
async fn last_notification_respects_status_and_window() {
  let s = store().await;
  let key = NotificationKey::new("score", "workspace", "acme", "sharp_drop").dedupe_key();

  s.insert_notification(notification(NotificationStatus::Suppressed), t0()).await.unwrap();
  let none = s
    .last_notification(&key, t0() - Duration::hours(1), &NotificationStatus::COOLDOWN)
    .await
    .unwrap();
  assert!(none.is_none());

  let sent = s.insert_notification(notification(NotificationStatus::Pending), t0()).await.unwrap();
  let hit = s
    .last_notification(&key, t0() - Duration::hours(1), &NotificationStatus::COOLDOWN)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(hit.notification_id, sent.notification_id);

  let stale = s
    .last_notification(&key, t0() + Duration::minutes(1), &NotificationStatus::COOLDOWN)
    .await
    .unwrap();
  assert!(stale.is_none());
}

#[tokio::test]
async fn pending_notifications_can_be_marked() {
  let s = store().await;
  let n = s.insert_notification(notification(NotificationStatus::Pending), t0()).await.unwrap();
  assert_eq!(s.pending_notifications(10).await.unwrap().len(), 1);

  let marked = s
    .mark_notification(n.notification_id, NotificationStatus::Sent, t0() + Duration::minutes(1))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(marked.status, NotificationStatus::Sent);
  assert!(s.pending_notifications(10).await.unwrap().is_empty());
}

// ─── Run ledger ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn run_ledger_overwrites_and_counts() {
  let s = store().await;
  let counts = RunCounts { candidates: 3, created: 3, ..Default::default() };
  s.record_run("nba:u1:workspace:acme:2026-03-02", "u1", &counts, t0()).await.unwrap();

  let again = RunCounts { candidates: 3, unchanged: 3, ..Default::default() };
  let later = t0() + Duration::hours(4);
  let rec = s
    .record_run("nba:u1:workspace:acme:2026-03-02", "u1", &again, later)
    .await
    .unwrap();
  assert_eq!(rec.run_count, 2);
  assert_eq!(rec.first_run_at, t0());
  assert_eq!(rec.last_run_at, later);
  assert_eq!(rec.counts.unchanged, 3);

  assert!(s.get_run("nba:u1:workspace:acme:2026-03-03").await.unwrap().is_none());
}

// ─── Key-value ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn kv_counter_uses_fixed_window() {
  let s = store().await;
  let ttl = StdDuration::from_secs(60);
  assert_eq!(s.incr("rl:u1", ttl).await.unwrap(), 1);
  assert_eq!(s.incr("rl:u1", ttl).await.unwrap(), 2);
  assert_eq!(s.incr("rl:u2", ttl).await.unwrap(), 1);

  let short = StdDuration::from_millis(5);
  assert_eq!(s.incr("rl:u3", short).await.unwrap(), 1);
  tokio::time::sleep(StdDuration::from_millis(20)).await;
  assert_eq!(s.incr("rl:u3", short).await.unwrap(), 1);
}

#[tokio::test]
async fn kv_values_expire() {
  let s = store().await;
  s.set("k", "v".into(), StdDuration::from_secs(60)).await.unwrap();
  assert_eq!(s.get("k").await.unwrap().as_deref(), Some("v"));

  s.set("gone", "v".into(), StdDuration::from_millis(5)).await.unwrap();
  tokio::time::sleep(StdDuration::from_millis(20)).await;
  assert_eq!(s.get("gone").await.unwrap(), None);
}
