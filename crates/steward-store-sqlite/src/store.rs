//! [`SqliteStore`], the SQLite implementation of [`DecisionStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use steward_core::{
  action::{ActionQuery, Candidate, StatusChange, StoredAction, UpsertOutcome},
  notification::{NewNotification, NotificationEvent, NotificationStatus},
  policy::{ActivityKind, RuleActivity},
  preference::{NewPreference, Preference},
  risk::{NewRiskFlag, RiskFlag, RiskOutcome, RiskStatus, RiskUpsert},
  run::{RunCounts, RunRecord},
  score::{NewScoreSnapshot, ScoreEvent, ScoreSnapshot},
  store::DecisionStore,
  weights::{EffectivenessMap, LearnedWeight, RuleEffectiveness},
};

use crate::{
  Error, Result,
  encode::{ANY_SCOPE, RawAction, decode_dt, decode_enum, encode_dt, encode_uuid},
  queries::{
    actions::{self, ActionFilter, Effect, NewActionRow, StatusRow},
    learning, ledger, notifications,
    notifications::NotificationRow,
    preferences::{self, PreferenceRow},
    risk::{self, RiskRow},
    scores::{self, EventRow, SnapshotRow},
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Steward decision store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    tracing::debug!("schema initialised");
    Ok(())
  }
}

fn limit_param(limit: usize) -> i64 { i64::try_from(limit).unwrap_or(i64::MAX) }

fn count(column: &str, v: i64) -> Result<u32> {
  u32::try_from(v).map_err(|_| Error::OutOfRange(format!("{column} = {v}")))
}

// ─── DecisionStore impl ──────────────────────────────────────────────────────

impl DecisionStore for SqliteStore {
  type Error = Error;

  // ── Actions ───────────────────────────────────────────────────────────────

  async fn upsert_action(
    &self,
    owner_user_id: &str,
    candidate: &Candidate,
    now: DateTime<Utc>,
  ) -> Result<UpsertOutcome> {
    let row = NewActionRow {
      action_id:     encode_uuid(Uuid::new_v4()),
      owner_user_id: owner_user_id.to_owned(),
      entity_type:   candidate.entity_type.clone(),
      entity_id:     candidate.entity_id.clone(),
      dedupe_key:    candidate.dedupe_key.clone(),
      rule_key:      candidate.rule_key.clone(),
      title:         candidate.title.clone(),
      reason:        candidate.reason.clone(),
      score:         i64::from(candidate.score),
      priority:      candidate.priority.as_ref().to_owned(),
      now:           encode_dt(now),
    };

    let (effect, raw) = self
      .conn
      .call(move |conn| Ok(actions::upsert(conn, &row)?))
      .await?;

    let action = raw.into_action()?;
    Ok(match effect {
      Effect::Created => UpsertOutcome::Created(action),
      Effect::Updated => UpsertOutcome::Updated(action),
      Effect::Unchanged => UpsertOutcome::Unchanged(action),
    })
  }

  async fn get_action(&self, action_id: Uuid) -> Result<Option<StoredAction>> {
    let id = encode_uuid(action_id);
    let raw = self.conn.call(move |conn| Ok(actions::get(conn, &id)?)).await?;
    raw.map(RawAction::into_action).transpose()
  }

  async fn list_actions(&self, query: &ActionQuery) -> Result<Vec<StoredAction>> {
    let filter = ActionFilter {
      owner_user_id: query.owner_user_id.clone(),
      entity_type:   query.entity_type.clone(),
      entity_id:     query.entity_id.clone(),
      rule_key:      query.rule_key.clone(),
      status:        query.status.map(|s| s.as_ref().to_owned()),
      limit:         limit_param(query.limit.unwrap_or(100)),
      offset:        limit_param(query.offset.unwrap_or(0)),
    };
    let raws = self.conn.call(move |conn| Ok(actions::list(conn, &filter)?)).await?;
    raws.into_iter().map(RawAction::into_action).collect()
  }

  async fn set_action_status(
    &self,
    action_id: Uuid,
    change: StatusChange,
    now: DateTime<Utc>,
  ) -> Result<Option<StoredAction>> {
    change.validate()?;
    let row = StatusRow {
      action_id:     encode_uuid(action_id),
      event_id:      encode_uuid(Uuid::new_v4()),
      status:        change.status.as_ref().to_owned(),
      outcome:       change.outcome.map(|o| o.as_ref().to_owned()),
      snoozed_until: change.snoozed_until.map(encode_dt),
      now:           encode_dt(now),
    };
    let raw = self
      .conn
      .call(move |conn| Ok(actions::set_status(conn, &row)?))
      .await?;
    raw.map(RawAction::into_action).transpose()
  }

  // ── Learning ──────────────────────────────────────────────────────────────

  async fn load_effectiveness(&self, owner_user_id: &str) -> Result<EffectivenessMap> {
    let owner = owner_user_id.to_owned();
    let rows = self
      .conn
      .call(move |conn| Ok(learning::effectiveness(conn, &owner)?))
      .await?;

    rows
      .into_iter()
      .map(|(rule_key, fired, applied, dismissed, succeeded)| -> Result<_> {
        let eff = RuleEffectiveness {
          rule_key:  rule_key.clone(),
          fired:     count("fired", fired)?,
          applied:   count("applied", applied)?,
          dismissed: count("dismissed", dismissed)?,
          succeeded: count("succeeded", succeeded)?,
        };
        Ok((rule_key, eff))
      })
      .collect()
  }

  async fn load_weights(&self, owner_user_id: &str) -> Result<Vec<LearnedWeight>> {
    let owner = owner_user_id.to_owned();
    let rows = self.conn.call(move |conn| Ok(learning::weights(conn, &owner)?)).await?;
    rows
      .into_iter()
      .map(|(rule_key, owner_user_id, multiplier, updated_at)| -> Result<_> {
        Ok(LearnedWeight { rule_key, owner_user_id, multiplier, updated_at: decode_dt(&updated_at)? })
      })
      .collect()
  }

  async fn upsert_weight(&self, weight: &LearnedWeight) -> Result<()> {
    let row = (
      weight.rule_key.clone(),
      weight.owner_user_id.clone(),
      weight.multiplier,
      encode_dt(weight.updated_at),
    );
    self.conn.call(move |conn| Ok(learning::upsert_weight(conn, &row)?)).await?;
    Ok(())
  }

  async fn rule_activity(&self, owner_user_id: &str, since: DateTime<Utc>) -> Result<Vec<RuleActivity>> {
    let owner = owner_user_id.to_owned();
    let since = encode_dt(since);
    let raws = self
      .conn
      .call(move |conn| Ok(learning::activity(conn, &owner, &since)?))
      .await?;

    let mut out = Vec::with_capacity(raws.len());
    for raw in raws {
      let at = decode_dt(&raw.at)?;
      let kinds: &[ActivityKind] = match (raw.kind.as_str(), raw.outcome.as_deref()) {
        ("fired", _) => &[ActivityKind::Fired],
        ("done", Some("success")) => &[ActivityKind::Applied, ActivityKind::Succeeded],
        ("done", _) => &[ActivityKind::Applied],
        ("dismissed", _) => &[ActivityKind::Dismissed],
        (other, _) => {
          return Err(Error::Core(steward_core::Error::UnknownVariant {
            kind:  "activity kind",
            value: other.to_owned(),
          }));
        }
      };
      out.extend(kinds.iter().map(|&kind| RuleActivity {
        rule_key: raw.rule_key.clone(),
        dedupe_key: raw.dedupe_key.clone(),
        kind,
        at,
      }));
    }
    Ok(out)
  }

  // ── Preferences ───────────────────────────────────────────────────────────

  async fn upsert_preference(&self, input: NewPreference, now: DateTime<Utc>) -> Result<Preference> {
    let row = PreferenceRow {
      preference_id:    encode_uuid(Uuid::new_v4()),
      owner_user_id:    input.owner_user_id,
      entity_type:      input.entity_type.unwrap_or_else(|| ANY_SCOPE.to_owned()),
      entity_id:        input.entity_id.unwrap_or_else(|| ANY_SCOPE.to_owned()),
      target_kind:      input.target.kind().to_owned(),
      target_key:       input.target.key().to_owned(),
      suppressed_until: input.suppressed_until.map(encode_dt),
      source:           input.source.as_ref().to_owned(),
      reason:           input.reason,
      now:              encode_dt(now),
    };
    let raw = self
      .conn
      .call(move |conn| Ok(preferences::upsert(conn, &row)?))
      .await?;
    raw.into_preference()
  }

  async fn preferences_for(
    &self,
    owner_user_id: &str,
    entity_type: &str,
    entity_id: &str,
  ) -> Result<Vec<Preference>> {
    let (owner, et, eid) = (owner_user_id.to_owned(), entity_type.to_owned(), entity_id.to_owned());
    let raws = self
      .conn
      .call(move |conn| Ok(preferences::for_scope(conn, &owner, &et, &eid)?))
      .await?;
    raws.into_iter().map(|r| r.into_preference()).collect()
  }

  async fn deactivate_preference(&self, preference_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
    let id = encode_uuid(preference_id);
    let now = encode_dt(now);
    Ok(
      self
        .conn
        .call(move |conn| Ok(preferences::deactivate(conn, &id, &now)?))
        .await?,
    )
  }

  // ── Scores ────────────────────────────────────────────────────────────────

  async fn insert_score_snapshot(
    &self,
    input: NewScoreSnapshot,
  ) -> Result<(ScoreSnapshot, Option<ScoreSnapshot>)> {
    let c = input.computation;
    let row = SnapshotRow {
      snapshot_id:  encode_uuid(Uuid::new_v4()),
      entity_type:  input.entity_type,
      entity_id:    input.entity_id,
      score:        i64::from(c.score),
      band:         c.band.as_ref().to_owned(),
      factors_json: serde_json::to_string(&c.factors)?,
      reasons_json: serde_json::to_string(&c.reasons)?,
      computed_at:  encode_dt(input.computed_at),
    };
    let (current, previous) = self
      .conn
      .call(move |conn| Ok(scores::insert_snapshot(conn, &row)?))
      .await?;
    Ok((current.into_snapshot()?, previous.map(|p| p.into_snapshot()).transpose()?))
  }

  async fn insert_score_events(&self, events: &[ScoreEvent]) -> Result<()> {
    if events.is_empty() {
      return Ok(());
    }
    let rows: Vec<EventRow> = events
      .iter()
      .map(|e| EventRow {
        event_id:         encode_uuid(e.event_id),
        snapshot_id:      encode_uuid(e.snapshot_id),
        prev_snapshot_id: encode_uuid(e.prev_snapshot_id),
        entity_type:      e.entity_type.clone(),
        entity_id:        e.entity_id.clone(),
        event_type:       e.event_type.as_ref().to_owned(),
        from_score:       i64::from(e.from_score),
        to_score:         i64::from(e.to_score),
        from_band:        e.from_band.as_ref().to_owned(),
        to_band:          e.to_band.as_ref().to_owned(),
        delta:            i64::from(e.delta),
        created_at:       encode_dt(e.created_at),
      })
      .collect();
    self.conn.call(move |conn| Ok(scores::insert_events(conn, &rows)?)).await?;
    Ok(())
  }

  async fn latest_score(&self, entity_type: &str, entity_id: &str) -> Result<Option<ScoreSnapshot>> {
    let (et, eid) = (entity_type.to_owned(), entity_id.to_owned());
    let raw = self.conn.call(move |conn| Ok(scores::latest(conn, &et, &eid)?)).await?;
    raw.map(|r| r.into_snapshot()).transpose()
  }

  async fn list_score_events(
    &self,
    entity_type: &str,
    entity_id: &str,
    limit: usize,
  ) -> Result<Vec<ScoreEvent>> {
    let (et, eid, limit) = (entity_type.to_owned(), entity_id.to_owned(), limit_param(limit));
    let raws = self
      .conn
      .call(move |conn| Ok(scores::list_events(conn, &et, &eid, limit)?))
      .await?;
    raws.into_iter().map(|r| r.into_event()).collect()
  }

  // ── Risk flags ────────────────────────────────────────────────────────────

  async fn upsert_risk_flag(&self, input: NewRiskFlag, now: DateTime<Utc>) -> Result<RiskUpsert> {
    let incoming_rank = input.severity.rank();
    let row = RiskRow {
      risk_flag_id:  encode_uuid(Uuid::new_v4()),
      rule_key:      input.rule_key,
      dedupe_key:    input.dedupe_key,
      severity:      input.severity.as_ref().to_owned(),
      severity_rank: incoming_rank,
      title:         input.title,
      description:   input.description,
      entity_type:   input.entity_type,
      entity_id:     input.entity_id,
      now:           encode_dt(now),
    };
    let (prior, raw) = self.conn.call(move |conn| Ok(risk::upsert(conn, &row)?)).await?;

    let prior = prior
      .map(|(rank, status)| Ok::<_, Error>((rank, decode_enum::<RiskStatus>("risk status", &status)?)))
      .transpose()?;
    let outcome = match prior {
      None => RiskOutcome::Created,
      Some((_, status)) if status.is_terminal() => RiskOutcome::Terminal,
      Some((rank, _)) if incoming_rank > rank => RiskOutcome::Escalated,
      Some(_) => RiskOutcome::Refreshed,
    };
    let flag = raw.into_flag()?;
    Ok(RiskUpsert { risk_flag_id: flag.risk_flag_id, outcome, flag })
  }

  async fn get_risk_flag(&self, risk_flag_id: Uuid) -> Result<Option<RiskFlag>> {
    let id = encode_uuid(risk_flag_id);
    let raw = self.conn.call(move |conn| Ok(risk::get(conn, &id)?)).await?;
    raw.map(|r| r.into_flag()).transpose()
  }

  async fn set_risk_status(
    &self,
    risk_flag_id: Uuid,
    status: RiskStatus,
    snoozed_until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
  ) -> Result<Option<RiskFlag>> {
    let id = encode_uuid(risk_flag_id);
    let status = status.as_ref().to_owned();
    let until = snoozed_until.map(encode_dt);
    let now = encode_dt(now);
    let raw = self
      .conn
      .call(move |conn| Ok(risk::set_status(conn, &id, &status, until.as_deref(), &now)?))
      .await?;
    raw.map(|r| r.into_flag()).transpose()
  }

  async fn list_risk_flags(&self, statuses: &[RiskStatus], limit: usize) -> Result<Vec<RiskFlag>> {
    let statuses: Vec<String> = statuses.iter().map(|s| s.as_ref().to_owned()).collect();
    let limit = limit_param(limit);
    let raws = self.conn.call(move |conn| Ok(risk::list(conn, &statuses, limit)?)).await?;
    raws.into_iter().map(|r| r.into_flag()).collect()
  }

  // ── Notifications ─────────────────────────────────────────────────────────

  async fn insert_notification(
    &self,
    input: NewNotification,
    now: DateTime<Utc>,
  ) -> Result<NotificationEvent> {
    let dedupe_key = input.key.dedupe_key();
    let row = NotificationRow {
      notification_id: encode_uuid(Uuid::new_v4()),
      dedupe_key,
      source: input.key.source,
      entity_type: input.key.entity_type,
      entity_id: input.key.entity_id,
      event_type: input.key.event_type,
      title: input.title,
      body: input.body,
      status: input.status.as_ref().to_owned(),
      now: encode_dt(now),
    };
    let raw = self.conn.call(move |conn| Ok(notifications::insert(conn, &row)?)).await?;
    raw.into_notification()
  }

  async fn last_notification(
    &self,
    dedupe_key: &str,
    since: DateTime<Utc>,
    statuses: &[NotificationStatus],
  ) -> Result<Option<NotificationEvent>> {
    let key = dedupe_key.to_owned();
    let since = encode_dt(since);
    let statuses: Vec<String> = statuses.iter().map(|s| s.as_ref().to_owned()).collect();
    let raw = self
      .conn
      .call(move |conn| Ok(notifications::last(conn, &key, &since, &statuses)?))
      .await?;
    raw.map(|r| r.into_notification()).transpose()
  }

  async fn pending_notifications(&self, limit: usize) -> Result<Vec<NotificationEvent>> {
    let limit = limit_param(limit);
    let raws = self.conn.call(move |conn| Ok(notifications::pending(conn, limit)?)).await?;
    raws.into_iter().map(|r| r.into_notification()).collect()
  }

  async fn mark_notification(
    &self,
    notification_id: Uuid,
    status: NotificationStatus,
    now: DateTime<Utc>,
  ) -> Result<Option<NotificationEvent>> {
    let id = encode_uuid(notification_id);
    let status = status.as_ref().to_owned();
    let now = encode_dt(now);
    let raw = self
      .conn
      .call(move |conn| Ok(notifications::mark(conn, &id, &status, &now)?))
      .await?;
    raw.map(|r| r.into_notification()).transpose()
  }

  // ── Run ledger ────────────────────────────────────────────────────────────

  async fn record_run(
    &self,
    run_key: &str,
    triggered_by: &str,
    counts: &RunCounts,
    now: DateTime<Utc>,
  ) -> Result<RunRecord> {
    let (key, by) = (run_key.to_owned(), triggered_by.to_owned());
    let counts_json = serde_json::to_string(counts)?;
    let now = encode_dt(now);
    let raw = self
      .conn
      .call(move |conn| Ok(ledger::record(conn, &key, &by, &counts_json, &now)?))
      .await?;
    raw.into_record()
  }

  async fn get_run(&self, run_key: &str) -> Result<Option<RunRecord>> {
    let key = run_key.to_owned();
    let raw = self.conn.call(move |conn| Ok(ledger::get(conn, &key)?)).await?;
    raw.map(|r| r.into_record()).transpose()
  }
}
