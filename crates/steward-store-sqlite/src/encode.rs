//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings with fixed microsecond precision
//! and a `Z` suffix. Enums are stored as their snake_case names. Structured
//! fields (factors, reasons, run counts) are stored as compact JSON. UUIDs are
//! stored as hyphenated lowercase strings.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use steward_core::{
  action::StoredAction,
  notification::NotificationEvent,
  preference::{Preference, PreferenceTarget},
  risk::RiskFlag,
  run::RunRecord,
  score::{ScoreEvent, ScoreSnapshot},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

/// Parse a snake_case enum column.
pub fn decode_enum<T: FromStr>(kind: &'static str, s: &str) -> Result<T> {
  s.parse().map_err(|_| {
    Error::Core(steward_core::Error::UnknownVariant { kind, value: s.to_owned() })
  })
}

fn decode_u8(column: &str, v: i64) -> Result<u8> {
  u8::try_from(v).map_err(|_| Error::OutOfRange(format!("{column} = {v}")))
}

fn decode_u32(column: &str, v: i64) -> Result<u32> {
  u32::try_from(v).map_err(|_| Error::OutOfRange(format!("{column} = {v}")))
}

/// Owner-wide preferences store `*` instead of a scope.
pub const ANY_SCOPE: &str = "*";

// ─── Actions ─────────────────────────────────────────────────────────────────

pub const ACTION_COLUMNS: &str = "action_id, owner_user_id, entity_type, entity_id, dedupe_key,
  rule_key, title, reason, score, priority, status, outcome, snoozed_until, fire_count,
  created_at, last_fired_at, status_changed_at";

/// Raw strings read directly from an `actions` row.
pub struct RawAction {
  pub action_id:         String,
  pub owner_user_id:     String,
  pub entity_type:       String,
  pub entity_id:         String,
  pub dedupe_key:        String,
  pub rule_key:          String,
  pub title:             String,
  pub reason:            String,
  pub score:             i64,
  pub priority:          String,
  pub status:            String,
  pub outcome:           Option<String>,
  pub snoozed_until:     Option<String>,
  pub fire_count:        i64,
  pub created_at:        String,
  pub last_fired_at:     String,
  pub status_changed_at: String,
}

impl RawAction {
  /// Map a row selected with [`ACTION_COLUMNS`].
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      action_id:         row.get(0)?,
      owner_user_id:     row.get(1)?,
      entity_type:       row.get(2)?,
      entity_id:         row.get(3)?,
      dedupe_key:        row.get(4)?,
      rule_key:          row.get(5)?,
      title:             row.get(6)?,
      reason:            row.get(7)?,
      score:             row.get(8)?,
      priority:          row.get(9)?,
      status:            row.get(10)?,
      outcome:           row.get(11)?,
      snoozed_until:     row.get(12)?,
      fire_count:        row.get(13)?,
      created_at:        row.get(14)?,
      last_fired_at:     row.get(15)?,
      status_changed_at: row.get(16)?,
    })
  }

  pub fn into_action(self) -> Result<StoredAction> {
    Ok(StoredAction {
      action_id:         decode_uuid(&self.action_id)?,
      owner_user_id:     self.owner_user_id,
      entity_type:       self.entity_type,
      entity_id:         self.entity_id,
      dedupe_key:        self.dedupe_key,
      rule_key:          self.rule_key,
      title:             self.title,
      reason:            self.reason,
      score:             decode_u8("score", self.score)?,
      priority:          decode_enum("priority", &self.priority)?,
      status:            decode_enum("action status", &self.status)?,
      outcome:           self
        .outcome
        .as_deref()
        .map(|o| decode_enum("outcome", o))
        .transpose()?,
      snoozed_until:     decode_opt_dt(self.snoozed_until)?,
      fire_count:        decode_u32("fire_count", self.fire_count)?,
      created_at:        decode_dt(&self.created_at)?,
      last_fired_at:     decode_dt(&self.last_fired_at)?,
      status_changed_at: decode_dt(&self.status_changed_at)?,
    })
  }
}

// ─── Preferences ─────────────────────────────────────────────────────────────

pub const PREFERENCE_COLUMNS: &str = "preference_id, owner_user_id, entity_type, entity_id,
  target_kind, target_key, suppressed_until, status, source, reason, created_at, updated_at";

pub struct RawPreference {
  pub preference_id:    String,
  pub owner_user_id:    String,
  pub entity_type:      String,
  pub entity_id:        String,
  pub target_kind:      String,
  pub target_key:       String,
  pub suppressed_until: Option<String>,
  pub status:           String,
  pub source:           String,
  pub reason:           Option<String>,
  pub created_at:       String,
  pub updated_at:       String,
}

impl RawPreference {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      preference_id:    row.get(0)?,
      owner_user_id:    row.get(1)?,
      entity_type:      row.get(2)?,
      entity_id:        row.get(3)?,
      target_kind:      row.get(4)?,
      target_key:       row.get(5)?,
      suppressed_until: row.get(6)?,
      status:           row.get(7)?,
      source:           row.get(8)?,
      reason:           row.get(9)?,
      created_at:       row.get(10)?,
      updated_at:       row.get(11)?,
    })
  }

  pub fn into_preference(self) -> Result<Preference> {
    let target = match self.target_kind.as_str() {
      "rule_key" => PreferenceTarget::RuleKey(self.target_key),
      "dedupe_key" => PreferenceTarget::DedupeKey(self.target_key),
      other => {
        return Err(Error::Core(steward_core::Error::UnknownVariant {
          kind:  "preference target",
          value: other.to_owned(),
        }));
      }
    };
    let scoped = |s: String| (s != ANY_SCOPE).then_some(s);
    Ok(Preference {
      preference_id: decode_uuid(&self.preference_id)?,
      owner_user_id: self.owner_user_id,
      entity_type: scoped(self.entity_type),
      entity_id: scoped(self.entity_id),
      target,
      suppressed_until: decode_opt_dt(self.suppressed_until)?,
      status: decode_enum("preference status", &self.status)?,
      source: decode_enum("preference source", &self.source)?,
      reason: self.reason,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

// ─── Scores ──────────────────────────────────────────────────────────────────

pub const SNAPSHOT_COLUMNS: &str =
  "snapshot_id, entity_type, entity_id, score, band, factors_json, reasons_json, computed_at";

pub struct RawSnapshot {
  pub snapshot_id:  String,
  pub entity_type:  String,
  pub entity_id:    String,
  pub score:        i64,
  pub band:         String,
  pub factors_json: String,
  pub reasons_json: String,
  pub computed_at:  String,
}

impl RawSnapshot {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      snapshot_id:  row.get(0)?,
      entity_type:  row.get(1)?,
      entity_id:    row.get(2)?,
      score:        row.get(3)?,
      band:         row.get(4)?,
      factors_json: row.get(5)?,
      reasons_json: row.get(6)?,
      computed_at:  row.get(7)?,
    })
  }

  pub fn into_snapshot(self) -> Result<ScoreSnapshot> {
    Ok(ScoreSnapshot {
      snapshot_id: decode_uuid(&self.snapshot_id)?,
      entity_type: self.entity_type,
      entity_id:   self.entity_id,
      score:       decode_u8("score", self.score)?,
      band:        decode_enum("band", &self.band)?,
      factors:     serde_json::from_str(&self.factors_json)?,
      reasons:     serde_json::from_str(&self.reasons_json)?,
      computed_at: decode_dt(&self.computed_at)?,
    })
  }
}

pub const SCORE_EVENT_COLUMNS: &str = "event_id, snapshot_id, prev_snapshot_id, entity_type,
  entity_id, event_type, from_score, to_score, from_band, to_band, delta, created_at";

pub struct RawScoreEvent {
  pub event_id:         String,
  pub snapshot_id:      String,
  pub prev_snapshot_id: String,
  pub entity_type:      String,
  pub entity_id:        String,
  pub event_type:       String,
  pub from_score:       i64,
  pub to_score:         i64,
  pub from_band:        String,
  pub to_band:          String,
  pub delta:            i64,
  pub created_at:       String,
}

impl RawScoreEvent {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:         row.get(0)?,
      snapshot_id:      row.get(1)?,
      prev_snapshot_id: row.get(2)?,
      entity_type:      row.get(3)?,
      entity_id:        row.get(4)?,
      event_type:       row.get(5)?,
      from_score:       row.get(6)?,
      to_score:         row.get(7)?,
      from_band:        row.get(8)?,
      to_band:          row.get(9)?,
      delta:            row.get(10)?,
      created_at:       row.get(11)?,
    })
  }

  pub fn into_event(self) -> Result<ScoreEvent> {
    Ok(ScoreEvent {
      event_id:         decode_uuid(&self.event_id)?,
      snapshot_id:      decode_uuid(&self.snapshot_id)?,
      prev_snapshot_id: decode_uuid(&self.prev_snapshot_id)?,
      entity_type:      self.entity_type,
      entity_id:        self.entity_id,
      event_type:       decode_enum("score event type", &self.event_type)?,
      from_score:       decode_u8("from_score", self.from_score)?,
      to_score:         decode_u8("to_score", self.to_score)?,
      from_band:        decode_enum("band", &self.from_band)?,
      to_band:          decode_enum("band", &self.to_band)?,
      delta:            i16::try_from(self.delta)
        .map_err(|_| Error::OutOfRange(format!("delta = {}", self.delta)))?,
      created_at:       decode_dt(&self.created_at)?,
    })
  }
}

// ─── Risk flags ──────────────────────────────────────────────────────────────

pub const RISK_COLUMNS: &str = "risk_flag_id, rule_key, dedupe_key, severity, title, description,
  entity_type, entity_id, status, snoozed_until, first_seen_at, last_seen_at, status_changed_at";

pub struct RawRiskFlag {
  pub risk_flag_id:      String,
  pub rule_key:          String,
  pub dedupe_key:        String,
  pub severity:          String,
  pub title:             String,
  pub description:       String,
  pub entity_type:       Option<String>,
  pub entity_id:         Option<String>,
  pub status:            String,
  pub snoozed_until:     Option<String>,
  pub first_seen_at:     String,
  pub last_seen_at:      String,
  pub status_changed_at: String,
}

impl RawRiskFlag {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      risk_flag_id:      row.get(0)?,
      rule_key:          row.get(1)?,
      dedupe_key:        row.get(2)?,
      severity:          row.get(3)?,
      title:             row.get(4)?,
      description:       row.get(5)?,
      entity_type:       row.get(6)?,
      entity_id:         row.get(7)?,
      status:            row.get(8)?,
      snoozed_until:     row.get(9)?,
      first_seen_at:     row.get(10)?,
      last_seen_at:      row.get(11)?,
      status_changed_at: row.get(12)?,
    })
  }

  pub fn into_flag(self) -> Result<RiskFlag> {
    Ok(RiskFlag {
      risk_flag_id:      decode_uuid(&self.risk_flag_id)?,
      rule_key:          self.rule_key,
      dedupe_key:        self.dedupe_key,
      severity:          decode_enum("severity", &self.severity)?,
      title:             self.title,
      description:       self.description,
      entity_type:       self.entity_type,
      entity_id:         self.entity_id,
      status:            decode_enum("risk status", &self.status)?,
      snoozed_until:     decode_opt_dt(self.snoozed_until)?,
      first_seen_at:     decode_dt(&self.first_seen_at)?,
      last_seen_at:      decode_dt(&self.last_seen_at)?,
      status_changed_at: decode_dt(&self.status_changed_at)?,
    })
  }
}

// ─── Notifications ───────────────────────────────────────────────────────────

pub const NOTIFICATION_COLUMNS: &str = "notification_id, dedupe_key, source, entity_type,
  entity_id, event_type, title, body, status, created_at, updated_at";

pub struct RawNotification {
  pub notification_id: String,
  pub dedupe_key:      String,
  pub source:          String,
  pub entity_type:     String,
  pub entity_id:       String,
  pub event_type:      String,
  pub title:           String,
  pub body:            String,
  pub status:          String,
  pub created_at:      String,
  pub updated_at:      String,
}

impl RawNotification {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      notification_id: row.get(0)?,
      dedupe_key:      row.get(1)?,
      source:          row.get(2)?,
      entity_type:     row.get(3)?,
      entity_id:       row.get(4)?,
      event_type:      row.get(5)?,
      title:           row.get(6)?,
      body:            row.get(7)?,
      status:          row.get(8)?,
      created_at:      row.get(9)?,
      updated_at:      row.get(10)?,
    })
  }

  pub fn into_notification(self) -> Result<NotificationEvent> {
    Ok(NotificationEvent {
      notification_id: decode_uuid(&self.notification_id)?,
      dedupe_key:      self.dedupe_key,
      source:          self.source,
      entity_type:     self.entity_type,
      entity_id:       self.entity_id,
      event_type:      self.event_type,
      title:           self.title,
      body:            self.body,
      status:          decode_enum("notification status", &self.status)?,
      created_at:      decode_dt(&self.created_at)?,
      updated_at:      decode_dt(&self.updated_at)?,
    })
  }
}

// ─── Run ledger ──────────────────────────────────────────────────────────────

pub const RUN_COLUMNS: &str =
  "run_key, triggered_by, counts_json, run_count, first_run_at, last_run_at";

pub struct RawRun {
  pub run_key:      String,
  pub triggered_by: String,
  pub counts_json:  String,
  pub run_count:    i64,
  pub first_run_at: String,
  pub last_run_at:  String,
}

impl RawRun {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      run_key:      row.get(0)?,
      triggered_by: row.get(1)?,
      counts_json:  row.get(2)?,
      run_count:    row.get(3)?,
      first_run_at: row.get(4)?,
      last_run_at:  row.get(5)?,
    })
  }

  pub fn into_record(self) -> Result<RunRecord> {
    Ok(RunRecord {
      run_key:      self.run_key,
      triggered_by: self.triggered_by,
      counts:       serde_json::from_str(&self.counts_json)?,
      run_count:    decode_u32("run_count", self.run_count)?,
      first_run_at: decode_dt(&self.first_run_at)?,
      last_run_at:  decode_dt(&self.last_run_at)?,
    })
  }
}
