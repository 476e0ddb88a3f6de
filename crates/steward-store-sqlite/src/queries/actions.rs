//! `actions`, `action_events` and `rule_firings`.

use rusqlite::{Connection, OptionalExtension as _, params};

use crate::encode::{ACTION_COLUMNS, RawAction};

/// Encoded column values for an upserted candidate.
pub struct NewActionRow {
  pub action_id:     String,
  pub owner_user_id: String,
  pub entity_type:   String,
  pub entity_id:     String,
  pub dedupe_key:    String,
  pub rule_key:      String,
  pub title:         String,
  pub reason:        String,
  pub score:         i64,
  pub priority:      String,
  pub now:           String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
  Created,
  Updated,
  Unchanged,
}

/// Snoozed rows whose snooze has lapsed return to the queue on re-fire.
const SNOOZE_LAPSED: &str = "actions.status = 'snoozed'
  AND actions.snoozed_until IS NOT NULL
  AND actions.snoozed_until <= excluded.last_fired_at";

pub fn upsert(conn: &mut Connection, row: &NewActionRow) -> rusqlite::Result<(Effect, RawAction)> {
  let tx = conn.transaction()?;

  let sql = format!(
    "INSERT INTO actions (
       action_id, owner_user_id, entity_type, entity_id, dedupe_key, rule_key,
       title, reason, score, priority, status, fire_count,
       created_at, last_fired_at, status_changed_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'queued', 1, ?11, ?11, ?11)
     ON CONFLICT (entity_type, entity_id, dedupe_key) DO UPDATE SET
       title             = excluded.title,
       reason            = excluded.reason,
       score             = excluded.score,
       priority          = excluded.priority,
       fire_count        = actions.fire_count + 1,
       last_fired_at     = excluded.last_fired_at,
       status            = CASE WHEN {SNOOZE_LAPSED} THEN 'queued' ELSE actions.status END,
       snoozed_until     = CASE WHEN {SNOOZE_LAPSED} THEN NULL ELSE actions.snoozed_until END,
       status_changed_at = CASE WHEN {SNOOZE_LAPSED}
                             THEN excluded.last_fired_at ELSE actions.status_changed_at END
     WHERE actions.status IN ('queued', 'snoozed')
     RETURNING action_id"
  );

  let touched: Option<String> = tx
    .query_row(
      &sql,
      params![
        row.action_id,
        row.owner_user_id,
        row.entity_type,
        row.entity_id,
        row.dedupe_key,
        row.rule_key,
        row.title,
        row.reason,
        row.score,
        row.priority,
        row.now,
      ],
      |r| r.get(0),
    )
    .optional()?;

  let effect = match &touched {
    Some(id) if *id == row.action_id => Effect::Created,
    Some(_) => Effect::Updated,
    None => Effect::Unchanged,
  };

  if let Some(action_id) = &touched {
    tx.execute(
      "INSERT INTO rule_firings (owner_user_id, rule_key, dedupe_key, action_id, fired_at)
       VALUES (?1, ?2, ?3, ?4, ?5)",
      params![row.owner_user_id, row.rule_key, row.dedupe_key, action_id, row.now],
    )?;
  }

  let raw = tx.query_row(
    &format!(
      "SELECT {ACTION_COLUMNS} FROM actions
       WHERE entity_type = ?1 AND entity_id = ?2 AND dedupe_key = ?3"
    ),
    params![row.entity_type, row.entity_id, row.dedupe_key],
    RawAction::from_row,
  )?;

  tx.commit()?;
  Ok((effect, raw))
}

pub fn get(conn: &Connection, action_id: &str) -> rusqlite::Result<Option<RawAction>> {
  conn
    .query_row(
      &format!("SELECT {ACTION_COLUMNS} FROM actions WHERE action_id = ?1"),
      params![action_id],
      RawAction::from_row,
    )
    .optional()
}

/// Encoded [`ActionQuery`](steward_core::action::ActionQuery); `None` means
/// "any".
pub struct ActionFilter {
  pub owner_user_id: Option<String>,
  pub entity_type:   Option<String>,
  pub entity_id:     Option<String>,
  pub rule_key:      Option<String>,
  pub status:        Option<String>,
  pub limit:         i64,
  pub offset:        i64,
}

pub fn list(conn: &Connection, f: &ActionFilter) -> rusqlite::Result<Vec<RawAction>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {ACTION_COLUMNS} FROM actions
     WHERE (?1 IS NULL OR owner_user_id = ?1)
       AND (?2 IS NULL OR entity_type = ?2)
       AND (?3 IS NULL OR entity_id = ?3)
       AND (?4 IS NULL OR rule_key = ?4)
       AND (?5 IS NULL OR status = ?5)
     ORDER BY score DESC, last_fired_at DESC, dedupe_key
     LIMIT ?6 OFFSET ?7"
  ))?;
  stmt
    .query_map(
      params![f.owner_user_id, f.entity_type, f.entity_id, f.rule_key, f.status, f.limit, f.offset],
      RawAction::from_row,
    )?
    .collect()
}

/// Encoded status change.
pub struct StatusRow {
  pub action_id:     String,
  pub event_id:      String,
  pub status:        String,
  pub outcome:       Option<String>,
  pub snoozed_until: Option<String>,
  pub now:           String,
}

/// Update the action and append the event in one transaction.
pub fn set_status(conn: &mut Connection, row: &StatusRow) -> rusqlite::Result<Option<RawAction>> {
  let tx = conn.transaction()?;
  let changed = tx.execute(
    "UPDATE actions
        SET status = ?2, outcome = ?3, snoozed_until = ?4, status_changed_at = ?5
      WHERE action_id = ?1",
    params![row.action_id, row.status, row.outcome, row.snoozed_until, row.now],
  )?;
  if changed == 0 {
    return Ok(None);
  }
  tx.execute(
    "INSERT INTO action_events (event_id, action_id, status, outcome, recorded_at)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    params![row.event_id, row.action_id, row.status, row.outcome, row.now],
  )?;
  let raw = tx.query_row(
    &format!("SELECT {ACTION_COLUMNS} FROM actions WHERE action_id = ?1"),
    params![row.action_id],
    RawAction::from_row,
  )?;
  tx.commit()?;
  Ok(Some(raw))
}
