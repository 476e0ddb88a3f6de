//! `risk_flags`.

use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior, params, params_from_iter};

use super::placeholders;
use crate::encode::{RISK_COLUMNS, RawRiskFlag};

pub struct RiskRow {
  pub risk_flag_id:  String,
  pub rule_key:      String,
  pub dedupe_key:    String,
  pub severity:      String,
  pub severity_rank: i64,
  pub title:         String,
  pub description:   String,
  pub entity_type:   Option<String>,
  pub entity_id:     Option<String>,
  pub now:           String,
}

/// `(severity_rank, status)` of the row that existed before the upsert.
pub type Prior = (i64, String);

/// A snoozed flag whose snooze has lapsed reopens on re-fire.
const SNOOZE_LAPSED: &str = "risk_flags.status = 'snoozed'
  AND risk_flags.snoozed_until IS NOT NULL
  AND risk_flags.snoozed_until <= excluded.last_seen_at";

/// Create the flag, or refresh a non-terminal one in place.
///
/// Runs under an immediate transaction so the prior state read here is the
/// state the conflict clause acts on.
pub fn upsert(conn: &mut Connection, row: &RiskRow) -> rusqlite::Result<(Option<Prior>, RawRiskFlag)> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  let prior: Option<Prior> = tx
    .query_row(
      "SELECT severity_rank, status FROM risk_flags WHERE dedupe_key = ?1",
      params![row.dedupe_key],
      |r| Ok((r.get(0)?, r.get(1)?)),
    )
    .optional()?;

  let sql = format!(
    "INSERT INTO risk_flags (
       risk_flag_id, rule_key, dedupe_key, severity, severity_rank, title, description,
       entity_type, entity_id, status, first_seen_at, last_seen_at, status_changed_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'open', ?10, ?10, ?10)
     ON CONFLICT (dedupe_key) DO UPDATE SET
       last_seen_at      = excluded.last_seen_at,
       severity          = CASE WHEN excluded.severity_rank > risk_flags.severity_rank
                              THEN excluded.severity ELSE risk_flags.severity END,
       severity_rank     = MAX(risk_flags.severity_rank, excluded.severity_rank),
       title             = excluded.title,
       description       = excluded.description,
       status            = CASE WHEN {SNOOZE_LAPSED} THEN 'open' ELSE risk_flags.status END,
       snoozed_until     = CASE WHEN {SNOOZE_LAPSED} THEN NULL ELSE risk_flags.snoozed_until END,
       status_changed_at = CASE WHEN {SNOOZE_LAPSED}
                             THEN excluded.last_seen_at ELSE risk_flags.status_changed_at END
     WHERE risk_flags.status IN ('open', 'snoozed')"
  );
  tx.execute(
    &sql,
    params![
      row.risk_flag_id,
      row.rule_key,
      row.dedupe_key,
      row.severity,
      row.severity_rank,
      row.title,
      row.description,
      row.entity_type,
      row.entity_id,
      row.now,
    ],
  )?;

  let raw = tx.query_row(
    &format!("SELECT {RISK_COLUMNS} FROM risk_flags WHERE dedupe_key = ?1"),
    params![row.dedupe_key],
    RawRiskFlag::from_row,
  )?;
  tx.commit()?;
  Ok((prior, raw))
}

pub fn get(conn: &Connection, risk_flag_id: &str) -> rusqlite::Result<Option<RawRiskFlag>> {
  conn
    .query_row(
      &format!("SELECT {RISK_COLUMNS} FROM risk_flags WHERE risk_flag_id = ?1"),
      params![risk_flag_id],
      RawRiskFlag::from_row,
    )
    .optional()
}

pub fn set_status(
  conn: &Connection,
  risk_flag_id: &str,
  status: &str,
  snoozed_until: Option<&str>,
  now: &str,
) -> rusqlite::Result<Option<RawRiskFlag>> {
  conn
    .query_row(
      &format!(
        "UPDATE risk_flags
            SET status = ?2, snoozed_until = ?3, status_changed_at = ?4
          WHERE risk_flag_id = ?1 AND status IN ('open', 'snoozed')
         RETURNING {RISK_COLUMNS}"
      ),
      params![risk_flag_id, status, snoozed_until, now],
      RawRiskFlag::from_row,
    )
    .optional()
}

pub fn list(conn: &Connection, statuses: &[String], limit: i64) -> rusqlite::Result<Vec<RawRiskFlag>> {
  if statuses.is_empty() {
    return Ok(Vec::new());
  }
  let mut stmt = conn.prepare(&format!(
    "SELECT {RISK_COLUMNS} FROM risk_flags
      WHERE status IN ({})
      ORDER BY severity_rank DESC, last_seen_at DESC
      LIMIT {limit}",
    placeholders(1, statuses.len()),
  ))?;
  stmt.query_map(params_from_iter(statuses), RawRiskFlag::from_row)?.collect()
}
