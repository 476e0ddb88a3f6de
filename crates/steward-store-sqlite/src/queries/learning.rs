//! Effectiveness counts, learned weights and rule activity.

use rusqlite::{Connection, params};

/// `(rule_key, fired, applied, dismissed, succeeded)`.
pub type EffectivenessRow = (String, i64, i64, i64, i64);

pub fn effectiveness(conn: &Connection, owner: &str) -> rusqlite::Result<Vec<EffectivenessRow>> {
  let mut stmt = conn.prepare(
    "SELECT rule_key,
            COUNT(*),
            SUM(status = 'done'),
            SUM(status = 'dismissed'),
            SUM(status = 'done' AND outcome = 'success')
       FROM actions
      WHERE owner_user_id = ?1
      GROUP BY rule_key",
  )?;
  stmt
    .query_map(params![owner], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)))?
    .collect()
}

/// `(rule_key, owner_user_id, multiplier, updated_at)`.
pub type WeightRow = (String, String, f64, String);

pub fn weights(conn: &Connection, owner: &str) -> rusqlite::Result<Vec<WeightRow>> {
  let mut stmt = conn.prepare(
    "SELECT rule_key, owner_user_id, multiplier, updated_at
       FROM learned_weights WHERE owner_user_id = ?1
      ORDER BY rule_key",
  )?;
  stmt
    .query_map(params![owner], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))?
    .collect()
}

pub fn upsert_weight(conn: &Connection, row: &WeightRow) -> rusqlite::Result<()> {
  let (rule_key, owner, multiplier, updated_at) = row;
  conn.execute(
    "INSERT INTO learned_weights (owner_user_id, rule_key, multiplier, updated_at)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT (owner_user_id, rule_key) DO UPDATE SET
       multiplier = excluded.multiplier,
       updated_at = excluded.updated_at",
    params![owner, rule_key, multiplier, updated_at],
  )?;
  Ok(())
}

/// One firing or one terminal status change.
///
/// `kind` is `fired`, `done` or `dismissed`; `outcome` is only set for `done`.
pub struct RawActivity {
  pub rule_key:   String,
  pub dedupe_key: String,
  pub kind:       String,
  pub outcome:    Option<String>,
  pub at:         String,
}

pub fn activity(conn: &Connection, owner: &str, since: &str) -> rusqlite::Result<Vec<RawActivity>> {
  let mut stmt = conn.prepare(
    "SELECT rule_key, dedupe_key, 'fired', NULL, fired_at
       FROM rule_firings
      WHERE owner_user_id = ?1 AND fired_at >= ?2
     UNION ALL
     SELECT a.rule_key, a.dedupe_key, e.status, e.outcome, e.recorded_at
       FROM action_events e
       JOIN actions a ON a.action_id = e.action_id
      WHERE a.owner_user_id = ?1
        AND e.recorded_at >= ?2
        AND e.status IN ('done', 'dismissed')
     ORDER BY 5",
  )?;
  stmt
    .query_map(params![owner, since], |r| {
      Ok(RawActivity {
        rule_key:   r.get(0)?,
        dedupe_key: r.get(1)?,
        kind:       r.get(2)?,
        outcome:    r.get(3)?,
        at:         r.get(4)?,
      })
    })?
    .collect()
}
