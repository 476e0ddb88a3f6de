//! `score_snapshots` and `score_events`.

use rusqlite::{Connection, OptionalExtension as _, params};

use crate::encode::{RawScoreEvent, RawSnapshot, SCORE_EVENT_COLUMNS, SNAPSHOT_COLUMNS};

pub struct SnapshotRow {
  pub snapshot_id:  String,
  pub entity_type:  String,
  pub entity_id:    String,
  pub score:        i64,
  pub band:         String,
  pub factors_json: String,
  pub reasons_json: String,
  pub computed_at:  String,
}

fn latest_in(conn: &Connection, entity_type: &str, entity_id: &str) -> rusqlite::Result<Option<RawSnapshot>> {
  conn
    .query_row(
      &format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM score_snapshots
          WHERE entity_type = ?1 AND entity_id = ?2
          ORDER BY seq DESC LIMIT 1"
      ),
      params![entity_type, entity_id],
      RawSnapshot::from_row,
    )
    .optional()
}

/// Append `row`; returns it with the scope's previous latest snapshot.
pub fn insert_snapshot(
  conn: &mut Connection,
  row: &SnapshotRow,
) -> rusqlite::Result<(RawSnapshot, Option<RawSnapshot>)> {
  let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
  let previous = latest_in(&tx, &row.entity_type, &row.entity_id)?;
  tx.execute(
    "INSERT INTO score_snapshots (
       snapshot_id, entity_type, entity_id, score, band, factors_json, reasons_json, computed_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    params![
      row.snapshot_id,
      row.entity_type,
      row.entity_id,
      row.score,
      row.band,
      row.factors_json,
      row.reasons_json,
      row.computed_at,
    ],
  )?;
  let current = tx.query_row(
    &format!("SELECT {SNAPSHOT_COLUMNS} FROM score_snapshots WHERE snapshot_id = ?1"),
    params![row.snapshot_id],
    RawSnapshot::from_row,
  )?;
  tx.commit()?;
  Ok((current, previous))
}

pub fn latest(conn: &Connection, entity_type: &str, entity_id: &str) -> rusqlite::Result<Option<RawSnapshot>> {
  latest_in(conn, entity_type, entity_id)
}

pub struct EventRow {
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

/// Re-inserting an event (or its type for the same snapshot) is a no-op.
pub fn insert_events(conn: &mut Connection, rows: &[EventRow]) -> rusqlite::Result<()> {
  let tx = conn.transaction()?;
  {
    let mut stmt = tx.prepare(&format!(
      "INSERT INTO score_events ({SCORE_EVENT_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
       ON CONFLICT DO NOTHING"
    ))?;
    for e in rows {
      stmt.execute(params![
        e.event_id,
        e.snapshot_id,
        e.prev_snapshot_id,
        e.entity_type,
        e.entity_id,
        e.event_type,
        e.from_score,
        e.to_score,
        e.from_band,
        e.to_band,
        e.delta,
        e.created_at,
      ])?;
    }
  }
  tx.commit()
}

pub fn list_events(
  conn: &Connection,
  entity_type: &str,
  entity_id: &str,
  limit: i64,
) -> rusqlite::Result<Vec<RawScoreEvent>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {SCORE_EVENT_COLUMNS} FROM score_events
      WHERE entity_type = ?1 AND entity_id = ?2
      ORDER BY created_at DESC, event_type
      LIMIT ?3"
  ))?;
  stmt
    .query_map(params![entity_type, entity_id, limit], RawScoreEvent::from_row)?
    .collect()
}
