//! `notifications`.

use rusqlite::{Connection, OptionalExtension as _, params, params_from_iter};

use super::placeholders;
use crate::encode::{NOTIFICATION_COLUMNS, RawNotification};

pub struct NotificationRow {
  pub notification_id: String,
  pub dedupe_key:      String,
  pub source:          String,
  pub entity_type:     String,
  pub entity_id:       String,
  pub event_type:      String,
  pub title:           String,
  pub body:            String,
  pub status:          String,
  pub now:             String,
}

pub fn insert(conn: &Connection, row: &NotificationRow) -> rusqlite::Result<RawNotification> {
  conn.query_row(
    &format!(
      "INSERT INTO notifications ({NOTIFICATION_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
       RETURNING {NOTIFICATION_COLUMNS}"
    ),
    params![
      row.notification_id,
      row.dedupe_key,
      row.source,
      row.entity_type,
      row.entity_id,
      row.event_type,
      row.title,
      row.body,
      row.status,
      row.now,
    ],
    RawNotification::from_row,
  )
}

pub fn last(
  conn: &Connection,
  dedupe_key: &str,
  since: &str,
  statuses: &[String],
) -> rusqlite::Result<Option<RawNotification>> {
  if statuses.is_empty() {
    return Ok(None);
  }
  let sql = format!(
    "SELECT {NOTIFICATION_COLUMNS} FROM notifications
      WHERE dedupe_key = ?1 AND created_at >= ?2 AND status IN ({})
      ORDER BY created_at DESC
      LIMIT 1",
    placeholders(3, statuses.len()),
  );
  let params = [dedupe_key, since]
    .into_iter()
    .chain(statuses.iter().map(String::as_str));
  conn
    .query_row(&sql, params_from_iter(params), RawNotification::from_row)
    .optional()
}

pub fn pending(conn: &Connection, limit: i64) -> rusqlite::Result<Vec<RawNotification>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {NOTIFICATION_COLUMNS} FROM notifications
      WHERE status = 'pending'
      ORDER BY created_at
      LIMIT ?1"
  ))?;
  stmt.query_map(params![limit], RawNotification::from_row)?.collect()
}

pub fn mark(
  conn: &Connection,
  notification_id: &str,
  status: &str,
  now: &str,
) -> rusqlite::Result<Option<RawNotification>> {
  conn
    .query_row(
      &format!(
        "UPDATE notifications SET status = ?2, updated_at = ?3
          WHERE notification_id = ?1
         RETURNING {NOTIFICATION_COLUMNS}"
      ),
      params![notification_id, status, now],
      RawNotification::from_row,
    )
    .optional()
}
