//! `kv_entries`. Expired rows read as absent and are overwritten lazily.

use rusqlite::{Connection, OptionalExtension as _, params};

pub fn get(conn: &Connection, key: &str, now: &str) -> rusqlite::Result<Option<String>> {
  conn
    .query_row(
      "SELECT value FROM kv_entries WHERE key = ?1 AND expires_at > ?2",
      params![key, now],
      |r| r.get(0),
    )
    .optional()
}

pub fn set(conn: &Connection, key: &str, value: &str, expires_at: &str) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO kv_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
     ON CONFLICT (key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
    params![key, value, expires_at],
  )?;
  Ok(())
}

/// Fixed-window counter: a live entry keeps its expiry, an expired one
/// restarts at 1.
pub fn incr(conn: &Connection, key: &str, now: &str, expires_at: &str) -> rusqlite::Result<i64> {
  let value: String = conn.query_row(
    "INSERT INTO kv_entries (key, value, expires_at) VALUES (?1, '1', ?3)
     ON CONFLICT (key) DO UPDATE SET
       value      = CASE WHEN kv_entries.expires_at > ?2
                      THEN CAST(CAST(kv_entries.value AS INTEGER) + 1 AS TEXT)
                      ELSE '1' END,
       expires_at = CASE WHEN kv_entries.expires_at > ?2
                      THEN kv_entries.expires_at
                      ELSE excluded.expires_at END
     RETURNING value",
    params![key, now, expires_at],
    |r| r.get(0),
  )?;
  value
    .parse()
    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}
