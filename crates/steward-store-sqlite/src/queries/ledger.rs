//! `run_ledger`.

use rusqlite::{Connection, OptionalExtension as _, params};

use crate::encode::{RUN_COLUMNS, RawRun};

/// Insert or overwrite; `first_run_at` survives, `run_count` increments.
pub fn record(
  conn: &Connection,
  run_key: &str,
  triggered_by: &str,
  counts_json: &str,
  now: &str,
) -> rusqlite::Result<RawRun> {
  conn.query_row(
    &format!(
      "INSERT INTO run_ledger ({RUN_COLUMNS})
       VALUES (?1, ?2, ?3, 1, ?4, ?4)
       ON CONFLICT (run_key) DO UPDATE SET
         triggered_by = excluded.triggered_by,
         counts_json  = excluded.counts_json,
         run_count    = run_ledger.run_count + 1,
         last_run_at  = excluded.last_run_at
       RETURNING {RUN_COLUMNS}"
    ),
    params![run_key, triggered_by, counts_json, now],
    RawRun::from_row,
  )
}

pub fn get(conn: &Connection, run_key: &str) -> rusqlite::Result<Option<RawRun>> {
  conn
    .query_row(
      &format!("SELECT {RUN_COLUMNS} FROM run_ledger WHERE run_key = ?1"),
      params![run_key],
      RawRun::from_row,
    )
    .optional()
}
