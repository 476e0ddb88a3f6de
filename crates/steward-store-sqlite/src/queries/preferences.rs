//! `preferences`.

use rusqlite::{Connection, params};

use crate::encode::{ANY_SCOPE, PREFERENCE_COLUMNS, RawPreference};

/// Encoded preference; unscoped columns already hold [`ANY_SCOPE`].
pub struct PreferenceRow {
  pub preference_id:    String,
  pub owner_user_id:    String,
  pub entity_type:      String,
  pub entity_id:        String,
  pub target_kind:      String,
  pub target_key:       String,
  pub suppressed_until: Option<String>,
  pub source:           String,
  pub reason:           Option<String>,
  pub now:              String,
}

/// Insert, or reactivate and overwrite the existing row for the same target.
pub fn upsert(conn: &Connection, row: &PreferenceRow) -> rusqlite::Result<RawPreference> {
  conn.query_row(
    &format!(
      "INSERT INTO preferences (
         preference_id, owner_user_id, entity_type, entity_id, target_kind, target_key,
         suppressed_until, status, source, reason, created_at, updated_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'active', ?8, ?9, ?10, ?10)
       ON CONFLICT (owner_user_id, entity_type, entity_id, target_kind, target_key) DO UPDATE SET
         suppressed_until = excluded.suppressed_until,
         status           = 'active',
         source           = excluded.source,
         reason           = excluded.reason,
         updated_at       = excluded.updated_at
       RETURNING {PREFERENCE_COLUMNS}"
    ),
    params![
      row.preference_id,
      row.owner_user_id,
      row.entity_type,
      row.entity_id,
      row.target_kind,
      row.target_key,
      row.suppressed_until,
      row.source,
      row.reason,
      row.now,
    ],
    RawPreference::from_row,
  )
}

pub fn for_scope(
  conn: &Connection,
  owner: &str,
  entity_type: &str,
  entity_id: &str,
) -> rusqlite::Result<Vec<RawPreference>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {PREFERENCE_COLUMNS} FROM preferences
      WHERE owner_user_id = ?1
        AND entity_type IN (?2, ?4)
        AND entity_id IN (?3, ?4)
      ORDER BY created_at"
  ))?;
  stmt
    .query_map(params![owner, entity_type, entity_id, ANY_SCOPE], RawPreference::from_row)?
    .collect()
}

pub fn deactivate(conn: &Connection, preference_id: &str, now: &str) -> rusqlite::Result<bool> {
  let changed = conn.execute(
    "UPDATE preferences SET status = 'inactive', updated_at = ?2 WHERE preference_id = ?1",
    params![preference_id, now],
  )?;
  Ok(changed > 0)
}
