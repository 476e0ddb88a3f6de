//! [`TtlStore`] over the `kv_entries` table, for deployments where several
//! processes must share rate-limit counters and cooldown caches.

use std::time::Duration;

use chrono::{DateTime, Utc};
use steward_core::ttl::TtlStore;

use crate::{Error, Result, SqliteStore, encode::encode_dt, queries::kv};

fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<String> {
  let ttl = chrono::Duration::from_std(ttl).map_err(|e| Error::OutOfRange(format!("ttl: {e}")))?;
  let at = now
    .checked_add_signed(ttl)
    .ok_or_else(|| Error::OutOfRange(format!("ttl: {ttl}")))?;
  Ok(encode_dt(at))
}

impl TtlStore for SqliteStore {
  type Error = Error;

  async fn get(&self, key: &str) -> Result<Option<String>> {
    let key = key.to_owned();
    let now = encode_dt(Utc::now());
    Ok(self.conn.call(move |conn| Ok(kv::get(conn, &key, &now)?)).await?)
  }

  async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
    let key = key.to_owned();
    let expires_at = expiry(Utc::now(), ttl)?;
    self
      .conn
      .call(move |conn| Ok(kv::set(conn, &key, &value, &expires_at)?))
      .await?;
    Ok(())
  }

  async fn incr(&self, key: &str, ttl: Duration) -> Result<u64> {
    let key = key.to_owned();
    let now = Utc::now();
    let expires_at = expiry(now, ttl)?;
    let now = encode_dt(now);
    let n = self
      .conn
      .call(move |conn| Ok(kv::incr(conn, &key, &now, &expires_at)?))
      .await?;
    u64::try_from(n).map_err(|_| Error::OutOfRange(format!("counter = {n}")))
  }
}
