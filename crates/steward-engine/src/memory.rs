//! In-process [`TtlStore`] for tests and single-process deployments.

use std::{
  convert::Infallible,
  time::{Duration, Instant},
};

use dashmap::DashMap;
use steward_core::ttl::TtlStore;

#[derive(Debug, Clone)]
struct Entry {
  value:      String,
  expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct MemoryTtlStore {
  entries: DashMap<String, Entry>,
}

impl MemoryTtlStore {
  pub fn new() -> Self { Self::default() }

  /// Drop every expired entry. Expired entries are otherwise only replaced
  /// lazily when their key is touched again.
  pub fn purge_expired(&self) {
    let now = Instant::now();
    self.entries.retain(|_, e| e.expires_at > now);
  }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

impl TtlStore for MemoryTtlStore {
  type Error = Infallible;

  async fn get(&self, key: &str) -> Result<Option<String>, Infallible> {
    let now = Instant::now();
    Ok(
      self
        .entries
        .get(key)
        .filter(|e| e.expires_at > now)
        .map(|e| e.value.clone()),
    )
  }

  async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), Infallible> {
    self.entries.insert(key.to_owned(), Entry { value, expires_at: Instant::now() + ttl });
    Ok(())
  }

  async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, Infallible> {
    let now = Instant::now();
    let mut entry = self
      .entries
      .entry(key.to_owned())
      .or_insert_with(|| Entry { value: "0".into(), expires_at: now + ttl });
    if entry.expires_at <= now {
      *entry = Entry { value: "0".into(), expires_at: now + ttl };
    }
    let next = entry.value.parse::<u64>().unwrap_or(0) + 1;
    entry.value = next.to_string();
    Ok(next)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn counter_restarts_after_window() {
    let kv = MemoryTtlStore::new();
    let ttl = Duration::from_millis(20);
    assert_eq!(kv.incr("a", ttl).await.unwrap(), 1);
    assert_eq!(kv.incr("a", ttl).await.unwrap(), 2);
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(kv.incr("a", ttl).await.unwrap(), 1);
  }

  #[tokio::test]
  async fn expired_values_read_as_none_and_purge() {
    let kv = MemoryTtlStore::new();
    kv.set("live", "1".into(), Duration::from_secs(60)).await.unwrap();
    kv.set("dead", "1".into(), Duration::from_millis(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(kv.get("live").await.unwrap().as_deref(), Some("1"));
    assert_eq!(kv.get("dead").await.unwrap(), None);
    kv.purge_expired();
    assert_eq!(kv.len(), 1);
  }
}
