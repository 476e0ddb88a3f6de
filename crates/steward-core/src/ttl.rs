//! A key-value-with-expiry abstraction for rate limits and caches.
//!
//! Tests and single-process deployments use an in-memory implementation;
//! multi-process deployments share one backed by the store. Callers do not
//! change either way.

use std::{future::Future, time::Duration};

pub trait TtlStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Fetch a live value. Expired entries read as `None`.
  fn get<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + 'a;

  /// Store `value` under `key` for `ttl`, replacing any previous entry.
  fn set<'a>(
    &'a self,
    key: &'a str,
    value: String,
    ttl: Duration,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Atomically increment a counter and return the new value.
  ///
  /// A missing or expired counter starts at 1 and expires after `ttl`; an
  /// existing counter keeps its original expiry (fixed window).
  fn incr<'a>(
    &'a self,
    key: &'a str,
    ttl: Duration,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;
}
