//! Per-actor fixed-window limit on pipeline triggers.
//!
//! The limit bounds how many runs can overlap; it does not serialize them.

use std::time::Duration;

use chrono::{DateTime, Utc};
use steward_core::ttl::TtlStore;

use crate::{Error, Result, config::RateLimitConfig};

pub struct RateLimiter<'a, T> {
  store:  &'a T,
  config: &'a RateLimitConfig,
}

impl<'a, T: TtlStore> RateLimiter<'a, T> {
  pub fn new(store: &'a T, config: &'a RateLimitConfig) -> Self { Self { store, config } }

  /// Count one run for `actor`, failing with [`Error::RateLimited`] once the
  /// window's budget is spent.
  ///
  /// An unreachable counter store lets the run through.
  pub async fn check(&self, actor: &str, now: DateTime<Utc>) -> Result<()> {
    let window = self.config.window_secs.max(1);
    let ts = u64::try_from(now.timestamp()).unwrap_or(0);
    let key = format!("rl:run:{actor}:{}", ts / window);

    let count = match self.store.incr(&key, Duration::from_secs(window)).await {
      Ok(n) => n,
      Err(e) => {
        tracing::warn!(error = %e, "rate limit counter unavailable; allowing run");
        return Ok(());
      }
    };

    if count > self.config.max_runs {
      let retry_after_secs = window - ts % window;
      tracing::debug!(%actor, count, retry_after_secs, "run rate limited");
      return Err(Error::RateLimited { retry_after_secs });
    }
    Ok(())
  }
}
