//! The notification cooldown gate.
//!
//! Decides whether an outbound notification is enqueued as `pending` or
//! recorded as `suppressed`. It never blocks the recording of the score
//! event or risk flag that triggered it.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use uuid::Uuid;

use steward_core::{
  notification::{CooldownStatus, NewNotification, NotificationEvent, NotificationKey, NotificationStatus},
  store::DecisionStore,
  ttl::TtlStore,
};

use crate::{Error, Result, redact::sanitize};

fn cache_key(dedupe_key: &str) -> String { format!("cooldown:{dedupe_key}") }

pub struct CooldownGate<'a, S, T> {
  store:            &'a S,
  cache:            &'a T,
  cooldown_minutes: u32,
}

impl<'a, S: DecisionStore, T: TtlStore> CooldownGate<'a, S, T> {
  pub fn new(store: &'a S, cache: &'a T, cooldown_minutes: u32) -> Self {
    Self { store, cache, cooldown_minutes }
  }

  /// Whether a `pending` or `sent` notification for `key` exists within the
  /// trailing `cooldown_minutes`.
  ///
  /// `0` minutes always reports clear. Lookup failures also report clear:
  /// a duplicate alert is preferred over a silent one.
  pub async fn is_in_cooldown(
    &self,
    key: &NotificationKey,
    cooldown_minutes: u32,
    now: DateTime<Utc>,
  ) -> CooldownStatus {
    if cooldown_minutes == 0 {
      return CooldownStatus::CLEAR;
    }
    let window = Duration::minutes(i64::from(cooldown_minutes));
    let dedupe_key = key.dedupe_key();
    let ck = cache_key(&dedupe_key);

    match self.cache.get(&ck).await {
      Ok(Some(v)) if !v.is_empty() => {
        if let Ok(last) = DateTime::parse_from_rfc3339(&v) {
          let last = last.to_utc();
          if last <= now && now <= last + window {
            return CooldownStatus { in_cooldown: true, last_at: Some(last) };
          }
        }
      }
      Ok(_) => {}
      Err(e) => tracing::debug!(error = %e, "cooldown cache unavailable"),
    }

    match self
      .store
      .last_notification(&dedupe_key, now - window, &NotificationStatus::COOLDOWN)
      .await
    {
      Ok(Some(last)) => {
        self.remember(&ck, last.created_at, window, now).await;
        CooldownStatus { in_cooldown: true, last_at: Some(last.created_at) }
      }
      Ok(None) => CooldownStatus::CLEAR,
      Err(e) => {
        tracing::warn!(
          key = %dedupe_key,
          error = %sanitize(&e.to_string()),
          "cooldown lookup failed; failing open"
        );
        CooldownStatus::CLEAR
      }
    }
  }

  async fn remember(&self, ck: &str, last_at: DateTime<Utc>, window: Duration, now: DateTime<Utc>) {
    let Ok(ttl) = (last_at + window - now).to_std() else { return };
    if ttl.is_zero() {
      return;
    }
    let value = last_at.to_rfc3339_opts(SecondsFormat::Micros, true);
    if let Err(e) = self.cache.set(ck, value, ttl).await {
      tracing::debug!(error = %e, "cooldown cache write failed");
    }
  }

  /// Record a notification for `key`: `pending` when clear, `suppressed`
  /// while a cooldown is running.
  pub async fn enqueue(
    &self,
    key: NotificationKey,
    title: String,
    body: String,
    now: DateTime<Utc>,
  ) -> Result<NotificationEvent> {
    let cooldown = self.is_in_cooldown(&key, self.cooldown_minutes, now).await;
    let status = if cooldown.in_cooldown {
      NotificationStatus::Suppressed
    } else {
      NotificationStatus::Pending
    };
    let ck = cache_key(&key.dedupe_key());

    let event = self
      .store
      .insert_notification(NewNotification { key, title, body, status }, now)
      .await
      .map_err(Error::store)?;

    if status == NotificationStatus::Pending && self.cooldown_minutes > 0 {
      let window = Duration::minutes(i64::from(self.cooldown_minutes));
      self.remember(&ck, now, window, now).await;
    }
    tracing::debug!(key = %event.dedupe_key, status = %event.status, "notification recorded");
    Ok(event)
  }

  /// Dispatcher feedback. A failed or withdrawn notification no longer
  /// holds the cooldown, so the cached entry is invalidated.
  pub async fn mark(
    &self,
    notification_id: Uuid,
    status: NotificationStatus,
    now: DateTime<Utc>,
  ) -> Result<NotificationEvent> {
    let event = self
      .store
      .mark_notification(notification_id, status, now)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::NotFound(format!("notification {notification_id}")))?;

    if !NotificationStatus::COOLDOWN.contains(&status) && self.cooldown_minutes > 0 {
      let ttl = std::time::Duration::from_secs(u64::from(self.cooldown_minutes) * 60);
      if let Err(e) = self.cache.set(&cache_key(&event.dedupe_key), String::new(), ttl).await {
        tracing::debug!(error = %e, "cooldown cache write failed");
      }
    }
    Ok(event)
  }

  pub async fn pending(&self, limit: usize) -> Result<Vec<NotificationEvent>> {
    self.store.pending_notifications(limit).await.map_err(Error::store)
  }
}
