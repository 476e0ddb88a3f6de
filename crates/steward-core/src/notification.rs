//! Outbound notification events and cooldown lookup keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationStatus {
  Pending,
  Sent,
  Failed,
  /// Recorded for audit but withheld by the cooldown gate.
  Suppressed,
}

impl NotificationStatus {
  /// Statuses that start (or extend) a cooldown window.
  pub const COOLDOWN: [Self; 2] = [Self::Pending, Self::Sent];
}

/// Identifies "the same alert" for cooldown purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationKey {
  /// The producing component, e.g. `score` or `risk`.
  pub source:      String,
  pub entity_type: String,
  pub entity_id:   String,
  pub event_type:  String,
}

impl NotificationKey {
  pub fn new(
    source: impl Into<String>,
    entity_type: impl Into<String>,
    entity_id: impl Into<String>,
    event_type: impl Into<String>,
  ) -> Self {
    Self {
      source:      source.into(),
      entity_type: entity_type.into(),
      entity_id:   entity_id.into(),
      event_type:  event_type.into(),
    }
  }

  /// `notif:{source}:{entity_type}:{entity_id}:{event_type}`
  pub fn dedupe_key(&self) -> String {
    format!(
      "notif:{}:{}:{}:{}",
      self.source, self.entity_type, self.entity_id, self.event_type
    )
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNotification {
  pub key:    NotificationKey,
  pub title:  String,
  pub body:   String,
  pub status: NotificationStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
  pub notification_id: Uuid,
  pub dedupe_key:      String,
  pub source:          String,
  pub entity_type:     String,
  pub entity_id:       String,
  pub event_type:      String,
  pub title:           String,
  pub body:            String,
  pub status:          NotificationStatus,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
}

/// Answer from the cooldown gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownStatus {
  pub in_cooldown: bool,
  pub last_at:     Option<DateTime<Utc>>,
}

impl CooldownStatus {
  pub const CLEAR: Self = Self { in_cooldown: false, last_at: None };
}
