//! The risk flag manager: deduplicated, severity-ranked issue tracking.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use steward_core::{
  notification::NotificationKey,
  risk::{NewRiskFlag, RiskFlag, RiskOutcome, RiskStatus, RiskUpsert},
  store::DecisionStore,
  ttl::TtlStore,
};

use crate::{CooldownGate, Error, Result, redact::sanitize};

pub struct RiskFlagManager<'a, S, T> {
  store: &'a S,
  gate:  CooldownGate<'a, S, T>,
}

impl<'a, S: DecisionStore, T: TtlStore> RiskFlagManager<'a, S, T> {
  pub fn new(store: &'a S, gate: CooldownGate<'a, S, T>) -> Self { Self { store, gate } }

  /// Create the flag or refresh the live one with the same dedupe key.
  ///
  /// New and escalated flags are announced through the cooldown gate;
  /// a notification failure is logged and does not undo the flag.
  pub async fn create_or_update(&self, input: NewRiskFlag, now: DateTime<Utc>) -> Result<RiskUpsert> {
    let upsert = self.store.upsert_risk_flag(input, now).await.map_err(Error::store)?;
    let flag = &upsert.flag;

    match upsert.outcome {
      RiskOutcome::Created | RiskOutcome::Escalated => {
        tracing::info!(
          dedupe_key = %flag.dedupe_key,
          severity = %flag.severity,
          outcome = ?upsert.outcome,
          "risk flag raised"
        );
      }
      RiskOutcome::Refreshed => tracing::debug!(dedupe_key = %flag.dedupe_key, "risk flag refreshed"),
      RiskOutcome::Terminal => {
        tracing::debug!(dedupe_key = %flag.dedupe_key, status = %flag.status, "risk flag is closed")
      }
    }

    if upsert.outcome.is_notable() {
      let key = NotificationKey::new(
        "risk",
        flag.entity_type.as_deref().unwrap_or("risk_flag"),
        flag.entity_id.as_deref().unwrap_or(&flag.dedupe_key),
        flag.rule_key.as_str(),
      );
      let body = format!("[{}] {}", flag.severity, flag.description);
      if let Err(e) = self.gate.enqueue(key, flag.title.clone(), body, now).await {
        tracing::warn!(error = %sanitize(&e.to_string()), "risk notification not recorded");
      }
    }
    Ok(upsert)
  }

  pub async fn dismiss(&self, risk_flag_id: Uuid, now: DateTime<Utc>) -> Result<RiskFlag> {
    self.transition(risk_flag_id, RiskStatus::Dismissed, None, now).await
  }

  pub async fn resolve(&self, risk_flag_id: Uuid, now: DateTime<Utc>) -> Result<RiskFlag> {
    self.transition(risk_flag_id, RiskStatus::Resolved, None, now).await
  }

  /// Quiet a live flag until `until`. Closed flags cannot be snoozed.
  pub async fn snooze(&self, risk_flag_id: Uuid, until: DateTime<Utc>, now: DateTime<Utc>) -> Result<RiskFlag> {
    if until <= now {
      return Err(Error::Validation("snooze must end in the future".into()));
    }
    self.transition(risk_flag_id, RiskStatus::Snoozed, Some(until), now).await
  }

  async fn transition(
    &self,
    risk_flag_id: Uuid,
    status: RiskStatus,
    snoozed_until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
  ) -> Result<RiskFlag> {
    let updated = self
      .store
      .set_risk_status(risk_flag_id, status, snoozed_until, now)
      .await
      .map_err(Error::store)?;
    let Some(flag) = updated else {
      // The update only touches live flags. Tell a closed flag from a missing one.
      return match self.store.get_risk_flag(risk_flag_id).await.map_err(Error::store)? {
        Some(current) => Err(Error::Validation(format!("risk flag is {}", current.status))),
        None => Err(Error::NotFound(format!("risk flag {risk_flag_id}"))),
      };
    };
    tracing::info!(dedupe_key = %flag.dedupe_key, status = %flag.status, "risk flag updated");
    Ok(flag)
  }

  /// Open flags, most severe and most recently seen first.
  pub async fn list_open(&self, limit: usize) -> Result<Vec<RiskFlag>> {
    self
      .store
      .list_risk_flags(&[RiskStatus::Open], limit)
      .await
      .map_err(Error::store)
  }
}
