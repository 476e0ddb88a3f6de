//! Score compute-and-store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use steward_core::{
  notification::NotificationKey,
  score::{self, Band, NewScoreSnapshot, Reason, ScoreEvent, ScoreEventType, ScoreInput},
  store::DecisionStore,
  ttl::TtlStore,
};

use crate::{Engine, Error, Result, redact::sanitize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResult {
  pub snapshot_id: Uuid,
  pub score:       u8,
  pub band:        Band,
  pub reasons:     Vec<Reason>,
  pub events:      Vec<ScoreEvent>,
}

fn headline(event: &ScoreEvent) -> &'static str {
  match event.event_type {
    ScoreEventType::ThresholdBreach => "Health score crossed into a worse band",
    ScoreEventType::SharpDrop => "Health score dropped sharply",
    ScoreEventType::Recovery => "Health score recovered",
  }
}

impl<S: DecisionStore, T: TtlStore> Engine<S, T> {
  /// Score `input`, append the snapshot, and derive transition events
  /// against the scope's previous snapshot.
  ///
  /// Malformed input is rejected before anything is written. Every event is
  /// recorded; only its notification is subject to the cooldown.
  pub async fn compute_and_store(
    &self,
    entity_type: &str,
    entity_id: &str,
    input: &ScoreInput,
    now: DateTime<Utc>,
  ) -> Result<ScoreResult> {
    let computation = score::compute(input)?;

    let (current, previous) = self
      .store
      .insert_score_snapshot(NewScoreSnapshot {
        entity_type: entity_type.to_owned(),
        entity_id: entity_id.to_owned(),
        computation,
        computed_at: now,
      })
      .await
      .map_err(Error::store)?;

    let events = previous
      .as_ref()
      .map(|prev| score::detect_events(prev, &current, self.config.sharp_drop_delta))
      .unwrap_or_default();
    self.store.insert_score_events(&events).await.map_err(Error::store)?;

    tracing::info!(
      %entity_type,
      %entity_id,
      score = current.score,
      band = %current.band,
      events = events.len(),
      "score recorded"
    );

    let gate = self.cooldown();
    for event in &events {
      let key = NotificationKey::new("score", entity_type, entity_id, event.event_type.as_ref());
      let body = format!(
        "{} → {} ({} → {}, {:+})",
        event.from_score, event.to_score, event.from_band, event.to_band, event.delta
      );
      if let Err(e) = gate.enqueue(key, headline(event).to_owned(), body, now).await {
        tracing::warn!(error = %sanitize(&e.to_string()), "score notification not recorded");
      }
    }

    Ok(ScoreResult {
      snapshot_id: current.snapshot_id,
      score: current.score,
      band: current.band,
      reasons: current.reasons,
      events,
    })
  }
}
