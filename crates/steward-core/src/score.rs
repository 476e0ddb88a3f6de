//! Composite health scoring, banding and transition detection.
//!
//! A score is the weighted mean of normalised `[0, 1]` factors, scaled to an
//! integer in `0..=100`. Snapshots are append-only; events are derived from
//! each consecutive pair of snapshots for the same scope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result};

/// Delta at or below `-DEFAULT_SHARP_DROP_DELTA` is a sharp drop.
pub const DEFAULT_SHARP_DROP_DELTA: u8 = 15;

// ─── Band ────────────────────────────────────────────────────────────────────

/// Coarse health classification. Ordered worst to best, so `a < b` means `a`
/// is less healthy.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Band {
  Critical = 0,
  Warning  = 1,
  Healthy  = 2,
}

impl Band {
  /// Fixed cutoffs: `<50` critical, `<75` warning, otherwise healthy.
  pub fn from_score(score: u8) -> Self {
    match score {
      0..=49 => Self::Critical,
      50..=74 => Self::Warning,
      _ => Self::Healthy,
    }
  }

  pub fn ordinal(self) -> u8 { self as u8 }
}

// ─── Input ───────────────────────────────────────────────────────────────────

/// One normalised input to the composite score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
  pub key:    String,
  #[serde(default)]
  pub label:  Option<String>,
  /// Relative weight; must be positive.
  pub weight: f64,
  /// Normalised value in `[0, 1]`, where 1 is perfectly healthy.
  pub value:  f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreInput {
  pub factors: Vec<Factor>,
}

/// How much one factor moved the score away from the neutral midpoint.
///
/// `impact` is in score points; negative values pull the score down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reason {
  pub factor:  String,
  pub impact:  f64,
  pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Computation {
  pub score:   u8,
  pub band:    Band,
  pub factors: Vec<Factor>,
  /// Sorted ascending by impact: the most damaging factor comes first.
  pub reasons: Vec<Reason>,
}

/// Compute the composite score for `input`.
///
/// Malformed input (no factors, non-positive or non-finite weights, values
/// outside `[0, 1]`) is rejected outright; nothing is partially scored.
pub fn compute(input: &ScoreInput) -> Result<Computation> {
  if input.factors.is_empty() {
    return Err(Error::InvalidScoreInput("at least one factor is required".into()));
  }
  for f in &input.factors {
    if !f.weight.is_finite() || f.weight <= 0.0 {
      return Err(Error::InvalidScoreInput(format!(
        "factor {:?} has a non-positive weight",
        f.key
      )));
    }
    if !f.value.is_finite() || !(0.0..=1.0).contains(&f.value) {
      return Err(Error::InvalidScoreInput(format!(
        "factor {:?} value must be within [0, 1]",
        f.key
      )));
    }
  }

  let total_weight: f64 = input.factors.iter().map(|f| f.weight).sum();
  let weighted: f64 = input.factors.iter().map(|f| f.weight * f.value).sum();
  let score = (weighted / total_weight * 100.0).round().clamp(0.0, 100.0) as u8;

  let mut reasons: Vec<Reason> = input
    .factors
    .iter()
    .map(|f| {
      let share = f.weight / total_weight;
      let impact = ((f.value - 0.5) * share * 100.0 * 10.0).round() / 10.0;
      let name = f.label.as_deref().unwrap_or(&f.key);
      Reason {
        factor:  f.key.clone(),
        impact,
        message: format!("{name}: {impact:+.1} points"),
      }
    })
    .collect();
  reasons.sort_by(|a, b| a.impact.total_cmp(&b.impact).then_with(|| a.factor.cmp(&b.factor)));

  Ok(Computation {
    score,
    band: Band::from_score(score),
    factors: input.factors.clone(),
    reasons,
  })
}

// ─── Snapshots ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewScoreSnapshot {
  pub entity_type: String,
  pub entity_id:   String,
  pub computation: Computation,
  pub computed_at: DateTime<Utc>,
}

/// An immutable, append-only score record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSnapshot {
  pub snapshot_id: Uuid,
  pub entity_type: String,
  pub entity_id:   String,
  pub score:       u8,
  pub band:        Band,
  pub factors:     Vec<Factor>,
  pub reasons:     Vec<Reason>,
  pub computed_at: DateTime<Utc>,
}

// ─── Events ──────────────────────────────────────────────────────────────────

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
pub enum ScoreEventType {
  ThresholdBreach,
  SharpDrop,
  Recovery,
}

/// A significant transition between two consecutive snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEvent {
  pub event_id:         Uuid,
  pub snapshot_id:      Uuid,
  pub prev_snapshot_id: Uuid,
  pub entity_type:      String,
  pub entity_id:        String,
  pub event_type:       ScoreEventType,
  pub from_score:       u8,
  pub to_score:         u8,
  pub from_band:        Band,
  pub to_band:          Band,
  pub delta:            i16,
  pub created_at:       DateTime<Utc>,
}

/// Compare `current` with the snapshot immediately before it.
///
/// Each event type is judged independently, so a single transition can yield
/// both a `sharp_drop` and a `threshold_breach`.
pub fn detect_events(
  previous: &ScoreSnapshot,
  current: &ScoreSnapshot,
  sharp_drop_delta: u8,
) -> Vec<ScoreEvent> {
  let delta = i16::from(current.score) - i16::from(previous.score);
  let mut types = Vec::new();

  if current.band < previous.band {
    types.push(ScoreEventType::ThresholdBreach);
  }
  if sharp_drop_delta > 0 && delta <= -i16::from(sharp_drop_delta) {
    types.push(ScoreEventType::SharpDrop);
  }
  if current.band > previous.band {
    types.push(ScoreEventType::Recovery);
  }

  types
    .into_iter()
    .map(|event_type| ScoreEvent {
      event_id: Uuid::new_v4(),
      snapshot_id: current.snapshot_id,
      prev_snapshot_id: previous.snapshot_id,
      entity_type: current.entity_type.clone(),
      entity_id: current.entity_id.clone(),
      event_type,
      from_score: previous.score,
      to_score: current.score,
      from_band: previous.band,
      to_band: current.band,
      delta,
      created_at: current.computed_at,
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn factor(key: &str, weight: f64, value: f64) -> Factor {
    Factor { key: key.into(), label: None, weight, value }
  }

  fn snap(score: u8) -> ScoreSnapshot {
    ScoreSnapshot {
      snapshot_id: Uuid::new_v4(),
      entity_type: "workspace".into(),
      entity_id:   "acme".into(),
      score,
      band:        Band::from_score(score),
      factors:     vec![],
      reasons:     vec![],
      computed_at: Utc::now(),
    }
  }

  fn types(events: &[ScoreEvent]) -> Vec<ScoreEventType> {
    events.iter().map(|e| e.event_type).collect()
  }

  #[test]
  fn band_cutoffs() {
    assert_eq!(Band::from_score(0), Band::Critical);
    assert_eq!(Band::from_score(49), Band::Critical);
    assert_eq!(Band::from_score(50), Band::Warning);
    assert_eq!(Band::from_score(74), Band::Warning);
    assert_eq!(Band::from_score(75), Band::Healthy);
    assert_eq!(Band::from_score(100), Band::Healthy);
    assert_eq!(Band::Healthy.ordinal(), 2);
    assert_eq!(Band::Critical.ordinal(), 0);
  }

  #[test]
  fn banding_is_monotone() {
    for s1 in 0..=100u8 {
      for s2 in s1..=100u8 {
        assert!(Band::from_score(s1) <= Band::from_score(s2));
      }
    }
  }

  #[test]
  fn weighted_mean_is_scaled_and_rounded() {
    let input = ScoreInput {
      factors: vec![factor("pipeline", 3.0, 0.9), factor("delivery", 1.0, 0.1)],
    };
    let c = compute(&input).unwrap();
    // (2.7 + 0.1) / 4 = 0.7
    assert_eq!(c.score, 70);
    assert_eq!(c.band, Band::Warning);
  }

  #[test]
  fn reasons_are_most_damaging_first() {
    let input = ScoreInput {
      factors: vec![
        factor("good", 1.0, 1.0),
        factor("bad", 1.0, 0.0),
        factor("meh", 1.0, 0.4),
      ],
    };
    let c = compute(&input).unwrap();
    let order: Vec<_> = c.reasons.iter().map(|r| r.factor.as_str()).collect();
    assert_eq!(order, ["bad", "meh", "good"]);
    assert!(c.reasons[0].impact < 0.0);
    assert!(c.reasons[2].impact > 0.0);
  }

  #[test]
  fn malformed_input_is_rejected() {
    assert!(compute(&ScoreInput::default()).is_err());
    assert!(compute(&ScoreInput { factors: vec![factor("a", 0.0, 0.5)] }).is_err());
    assert!(compute(&ScoreInput { factors: vec![factor("a", 1.0, 1.5)] }).is_err());
    assert!(compute(&ScoreInput { factors: vec![factor("a", 1.0, f64::NAN)] }).is_err());
  }

  #[test]
  fn healthy_to_critical_is_breach_and_drop() {
    let events = detect_events(&snap(70), &snap(40), DEFAULT_SHARP_DROP_DELTA);
    assert_eq!(types(&events), [ScoreEventType::ThresholdBreach, ScoreEventType::SharpDrop]);
    assert!(events.iter().all(|e| e.delta == -30));
  }

  #[test]
  fn critical_to_healthy_is_recovery() {
    let events = detect_events(&snap(45), &snap(85), DEFAULT_SHARP_DROP_DELTA);
    assert_eq!(types(&events), [ScoreEventType::Recovery]);
    assert_eq!(events[0].from_band, Band::Critical);
    assert_eq!(events[0].to_band, Band::Healthy);
    assert_eq!(events[0].delta, 40);
  }

  #[test]
  fn sixty_to_forty_four_yields_both_events() {
    let events = detect_events(&snap(60), &snap(44), DEFAULT_SHARP_DROP_DELTA);
    assert_eq!(types(&events), [ScoreEventType::ThresholdBreach, ScoreEventType::SharpDrop]);
    assert_eq!(events[0].delta, -16);
  }

  #[test]
  fn sharp_drop_within_band() {
    let events = detect_events(&snap(100), &snap(80), DEFAULT_SHARP_DROP_DELTA);
    assert_eq!(types(&events), [ScoreEventType::SharpDrop]);
  }

  #[test]
  fn small_moves_are_quiet() {
    assert!(detect_events(&snap(80), &snap(76), DEFAULT_SHARP_DROP_DELTA).is_empty());
    assert!(detect_events(&snap(60), &snap(46), 0).len() == 1);
  }
}
