//! Learned per-rule weights and historical effectiveness.
//!
//! The rule engine multiplies each rule's base score by a learned multiplier.
//! Multipliers are only ever moved by the memory policy engine, one bounded
//! step at a time, and are always clamped to `[min, max]`. Because each step
//! moves towards a target that itself lies inside the bounds, and never by more
//! than the remaining distance, repeated adjustments against unchanged history
//! converge monotonically and cannot oscillate.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MULTIPLIER: f64 = 1.0;

/// Rule key → current multiplier.
pub type WeightMap = HashMap<String, f64>;

/// Rule key → historical counts.
pub type EffectivenessMap = HashMap<String, RuleEffectiveness>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedWeight {
  pub rule_key:      String,
  pub owner_user_id: String,
  pub multiplier:    f64,
  pub updated_at:    DateTime<Utc>,
}

/// Historical outcome counts for one rule.
///
/// `fired` counts distinct recommendations, not re-fires of the same one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEffectiveness {
  pub rule_key:  String,
  pub fired:     u32,
  pub applied:   u32,
  pub dismissed: u32,
  pub succeeded: u32,
}

impl RuleEffectiveness {
  pub fn success_rate(&self) -> f64 { ratio(self.succeeded, self.fired) }

  pub fn dismiss_rate(&self) -> f64 { ratio(self.dismissed, self.fired) }
}

pub(crate) fn ratio(num: u32, den: u32) -> f64 {
  if den == 0 { 0.0 } else { f64::from(num) / f64::from(den) }
}

// ─── Adjustment ──────────────────────────────────────────────────────────────

/// Stability bounds for multiplier adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightBounds {
  pub min:         f64,
  pub max:         f64,
  /// Largest change allowed in a single adjustment.
  pub max_step:    f64,
  /// Below this many fired recommendations the multiplier is left alone.
  pub min_samples: u32,
}

impl Default for WeightBounds {
  fn default() -> Self {
    Self { min: 0.5, max: 1.5, max_step: 0.1, min_samples: 5 }
  }
}

impl WeightBounds {
  pub fn clamp(&self, multiplier: f64) -> f64 {
    if multiplier.is_nan() {
      return DEFAULT_MULTIPLIER.clamp(self.min, self.max);
    }
    multiplier.clamp(self.min, self.max)
  }
}

/// The multiplier the history argues for: `1 + 0.5 · (success − dismiss)`,
/// clamped to the bounds.
pub fn target_multiplier(eff: &RuleEffectiveness, bounds: &WeightBounds) -> f64 {
  bounds.clamp(DEFAULT_MULTIPLIER + 0.5 * (eff.success_rate() - eff.dismiss_rate()))
}

/// One bounded step from `current` towards the target.
///
/// Returns `None` when there are too few samples or the step would not change
/// the multiplier.
pub fn next_multiplier(
  current: f64,
  eff: &RuleEffectiveness,
  bounds: &WeightBounds,
) -> Option<f64> {
  if eff.fired < bounds.min_samples {
    return None;
  }
  let current = bounds.clamp(current);
  let target = target_multiplier(eff, bounds);
  let step = (target - current).clamp(-bounds.max_step, bounds.max_step);
  let next = bounds.clamp(current + step);
  if (next - current).abs() < 1e-9 { None } else { Some(next) }
}

/// Collapse a list of stored weights into a lookup map.
pub fn weight_map(weights: impl IntoIterator<Item = LearnedWeight>) -> WeightMap {
  weights.into_iter().map(|w| (w.rule_key, w.multiplier)).collect()
}
