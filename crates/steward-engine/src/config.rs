//! Engine tuning knobs. Every field has a serde default, so an empty config
//! section is valid.

use serde::{Deserialize, Serialize};
use steward_core::{policy::PolicyConfig, score::DEFAULT_SHARP_DROP_DELTA};

use crate::{Error, Result};

/// Longest policy window or auto-applied suppression, in days.
pub const MAX_DAYS: i64 = 3650;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Trailing window in which a repeat notification is suppressed. `0`
  /// disables the cooldown.
  pub cooldown_minutes: u32,
  pub sharp_drop_delta: u8,
  pub rate_limit:       RateLimitConfig,
  pub policy:           PolicyConfig,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      cooldown_minutes: 60,
      sharp_drop_delta: DEFAULT_SHARP_DROP_DELTA,
      rate_limit:       RateLimitConfig::default(),
      policy:           PolicyConfig::default(),
    }
  }
}

impl EngineConfig {
  /// Reject values the engine cannot work with. Called once at startup and
  /// again before a policy run.
  pub fn validate(&self) -> Result<()> {
    let p = &self.policy;
    let b = &p.weight_bounds;

    if !(b.min.is_finite() && b.max.is_finite()) || b.min <= 0.0 || b.min > b.max {
      return invalid(format!("weight bounds [{}, {}] must satisfy 0 < min <= max", b.min, b.max));
    }
    if !b.max_step.is_finite() || b.max_step <= 0.0 {
      return invalid(format!("weight max_step {} must be positive", b.max_step));
    }
    if !(1..=MAX_DAYS).contains(&p.window_days) {
      return invalid(format!("policy window_days {} must be in 1..={MAX_DAYS}", p.window_days));
    }
    if !(1..=MAX_DAYS).contains(&p.suppression_days) {
      return invalid(format!("policy suppression_days {} must be in 1..={MAX_DAYS}", p.suppression_days));
    }
    for (name, v) in [
      ("dismiss_rate_floor", p.dismiss_rate_floor),
      ("success_rate_ceiling", p.success_rate_ceiling),
      ("pattern_alert_floor", p.pattern_alert_floor),
      ("auto_apply_min_confidence", p.auto_apply_min_confidence),
    ] {
      if !(0.0..=1.0).contains(&v) {
        return invalid(format!("policy {name} {v} must be in [0, 1]"));
      }
    }
    if self.rate_limit.window_secs == 0 {
      return invalid("rate_limit window_secs must be positive".into());
    }
    Ok(())
  }
}

fn invalid(msg: String) -> Result<()> { Err(Error::Validation(msg)) }

/// Fixed-window limit on pipeline runs per actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
  pub max_runs:    u64,
  pub window_secs: u64,
}

impl Default for RateLimitConfig {
  fn default() -> Self { Self { max_runs: 6, window_secs: 60 } }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_valid() {
    assert!(EngineConfig::default().validate().is_ok());
  }

  #[test]
  fn inverted_weight_bounds_are_rejected() {
    let mut cfg = EngineConfig::default();
    cfg.policy.weight_bounds.min = 1.5;
    cfg.policy.weight_bounds.max = 0.5;
    assert!(matches!(cfg.validate(), Err(Error::Validation(_))));

    let mut cfg = EngineConfig::default();
    cfg.policy.weight_bounds.max = f64::NAN;
    assert!(cfg.validate().is_err());

    let mut cfg = EngineConfig::default();
    cfg.policy.weight_bounds.max_step = 0.0;
    assert!(cfg.validate().is_err());
  }

  #[test]
  fn day_counts_must_be_in_range() {
    for days in [0, -1, MAX_DAYS + 1, i64::MAX] {
      let mut cfg = EngineConfig::default();
      cfg.policy.window_days = days;
      assert!(cfg.validate().is_err(), "window_days {days}");

      let mut cfg = EngineConfig::default();
      cfg.policy.suppression_days = days;
      assert!(cfg.validate().is_err(), "suppression_days {days}");
    }
  }

  #[test]
  fn rates_and_rate_limit_are_checked() {
    let mut cfg = EngineConfig::default();
    cfg.policy.dismiss_rate_floor = 1.2;
    assert!(cfg.validate().is_err());

    let mut cfg = EngineConfig::default();
    cfg.policy.auto_apply_min_confidence = f64::NAN;
    assert!(cfg.validate().is_err());

    let mut cfg = EngineConfig::default();
    cfg.rate_limit.window_secs = 0;
    assert!(cfg.validate().is_err());
  }
}
