//! Memory policy: trend analysis over rule-firing history.
//!
//! Two equal-length trailing windows (by default the last 7 days and the 7
//! before that) are summarised per rule and compared. Rules that are mostly
//! dismissed and rarely succeed yield `suppression_30d` suggestions; rules
//! with enough history yield bounded weight adjustments. Confident
//! suggestions become pattern alerts, and, only when explicitly enabled,
//! auto-applied suppressions.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{
  risk::{NewRiskFlag, Severity},
  weights::{
    DEFAULT_MULTIPLIER, RuleEffectiveness, WeightBounds, WeightMap, next_multiplier, ratio,
  },
};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
  pub window_days:               i64,
  /// Distinct recommendations a rule needs in the window to be judged.
  pub min_samples:               u32,
  pub dismiss_rate_floor:        f64,
  pub success_rate_ceiling:      f64,
  /// Suggestions at or above this confidence become pattern alerts.
  pub pattern_alert_floor:       f64,
  /// Master switch for converting suggestions into preferences unasked.
  pub auto_apply_enabled:        bool,
  pub auto_apply_min_confidence: f64,
  pub suppression_days:          i64,
  pub weight_bounds:             WeightBounds,
}

impl Default for PolicyConfig {
  fn default() -> Self {
    Self {
      window_days:               7,
      min_samples:               5,
      dismiss_rate_floor:        0.6,
      success_rate_ceiling:      0.2,
      pattern_alert_floor:       0.6,
      auto_apply_enabled:        false,
      auto_apply_min_confidence: 0.8,
      suppression_days:          30,
      weight_bounds:             WeightBounds::default(),
    }
  }
}

// ─── History ─────────────────────────────────────────────────────────────────

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
pub enum ActivityKind {
  Fired,
  Applied,
  Dismissed,
  Succeeded,
}

/// One entry of rule history: a firing or an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleActivity {
  pub rule_key:   String,
  pub dedupe_key: String,
  pub kind:       ActivityKind,
  pub at:         DateTime<Utc>,
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
  pub start: DateTime<Utc>,
  pub end:   DateTime<Utc>,
}

impl Window {
  pub fn trailing(end: DateTime<Utc>, days: i64) -> Self {
    Self { start: end - Duration::days(days), end }
  }

  /// The window of equal length immediately before this one.
  pub fn previous(&self) -> Self {
    Self { start: self.start - (self.end - self.start), end: self.start }
  }

  pub fn contains(&self, at: DateTime<Utc>) -> bool { at >= self.start && at < self.end }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
  pub rule_key:  String,
  /// Distinct recommendations fired in the window.
  pub fired:     u32,
  pub applied:   u32,
  pub dismissed: u32,
  pub succeeded: u32,
}

impl WindowStats {
  pub fn dismiss_rate(&self) -> f64 { ratio(self.dismissed, self.fired).min(1.0) }

  pub fn success_rate(&self) -> f64 { ratio(self.succeeded, self.fired).min(1.0) }

  pub fn effectiveness(&self) -> RuleEffectiveness {
    RuleEffectiveness {
      rule_key:  self.rule_key.clone(),
      fired:     self.fired,
      applied:   self.applied,
      dismissed: self.dismissed,
      succeeded: self.succeeded,
    }
  }
}

/// Summarise `activity` falling inside `window`, per rule.
///
/// Re-fires of the same dedupe key within the window count once.
pub fn compute_window_stats(
  activity: &[RuleActivity],
  window: Window,
) -> BTreeMap<String, WindowStats> {
  let mut stats: BTreeMap<String, WindowStats> = BTreeMap::new();
  let mut fired: BTreeSet<(&str, &str)> = BTreeSet::new();

  for a in activity.iter().filter(|a| window.contains(a.at)) {
    let entry = stats.entry(a.rule_key.clone()).or_insert_with(|| WindowStats {
      rule_key: a.rule_key.clone(),
      ..WindowStats::default()
    });
    match a.kind {
      ActivityKind::Fired => {
        if fired.insert((a.rule_key.as_str(), a.dedupe_key.as_str())) {
          entry.fired += 1;
        }
      }
      ActivityKind::Applied => entry.applied += 1,
      ActivityKind::Dismissed => entry.dismissed += 1,
      ActivityKind::Succeeded => entry.succeeded += 1,
    }
  }
  stats
}

// ─── Trends ──────────────────────────────────────────────────────────────────

/// Rate changes smaller than this are reported as stable.
pub const TREND_EPSILON: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
  Rising,
  Falling,
  Stable,
}

impl TrendDirection {
  fn of(delta: f64) -> Self {
    if delta >= TREND_EPSILON {
      Self::Rising
    } else if delta <= -TREND_EPSILON {
      Self::Falling
    } else {
      Self::Stable
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendDiff {
  pub rule_key:           String,
  pub current:            WindowStats,
  pub previous:           WindowStats,
  pub fired_delta:        i64,
  pub dismiss_rate_delta: f64,
  pub success_rate_delta: f64,
  pub dismiss_trend:      TrendDirection,
  pub success_trend:      TrendDirection,
}

/// Pair up the two windows per rule. Rules present in either window appear.
pub fn compute_trend_diffs(
  current: &BTreeMap<String, WindowStats>,
  previous: &BTreeMap<String, WindowStats>,
) -> Vec<TrendDiff> {
  let keys: BTreeSet<&String> = current.keys().chain(previous.keys()).collect();
  keys
    .into_iter()
    .map(|key| {
      let empty = || WindowStats { rule_key: key.clone(), ..WindowStats::default() };
      let cur = current.get(key).cloned().unwrap_or_else(empty);
      let prev = previous.get(key).cloned().unwrap_or_else(empty);
      let dismiss_rate_delta = cur.dismiss_rate() - prev.dismiss_rate();
      let success_rate_delta = cur.success_rate() - prev.success_rate();
      TrendDiff {
        rule_key: key.clone(),
        fired_delta: i64::from(cur.fired) - i64::from(prev.fired),
        dismiss_rate_delta,
        success_rate_delta,
        dismiss_trend: TrendDirection::of(dismiss_rate_delta),
        success_trend: TrendDirection::of(success_rate_delta),
        current: cur,
        previous: prev,
      }
    })
    .collect()
}

// ─── Suggestions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SuggestionKind {
  #[serde(rename = "suppression_30d")]
  Suppression30d,
  WeightAdjustment { from: f64, to: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySuggestion {
  pub rule_key:      String,
  pub owner_user_id: String,
  #[serde(flatten)]
  pub kind:          SuggestionKind,
  /// In `[0, 1]`.
  pub confidence:    f64,
  pub rationale:     String,
}

/// Turn trend diffs into suppression and weight suggestions.
pub fn derive_policy_suggestions(
  owner_user_id: &str,
  diffs: &[TrendDiff],
  weights: &WeightMap,
  cfg: &PolicyConfig,
) -> Vec<PolicySuggestion> {
  let mut out = Vec::new();

  for diff in diffs {
    let cur = &diff.current;
    if cur.fired < cfg.min_samples {
      continue;
    }
    let dismiss = cur.dismiss_rate();
    let success = cur.success_rate();
    let support = (f64::from(cur.fired) / 20.0).min(1.0);

    if dismiss >= cfg.dismiss_rate_floor && success <= cfg.success_rate_ceiling {
      let trend_bonus = if diff.dismiss_trend == TrendDirection::Rising { 0.05 } else { 0.0 };
      let confidence =
        (0.6 * dismiss + 0.2 * (1.0 - success) + 0.2 * support + trend_bonus).clamp(0.0, 1.0);
      out.push(PolicySuggestion {
        rule_key: diff.rule_key.clone(),
        owner_user_id: owner_user_id.to_owned(),
        kind: SuggestionKind::Suppression30d,
        confidence,
        rationale: format!(
          "{:.0}% dismissed, {:.0}% succeeded over {} recommendations",
          dismiss * 100.0,
          success * 100.0,
          cur.fired
        ),
      });
    }

    let current = weights.get(&diff.rule_key).copied().unwrap_or(DEFAULT_MULTIPLIER);
    if let Some(to) = next_multiplier(current, &cur.effectiveness(), &cfg.weight_bounds) {
      out.push(PolicySuggestion {
        rule_key: diff.rule_key.clone(),
        owner_user_id: owner_user_id.to_owned(),
        kind: SuggestionKind::WeightAdjustment { from: current, to },
        confidence: support,
        rationale: format!("weight {current:.2} → {to:.2}"),
      });
    }
  }
  out
}

// ─── Pattern alerts ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternAlert {
  pub rule_key:      String,
  pub owner_user_id: String,
  pub confidence:    f64,
  pub dedupe_key:    String,
  pub severity:      Severity,
  pub title:         String,
  pub description:   String,
}

impl PatternAlert {
  pub fn to_risk_flag(&self) -> NewRiskFlag {
    NewRiskFlag {
      rule_key:    self.rule_key.clone(),
      severity:    self.severity,
      dedupe_key:  self.dedupe_key.clone(),
      title:       self.title.clone(),
      description: self.description.clone(),
      entity_type: Some("user".into()),
      entity_id:   Some(self.owner_user_id.clone()),
    }
  }
}

/// Confident suppression suggestions become pattern alerts, keyed per day so
/// that a dismissed alert can recur on a later day.
pub fn build_pattern_alerts(
  suggestions: &[PolicySuggestion],
  cfg: &PolicyConfig,
  now: DateTime<Utc>,
) -> Vec<PatternAlert> {
  let day = now.format("%Y-%m-%d");
  suggestions
    .iter()
    .filter(|s| s.kind == SuggestionKind::Suppression30d)
    .filter(|s| s.confidence >= cfg.pattern_alert_floor)
    .map(|s| PatternAlert {
      rule_key:      s.rule_key.clone(),
      owner_user_id: s.owner_user_id.clone(),
      confidence:    s.confidence,
      dedupe_key:    format!("pattern:{}:{}:{day}", s.rule_key, s.owner_user_id),
      severity:      if s.confidence >= 0.9 { Severity::High } else { Severity::Medium },
      title:         format!("Recommendations from {} are mostly ignored", s.rule_key),
      description:   s.rationale.clone(),
    })
    .collect()
}

/// Suppression suggestions eligible for auto-apply. Empty unless the feature
/// is enabled.
pub fn auto_apply_candidates<'a>(
  suggestions: &'a [PolicySuggestion],
  cfg: &'a PolicyConfig,
) -> impl Iterator<Item = &'a PolicySuggestion> + 'a {
  suggestions.iter().filter(move |s| {
    cfg.auto_apply_enabled
      && s.kind == SuggestionKind::Suppression30d
      && s.confidence >= cfg.auto_apply_min_confidence
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn t(days_ago: i64) -> DateTime<Utc> { end() - Duration::days(days_ago) }

  fn end() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-06-30T00:00:00Z").unwrap().to_utc()
  }

  fn act(rule: &str, key: &str, kind: ActivityKind, at: DateTime<Utc>) -> RuleActivity {
    RuleActivity { rule_key: rule.into(), dedupe_key: key.into(), kind, at }
  }

  /// `n` distinct recommendations in the window, `dismissed` of them dismissed
  /// and `succeeded` of them applied successfully.
  fn history(rule: &str, n: u32, dismissed: u32, succeeded: u32, days_ago: i64) -> Vec<RuleActivity> {
    let mut out = Vec::new();
    for i in 0..n {
      let key = format!("{rule}:{days_ago}:{i}");
      out.push(act(rule, &key, ActivityKind::Fired, t(days_ago)));
      out.push(act(rule, &key, ActivityKind::Fired, t(days_ago)));
      if i < dismissed {
        out.push(act(rule, &key, ActivityKind::Dismissed, t(days_ago)));
      } else if i < dismissed + succeeded {
        out.push(act(rule, &key, ActivityKind::Applied, t(days_ago)));
        out.push(act(rule, &key, ActivityKind::Succeeded, t(days_ago)));
      }
    }
    out
  }

  fn analyse(activity: &[RuleActivity]) -> Vec<TrendDiff> {
    let current = Window::trailing(end(), 7);
    compute_trend_diffs(
      &compute_window_stats(activity, current),
      &compute_window_stats(activity, current.previous()),
    )
  }

  #[test]
  fn windows_are_adjacent_and_equal() {
    let w = Window::trailing(end(), 7);
    let p = w.previous();
    assert_eq!(p.end, w.start);
    assert_eq!(p.end - p.start, w.end - w.start);
    assert!(!w.contains(w.end));
    assert!(w.contains(w.start));
  }

  #[test]
  fn refires_count_once() {
    let stats = compute_window_stats(&history("r", 4, 1, 1, 1), Window::trailing(end(), 7));
    let s = &stats["r"];
    assert_eq!(s.fired, 4);
    assert_eq!(s.dismissed, 1);
    assert_eq!(s.succeeded, 1);
    assert_eq!(s.applied, 1);
  }

  #[test]
  fn activity_outside_window_is_ignored() {
    let stats = compute_window_stats(&history("r", 3, 0, 0, 20), Window::trailing(end(), 7));
    assert!(stats.is_empty());
  }

  #[test]
  fn trend_diff_detects_rising_dismissals() {
    let mut activity = history("r", 10, 2, 5, 10);
    activity.extend(history("r", 10, 8, 1, 2));
    let diffs = analyse(&activity);
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].dismiss_trend, TrendDirection::Rising);
    assert_eq!(diffs[0].success_trend, TrendDirection::Falling);
    assert!((diffs[0].dismiss_rate_delta - 0.6).abs() < 1e-9);
    assert_eq!(diffs[0].fired_delta, 0);
  }

  #[test]
  fn high_dismiss_low_success_suggests_suppression() {
    let mut activity = history("noisy", 10, 2, 5, 10);
    activity.extend(history("noisy", 10, 9, 0, 2));
    let suggestions = derive_policy_suggestions(
      "u1",
      &analyse(&activity),
      &WeightMap::new(),
      &PolicyConfig::default(),
    );

    let suppression = suggestions
      .iter()
      .find(|s| s.kind == SuggestionKind::Suppression30d)
      .expect("suppression suggestion");
    // 0.6·0.9 + 0.2·1.0 + 0.2·0.5 + 0.05
    assert!((suppression.confidence - 0.89).abs() < 1e-9);
    assert!((0.0..=1.0).contains(&suppression.confidence));

    let adj = suggestions
      .iter()
      .find_map(|s| match s.kind {
        SuggestionKind::WeightAdjustment { from, to } => Some((from, to)),
        _ => None,
      })
      .expect("weight adjustment");
    assert_eq!(adj.0, 1.0);
    assert!((adj.1 - 0.9).abs() < 1e-9);
  }

  #[test]
  fn useful_rules_are_not_suppressed() {
    let suggestions = derive_policy_suggestions(
      "u1",
      &analyse(&history("good", 10, 1, 8, 2)),
      &WeightMap::new(),
      &PolicyConfig::default(),
    );
    assert!(suggestions.iter().all(|s| s.kind != SuggestionKind::Suppression30d));
  }

  #[test]
  fn sparse_rules_are_not_judged() {
    let suggestions = derive_policy_suggestions(
      "u1",
      &analyse(&history("rare", 4, 4, 0, 2)),
      &WeightMap::new(),
      &PolicyConfig::default(),
    );
    assert!(suggestions.is_empty());
  }

  #[test]
  fn pattern_alerts_respect_floor_and_are_day_scoped() {
    let cfg = PolicyConfig::default();
    let mk = |confidence| PolicySuggestion {
      rule_key: "noisy".into(),
      owner_user_id: "u1".into(),
      kind: SuggestionKind::Suppression30d,
      confidence,
      rationale: "r".into(),
    };
    let alerts = build_pattern_alerts(&[mk(0.5), mk(0.95)], &cfg, end());
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].dedupe_key, "pattern:noisy:u1:2026-06-30");
    assert_eq!(alerts[0].severity, Severity::High);
    assert_eq!(alerts[0].to_risk_flag().dedupe_key, alerts[0].dedupe_key);
  }

  #[test]
  fn auto_apply_is_gated() {
    let s = PolicySuggestion {
      rule_key: "noisy".into(),
      owner_user_id: "u1".into(),
      kind: SuggestionKind::Suppression30d,
      confidence: 0.85,
      rationale: "r".into(),
    };
    let suggestions = [s];

    let mut cfg = PolicyConfig::default();
    assert_eq!(auto_apply_candidates(&suggestions, &cfg).count(), 0);

    cfg.auto_apply_enabled = true;
    assert_eq!(auto_apply_candidates(&suggestions, &cfg).count(), 1);

    cfg.auto_apply_min_confidence = 0.9;
    assert_eq!(auto_apply_candidates(&suggestions, &cfg).count(), 0);
  }

  #[test]
  fn suggestion_serialises_with_kind_tag() {
    let s = PolicySuggestion {
      rule_key: "noisy".into(),
      owner_user_id: "u1".into(),
      kind: SuggestionKind::Suppression30d,
      confidence: 0.7,
      rationale: "r".into(),
    };
    let json = serde_json::to_value(&s).unwrap();
    assert_eq!(json["kind"], "suppression_30d");
  }
}
