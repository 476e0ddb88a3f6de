//! Applying the memory policy for one owner.
//!
//! Reads the owner's rule activity over two equal trailing windows, then
//! writes in order: bounded weight adjustments, pattern alerts (as risk
//! flags), and, only when enabled, auto-applied suppressions.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use steward_core::{
  policy::{
    PolicySuggestion, SuggestionKind, Window, auto_apply_candidates, build_pattern_alerts,
    compute_trend_diffs, compute_window_stats, derive_policy_suggestions,
  },
  preference::{NewPreference, Preference, PreferenceSource, PreferenceTarget},
  risk::RiskUpsert,
  store::DecisionStore,
  ttl::TtlStore,
  weights::{LearnedWeight, weight_map},
};

use crate::{Engine, Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyReport {
  pub owner_user_id: String,
  pub window:        Window,
  pub suggestions:   Vec<PolicySuggestion>,
  pub weights:       Vec<LearnedWeight>,
  pub alerts:        Vec<RiskUpsert>,
  /// Suppressions written without confirmation. Empty unless auto-apply is
  /// enabled.
  pub auto_applied:  Vec<Preference>,
}

impl<S: DecisionStore, T: TtlStore> Engine<S, T> {
  pub async fn apply_memory_policy(&self, owner_user_id: &str, now: DateTime<Utc>) -> Result<PolicyReport> {
    self.config.validate()?;
    let cfg = &self.config.policy;
    let current = Window::trailing(now, cfg.window_days);
    let previous = current.previous();

    let (activity, weights) = tokio::try_join!(
      async { self.store.rule_activity(owner_user_id, previous.start).await.map_err(Error::store) },
      async { self.store.load_weights(owner_user_id).await.map_err(Error::store) },
    )?;

    let diffs = compute_trend_diffs(
      &compute_window_stats(&activity, current),
      &compute_window_stats(&activity, previous),
    );
    // A rule's weight moves at most once per window, however often the
    // policy is triggered.
    let stepped: HashSet<String> = weights
      .iter()
      .filter(|w| w.updated_at >= current.start && w.updated_at <= now)
      .map(|w| w.rule_key.clone())
      .collect();
    let mut suggestions = derive_policy_suggestions(owner_user_id, &diffs, &weight_map(weights), cfg);
    suggestions.retain(|s| {
      let repeat = matches!(s.kind, SuggestionKind::WeightAdjustment { .. }) && stepped.contains(&s.rule_key);
      if repeat {
        tracing::debug!(rule = %s.rule_key, "weight already adjusted in this window");
      }
      !repeat
    });

    let mut adjusted = Vec::new();
    for s in &suggestions {
      if let SuggestionKind::WeightAdjustment { from, to } = s.kind {
        let weight = LearnedWeight {
          rule_key:      s.rule_key.clone(),
          owner_user_id: owner_user_id.to_owned(),
          multiplier:    to,
          updated_at:    now,
        };
        self.store.upsert_weight(&weight).await.map_err(Error::store)?;
        tracing::info!(rule = %s.rule_key, from, to, "rule weight adjusted");
        adjusted.push(weight);
      }
    }

    let manager = self.risk_flags();
    let mut alerts = Vec::new();
    for alert in build_pattern_alerts(&suggestions, cfg, now) {
      alerts.push(manager.create_or_update(alert.to_risk_flag(), now).await?);
    }

    let mut auto_applied = Vec::new();
    for s in auto_apply_candidates(&suggestions, cfg) {
      let preference = NewPreference {
        owner_user_id:    owner_user_id.to_owned(),
        entity_type:      None,
        entity_id:        None,
        target:           PreferenceTarget::RuleKey(s.rule_key.clone()),
        suppressed_until: Some(now + Duration::days(cfg.suppression_days)),
        source:           PreferenceSource::Policy,
        reason:           Some(s.rationale.clone()),
      };
      let stored = self.store.upsert_preference(preference, now).await.map_err(Error::store)?;
      tracing::info!(
        rule = %s.rule_key,
        confidence = s.confidence,
        until = ?stored.suppressed_until,
        "suppression auto-applied"
      );
      auto_applied.push(stored);
    }

    Ok(PolicyReport {
      owner_user_id: owner_user_id.to_owned(),
      window: current,
      suggestions,
      weights: adjusted,
      alerts,
      auto_applied,
    })
  }
}
