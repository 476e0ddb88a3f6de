//! User- and policy-authored suppression preferences.
//!
//! A preference withholds candidates whose rule key or dedupe key matches,
//! until `suppressed_until` passes. Expired rows are inert but kept.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::action::Candidate;

/// What a preference suppresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum PreferenceTarget {
  /// Every candidate of a rule.
  RuleKey(String),
  /// One specific recommendation.
  DedupeKey(String),
}

impl PreferenceTarget {
  pub fn kind(&self) -> &'static str {
    match self {
      Self::RuleKey(_) => "rule_key",
      Self::DedupeKey(_) => "dedupe_key",
    }
  }

  pub fn key(&self) -> &str {
    match self {
      Self::RuleKey(k) | Self::DedupeKey(k) => k,
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PreferenceStatus {
  Active,
  Inactive,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PreferenceSource {
  User,
  /// Created by the memory policy engine's auto-apply path.
  Policy,
}

/// A persisted suppression preference.
///
/// `entity_type`/`entity_id` of `None` apply to every scope the owner runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preference {
  pub preference_id:    Uuid,
  pub owner_user_id:    String,
  pub entity_type:      Option<String>,
  pub entity_id:        Option<String>,
  pub target:           PreferenceTarget,
  /// `None` suppresses indefinitely.
  pub suppressed_until: Option<DateTime<Utc>>,
  pub status:           PreferenceStatus,
  pub source:           PreferenceSource,
  pub reason:           Option<String>,
  pub created_at:       DateTime<Utc>,
  pub updated_at:       DateTime<Utc>,
}

impl Preference {
  pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
    self.status == PreferenceStatus::Active
      && self.suppressed_until.is_none_or(|until| until > now)
  }
}

/// Input for
/// [`DecisionStore::upsert_preference`](crate::store::DecisionStore::upsert_preference).
///
/// Upserting the same owner, scope and target again refreshes the window
/// and reactivates the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPreference {
  pub owner_user_id:    String,
  #[serde(default)]
  pub entity_type:      Option<String>,
  #[serde(default)]
  pub entity_id:        Option<String>,
  pub target:           PreferenceTarget,
  #[serde(default)]
  pub suppressed_until: Option<DateTime<Utc>>,
  #[serde(default = "default_source")]
  pub source:           PreferenceSource,
  #[serde(default)]
  pub reason:           Option<String>,
}

fn default_source() -> PreferenceSource { PreferenceSource::User }

// ─── Filter ──────────────────────────────────────────────────────────────────

/// The set of preferences active at a single instant.
///
/// `now` is captured once per run so every candidate is judged against the
/// same clock.
#[derive(Debug, Clone, Default)]
pub struct PreferenceFilter {
  rule_keys:   HashSet<String>,
  dedupe_keys: HashSet<String>,
}

/// Result of [`PreferenceFilter::apply`].
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
  pub kept:       Vec<Candidate>,
  pub suppressed: Vec<Candidate>,
}

impl PreferenceFilter {
  pub fn new<'a>(
    preferences: impl IntoIterator<Item = &'a Preference>,
    now: DateTime<Utc>,
  ) -> Self {
    let mut filter = Self::default();
    for p in preferences.into_iter().filter(|p| p.is_active_at(now)) {
      match &p.target {
        PreferenceTarget::RuleKey(k) => filter.rule_keys.insert(k.clone()),
        PreferenceTarget::DedupeKey(k) => filter.dedupe_keys.insert(k.clone()),
      };
    }
    filter
  }

  pub fn suppresses(&self, candidate: &Candidate) -> bool {
    self.rule_keys.contains(&candidate.rule_key)
      || self.dedupe_keys.contains(&candidate.dedupe_key)
  }

  pub fn apply(&self, candidates: Vec<Candidate>) -> FilterOutcome {
    let (suppressed, kept) = candidates.into_iter().partition(|c| self.suppresses(c));
    FilterOutcome { kept, suppressed }
  }
}
