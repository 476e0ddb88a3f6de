//! The declarative rule registry and the engine that evaluates it.
//!
//! Each rule is a [`RuleDescriptor`]: a key plus three plain functions. The
//! predicate finds the things the rule fires for, the score function turns a
//! match into a base score, and the priority function bands the final score.
//! Rules are evaluated independently; one failing predicate is skipped and
//! reported without affecting the others. Evaluation has no side effects.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  RuleError, Scope,
  action::{Candidate, Priority},
  context::{BusinessContext, DeliveryStatus, LeadStatus, ProposalStatus},
  weights::{DEFAULT_MULTIPLIER, EffectivenessMap, WeightBounds, WeightMap},
};

// ─── Descriptor ──────────────────────────────────────────────────────────────

/// One thing a rule fired for.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
  /// Sub-entity id (proposal, lead, delivery). `None` for scope-level rules.
  pub subject_id: Option<String>,
  pub title:      String,
  pub reason:     String,
  /// Rule-specific severity signal, typically days past a threshold.
  pub magnitude:  f64,
}

pub type Predicate = fn(&BusinessContext) -> Result<Vec<RuleMatch>, RuleError>;
pub type ScoreFn = fn(&BusinessContext, &RuleMatch) -> f64;
pub type PriorityFn = fn(u8) -> Priority;

#[derive(Clone, Copy)]
pub struct RuleDescriptor {
  pub key:         &'static str,
  pub description: &'static str,
  pub predicate:   Predicate,
  pub score:       ScoreFn,
  pub priority:    PriorityFn,
}

impl std::fmt::Debug for RuleDescriptor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RuleDescriptor").field("key", &self.key).finish_non_exhaustive()
  }
}

/// A rule that failed to evaluate during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleWarning {
  pub rule_key: String,
  pub message:  String,
}

/// Output of [`RuleEngine::produce_candidates`].
#[derive(Debug, Clone, Default)]
pub struct CandidateBatch {
  pub candidates: Vec<Candidate>,
  pub warnings:   Vec<RuleWarning>,
}

/// `{rule_key}:{entity_type}:{entity_id}[:{subject_id}]`
pub fn dedupe_key(rule_key: &str, scope: &Scope, subject_id: Option<&str>) -> String {
  match subject_id {
    Some(sub) => format!("{rule_key}:{scope}:{sub}"),
    None => format!("{rule_key}:{scope}"),
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RuleEngine {
  rules: Vec<RuleDescriptor>,
}

impl Default for RuleEngine {
  fn default() -> Self { Self::builtin() }
}

impl RuleEngine {
  /// An engine over the built-in registry.
  pub fn builtin() -> Self { Self { rules: BUILTIN_RULES.to_vec() } }

  pub fn with_rules(rules: Vec<RuleDescriptor>) -> Self { Self { rules } }

  pub fn rules(&self) -> &[RuleDescriptor] { &self.rules }

  /// Evaluate every rule against `ctx`.
  ///
  /// `score = clamp(base · weight, 0, 100)` where `weight` defaults to 1.0.
  /// Candidates come back sorted by score, then historical success rate, then
  /// dedupe key, so the ordering is stable across runs.
  pub fn produce_candidates(
    &self,
    ctx: &BusinessContext,
    scope: &Scope,
    weights: Option<&WeightMap>,
    effectiveness: Option<&EffectivenessMap>,
  ) -> CandidateBatch {
    let mut batch = CandidateBatch::default();

    for rule in &self.rules {
      let matches = match (rule.predicate)(ctx) {
        Ok(m) => m,
        Err(e) => {
          batch.warnings.push(RuleWarning {
            rule_key: rule.key.to_owned(),
            message:  e.0,
          });
          continue;
        }
      };

      let weight = weights
        .and_then(|w| w.get(rule.key))
        .copied()
        .filter(|w| w.is_finite())
        .map(|w| WeightBounds::default().clamp(w))
        .unwrap_or(DEFAULT_MULTIPLIER);
      let success_rate = effectiveness
        .and_then(|e| e.get(rule.key))
        .filter(|e| e.fired > 0)
        .map(|e| e.success_rate());

      for m in matches {
        let base = (rule.score)(ctx, &m);
        let score = to_score(base * weight);
        batch.candidates.push(Candidate {
          rule_key: rule.key.to_owned(),
          dedupe_key: dedupe_key(rule.key, scope, m.subject_id.as_deref()),
          entity_type: scope.entity_type.clone(),
          entity_id: scope.entity_id.clone(),
          subject_id: m.subject_id,
          title: m.title,
          reason: m.reason,
          score,
          priority: (rule.priority)(score),
          weight,
          success_rate,
        });
      }
    }

    batch.candidates.sort_by(|a, b| {
      b.score
        .cmp(&a.score)
        .then_with(|| {
          let (x, y) = (a.success_rate.unwrap_or(0.0), b.success_rate.unwrap_or(0.0));
          y.partial_cmp(&x).unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.dedupe_key.cmp(&b.dedupe_key))
    });
    batch
  }
}

fn to_score(raw: f64) -> u8 {
  if raw.is_nan() {
    return 0;
  }
  raw.round().clamp(0.0, 100.0) as u8
}

fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 { (to - from).num_days() }

// ─── Built-in rules ──────────────────────────────────────────────────────────

pub const PROPOSAL_STALE_FOLLOWUP: &str = "proposal_stale_followup";
pub const PROPOSAL_EXPIRING: &str = "proposal_expiring";
pub const LEAD_UNCONTACTED: &str = "lead_uncontacted";
pub const DELIVERY_OVERDUE: &str = "delivery_overdue";
pub const DELIVERY_BLOCKED: &str = "delivery_blocked";
pub const PIPELINE_THIN: &str = "pipeline_thin";

pub static BUILTIN_RULES: &[RuleDescriptor] = &[
  RuleDescriptor {
    key:         PROPOSAL_STALE_FOLLOWUP,
    description: "Sent proposal with no follow-up past the stale threshold",
    predicate:   stale_followup_matches,
    score:       stale_followup_score,
    priority:    Priority::from_score,
  },
  RuleDescriptor {
    key:         PROPOSAL_EXPIRING,
    description: "Sent proposal expiring soon",
    predicate:   expiring_matches,
    score:       expiring_score,
    priority:    Priority::from_score,
  },
  RuleDescriptor {
    key:         LEAD_UNCONTACTED,
    description: "New lead never contacted within the response window",
    predicate:   uncontacted_matches,
    score:       uncontacted_score,
    priority:    Priority::from_score,
  },
  RuleDescriptor {
    key:         DELIVERY_OVERDUE,
    description: "Delivery past its due date",
    predicate:   overdue_matches,
    score:       overdue_score,
    priority:    Priority::from_score,
  },
  RuleDescriptor {
    key:         DELIVERY_BLOCKED,
    description: "Delivery blocked for longer than the alert threshold",
    predicate:   blocked_matches,
    score:       blocked_score,
    priority:    Priority::from_score,
  },
  RuleDescriptor {
    key:         PIPELINE_THIN,
    description: "Too few open leads in the pipeline",
    predicate:   thin_pipeline_matches,
    score:       thin_pipeline_score,
    priority:    Priority::from_score,
  },
];

// proposal_stale_followup

fn stale_followup_matches(ctx: &BusinessContext) -> Result<Vec<RuleMatch>, RuleError> {
  let threshold = ctx.settings.stale_followup_days;
  let mut out = Vec::new();
  for p in ctx.proposals.iter().filter(|p| p.status == ProposalStatus::Sent) {
    let sent_at = p
      .sent_at
      .ok_or_else(|| RuleError(format!("proposal {} is sent but has no sent_at", p.id)))?;
    let last_touch = p.last_follow_up_at.map_or(sent_at, |f| f.max(sent_at));
    let idle = days_between(last_touch, ctx.as_of);
    if idle > threshold {
      out.push(RuleMatch {
        subject_id: Some(p.id.clone()),
        title:      format!("Follow up on \"{}\"", p.title),
        reason:     format!("No follow-up for {idle} days (threshold {threshold})"),
        magnitude:  (idle - threshold) as f64,
      });
    }
  }
  Ok(out)
}

fn stale_followup_score(ctx: &BusinessContext, m: &RuleMatch) -> f64 {
  let value_bonus = m
    .subject_id
    .as_deref()
    .and_then(|id| ctx.proposals.iter().find(|p| p.id == id))
    .map_or(0.0, |p| (p.value / 10_000.0).min(5.0));
  65.0 + m.magnitude.min(20.0) * 1.5 + value_bonus
}

// proposal_expiring

fn expiring_matches(ctx: &BusinessContext) -> Result<Vec<RuleMatch>, RuleError> {
  let window = ctx.settings.expiring_within_days;
  Ok(
    ctx
      .proposals
      .iter()
      .filter(|p| p.status == ProposalStatus::Sent)
      .filter_map(|p| {
        let expires_at = p.expires_at?;
        if expires_at < ctx.as_of {
          return None;
        }
        let left = days_between(ctx.as_of, expires_at);
        (left <= window).then(|| RuleMatch {
          subject_id: Some(p.id.clone()),
          title:      format!("\"{}\" expires soon", p.title),
          reason:     format!("Expires in {left} days"),
          magnitude:  (window - left) as f64,
        })
      })
      .collect(),
  )
}

fn expiring_score(_ctx: &BusinessContext, m: &RuleMatch) -> f64 {
  50.0 + m.magnitude * 8.0
}

// lead_uncontacted

fn uncontacted_matches(ctx: &BusinessContext) -> Result<Vec<RuleMatch>, RuleError> {
  let window = ctx.settings.lead_response_days;
  Ok(
    ctx
      .leads
      .iter()
      .filter(|l| l.status == LeadStatus::New && l.last_contacted_at.is_none())
      .filter_map(|l| {
        let age = days_between(l.created_at, ctx.as_of);
        (age >= window).then(|| RuleMatch {
          subject_id: Some(l.id.clone()),
          title:      format!("Contact lead {}", l.name),
          reason:     format!("Lead waiting {age} days without contact"),
          magnitude:  (age - window) as f64,
        })
      })
      .collect(),
  )
}

fn uncontacted_score(_ctx: &BusinessContext, m: &RuleMatch) -> f64 {
  40.0 + m.magnitude.min(10.0) * 4.0
}

// delivery_overdue

fn overdue_matches(ctx: &BusinessContext) -> Result<Vec<RuleMatch>, RuleError> {
  Ok(
    ctx
      .deliveries
      .iter()
      .filter(|d| d.status != DeliveryStatus::Done)
      .filter_map(|d| {
        let due = d.due_at?;
        (due < ctx.as_of).then(|| {
          let late = days_between(due, ctx.as_of);
          RuleMatch {
            subject_id: Some(d.id.clone()),
            title:      format!("{} is overdue", d.name),
            reason:     format!("Past due by {late} days"),
            magnitude:  late as f64,
          }
        })
      })
      .collect(),
  )
}

fn overdue_score(_ctx: &BusinessContext, m: &RuleMatch) -> f64 {
  55.0 + m.magnitude.min(15.0) * 2.5
}

// delivery_blocked

fn blocked_matches(ctx: &BusinessContext) -> Result<Vec<RuleMatch>, RuleError> {
  let threshold = ctx.settings.blocked_alert_days;
  let mut out = Vec::new();
  for d in ctx.deliveries.iter().filter(|d| d.status == DeliveryStatus::Blocked) {
    let since = d.blocked_since.ok_or_else(|| {
      RuleError(format!("delivery {} is blocked but has no blocked_since", d.id))
    })?;
    let days = days_between(since, ctx.as_of);
    if days >= threshold {
      out.push(RuleMatch {
        subject_id: Some(d.id.clone()),
        title:      format!("Unblock {}", d.name),
        reason:     format!("Blocked for {days} days"),
        magnitude:  days as f64,
      });
    }
  }
  Ok(out)
}

fn blocked_score(_ctx: &BusinessContext, m: &RuleMatch) -> f64 {
  45.0 + m.magnitude.min(10.0) * 3.0
}

// pipeline_thin

fn thin_pipeline_matches(ctx: &BusinessContext) -> Result<Vec<RuleMatch>, RuleError> {
  let open = ctx.leads.iter().filter(|l| l.status.is_open()).count();
  let min = ctx.settings.min_open_leads;
  if open >= min {
    return Ok(Vec::new());
  }
  Ok(vec![RuleMatch {
    subject_id: None,
    title:      "Pipeline is thin".into(),
    reason:     format!("{open} open leads, target at least {min}"),
    magnitude:  (min - open) as f64,
  }])
}

fn thin_pipeline_score(_ctx: &BusinessContext, m: &RuleMatch) -> f64 {
  30.0 + m.magnitude * 10.0
}
