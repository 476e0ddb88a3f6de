//! The business context snapshot evaluated by the rule engine.
//!
//! A context is an opaque, read-only aggregate of the dashboard's CRUD data
//! as of a single instant. Rules never query the store themselves; they only
//! see what the [`ContextProvider`] hands them.

use std::{collections::HashSet, convert::Infallible, future::Future};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, Scope};

// ─── Aggregates ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
  New,
  Contacted,
  Qualified,
  Won,
  Lost,
}

impl LeadStatus {
  /// Whether the lead still counts towards the open pipeline.
  pub fn is_open(self) -> bool {
    matches!(self, Self::New | Self::Contacted | Self::Qualified)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
  pub id:                String,
  pub name:              String,
  pub status:            LeadStatus,
  pub created_at:        DateTime<Utc>,
  #[serde(default)]
  pub last_contacted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
  Draft,
  Sent,
  Accepted,
  Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
  pub id:                String,
  pub title:             String,
  pub status:            ProposalStatus,
  /// Contract value in the workspace currency.
  #[serde(default)]
  pub value:             f64,
  #[serde(default)]
  pub sent_at:           Option<DateTime<Utc>>,
  #[serde(default)]
  pub last_follow_up_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub expires_at:        Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
  Planned,
  Active,
  Blocked,
  Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
  pub id:            String,
  pub name:          String,
  pub status:        DeliveryStatus,
  #[serde(default)]
  pub due_at:        Option<DateTime<Utc>>,
  #[serde(default)]
  pub blocked_since: Option<DateTime<Utc>>,
}

/// Workspace settings that parameterise the built-in rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub stale_followup_days:  i64,
  pub lead_response_days:   i64,
  pub expiring_within_days: i64,
  pub blocked_alert_days:   i64,
  pub min_open_leads:       usize,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      stale_followup_days:  7,
      lead_response_days:   2,
      expiring_within_days: 3,
      blocked_alert_days:   3,
      min_open_leads:       3,
    }
  }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// A read-only snapshot of the business aggregates at `as_of`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessContext {
  pub as_of:      DateTime<Utc>,
  #[serde(default)]
  pub leads:      Vec<Lead>,
  #[serde(default)]
  pub proposals:  Vec<Proposal>,
  #[serde(default)]
  pub deliveries: Vec<Delivery>,
  #[serde(default)]
  pub settings:   Settings,
}

impl BusinessContext {
  pub fn empty(as_of: DateTime<Utc>) -> Self {
    Self {
      as_of,
      leads: Vec::new(),
      proposals: Vec::new(),
      deliveries: Vec::new(),
      settings: Settings::default(),
    }
  }

  /// Reject structurally malformed input before anything is evaluated.
  ///
  /// Checks id uniqueness per aggregate, that no recorded timestamp lies after
  /// `as_of`, and that numeric settings are usable.
  pub fn validate(&self) -> Result<()> {
    let invalid = |msg: String| Err(Error::InvalidContext(msg));

    let s = &self.settings;
    if s.stale_followup_days < 0
      || s.lead_response_days < 0
      || s.expiring_within_days < 0
      || s.blocked_alert_days < 0
    {
      return invalid("settings must not contain negative day counts".into());
    }

    let mut seen = HashSet::new();
    for lead in &self.leads {
      if lead.id.is_empty() || !seen.insert(lead.id.as_str()) {
        return invalid(format!("duplicate or empty lead id {:?}", lead.id));
      }
      self.not_in_future("lead", &lead.id, Some(lead.created_at))?;
      self.not_in_future("lead", &lead.id, lead.last_contacted_at)?;
    }

    seen.clear();
    for p in &self.proposals {
      if p.id.is_empty() || !seen.insert(p.id.as_str()) {
        return invalid(format!("duplicate or empty proposal id {:?}", p.id));
      }
      if !p.value.is_finite() || p.value < 0.0 {
        return invalid(format!("proposal {} has an invalid value", p.id));
      }
      self.not_in_future("proposal", &p.id, p.sent_at)?;
      self.not_in_future("proposal", &p.id, p.last_follow_up_at)?;
    }

    seen.clear();
    for d in &self.deliveries {
      if d.id.is_empty() || !seen.insert(d.id.as_str()) {
        return invalid(format!("duplicate or empty delivery id {:?}", d.id));
      }
      self.not_in_future("delivery", &d.id, d.blocked_since)?;
    }

    Ok(())
  }

  fn not_in_future(
    &self,
    kind: &str,
    id: &str,
    at: Option<DateTime<Utc>>,
  ) -> Result<()> {
    match at {
      Some(at) if at > self.as_of => Err(Error::InvalidContext(format!(
        "{kind} {id} has a timestamp after the snapshot instant"
      ))),
      _ => Ok(()),
    }
  }
}

// ─── Provider ────────────────────────────────────────────────────────────────

/// Supplies the context snapshot for a scope.
pub trait ContextProvider: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn snapshot<'a>(
    &'a self,
    scope: &'a Scope,
    as_of: DateTime<Utc>,
  ) -> impl Future<Output = Result<BusinessContext, Self::Error>> + Send + 'a;
}

/// A provider that always returns the same pre-built snapshot.
///
/// Used when the trigger delivers the context inline, and in tests.
#[derive(Debug, Clone)]
pub struct StaticContext(pub BusinessContext);

impl ContextProvider for StaticContext {
  type Error = Infallible;

  async fn snapshot(
    &self,
    _scope: &Scope,
    _as_of: DateTime<Utc>,
  ) -> Result<BusinessContext, Infallible> {
    Ok(self.0.clone())
  }
}

#[cfg(test)]
mod tests {
  use chrono::Duration;

  use super::*;

  fn lead(id: &str, created_at: DateTime<Utc>) -> Lead {
    Lead {
      id: id.into(),
      name: format!("Lead {id}"),
      status: LeadStatus::New,
      created_at,
      last_contacted_at: None,
    }
  }

  #[test]
  fn empty_context_is_valid() {
    assert!(BusinessContext::empty(Utc::now()).validate().is_ok());
  }

  #[test]
  fn duplicate_lead_ids_are_rejected() {
    let now = Utc::now();
    let mut ctx = BusinessContext::empty(now);
    ctx.leads = vec![lead("a", now), lead("a", now)];
    assert!(matches!(ctx.validate(), Err(Error::InvalidContext(_))));
  }

  #[test]
  fn future_timestamps_are_rejected() {
    let now = Utc::now();
    let mut ctx = BusinessContext::empty(now);
    ctx.leads = vec![lead("a", now + Duration::hours(1))];
    assert!(matches!(ctx.validate(), Err(Error::InvalidContext(_))));
  }

  #[test]
  fn negative_proposal_value_is_rejected() {
    let now = Utc::now();
    let mut ctx = BusinessContext::empty(now);
    ctx.proposals = vec![Proposal {
      id:                "p1".into(),
      title:             "Website".into(),
      status:            ProposalStatus::Draft,
      value:             -1.0,
      sent_at:           None,
      last_follow_up_at: None,
      expires_at:        None,
    }];
    assert!(ctx.validate().is_err());
  }

  #[test]
  fn settings_default_when_omitted_from_json() {
    let ctx: BusinessContext =
      serde_json::from_str(r#"{"as_of":"2026-01-01T00:00:00Z"}"#).unwrap();
    assert_eq!(ctx.settings.stale_followup_days, 7);
    assert!(ctx.leads.is_empty());
  }
}
