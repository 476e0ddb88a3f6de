//! Orchestration for the Steward decision engine.
//!
//! [`Engine`] ties the pure logic in `steward-core` to a [`DecisionStore`]
//! and a [`TtlStore`]. It is generic over both, so the same code runs against
//! SQLite in production and in-memory fakes in tests.
//!
//! | Operation | Module |
//! |-----------|--------|
//! | Pipeline run (rules → filter → upsert → ledger) | [`pipeline`] |
//! | Score compute-and-store | [`scoring`] |
//! | Risk flag lifecycle | [`risk`] |
//! | Memory policy application | [`policy`] |
//! | Notification cooldown | [`cooldown`] |

pub mod config;
pub mod cooldown;
pub mod error;
pub mod memory;
pub mod pipeline;
pub mod policy;
pub mod rate_limit;
pub mod redact;
pub mod risk;
pub mod scoring;

use std::sync::Arc;

use steward_core::{rules::RuleEngine, store::DecisionStore, ttl::TtlStore};

pub use config::EngineConfig;
pub use cooldown::CooldownGate;
pub use error::{Error, Result};
pub use memory::MemoryTtlStore;
pub use pipeline::{RunRequest, RunSummary};
pub use rate_limit::RateLimiter;
pub use risk::RiskFlagManager;

/// Target of the structured run events (`run.start`, `run.complete`,
/// `run.error`).
pub const RUN_TARGET: &str = "steward::run";

/// Shared handle to the store, the TTL store and the engine configuration.
///
/// Cloning is cheap; everything inside is reference-counted.
pub struct Engine<S, T> {
  store:  Arc<S>,
  ttl:    Arc<T>,
  config: Arc<EngineConfig>,
  rules:  Arc<RuleEngine>,
}

impl<S, T> Clone for Engine<S, T> {
  fn clone(&self) -> Self {
    Self {
      store:  Arc::clone(&self.store),
      ttl:    Arc::clone(&self.ttl),
      config: Arc::clone(&self.config),
      rules:  Arc::clone(&self.rules),
    }
  }
}

impl<S: DecisionStore, T: TtlStore> Engine<S, T> {
  /// An engine running the built-in rule registry.
  pub fn new(store: Arc<S>, ttl: Arc<T>, config: EngineConfig) -> Self {
    Self {
      store,
      ttl,
      config: Arc::new(config),
      rules: Arc::new(RuleEngine::builtin()),
    }
  }

  pub fn with_rules(mut self, rules: RuleEngine) -> Self {
    self.rules = Arc::new(rules);
    self
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn config(&self) -> &EngineConfig { &self.config }

  pub fn cooldown(&self) -> CooldownGate<'_, S, T> {
    CooldownGate::new(&self.store, &self.ttl, self.config.cooldown_minutes)
  }

  pub fn risk_flags(&self) -> RiskFlagManager<'_, S, T> {
    RiskFlagManager::new(&self.store, self.cooldown())
  }

  pub fn rate_limiter(&self) -> RateLimiter<'_, T> {
    RateLimiter::new(&self.ttl, &self.config.rate_limit)
  }
}
