//! One evaluation run: read, evaluate, filter, upsert, record.
//!
//! All reads complete before the first write. Concurrent runs over the same
//! scope are safe because every write is an atomic upsert on a natural key;
//! nothing here takes a lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use steward_core::{
  Scope,
  action::{UpsertItemError, UpsertReport},
  context::ContextProvider,
  preference::PreferenceFilter,
  rules::RuleWarning,
  run::{RunCounts, run_key},
  store::{DecisionStore, StoreFailure},
  ttl::TtlStore,
  weights::weight_map,
};

use crate::{Engine, Error, RUN_TARGET, Result, redact::sanitize};

/// Who asked for a run, and over what.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
  /// The owner whose weights, preferences and actions the run uses.
  pub actor:        String,
  pub scope:        Scope,
  /// Recorded in the ledger; defaults to the actor.
  #[serde(default)]
  pub triggered_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
  pub run_key:     String,
  pub created:     usize,
  pub updated:     usize,
  pub unchanged:   usize,
  pub suppressed:  usize,
  pub candidates:  usize,
  pub last_run_at: DateTime<Utc>,
  pub warnings:    Vec<RuleWarning>,
  pub errors:      Vec<UpsertItemError>,
}

/// Public text for a candidate that could not be written.
const ITEM_ERROR: &str = "failed to save recommendation";

impl<S: DecisionStore, T: TtlStore> Engine<S, T> {
  /// Run the pipeline for `request` against the snapshot from `provider`.
  pub async fn run<C: ContextProvider>(&self, request: &RunRequest, provider: &C) -> Result<RunSummary> {
    self.run_at(request, provider, Utc::now()).await
  }

  /// As [`Engine::run`], with "now" fixed by the caller. The same instant is
  /// used for suppression checks, upsert timestamps and the run key.
  pub async fn run_at<C: ContextProvider>(
    &self,
    request: &RunRequest,
    provider: &C,
    now: DateTime<Utc>,
  ) -> Result<RunSummary> {
    let run_key = run_key(&request.actor, &request.scope, now);
    tracing::info!(
      target: RUN_TARGET,
      event = "run.start",
      run_key = %sanitize(&run_key),
      scope = %sanitize(&request.scope.to_string()),
      "run started"
    );

    match self.execute(request, provider, &run_key, now).await {
      Ok(summary) => {
        tracing::info!(
          target: RUN_TARGET,
          event = "run.complete",
          run_key = %sanitize(&run_key),
          candidates = summary.candidates,
          suppressed = summary.suppressed,
          created = summary.created,
          updated = summary.updated,
          unchanged = summary.unchanged,
          warnings = summary.warnings.len(),
          errors = summary.errors.len(),
          "run complete"
        );
        Ok(summary)
      }
      Err(e) => {
        tracing::error!(
          target: RUN_TARGET,
          event = "run.error",
          run_key = %sanitize(&run_key),
          error = %sanitize(&e.to_string()),
          "run failed"
        );
        Err(e)
      }
    }
  }

  async fn execute<C: ContextProvider>(
    &self,
    request: &RunRequest,
    provider: &C,
    run_key: &str,
    now: DateTime<Utc>,
  ) -> Result<RunSummary> {
    self.rate_limiter().check(&request.actor, now).await?;

    let actor = request.actor.as_str();
    let scope = &request.scope;

    let (ctx, weights, effectiveness, preferences) = tokio::try_join!(
      async { provider.snapshot(scope, now).await.map_err(|e| Error::Context(Box::new(e))) },
      async { self.store.load_weights(actor).await.map_err(Error::store) },
      async { self.store.load_effectiveness(actor).await.map_err(Error::store) },
      async {
        self
          .store
          .preferences_for(actor, &scope.entity_type, &scope.entity_id)
          .await
          .map_err(Error::store)
      },
    )?;

    ctx.validate()?;

    let weights = weight_map(weights);
    let batch = self.rules.produce_candidates(&ctx, scope, Some(&weights), Some(&effectiveness));
    for w in &batch.warnings {
      tracing::warn!(rule = %w.rule_key, message = %sanitize(&w.message), "rule skipped");
    }
    let candidates = batch.candidates.len();

    let filtered = PreferenceFilter::new(&preferences, now).apply(batch.candidates);
    let suppressed = filtered.suppressed.len();

    let mut report = UpsertReport::default();
    for candidate in &filtered.kept {
      match self.store.upsert_action(actor, candidate, now).await {
        Ok(outcome) => report.record(&outcome),
        Err(e) if e.is_unavailable() => return Err(Error::store(e)),
        Err(e) => {
          tracing::warn!(
            dedupe_key = %candidate.dedupe_key,
            error = %sanitize(&e.to_string()),
            "upsert failed"
          );
          report.errors.push(UpsertItemError {
            dedupe_key: candidate.dedupe_key.clone(),
            message:    ITEM_ERROR.to_owned(),
          });
        }
      }
    }

    let counts = RunCounts {
      candidates,
      suppressed,
      created: report.created,
      updated: report.updated,
      unchanged: report.unchanged,
      errors: report.errors.len(),
      warnings: batch.warnings.len(),
    };
    let triggered_by = request.triggered_by.as_deref().unwrap_or(actor);
    let last_run_at = match self.store.record_run(run_key, triggered_by, &counts, now).await {
      Ok(record) => record.last_run_at,
      Err(e) => {
        tracing::warn!(error = %sanitize(&e.to_string()), "run ledger not updated");
        now
      }
    };

    Ok(RunSummary {
      run_key: run_key.to_owned(),
      created: report.created,
      updated: report.updated,
      unchanged: report.unchanged,
      suppressed,
      candidates,
      last_run_at,
      warnings: batch.warnings,
      errors: report.errors,
    })
  }
}
