//! `POST /runs`: evaluate a posted context for one scope.

use axum::{Json, extract::State};
use serde::Deserialize;
use steward_core::{
  Scope,
  context::{BusinessContext, StaticContext},
  store::DecisionStore,
  ttl::TtlStore,
};
use steward_engine::{RunRequest, RunSummary};

use super::require;
use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct RunBody {
  pub actor:        String,
  pub entity_type:  String,
  pub entity_id:    String,
  /// Recorded in the run ledger; defaults to `actor`.
  #[serde(default)]
  pub triggered_by: Option<String>,
  pub context:      BusinessContext,
}

pub async fn create<S, T>(
  State(state): State<AppState<S, T>>,
  Json(body): Json<RunBody>,
) -> Result<Json<RunSummary>, ApiError>
where
  S: DecisionStore,
  T: TtlStore,
{
  require("actor", &body.actor)?;
  require("entity_type", &body.entity_type)?;
  require("entity_id", &body.entity_id)?;

  let request = RunRequest {
    actor:        body.actor,
    scope:        Scope::new(body.entity_type, body.entity_id),
    triggered_by: body.triggered_by,
  };
  let summary = state.engine.run(&request, &StaticContext(body.context)).await?;
  Ok(Json(summary))
}
