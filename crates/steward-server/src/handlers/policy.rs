//! `POST /policy`: apply the memory policy for one owner.

use axum::{Json, extract::State};
use chrono::Utc;
use serde::Deserialize;
use steward_core::{store::DecisionStore, ttl::TtlStore};
use steward_engine::policy::PolicyReport;

use super::require;
use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct PolicyBody {
  pub owner: String,
}

pub async fn apply<S, T>(
  State(state): State<AppState<S, T>>,
  Json(body): Json<PolicyBody>,
) -> Result<Json<PolicyReport>, ApiError>
where
  S: DecisionStore,
  T: TtlStore,
{
  require("owner", &body.owner)?;
  let report = state.engine.apply_memory_policy(&body.owner, Utc::now()).await?;
  Ok(Json(report))
}
