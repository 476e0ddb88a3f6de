//! `POST /scores`: compute and store a health score.

use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use serde::Deserialize;
use steward_core::{
  score::{Factor, ScoreInput},
  store::DecisionStore,
  ttl::TtlStore,
};
use steward_engine::scoring::ScoreResult;

use super::require;
use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ScoreBody {
  pub entity_type: String,
  pub entity_id:   String,
  pub factors:     Vec<Factor>,
}

pub async fn create<S, T>(
  State(state): State<AppState<S, T>>,
  Json(body): Json<ScoreBody>,
) -> Result<(StatusCode, Json<ScoreResult>), ApiError>
where
  S: DecisionStore,
  T: TtlStore,
{
  require("entity_type", &body.entity_type)?;
  require("entity_id", &body.entity_id)?;

  let input = ScoreInput { factors: body.factors };
  let result = state
    .engine
    .compute_and_store(&body.entity_type, &body.entity_id, &input, Utc::now())
    .await?;
  Ok((StatusCode::CREATED, Json(result)))
}
