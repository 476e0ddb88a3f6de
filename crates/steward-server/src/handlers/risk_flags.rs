//! Handlers for `/risk-flags` endpoints.

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use steward_core::{risk::RiskFlag, store::DecisionStore, ttl::TtlStore};
use uuid::Uuid;

use super::LimitParams;
use crate::{AppState, error::ApiError};

/// `GET /risk-flags[?limit=n]`
pub async fn list<S, T>(
  State(state): State<AppState<S, T>>,
  Query(params): Query<LimitParams>,
) -> Result<Json<Vec<RiskFlag>>, ApiError>
where
  S: DecisionStore,
  T: TtlStore,
{
  let flags = state.engine.risk_flags().list_open(params.resolve()).await?;
  Ok(Json(flags))
}

/// `POST /risk-flags/:id/dismiss`
pub async fn dismiss<S, T>(
  State(state): State<AppState<S, T>>,
  Path(id): Path<Uuid>,
) -> Result<Json<RiskFlag>, ApiError>
where
  S: DecisionStore,
  T: TtlStore,
{
  Ok(Json(state.engine.risk_flags().dismiss(id, Utc::now()).await?))
}

/// `POST /risk-flags/:id/resolve`
pub async fn resolve<S, T>(
  State(state): State<AppState<S, T>>,
  Path(id): Path<Uuid>,
) -> Result<Json<RiskFlag>, ApiError>
where
  S: DecisionStore,
  T: TtlStore,
{
  Ok(Json(state.engine.risk_flags().resolve(id, Utc::now()).await?))
}

#[derive(Debug, Deserialize)]
pub struct SnoozeBody {
  pub until: DateTime<Utc>,
}

/// `POST /risk-flags/:id/snooze`
pub async fn snooze<S, T>(
  State(state): State<AppState<S, T>>,
  Path(id): Path<Uuid>,
  Json(body): Json<SnoozeBody>,
) -> Result<Json<RiskFlag>, ApiError>
where
  S: DecisionStore,
  T: TtlStore,
{
  Ok(Json(state.engine.risk_flags().snooze(id, body.until, Utc::now()).await?))
}
