//! Dispatcher endpoints: fetch pending notifications and report delivery.

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::Utc;
use serde::Deserialize;
use steward_core::{
  notification::{NotificationEvent, NotificationStatus},
  store::DecisionStore,
  ttl::TtlStore,
};
use uuid::Uuid;

use super::LimitParams;
use crate::{AppState, error::ApiError};

/// `GET /notifications/pending[?limit=n]`, oldest first.
pub async fn pending<S, T>(
  State(state): State<AppState<S, T>>,
  Query(params): Query<LimitParams>,
) -> Result<Json<Vec<NotificationEvent>>, ApiError>
where
  S: DecisionStore,
  T: TtlStore,
{
  Ok(Json(state.engine.cooldown().pending(params.resolve()).await?))
}

#[derive(Debug, Deserialize)]
pub struct MarkBody {
  pub status: NotificationStatus,
}

/// `POST /notifications/:id`
pub async fn mark<S, T>(
  State(state): State<AppState<S, T>>,
  Path(id): Path<Uuid>,
  Json(body): Json<MarkBody>,
) -> Result<Json<NotificationEvent>, ApiError>
where
  S: DecisionStore,
  T: TtlStore,
{
  if !matches!(body.status, NotificationStatus::Sent | NotificationStatus::Failed) {
    return Err(ApiError::BadRequest("status must be sent or failed".into()));
  }
  Ok(Json(state.engine.cooldown().mark(id, body.status, Utc::now()).await?))
}
