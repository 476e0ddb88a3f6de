//! Handlers for `/preferences` endpoints.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use chrono::Utc;
use steward_core::{
  preference::{NewPreference, Preference},
  store::DecisionStore,
  ttl::TtlStore,
};
use steward_engine::Error;
use uuid::Uuid;

use super::require;
use crate::{AppState, error::ApiError};

/// `POST /preferences`
pub async fn create<S, T>(
  State(state): State<AppState<S, T>>,
  Json(body): Json<NewPreference>,
) -> Result<(StatusCode, Json<Preference>), ApiError>
where
  S: DecisionStore,
  T: TtlStore,
{
  require("owner_user_id", &body.owner_user_id)?;
  require("target", body.target.key())?;

  let now = Utc::now();
  if body.suppressed_until.is_some_and(|until| until <= now) {
    return Err(ApiError::BadRequest("suppressed_until must be in the future".into()));
  }

  let stored = state
    .engine
    .store()
    .upsert_preference(body, now)
    .await
    .map_err(Error::store)?;
  tracing::info!(
    preference_id = %stored.preference_id,
    target = %stored.target.key(),
    "preference saved"
  );
  Ok((StatusCode::CREATED, Json(stored)))
}

/// `DELETE /preferences/:id`
pub async fn deactivate<S, T>(
  State(state): State<AppState<S, T>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: DecisionStore,
  T: TtlStore,
{
  let found = state
    .engine
    .store()
    .deactivate_preference(id, Utc::now())
    .await
    .map_err(Error::store)?;
  if !found {
    return Err(Error::NotFound(format!("preference {id}")).into());
  }
  Ok(StatusCode::NO_CONTENT)
}
