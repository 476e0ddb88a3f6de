//! HTTP trigger surface for the Steward decision engine.
//!
//! Exposes an axum [`Router`] over an [`Engine`] backed by any
//! [`DecisionStore`] and [`TtlStore`]. Auth and TLS are the caller's
//! responsibility.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/runs` | Body: [`handlers::runs::RunBody`]; evaluates the posted context |
//! | `POST` | `/scores` | Body: [`handlers::scores::ScoreBody`]; returns 201 + snapshot and events |
//! | `GET`  | `/risk-flags` | Open flags, most severe first |
//! | `POST` | `/risk-flags/{id}/dismiss` | |
//! | `POST` | `/risk-flags/{id}/resolve` | |
//! | `POST` | `/risk-flags/{id}/snooze` | Body: `{"until": "..."}` |
//! | `POST` | `/policy` | Body: `{"owner": "..."}`; applies the memory policy |
//! | `POST` | `/preferences` | Body: [`steward_core::preference::NewPreference`] |
//! | `DELETE` | `/preferences/{id}` | Deactivates the preference |
//! | `GET`  | `/notifications/pending` | For the dispatcher |
//! | `POST` | `/notifications/{id}` | Body: `{"status": "sent" \| "failed"}` |

pub mod error;
pub mod handlers;

pub use error::ApiError;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{delete, get, post},
};
use serde::Deserialize;
use steward_core::{store::DecisionStore, ttl::TtlStore};
use steward_engine::{Engine, EngineConfig};
use tower_http::trace::TraceLayer;

use handlers::{notifications, policy, preferences, risk_flags, runs, scores};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Where rate-limit counters and cooldown hits are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtlBackend {
  /// In-process; fine for a single server.
  #[default]
  Memory,
  /// In the SQLite store, shared by every process using the same file.
  Sqlite,
}

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
  #[serde(default)]
  pub ttl:        TtlBackend,
  #[serde(default)]
  pub engine:     EngineConfig,
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S, T> {
  pub engine: Engine<S, T>,
  pub config: Arc<ServerConfig>,
}

impl<S, T> Clone for AppState<S, T> {
  fn clone(&self) -> Self {
    Self { engine: self.engine.clone(), config: Arc::clone(&self.config) }
  }
}

impl<S: DecisionStore, T: TtlStore> AppState<S, T> {
  pub fn new(store: Arc<S>, ttl: Arc<T>, config: ServerConfig) -> Self {
    Self {
      engine: Engine::new(store, ttl, config.engine.clone()),
      config: Arc::new(config),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build an axum [`Router`] for the trigger surface.
pub fn router<S, T>(state: AppState<S, T>) -> Router
where
  S: DecisionStore + 'static,
  T: TtlStore + 'static,
{
  Router::new()
    // Pipeline
    .route("/runs", post(runs::create::<S, T>))
    // Scores
    .route("/scores", post(scores::create::<S, T>))
    // Risk flags
    .route("/risk-flags", get(risk_flags::list::<S, T>))
    .route("/risk-flags/{id}/dismiss", post(risk_flags::dismiss::<S, T>))
    .route("/risk-flags/{id}/resolve", post(risk_flags::resolve::<S, T>))
    .route("/risk-flags/{id}/snooze", post(risk_flags::snooze::<S, T>))
    // Memory policy
    .route("/policy", post(policy::apply::<S, T>))
    // Preferences
    .route("/preferences", post(preferences::create::<S, T>))
    .route("/preferences/{id}", delete(preferences::deactivate::<S, T>))
    // Notifications
    .route("/notifications/pending", get(notifications::pending::<S, T>))
    .route("/notifications/{id}", post(notifications::mark::<S, T>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use serde_json::{Value, json};
  use steward_engine::MemoryTtlStore;
  use steward_store_sqlite::SqliteStore;
  use tower::ServiceExt as _;

  async fn make_state(engine: EngineConfig) -> AppState<SqliteStore, MemoryTtlStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    AppState::new(
      Arc::new(store),
      Arc::new(MemoryTtlStore::new()),
      ServerConfig {
        host:       "127.0.0.1".to_string(),
        port:       8080,
        store_path: PathBuf::from(":memory:"),
        ttl:        TtlBackend::Memory,
        engine,
      },
    )
  }

  async fn send(
    state: AppState<SqliteStore, MemoryTtlStore>,
    method: &str,
    uri: &str,
    body: Option<Value>,
  ) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
      Some(v) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(v.to_string())
      }
      None => Body::empty(),
    };
    let resp = router(state).oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, json)
  }

  fn run_body(proposals: Value) -> Value {
    json!({
      "actor": "u1",
      "entity_type": "workspace",
      "entity_id": "acme",
      "context": {
        "as_of": "2026-04-06T10:00:00Z",
        "proposals": proposals,
      },
    })
  }

  fn stale(id: &str) -> Value {
    json!({
      "id": id,
      "title": "Website redesign",
      "status": "sent",
      "value": 12000.0,
      "sent_at": "2026-03-20T10:00:00Z",
    })
  }

  // ── Runs ────────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn run_creates_then_refreshes() {
    let state = make_state(EngineConfig::default()).await;

    let (status, first) = send(state.clone(), "POST", "/runs", Some(run_body(json!([stale("p1")])))).await;
    assert_eq!(status, StatusCode::OK, "{first}");
    // the stale proposal plus the empty pipeline
    assert_eq!(first["created"], 2);
    assert!(first["run_key"].as_str().unwrap().starts_with("nba:u1:workspace:acme:"));

    let (_, second) = send(state, "POST", "/runs", Some(run_body(json!([stale("p1")])))).await;
    assert_eq!(second["created"], 0);
    assert_eq!(second["updated"], 2);
  }

  #[tokio::test]
  async fn malformed_context_returns_400_with_fixed_message() {
    let state = make_state(EngineConfig::default()).await;
    let body = run_body(json!([stale("p1"), stale("p1")]));
    let (status, json) = send(state, "POST", "/runs", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json, json!({ "error": "invalid request" }));
  }

  #[tokio::test]
  async fn empty_actor_is_rejected() {
    let state = make_state(EngineConfig::default()).await;
    let mut body = run_body(json!([]));
    body["actor"] = json!("  ");
    let (status, _) = send(state, "POST", "/runs", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn excess_runs_return_429() {
    let mut engine = EngineConfig::default();
    engine.rate_limit.max_runs = 1;
    let state = make_state(engine).await;

    let (ok, _) = send(state.clone(), "POST", "/runs", Some(run_body(json!([])))).await;
    assert_eq!(ok, StatusCode::OK);

    // two more attempts, so a minute boundary can only reset one of them
    let mut limited = Vec::new();
    for _ in 0..2 {
      let (status, json) = send(state.clone(), "POST", "/runs", Some(run_body(json!([])))).await;
      if status == StatusCode::TOO_MANY_REQUESTS {
        limited.push(json);
      }
    }
    assert!(!limited.is_empty());
    assert_eq!(limited[0]["error"], "rate limit exceeded");
  }

  // ── Scores ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn score_drop_returns_events() {
    let state = make_state(EngineConfig::default()).await;
    let body = |value: f64| {
      json!({
        "entity_type": "client",
        "entity_id": "c1",
        "factors": [{ "key": "payments", "weight": 1.0, "value": value }],
      })
    };

    let (status, first) = send(state.clone(), "POST", "/scores", Some(body(0.8))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["band"], "healthy");
    assert_eq!(first["events"], json!([]));

    let (_, second) = send(state.clone(), "POST", "/scores", Some(body(0.3))).await;
    let types: Vec<&str> =
      second["events"].as_array().unwrap().iter().map(|e| e["event_type"].as_str().unwrap()).collect();
    assert_eq!(types, ["threshold_breach", "sharp_drop"]);

    let (_, pending) = send(state, "GET", "/notifications/pending", None).await;
    assert_eq!(pending.as_array().unwrap().len(), 2);
  }

  #[tokio::test]
  async fn invalid_factor_returns_400() {
    let state = make_state(EngineConfig::default()).await;
    let body = json!({ "entity_type": "client", "entity_id": "c1", "factors": [] });
    let (status, _) = send(state, "POST", "/scores", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  // ── Risk flags / policy / preferences ───────────────────────────────────────

  #[tokio::test]
  async fn risk_flags_start_empty_and_unknown_ids_are_404() {
    let state = make_state(EngineConfig::default()).await;
    let (status, flags) = send(state.clone(), "GET", "/risk-flags", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(flags, json!([]));

    let uri = format!("/risk-flags/{}/dismiss", uuid::Uuid::new_v4());
    let (status, _) = send(state, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn policy_without_history_suggests_nothing() {
    let state = make_state(EngineConfig::default()).await;
    let (status, report) = send(state, "POST", "/policy", Some(json!({ "owner": "u1" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["suggestions"], json!([]));
    assert_eq!(report["auto_applied"], json!([]));
  }

  #[tokio::test]
  async fn preference_suppresses_the_next_run() {
    let state = make_state(EngineConfig::default()).await;
    let pref = json!({
      "owner_user_id": "u1",
      "target": { "kind": "rule_key", "key": "pipeline_thin" },
      "suppressed_until": "2099-01-01T00:00:00Z",
    });
    let (status, stored) = send(state.clone(), "POST", "/preferences", Some(pref)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(stored["source"], "user");

    let (_, run) = send(state.clone(), "POST", "/runs", Some(run_body(json!([])))).await;
    assert_eq!(run["suppressed"], 1);
    assert_eq!(run["created"], 0);

    let uri = format!("/preferences/{}", stored["preference_id"].as_str().unwrap());
    let (status, _) = send(state.clone(), "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, run) = send(state.clone(), "POST", "/runs", Some(run_body(json!([])))).await;
    assert_eq!(run["suppressed"], 0);
    assert_eq!(run["created"], 1);

    let uri = format!("/preferences/{}", uuid::Uuid::new_v4());
    let (status, _) = send(state, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }
}
