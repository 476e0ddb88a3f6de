//! steward server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! SQLite store, and serves the trigger API over HTTP.
//!
//! Any setting can be overridden from the environment with a `STEWARD_`
//! prefix, e.g. `STEWARD_PORT=9000` or
//! `STEWARD_ENGINE__COOLDOWN_MINUTES=30`.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use clap::Parser;
use steward_core::{store::DecisionStore, ttl::TtlStore};
use steward_engine::MemoryTtlStore;
use steward_server::{AppState, ServerConfig, TtlBackend};
use steward_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// How often expired in-process TTL entries are dropped.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(author, version, about = "Steward decision engine server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .set_default("host", "127.0.0.1")?
    .set_default("port", 8080)?
    .set_default("store_path", "steward.db")?
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("STEWARD").prefix_separator("_").separator("__"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;
  server_cfg
    .engine
    .validate()
    .context("invalid engine configuration")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);

  let store = Arc::new(
    SqliteStore::open(&store_path)
      .await
      .with_context(|| format!("failed to open store at {store_path:?}"))?,
  );

  match server_cfg.ttl {
    TtlBackend::Memory => {
      let ttl = Arc::new(MemoryTtlStore::new());
      let purge = Arc::clone(&ttl);
      tokio::spawn(async move {
        let mut tick = tokio::time::interval(PURGE_INTERVAL);
        loop {
          tick.tick().await;
          purge.purge_expired();
        }
      });
      serve(store, ttl, server_cfg).await
    }
    TtlBackend::Sqlite => {
      let ttl = Arc::clone(&store);
      serve(store, ttl, server_cfg).await
    }
  }
}

async fn serve<S, T>(store: Arc<S>, ttl: Arc<T>, config: ServerConfig) -> anyhow::Result<()>
where
  S: DecisionStore + 'static,
  T: TtlStore + 'static,
{
  let address = format!("{}:{}", config.host, config.port);
  let app = steward_server::router(AppState::new(store, ttl, config));

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
