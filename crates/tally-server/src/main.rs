//! tallyd — the Tally metrics daemon.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! SQLite store, and serves ingestion, admin, and query endpoints over HTTP.
//! A background task runs the finalize sweep and conservation check for
//! every tenant on a fixed interval.

use std::{sync::Arc, time::Duration};

use anyhow::Context as _;
use clap::Parser;
use tally_core::store::MetricsStore;
use tally_engine::{Engine, EngineConfig};
use tally_server::{AppState, ServerConfig};
use tally_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Tally metrics daemon")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("TALLY"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store = SqliteStore::open(&server_cfg.store_path)
    .await
    .with_context(|| {
      format!("failed to open store at {:?}", server_cfg.store_path)
    })?;

  let engine = Engine::new(
    Arc::new(store),
    EngineConfig {
      lag_window_days: server_cfg.lag_window_days,
      ..EngineConfig::default()
    },
  );

  let state = AppState { engine: engine.clone() };

  tokio::spawn(sweep_loop(
    engine,
    Duration::from_secs(server_cfg.sweep_interval_secs),
  ));

  let app = tally_server::router(state);
  let address = server_cfg.bind_addr();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Periodic finalize + conservation pass over every tenant. Failures are
/// logged and the loop keeps going; the next tick retries.
async fn sweep_loop(engine: Engine<SqliteStore>, interval: Duration) {
  let mut ticker = tokio::time::interval(interval);
  ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

  loop {
    ticker.tick().await;

    let tenants = match engine.store().list_tenants().await {
      Ok(tenants) => tenants,
      Err(e) => {
        tracing::error!(error = %e, "sweep: failed to list tenants");
        continue;
      }
    };

    for tenant in tenants {
      if let Err(e) = engine.finalize_sweep(tenant.tenant_id).await {
        tracing::error!(
          tenant_id = %tenant.tenant_id, error = %e,
          "sweep: finalize failed"
        );
        continue;
      }
      if let Err(e) = engine.check_conservation(tenant.tenant_id).await {
        tracing::error!(
          tenant_id = %tenant.tenant_id, error = %e,
          "sweep: conservation check failed"
        );
      }
    }
  }
}
