//! HTTP surface and wiring for the Tally daemon.
//!
//! The collector pushes raw counter tuples at `/ingest/*`; the scheduler (or
//! an operator) triggers batch passes at `/admin/*`; everything under `/api`
//! is the read-only query surface from [`tally_api`]. The binary in
//! `main.rs` adds the periodic finalize sweep on top.

pub mod admin;
pub mod error;
pub mod ingest;

pub use error::Error;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use serde::Deserialize;
use tally_engine::Engine;
use tally_store_sqlite::SqliteStore;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

fn default_host() -> String { "127.0.0.1".to_owned() }
fn default_port() -> u16 { 8777 }
fn default_store_path() -> PathBuf { PathBuf::from("tally.db") }
fn default_lag_window_days() -> u32 { 7 }
fn default_sweep_interval_secs() -> u64 { 3600 }

/// Runtime server configuration, deserialised from `config.toml` with
/// `TALLY_`-prefixed environment overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                String,
  #[serde(default = "default_port")]
  pub port:                u16,
  #[serde(default = "default_store_path")]
  pub store_path:          PathBuf,
  /// Days a daily total stays mutable before the sweep freezes it.
  #[serde(default = "default_lag_window_days")]
  pub lag_window_days:     u32,
  /// Seconds between background finalize/conservation sweeps.
  #[serde(default = "default_sweep_interval_secs")]
  pub sweep_interval_secs: u64,
}

impl ServerConfig {
  pub fn bind_addr(&self) -> String {
    format!("{}:{}", self.host, self.port)
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState {
  pub engine: Engine<SqliteStore>,
}

impl AppState {
  pub fn store(&self) -> &Arc<SqliteStore> { self.engine.store() }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full axum [`Router`] for the daemon.
pub fn router(state: AppState) -> Router {
  let api = tally_api::api_router(Arc::clone(state.store()));

  Router::new()
    .route("/healthz", get(healthz))
    // Collector boundary
    .route("/ingest/streams", post(ingest::streams))
    .route("/ingest/followers", post(ingest::followers))
    .route("/ingest/health-checks", post(ingest::health_checks))
    // Scheduler / operator boundary
    .route("/admin/recompute", post(admin::recompute))
    .route("/admin/finalize", post(admin::finalize))
    .route("/admin/retention", post(admin::retention))
    .with_state(state)
    .nest("/api", api)
    .layer(TraceLayer::new_for_http())
}

async fn healthz() -> axum::Json<serde_json::Value> {
  axum::Json(serde_json::json!({ "status": "ok" }))
}
