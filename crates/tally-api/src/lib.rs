//! JSON REST API for Tally.
//!
//! Exposes an axum [`Router`] backed by any
//! [`tally_core::store::MetricsStore`]. All routes are read-only queries over
//! materialized results; auth, TLS, and transport concerns are the caller's
//! responsibility. Every route takes a required `tenant_id` query parameter —
//! the tenant boundary at this layer; there is no route that reads across it.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", tally_api::api_router(store.clone()))
//! ```

pub mod catalogue;
pub mod error;
pub mod playlists;
pub mod streams;

use std::sync::Arc;

use axum::{Router, routing::get};
use serde::Deserialize;
use tally_core::store::MetricsStore;
use uuid::Uuid;

pub use error::ApiError;

/// The bare tenant-scoping parameter for list endpoints.
#[derive(Debug, Deserialize)]
pub struct TenantParam {
  pub tenant_id: Uuid,
}

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: MetricsStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  Router::new()
    // Streams
    .route("/streams/daily-totals", get(streams::daily_totals::<S>))
    .route("/streams/lag-credits", get(streams::lag_credits::<S>))
    .route("/streams/top-deltas", get(streams::top_deltas::<S>))
    .route("/streams/tracks/{id}/series", get(streams::track_series::<S>))
    // Playlists
    .route("/playlists", get(playlists::list::<S>))
    .route("/playlists/{id}/series", get(playlists::series::<S>))
    // Catalogue
    .route("/catalogue/tracks", get(catalogue::tracks::<S>))
    .route("/catalogue/size-series", get(catalogue::size_series::<S>))
    .route("/catalogue/health-heatmap", get(catalogue::health_heatmap::<S>))
    .with_state(store)
}
