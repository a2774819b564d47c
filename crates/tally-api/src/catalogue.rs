//! Handlers for `/catalogue` endpoints.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use tally_core::{
  catalog::Track,
  health::{CataloguePoint, HealthSnapshot},
  store::MetricsStore,
};

use crate::{error::ApiError, streams::WindowParams, TenantParam};

/// `GET /catalogue/tracks?tenant_id=<id>`
pub async fn tracks<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<TenantParam>,
) -> Result<Json<Vec<Track>>, ApiError>
where
  S: MetricsStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let tracks = store
    .list_tracks(params.tenant_id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(tracks))
}

/// `GET /catalogue/size-series?tenant_id=<id>`
pub async fn size_series<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<TenantParam>,
) -> Result<Json<Vec<CataloguePoint>>, ApiError>
where
  S: MetricsStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let series = store
    .catalogue_size_series(params.tenant_id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(series))
}

/// `GET /catalogue/health-heatmap?tenant_id=<id>[&from=...][&to=...]`
///
/// One row per (track, check date); the dashboard folds these into its
/// availability grid.
pub async fn health_heatmap<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<WindowParams>,
) -> Result<Json<Vec<HealthSnapshot>>, ApiError>
where
  S: MetricsStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let snapshots = store
    .health_snapshots(
      params.tenant_id,
      tally_core::store::DayWindow { from: params.from, to: params.to },
    )
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(snapshots))
}
