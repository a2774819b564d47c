//! Handlers for `/playlists` endpoints.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use tally_core::{
  catalog::{Platform, Playlist},
  store::{DayWindow, FollowerPoint, MetricsStore},
};
use uuid::Uuid;

use crate::{error::ApiError, streams::SeriesParams, TenantParam};

/// `GET /playlists?tenant_id=<id>`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<TenantParam>,
) -> Result<Json<Vec<Playlist>>, ApiError>
where
  S: MetricsStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let playlists = store
    .list_playlists(params.tenant_id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(playlists))
}

/// `GET /playlists/:id/series?tenant_id=<id>[&platform=spotify]`
///
/// Returns the raw cumulative follower counts alongside the derived daily
/// increments.
pub async fn series<S>(
  State(store): State<Arc<S>>,
  Path(playlist_id): Path<Uuid>,
  Query(params): Query<SeriesParams>,
) -> Result<Json<Vec<FollowerPoint>>, ApiError>
where
  S: MetricsStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  store
    .get_playlist(params.tenant_id, playlist_id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("playlist {playlist_id}")))?;

  let series = store
    .follower_series(
      params.tenant_id,
      params.platform.unwrap_or(Platform::Spotify),
      playlist_id,
      DayWindow { from: params.from, to: params.to },
    )
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(series))
}
