//! Handlers for `/streams` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/streams/daily-totals` | `?tenant_id` required; optional `from`, `to` |
//! | `GET`  | `/streams/lag-credits` | Same parameters |
//! | `GET`  | `/streams/top-deltas` | `?tenant_id&day` required; optional `limit` |
//! | `GET`  | `/streams/tracks/:id/series` | Optional `platform` (default spotify) |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::NaiveDate;
use serde::Deserialize;
use tally_core::{
  catalog::Platform,
  reconcile::{DailyTotal, LagCredit},
  store::{DayWindow, MetricsStore, SeriesPoint, TopTrackDelta},
};
use uuid::Uuid;

use crate::error::ApiError;

// ─── Shared parameters ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct WindowParams {
  pub tenant_id: Uuid,
  pub from:      Option<NaiveDate>,
  pub to:        Option<NaiveDate>,
}

impl WindowParams {
  fn window(&self) -> DayWindow {
    DayWindow { from: self.from, to: self.to }
  }
}

// ─── Daily totals ─────────────────────────────────────────────────────────────

/// `GET /streams/daily-totals?tenant_id=<id>[&from=...][&to=...]`
pub async fn daily_totals<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<WindowParams>,
) -> Result<Json<Vec<DailyTotal>>, ApiError>
where
  S: MetricsStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let totals = store
    .daily_totals(params.tenant_id, params.window())
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(totals))
}

/// `GET /streams/lag-credits?tenant_id=<id>[&from=...][&to=...]`
pub async fn lag_credits<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<WindowParams>,
) -> Result<Json<Vec<LagCredit>>, ApiError>
where
  S: MetricsStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let credits = store
    .lag_credits(params.tenant_id, params.window())
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(credits))
}

// ─── Top deltas ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TopParams {
  pub tenant_id: Uuid,
  pub day:       NaiveDate,
  pub limit:     Option<usize>,
}

/// `GET /streams/top-deltas?tenant_id=<id>&day=<date>[&limit=10]`
pub async fn top_deltas<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<TopParams>,
) -> Result<Json<Vec<TopTrackDelta>>, ApiError>
where
  S: MetricsStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let top = store
    .top_track_deltas(params.tenant_id, params.day, params.limit.unwrap_or(10))
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(top))
}

// ─── Per-track series ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SeriesParams {
  pub tenant_id: Uuid,
  pub platform:  Option<Platform>,
  pub from:      Option<NaiveDate>,
  pub to:        Option<NaiveDate>,
}

/// `GET /streams/tracks/:id/series?tenant_id=<id>[&platform=spotify]`
pub async fn track_series<S>(
  State(store): State<Arc<S>>,
  Path(track_id): Path<Uuid>,
  Query(params): Query<SeriesParams>,
) -> Result<Json<Vec<SeriesPoint>>, ApiError>
where
  S: MetricsStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  store
    .get_track(params.tenant_id, track_id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("track {track_id}")))?;

  let series = store
    .track_delta_series(
      params.tenant_id,
      params.platform.unwrap_or(Platform::Spotify),
      track_id,
      DayWindow { from: params.from, to: params.to },
    )
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(series))
}
