//! Operator/scheduler-facing batch endpoints, mirroring the manual trigger
//! surface of the collection worker.

use axum::{Json, extract::State};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tally_core::{catalog::Platform, store::MetricsStore};
use uuid::Uuid;

use crate::{AppState, Error};

// ─── Recompute ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RecomputeRequest {
  pub tenant_id: Uuid,
  /// Opens the rewrite window; `None` re-derives everything, which assumes
  /// raw history has not been compacted.
  pub since:     Option<NaiveDate>,
}

/// `POST /admin/recompute` — re-derive every entity for a tenant.
///
/// Restartable at any point: each entity's recompute is idempotent, so a
/// pass that died halfway is simply run again.
pub async fn recompute(
  State(state): State<AppState>,
  Json(body): Json<RecomputeRequest>,
) -> Result<Json<serde_json::Value>, Error> {
  let tracks = state.store().list_tracks(body.tenant_id).await?;
  let playlists = state.store().list_playlists(body.tenant_id).await?;

  let mut entities = 0usize;
  let mut credits = 0usize;
  for track in &tracks {
    for platform in Platform::ALL {
      let report = state
        .engine
        .recompute_track(body.tenant_id, platform, track.track_id, body.since)
        .await?;
      entities += 1;
      credits += report.credited.len();
    }
  }
  for playlist in &playlists {
    for platform in Platform::ALL {
      state
        .engine
        .recompute_playlist(
          body.tenant_id,
          platform,
          playlist.playlist_id,
          body.since,
        )
        .await?;
      entities += 1;
    }
  }

  Ok(Json(json!({ "entities": entities, "credits_recorded": credits })))
}

// ─── Finalize ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
  pub tenant_id: Uuid,
}

/// `POST /admin/finalize` — freeze every eligible day, then log the
/// conservation diagnostic.
pub async fn finalize(
  State(state): State<AppState>,
  Json(body): Json<FinalizeRequest>,
) -> Result<Json<serde_json::Value>, Error> {
  let frozen = state.engine.finalize_sweep(body.tenant_id).await?;
  let report = state.engine.check_conservation(body.tenant_id).await?;

  Ok(Json(json!({
    "days_finalized": frozen,
    "total_delta_sum": report.total_delta_sum,
    "credit_sum": report.credit_sum,
    "anomalies": report.anomalies().count(),
  })))
}

// ─── Retention ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RetentionRequest {
  pub tenant_id: Uuid,
  /// Raw snapshots dated strictly before this day are affected.
  pub cutoff:    NaiveDate,
  /// `true` keeps one baseline row per entity instead of deleting outright.
  #[serde(default)]
  pub compress:  bool,
}

/// `POST /admin/retention`
pub async fn retention(
  State(state): State<AppState>,
  Json(body): Json<RetentionRequest>,
) -> Result<Json<serde_json::Value>, Error> {
  let outcome = if body.compress {
    state.engine.apply_compression(body.tenant_id, body.cutoff).await?
  } else {
    state.engine.apply_retention(body.tenant_id, body.cutoff).await?
  };

  Ok(Json(json!({
    "stream_rows": outcome.stream_rows,
    "follower_rows": outcome.follower_rows,
  })))
}
