//! Collector-facing ingestion endpoints.
//!
//! The collector pushes `(tenant, platform, external_code, date, value)`
//! tuples with no ordering guarantee across entities. Dimension rows are
//! created on first ingestion; each accepted snapshot triggers a windowed
//! recompute for its entity before the response is sent.

use axum::{Json, extract::State};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tally_core::{
  catalog::{NewPlaylist, NewTrack, Platform},
  snapshot::{NewFollowerSnapshot, NewStreamSnapshot},
  store::MetricsStore,
};
use uuid::Uuid;

use crate::{AppState, Error};

// ─── Streams ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StreamReading {
  pub tenant_id: Uuid,
  pub platform:  Platform,
  /// ISRC-equivalent catalogue identifier; the track row is created on
  /// first sight.
  pub isrc:      String,
  pub date:      NaiveDate,
  pub playcount: u64,
  pub title:     Option<String>,
  pub artist:    Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IngestOutcome {
  pub entity_id:   Uuid,
  pub delta_rows:  usize,
  pub days_folded: Vec<NaiveDate>,
  pub credited:    Vec<(NaiveDate, i64)>,
}

/// `POST /ingest/streams`
pub async fn streams(
  State(state): State<AppState>,
  Json(body): Json<StreamReading>,
) -> Result<Json<IngestOutcome>, Error> {
  let mut input = NewTrack::new(body.tenant_id, body.isrc);
  input.title = body.title;
  input.artist = body.artist;
  let track = state.store().ensure_track(input).await?;

  let report = state
    .engine
    .ingest_stream(NewStreamSnapshot {
      tenant_id: body.tenant_id,
      platform:  body.platform,
      track_id:  track.track_id,
      date:      body.date,
      playcount: body.playcount,
    })
    .await?;

  Ok(Json(IngestOutcome {
    entity_id:   track.track_id,
    delta_rows:  report.delta_rows,
    days_folded: report.days_folded,
    credited:    report.credited,
  }))
}

// ─── Followers ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct FollowerReading {
  pub tenant_id:   Uuid,
  pub platform:    Platform,
  /// Platform playlist identifier; the playlist row is created on first
  /// sight.
  pub playlist_id: String,
  pub date:        NaiveDate,
  pub followers:   u64,
  pub name:        Option<String>,
}

/// `POST /ingest/followers`
pub async fn followers(
  State(state): State<AppState>,
  Json(body): Json<FollowerReading>,
) -> Result<Json<serde_json::Value>, Error> {
  let mut input = NewPlaylist::new(body.tenant_id, body.playlist_id);
  input.name = body.name;
  let playlist = state.store().ensure_playlist(input).await?;

  let delta_rows = state
    .engine
    .ingest_follower(NewFollowerSnapshot {
      tenant_id:   body.tenant_id,
      platform:    body.platform,
      playlist_id: playlist.playlist_id,
      date:        body.date,
      followers:   body.followers,
    })
    .await?;

  Ok(Json(json!({
    "entity_id": playlist.playlist_id,
    "delta_rows": delta_rows,
  })))
}

// ─── Health checks ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HealthReading {
  pub tenant_id:  Uuid,
  pub track_id:   Uuid,
  pub check_date: NaiveDate,
  pub platform:   Platform,
  pub available:  bool,
}

/// `POST /ingest/health-checks`
pub async fn health_checks(
  State(state): State<AppState>,
  Json(body): Json<HealthReading>,
) -> Result<Json<serde_json::Value>, Error> {
  let snapshot = state
    .store()
    .record_health(
      body.tenant_id,
      body.track_id,
      body.check_date,
      body.platform,
      body.available,
    )
    .await?;

  Ok(Json(json!({
    "track_id": snapshot.track_id,
    "check_date": snapshot.check_date,
    "spotify_ok": snapshot.spotify_ok,
    "apple_music_ok": snapshot.apple_music_ok,
  })))
}
