//! The `MetricsStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `tally-store-sqlite`).
//! Higher layers (`tally-engine`, `tally-api`) depend on this abstraction,
//! not on any concrete backend.
//!
//! Every operation is tenant-scoped: entity lookups resolve only within the
//! given tenant, and no query crosses a tenant boundary.

use std::future::Future;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  catalog::{NewPlaylist, NewTrack, Platform, Playlist, Track},
  health::{CataloguePoint, HealthSnapshot},
  reconcile::{ConservationReport, DailyTotal, LagCredit, RecomputeReport},
  snapshot::{
    DatedDelta, FollowerSnapshot, NewFollowerSnapshot, NewStreamSnapshot,
    StreamDelta, StreamSnapshot,
  },
  tenant::Tenant,
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// An optional inclusive date window for series queries. An unbounded side
/// means "from the beginning" / "to the latest".
#[derive(Debug, Clone, Copy, Default)]
pub struct DayWindow {
  pub from: Option<NaiveDate>,
  pub to:   Option<NaiveDate>,
}

impl DayWindow {
  pub fn through(to: NaiveDate) -> Self { Self { from: None, to: Some(to) } }

  pub fn contains(&self, day: NaiveDate) -> bool {
    self.from.is_none_or(|f| day >= f) && self.to.is_none_or(|t| day <= t)
  }
}

/// One point of a per-entity delta series.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SeriesPoint {
  pub date:  NaiveDate,
  pub value: u64,
}

/// One point of a playlist follower series: the raw cumulative count plus
/// the derived daily increment (absent until recompute has covered the date).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FollowerPoint {
  pub date:      NaiveDate,
  pub followers: u64,
  pub delta:     Option<u64>,
}

/// A track ranked by its delta on a single day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopTrackDelta {
  pub track: Track,
  pub delta: u64,
}

/// Rows removed by a retention or compression pass.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PruneOutcome {
  pub stream_rows:   usize,
  pub follower_rows: usize,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Tally metrics store backend.
///
/// Raw snapshots are upsert-only inputs; derived rows (deltas, daily totals,
/// lag credits) are written exclusively through the recompute/reconcile
/// operations so that every mutation of the durable record flows through one
/// contract. All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait MetricsStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Tenants ───────────────────────────────────────────────────────────

  /// Create and persist a new tenant.
  fn add_tenant(
    &self,
    display_name: String,
  ) -> impl Future<Output = Result<Tenant, Self::Error>> + Send + '_;

  /// Retrieve a tenant by id. Returns `None` if not found.
  fn get_tenant(
    &self,
    tenant_id: Uuid,
  ) -> impl Future<Output = Result<Option<Tenant>, Self::Error>> + Send + '_;

  fn list_tenants(
    &self,
  ) -> impl Future<Output = Result<Vec<Tenant>, Self::Error>> + Send + '_;

  /// Delete a tenant and, by cascade, every row it owns: tracks, playlists,
  /// snapshots, deltas, daily totals, lag credits, health snapshots.
  fn remove_tenant(
    &self,
    tenant_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Catalogue dimensions ──────────────────────────────────────────────

  /// Register a track. Fails if the tenant already has a track with the
  /// same external code.
  fn add_track(
    &self,
    input: NewTrack,
  ) -> impl Future<Output = Result<Track, Self::Error>> + Send + '_;

  /// Get-or-create by `(tenant, external_code)` — the first-ingestion path.
  /// Metadata on `input` is only applied when the row is created.
  fn ensure_track(
    &self,
    input: NewTrack,
  ) -> impl Future<Output = Result<Track, Self::Error>> + Send + '_;

  fn get_track(
    &self,
    tenant_id: Uuid,
    track_id: Uuid,
  ) -> impl Future<Output = Result<Option<Track>, Self::Error>> + Send + '_;

  fn get_track_by_code<'a>(
    &'a self,
    tenant_id: Uuid,
    external_code: &'a str,
  ) -> impl Future<Output = Result<Option<Track>, Self::Error>> + Send + 'a;

  fn list_tracks(
    &self,
    tenant_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Track>, Self::Error>> + Send + '_;

  /// Remove a track and its snapshots, deltas, and health rows. Daily
  /// totals and lag credits are left untouched: they are the durable
  /// reconciled record and do not depend on the dimension row.
  fn remove_track(
    &self,
    tenant_id: Uuid,
    track_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn add_playlist(
    &self,
    input: NewPlaylist,
  ) -> impl Future<Output = Result<Playlist, Self::Error>> + Send + '_;

  /// Get-or-create by `(tenant, external_code)`, as [`Self::ensure_track`].
  fn ensure_playlist(
    &self,
    input: NewPlaylist,
  ) -> impl Future<Output = Result<Playlist, Self::Error>> + Send + '_;

  fn get_playlist(
    &self,
    tenant_id: Uuid,
    playlist_id: Uuid,
  ) -> impl Future<Output = Result<Option<Playlist>, Self::Error>> + Send + '_;

  fn list_playlists(
    &self,
    tenant_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Playlist>, Self::Error>> + Send + '_;

  fn remove_playlist(
    &self,
    tenant_id: Uuid,
    playlist_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Fact store — snapshot upserts ─────────────────────────────────────

  /// Upsert a cumulative play-count snapshot. Validates at the boundary:
  /// the date must not be in the future, the value must fit the storable
  /// range, and the track must exist under the tenant. Re-applying the same
  /// key/value overwrites in place; no delta is computed here.
  fn upsert_stream_snapshot(
    &self,
    input: NewStreamSnapshot,
  ) -> impl Future<Output = Result<StreamSnapshot, Self::Error>> + Send + '_;

  /// All snapshots for one track on one platform, ascending by date.
  fn stream_snapshots(
    &self,
    tenant_id: Uuid,
    platform: Platform,
    track_id: Uuid,
  ) -> impl Future<Output = Result<Vec<StreamSnapshot>, Self::Error>> + Send + '_;

  /// Upsert a cumulative follower-count snapshot; same contract as
  /// [`Self::upsert_stream_snapshot`].
  fn upsert_follower_snapshot(
    &self,
    input: NewFollowerSnapshot,
  ) -> impl Future<Output = Result<FollowerSnapshot, Self::Error>> + Send + '_;

  /// All snapshots for one playlist on one platform, ascending by date.
  fn follower_snapshots(
    &self,
    tenant_id: Uuid,
    platform: Platform,
    playlist_id: Uuid,
  ) -> impl Future<Output = Result<Vec<FollowerSnapshot>, Self::Error>> + Send + '_;

  // ── Derived rows — written only by recompute/reconcile ────────────────

  /// Atomically replace one track's delta rows dated `since` onward (all of
  /// them when `since` is `None`) and fold every affected day into the
  /// tenant's daily totals: non-finalized days are overwritten in place,
  /// finalized days receive a lag credit instead. Affected days are the
  /// union of previously stored and newly supplied delta dates inside the
  /// window, so volume leaving a day is folded back too. `deltas` must all
  /// fall inside the window.
  ///
  /// The whole operation is one transaction; readers never observe a
  /// partially replaced window, and re-running with identical inputs is a
  /// no-op on totals and credits.
  fn commit_track_recompute(
    &self,
    tenant_id: Uuid,
    platform: Platform,
    track_id: Uuid,
    since: Option<NaiveDate>,
    deltas: Vec<DatedDelta>,
  ) -> impl Future<Output = Result<RecomputeReport, Self::Error>> + Send + '_;

  /// Atomically replace one playlist's delta rows dated `since` onward.
  /// Follower deltas are an independent derivation stream and do not feed
  /// daily totals.
  fn commit_playlist_recompute(
    &self,
    tenant_id: Uuid,
    platform: Platform,
    playlist_id: Uuid,
    since: Option<NaiveDate>,
    deltas: Vec<DatedDelta>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Stored deltas for one track on one platform, ascending by date.
  fn stream_deltas(
    &self,
    tenant_id: Uuid,
    platform: Platform,
    track_id: Uuid,
  ) -> impl Future<Output = Result<Vec<StreamDelta>, Self::Error>> + Send + '_;

  /// Mark every non-finalized daily total with `day <= through` as
  /// finalized. Returns the number of days finalized.
  fn finalize_daily_totals(
    &self,
    tenant_id: Uuid,
    through: NaiveDate,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Reads — serving layer ─────────────────────────────────────────────

  fn daily_totals(
    &self,
    tenant_id: Uuid,
    window: DayWindow,
  ) -> impl Future<Output = Result<Vec<DailyTotal>, Self::Error>> + Send + '_;

  fn lag_credits(
    &self,
    tenant_id: Uuid,
    window: DayWindow,
  ) -> impl Future<Output = Result<Vec<LagCredit>, Self::Error>> + Send + '_;

  /// Top tracks by summed delta across platforms on a single day.
  fn top_track_deltas(
    &self,
    tenant_id: Uuid,
    day: NaiveDate,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<TopTrackDelta>, Self::Error>> + Send + '_;

  fn track_delta_series(
    &self,
    tenant_id: Uuid,
    platform: Platform,
    track_id: Uuid,
    window: DayWindow,
  ) -> impl Future<Output = Result<Vec<SeriesPoint>, Self::Error>> + Send + '_;

  fn follower_series(
    &self,
    tenant_id: Uuid,
    platform: Platform,
    playlist_id: Uuid,
    window: DayWindow,
  ) -> impl Future<Output = Result<Vec<FollowerPoint>, Self::Error>> + Send + '_;

  /// Per-entity delta sums against latest cumulative values, plus the
  /// tenant-level totals/credits sums, for the conservation diagnostic.
  fn conservation_report(
    &self,
    tenant_id: Uuid,
  ) -> impl Future<Output = Result<ConservationReport, Self::Error>> + Send + '_;

  // ── Catalogue health ──────────────────────────────────────────────────

  /// Upsert one platform's availability flag for `(tenant, track,
  /// check_date)`; the other platform's flag is left as it was.
  fn record_health(
    &self,
    tenant_id: Uuid,
    track_id: Uuid,
    check_date: NaiveDate,
    platform: Platform,
    available: bool,
  ) -> impl Future<Output = Result<HealthSnapshot, Self::Error>> + Send + '_;

  fn health_snapshots(
    &self,
    tenant_id: Uuid,
    window: DayWindow,
  ) -> impl Future<Output = Result<Vec<HealthSnapshot>, Self::Error>> + Send + '_;

  /// Per check date: tracks available on at least one platform vs tracks
  /// checked at all.
  fn catalogue_size_series(
    &self,
    tenant_id: Uuid,
  ) -> impl Future<Output = Result<Vec<CataloguePoint>, Self::Error>> + Send + '_;

  // ── Retention & compression ───────────────────────────────────────────

  /// Delete raw snapshots dated strictly before `cutoff`. Refused, with no
  /// partial effect, if any daily total at or before `cutoff` is not yet
  /// finalized. Never touches daily totals or lag credits.
  fn prune_snapshots(
    &self,
    tenant_id: Uuid,
    cutoff: NaiveDate,
  ) -> impl Future<Output = Result<PruneOutcome, Self::Error>> + Send + '_;

  /// Collapse each entity's snapshots dated strictly before `cutoff` down
  /// to its single most recent one, preserving the baseline for future
  /// delta derivation. Same finalization guard as [`Self::prune_snapshots`].
  fn compress_snapshots(
    &self,
    tenant_id: Uuid,
    cutoff: NaiveDate,
  ) -> impl Future<Output = Result<PruneOutcome, Self::Error>> + Send + '_;
}
