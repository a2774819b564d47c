//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::NaiveDate;
use tally_core::{
  catalog::{NewPlaylist, NewTrack, Platform},
  snapshot::{DatedDelta, NewStreamSnapshot},
  store::{DayWindow, MetricsStore},
};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn day(d: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
}

async fn tenant(s: &SqliteStore) -> Uuid {
  s.add_tenant("Test Label".into()).await.unwrap().tenant_id
}

async fn track(s: &SqliteStore, tenant_id: Uuid, code: &str) -> Uuid {
  s.add_track(NewTrack::new(tenant_id, code)).await.unwrap().track_id
}

fn snapshot(
  tenant_id: Uuid,
  track_id: Uuid,
  date: NaiveDate,
  playcount: u64,
) -> NewStreamSnapshot {
  NewStreamSnapshot {
    tenant_id,
    platform: Platform::Spotify,
    track_id,
    date,
    playcount,
  }
}

// ─── Tenants ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_get_tenant() {
  let s = store().await;

  let t = s.add_tenant("Ivory Coast Records".into()).await.unwrap();
  let fetched = s.get_tenant(t.tenant_id).await.unwrap().unwrap();
  assert_eq!(fetched.tenant_id, t.tenant_id);
  assert_eq!(fetched.display_name, "Ivory Coast Records");
}

#[tokio::test]
async fn get_tenant_missing_returns_none() {
  let s = store().await;
  assert!(s.get_tenant(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn remove_tenant_cascades_to_everything() {
  let s = store().await;
  let tid = tenant(&s).await;
  let track_id = track(&s, tid, "GBAYE2500001").await;

  s.upsert_stream_snapshot(snapshot(tid, track_id, day(1), 100))
    .await
    .unwrap();
  s.commit_track_recompute(
    tid,
    Platform::Spotify,
    track_id,
    None,
    vec![DatedDelta { date: day(1), delta: 100 }],
  )
  .await
  .unwrap();
  s.record_health(tid, track_id, day(1), Platform::Spotify, true)
    .await
    .unwrap();

  s.remove_tenant(tid).await.unwrap();

  assert!(s.get_track(tid, track_id).await.unwrap().is_none());
  assert!(s.daily_totals(tid, DayWindow::default()).await.unwrap().is_empty());
  assert!(
    s.health_snapshots(tid, DayWindow::default()).await.unwrap().is_empty()
  );
}

#[tokio::test]
async fn remove_missing_tenant_errors() {
  let s = store().await;
  let err = s.remove_tenant(Uuid::new_v4()).await.unwrap_err();
  assert!(matches!(err, crate::Error::TenantNotFound(_)));
}

// ─── Catalogue dimensions ────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_external_code_rejected_within_tenant() {
  let s = store().await;
  let tid = tenant(&s).await;
  track(&s, tid, "USRC17607839").await;

  let err = s
    .add_track(NewTrack::new(tid, "USRC17607839"))
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::DuplicateExternalCode { .. }));
}

#[tokio::test]
async fn same_external_code_allowed_across_tenants() {
  let s = store().await;
  let a = tenant(&s).await;
  let b = tenant(&s).await;

  let ta = track(&s, a, "USRC17607839").await;
  let tb = track(&s, b, "USRC17607839").await;
  assert_ne!(ta, tb);
}

#[tokio::test]
async fn ensure_track_is_get_or_create() {
  let s = store().await;
  let tid = tenant(&s).await;

  let mut input = NewTrack::new(tid, "GBAYE2500001");
  input.title = Some("First Light".into());
  let created = s.ensure_track(input).await.unwrap();

  // Second call returns the same row; new metadata is not applied.
  let mut again = NewTrack::new(tid, "GBAYE2500001");
  again.title = Some("Renamed".into());
  let found = s.ensure_track(again).await.unwrap();

  assert_eq!(found.track_id, created.track_id);
  assert_eq!(found.title.as_deref(), Some("First Light"));
}

#[tokio::test]
async fn track_lookup_is_tenant_scoped() {
  let s = store().await;
  let a = tenant(&s).await;
  let b = tenant(&s).await;
  let track_a = track(&s, a, "GBAYE2500001").await;

  // The row exists, but not under tenant B.
  assert!(s.get_track(b, track_a).await.unwrap().is_none());
}

#[tokio::test]
async fn remove_track_keeps_daily_totals() {
  let s = store().await;
  let tid = tenant(&s).await;
  let track_id = track(&s, tid, "GBAYE2500001").await;

  s.upsert_stream_snapshot(snapshot(tid, track_id, day(1), 100))
    .await
    .unwrap();
  s.commit_track_recompute(
    tid,
    Platform::Spotify,
    track_id,
    None,
    vec![DatedDelta { date: day(1), delta: 100 }],
  )
  .await
  .unwrap();

  s.remove_track(tid, track_id).await.unwrap();

  assert!(
    s.stream_snapshots(tid, Platform::Spotify, track_id)
      .await
      .unwrap()
      .is_empty()
  );
  let totals = s.daily_totals(tid, DayWindow::default()).await.unwrap();
  assert_eq!(totals.len(), 1);
  assert_eq!(totals[0].total_delta, 100);
}

// ─── Snapshot upserts ────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_rejects_future_date() {
  let s = store().await;
  let tid = tenant(&s).await;
  let track_id = track(&s, tid, "GBAYE2500001").await;

  let tomorrow = chrono::Utc::now().date_naive().succ_opt().unwrap();
  let err = s
    .upsert_stream_snapshot(snapshot(tid, track_id, tomorrow, 100))
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::FutureDate(_)));
}

#[tokio::test]
async fn upsert_rejects_value_out_of_range() {
  let s = store().await;
  let tid = tenant(&s).await;
  let track_id = track(&s, tid, "GBAYE2500001").await;

  let err = s
    .upsert_stream_snapshot(snapshot(tid, track_id, day(1), u64::MAX))
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::ValueOutOfRange(_)));
}

#[tokio::test]
async fn upsert_rejects_unknown_track() {
  let s = store().await;
  let tid = tenant(&s).await;

  let err = s
    .upsert_stream_snapshot(snapshot(tid, Uuid::new_v4(), day(1), 100))
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::TrackNotFound(_)));
}

#[tokio::test]
async fn upsert_rejects_other_tenants_track() {
  let s = store().await;
  let a = tenant(&s).await;
  let b = tenant(&s).await;
  let track_a = track(&s, a, "GBAYE2500001").await;

  let err = s
    .upsert_stream_snapshot(snapshot(b, track_a, day(1), 100))
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::TrackNotFound(_)));
}

#[tokio::test]
async fn upsert_overwrites_same_key() {
  let s = store().await;
  let tid = tenant(&s).await;
  let track_id = track(&s, tid, "GBAYE2500001").await;

  s.upsert_stream_snapshot(snapshot(tid, track_id, day(1), 100))
    .await
    .unwrap();
  s.upsert_stream_snapshot(snapshot(tid, track_id, day(1), 120))
    .await
    .unwrap();

  let snaps =
    s.stream_snapshots(tid, Platform::Spotify, track_id).await.unwrap();
  assert_eq!(snaps.len(), 1);
  assert_eq!(snaps[0].playcount, 120);
}

#[tokio::test]
async fn snapshots_ordered_by_date_per_platform() {
  let s = store().await;
  let tid = tenant(&s).await;
  let track_id = track(&s, tid, "GBAYE2500001").await;

  s.upsert_stream_snapshot(snapshot(tid, track_id, day(3), 180))
    .await
    .unwrap();
  s.upsert_stream_snapshot(snapshot(tid, track_id, day(1), 100))
    .await
    .unwrap();
  let mut apple = snapshot(tid, track_id, day(2), 40);
  apple.platform = Platform::AppleMusic;
  s.upsert_stream_snapshot(apple).await.unwrap();

  let spotify =
    s.stream_snapshots(tid, Platform::Spotify, track_id).await.unwrap();
  let dates: Vec<NaiveDate> = spotify.iter().map(|s| s.date).collect();
  assert_eq!(dates, [day(1), day(3)]);
}

// ─── Recompute commit ────────────────────────────────────────────────────────

#[tokio::test]
async fn windowed_commit_leaves_earlier_deltas_alone() {
  let s = store().await;
  let tid = tenant(&s).await;
  let track_id = track(&s, tid, "GBAYE2500001").await;

  s.commit_track_recompute(
    tid,
    Platform::Spotify,
    track_id,
    None,
    vec![
      DatedDelta { date: day(1), delta: 100 },
      DatedDelta { date: day(2), delta: 50 },
    ],
  )
  .await
  .unwrap();

  // Rewrite only day 2 onward.
  s.commit_track_recompute(
    tid,
    Platform::Spotify,
    track_id,
    Some(day(2)),
    vec![DatedDelta { date: day(2), delta: 30 }],
  )
  .await
  .unwrap();

  let deltas =
    s.stream_deltas(tid, Platform::Spotify, track_id).await.unwrap();
  let values: Vec<u64> = deltas.iter().map(|d| d.delta).collect();
  assert_eq!(values, [100, 30]);
}

#[tokio::test]
async fn commit_folds_volume_out_of_an_abandoned_day() {
  let s = store().await;
  let tid = tenant(&s).await;
  let track_id = track(&s, tid, "GBAYE2500001").await;

  s.commit_track_recompute(
    tid,
    Platform::Spotify,
    track_id,
    None,
    vec![
      DatedDelta { date: day(1), delta: 100 },
      DatedDelta { date: day(2), delta: 50 },
    ],
  )
  .await
  .unwrap();

  // A later derivation no longer attributes anything to day 2.
  s.commit_track_recompute(
    tid,
    Platform::Spotify,
    track_id,
    None,
    vec![DatedDelta { date: day(1), delta: 150 }],
  )
  .await
  .unwrap();

  let totals = s.daily_totals(tid, DayWindow::default()).await.unwrap();
  let by_day: Vec<(NaiveDate, u64)> =
    totals.iter().map(|t| (t.day, t.total_delta)).collect();
  assert_eq!(by_day, [(day(1), 150), (day(2), 0)]);
}

#[tokio::test]
async fn finalize_marks_days_and_reports_count() {
  let s = store().await;
  let tid = tenant(&s).await;
  let track_id = track(&s, tid, "GBAYE2500001").await;

  s.commit_track_recompute(
    tid,
    Platform::Spotify,
    track_id,
    None,
    vec![
      DatedDelta { date: day(1), delta: 100 },
      DatedDelta { date: day(2), delta: 50 },
      DatedDelta { date: day(3), delta: 25 },
    ],
  )
  .await
  .unwrap();

  assert_eq!(s.finalize_daily_totals(tid, day(2)).await.unwrap(), 2);
  // Already-finalized days are not re-finalized.
  assert_eq!(s.finalize_daily_totals(tid, day(2)).await.unwrap(), 0);

  let totals = s.daily_totals(tid, DayWindow::default()).await.unwrap();
  assert!(totals[0].finalized && totals[0].finalized_at.is_some());
  assert!(totals[1].finalized);
  assert!(!totals[2].finalized);
}

// ─── Serving reads ───────────────────────────────────────────────────────────

#[tokio::test]
async fn daily_totals_respect_the_window() {
  let s = store().await;
  let tid = tenant(&s).await;
  let track_id = track(&s, tid, "GBAYE2500001").await;

  s.commit_track_recompute(
    tid,
    Platform::Spotify,
    track_id,
    None,
    (1..=5)
      .map(|d| DatedDelta { date: day(d), delta: u64::from(d) })
      .collect(),
  )
  .await
  .unwrap();

  let window = DayWindow { from: Some(day(2)), to: Some(day(4)) };
  let totals = s.daily_totals(tid, window).await.unwrap();
  let days: Vec<NaiveDate> = totals.iter().map(|t| t.day).collect();
  assert_eq!(days, [day(2), day(3), day(4)]);
}

#[tokio::test]
async fn top_track_deltas_ranks_and_limits() {
  let s = store().await;
  let tid = tenant(&s).await;
  let quiet = track(&s, tid, "GBAYE2500001").await;
  let loud = track(&s, tid, "GBAYE2500002").await;

  s.commit_track_recompute(
    tid,
    Platform::Spotify,
    quiet,
    None,
    vec![DatedDelta { date: day(1), delta: 10 }],
  )
  .await
  .unwrap();
  s.commit_track_recompute(
    tid,
    Platform::Spotify,
    loud,
    None,
    vec![DatedDelta { date: day(1), delta: 90 }],
  )
  .await
  .unwrap();
  // The loud track also plays on Apple Music; the ranking sums platforms.
  s.commit_track_recompute(
    tid,
    Platform::AppleMusic,
    loud,
    None,
    vec![DatedDelta { date: day(1), delta: 15 }],
  )
  .await
  .unwrap();

  let top = s.top_track_deltas(tid, day(1), 1).await.unwrap();
  assert_eq!(top.len(), 1);
  assert_eq!(top[0].track.track_id, loud);
  assert_eq!(top[0].delta, 105);
}

#[tokio::test]
async fn no_read_crosses_tenants() {
  let s = store().await;
  let a = tenant(&s).await;
  let b = tenant(&s).await;
  let track_a = track(&s, a, "GBAYE2500001").await;

  s.commit_track_recompute(
    a,
    Platform::Spotify,
    track_a,
    None,
    vec![DatedDelta { date: day(1), delta: 100 }],
  )
  .await
  .unwrap();

  assert!(s.daily_totals(b, DayWindow::default()).await.unwrap().is_empty());
  assert!(s.top_track_deltas(b, day(1), 10).await.unwrap().is_empty());
  assert!(s.list_tracks(b).await.unwrap().is_empty());
}

// ─── Catalogue health ────────────────────────────────────────────────────────

#[tokio::test]
async fn record_health_upserts_one_platform_at_a_time() {
  let s = store().await;
  let tid = tenant(&s).await;
  let track_id = track(&s, tid, "GBAYE2500001").await;

  let after_spotify = s
    .record_health(tid, track_id, day(1), Platform::Spotify, true)
    .await
    .unwrap();
  assert_eq!(after_spotify.spotify_ok, Some(true));
  assert_eq!(after_spotify.apple_music_ok, None);

  let after_apple = s
    .record_health(tid, track_id, day(1), Platform::AppleMusic, false)
    .await
    .unwrap();
  assert_eq!(after_apple.spotify_ok, Some(true));
  assert_eq!(after_apple.apple_music_ok, Some(false));

  // Re-checking overwrites in place: still one row for the day.
  s.record_health(tid, track_id, day(1), Platform::AppleMusic, true)
    .await
    .unwrap();
  let snaps = s.health_snapshots(tid, DayWindow::default()).await.unwrap();
  assert_eq!(snaps.len(), 1);
  assert_eq!(snaps[0].apple_music_ok, Some(true));
}

#[tokio::test]
async fn catalogue_size_series_counts_available_tracks() {
  let s = store().await;
  let tid = tenant(&s).await;
  let live = track(&s, tid, "GBAYE2500001").await;
  let gone = track(&s, tid, "GBAYE2500002").await;

  s.record_health(tid, live, day(1), Platform::Spotify, true)
    .await
    .unwrap();
  s.record_health(tid, gone, day(1), Platform::Spotify, false)
    .await
    .unwrap();
  s.record_health(tid, gone, day(1), Platform::AppleMusic, false)
    .await
    .unwrap();

  let series = s.catalogue_size_series(tid).await.unwrap();
  assert_eq!(series.len(), 1);
  assert_eq!(series[0].available_tracks, 1);
  assert_eq!(series[0].checked_tracks, 2);
}
