//! Integration tests for the engine against an in-memory SQLite store.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tally_core::{
  catalog::{NewPlaylist, NewTrack, Platform},
  snapshot::{NewFollowerSnapshot, NewStreamSnapshot},
  store::{DayWindow, MetricsStore},
};
use tally_store_sqlite::SqliteStore;
use uuid::Uuid;

use crate::{Engine, EngineConfig, Error};

async fn engine() -> Engine<SqliteStore> {
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  Engine::new(Arc::new(store), EngineConfig::default())
}

fn day(d: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
}

async fn tenant_and_track(e: &Engine<SqliteStore>) -> (Uuid, Uuid) {
  let tenant = e.store().add_tenant("Bedroom Label".into()).await.unwrap();
  let track = e
    .store()
    .add_track(NewTrack::new(tenant.tenant_id, "GBAYE2500001"))
    .await
    .unwrap();
  (tenant.tenant_id, track.track_id)
}

async fn ingest(
  e: &Engine<SqliteStore>,
  tenant_id: Uuid,
  track_id: Uuid,
  date: NaiveDate,
  playcount: u64,
) {
  e.ingest_stream(NewStreamSnapshot {
    tenant_id,
    platform: Platform::Spotify,
    track_id,
    date,
    playcount,
  })
  .await
  .unwrap();
}

async fn totals_by_day(
  e: &Engine<SqliteStore>,
  tenant_id: Uuid,
) -> Vec<(NaiveDate, u64, bool)> {
  e.store()
    .daily_totals(tenant_id, DayWindow::default())
    .await
    .unwrap()
    .into_iter()
    .map(|t| (t.day, t.total_delta, t.finalized))
    .collect()
}

// ─── Delta derivation through the full stack ─────────────────────────────────

#[tokio::test]
async fn first_seen_and_increment() {
  let e = engine().await;
  let (tenant, track) = tenant_and_track(&e).await;

  ingest(&e, tenant, track, day(1), 100).await;
  ingest(&e, tenant, track, day(2), 150).await;

  let deltas = e
    .store()
    .stream_deltas(tenant, Platform::Spotify, track)
    .await
    .unwrap();
  let values: Vec<(NaiveDate, u64)> =
    deltas.iter().map(|d| (d.date, d.delta)).collect();
  assert_eq!(values, [(day(1), 100), (day(2), 50)]);

  assert_eq!(
    totals_by_day(&e, tenant).await,
    [(day(1), 100, false), (day(2), 50, false)]
  );
}

#[tokio::test]
async fn correction_before_finalization_rewrites_in_place() {
  let e = engine().await;
  let (tenant, track) = tenant_and_track(&e).await;

  ingest(&e, tenant, track, day(1), 100).await;
  ingest(&e, tenant, track, day(2), 150).await;
  // Pre-finalization correction: day 1 was actually 120.
  ingest(&e, tenant, track, day(1), 120).await;

  let deltas = e
    .store()
    .stream_deltas(tenant, Platform::Spotify, track)
    .await
    .unwrap();
  let values: Vec<u64> = deltas.iter().map(|d| d.delta).collect();
  assert_eq!(values, [120, 30]);

  assert_eq!(
    totals_by_day(&e, tenant).await,
    [(day(1), 120, false), (day(2), 30, false)]
  );

  // Nothing was credited: the days were still mutable.
  let credits =
    e.store().lag_credits(tenant, DayWindow::default()).await.unwrap();
  assert!(credits.is_empty());
}

#[tokio::test]
async fn correction_after_finalization_credits_the_day() {
  let e = engine().await;
  let (tenant, track) = tenant_and_track(&e).await;

  ingest(&e, tenant, track, day(1), 100).await;
  ingest(&e, tenant, track, day(2), 150).await;
  e.store().finalize_daily_totals(tenant, day(1)).await.unwrap();

  // Post-finalization correction raises day 1's true value to 120.
  ingest(&e, tenant, track, day(1), 120).await;

  // The frozen total is untouched; the difference became a credit. Day 2
  // was still mutable and re-derived as 150 - 120 = 30.
  assert_eq!(
    totals_by_day(&e, tenant).await,
    [(day(1), 100, true), (day(2), 30, false)]
  );

  let credits =
    e.store().lag_credits(tenant, DayWindow::default()).await.unwrap();
  assert_eq!(credits.len(), 1);
  assert_eq!(credits[0].day, day(1));
  assert_eq!(credits[0].moved_today, 20);
  assert_eq!(credits[0].moved_alltime, 20);
}

#[tokio::test]
async fn downward_revision_yields_negative_credit() {
  let e = engine().await;
  let (tenant, track) = tenant_and_track(&e).await;

  ingest(&e, tenant, track, day(1), 100).await;
  e.store().finalize_daily_totals(tenant, day(1)).await.unwrap();

  ingest(&e, tenant, track, day(1), 80).await;

  assert_eq!(totals_by_day(&e, tenant).await, [(day(1), 100, true)]);

  let credits =
    e.store().lag_credits(tenant, DayWindow::default()).await.unwrap();
  assert_eq!(credits[0].moved_today, -20);
  assert_eq!(credits[0].moved_alltime, -20);
}

#[tokio::test]
async fn rerun_recompute_is_a_noop() {
  let e = engine().await;
  let (tenant, track) = tenant_and_track(&e).await;

  ingest(&e, tenant, track, day(1), 100).await;
  ingest(&e, tenant, track, day(2), 150).await;
  let before = totals_by_day(&e, tenant).await;

  let report = e
    .recompute_track(tenant, Platform::Spotify, track, None)
    .await
    .unwrap();
  assert_eq!(report.delta_rows, 2);
  assert!(report.days_folded.is_empty());
  assert!(report.credited.is_empty());
  assert_eq!(totals_by_day(&e, tenant).await, before);

  // Still a no-op once the days are frozen: no phantom credits.
  e.store().finalize_daily_totals(tenant, day(2)).await.unwrap();
  let report = e
    .recompute_track(tenant, Platform::Spotify, track, None)
    .await
    .unwrap();
  assert!(report.credited.is_empty());
  let credits =
    e.store().lag_credits(tenant, DayWindow::default()).await.unwrap();
  assert!(credits.is_empty());
}

#[tokio::test]
async fn credit_is_not_double_counted_on_rerun() {
  let e = engine().await;
  let (tenant, track) = tenant_and_track(&e).await;

  ingest(&e, tenant, track, day(1), 100).await;
  e.store().finalize_daily_totals(tenant, day(1)).await.unwrap();
  ingest(&e, tenant, track, day(1), 120).await;

  // Recompute again over identical inputs: the +20 must not be re-applied.
  e.recompute_track(tenant, Platform::Spotify, track, None).await.unwrap();

  let credits =
    e.store().lag_credits(tenant, DayWindow::default()).await.unwrap();
  assert_eq!(credits[0].moved_alltime, 20);
}

#[tokio::test]
async fn missing_day_stays_absent() {
  let e = engine().await;
  let (tenant, track) = tenant_and_track(&e).await;

  ingest(&e, tenant, track, day(1), 100).await;
  ingest(&e, tenant, track, day(5), 130).await;

  let totals = totals_by_day(&e, tenant).await;
  assert_eq!(totals, [(day(1), 100, false), (day(5), 30, false)]);
  assert!(!totals.iter().any(|(d, ..)| *d == day(3)));
}

#[tokio::test]
async fn same_code_two_tenants_stay_independent() {
  let e = engine().await;

  let a = e.store().add_tenant("Tenant A".into()).await.unwrap();
  let b = e.store().add_tenant("Tenant B".into()).await.unwrap();
  let track_a = e
    .store()
    .add_track(NewTrack::new(a.tenant_id, "USRC17607839"))
    .await
    .unwrap();
  let track_b = e
    .store()
    .add_track(NewTrack::new(b.tenant_id, "USRC17607839"))
    .await
    .unwrap();
  assert_ne!(track_a.track_id, track_b.track_id);

  ingest(&e, a.tenant_id, track_a.track_id, day(1), 100).await;
  ingest(&e, b.tenant_id, track_b.track_id, day(1), 7).await;

  assert_eq!(totals_by_day(&e, a.tenant_id).await, [(day(1), 100, false)]);
  assert_eq!(totals_by_day(&e, b.tenant_id).await, [(day(1), 7, false)]);
}

// ─── Conservation ────────────────────────────────────────────────────────────

#[tokio::test]
async fn conservation_identity_holds_through_corrections() {
  let e = engine().await;
  let (tenant, track) = tenant_and_track(&e).await;

  ingest(&e, tenant, track, day(1), 100).await;
  ingest(&e, tenant, track, day(2), 150).await;
  e.store().finalize_daily_totals(tenant, day(1)).await.unwrap();
  ingest(&e, tenant, track, day(1), 120).await;

  let report = e.check_conservation(tenant).await.unwrap();
  assert_eq!(report.rows.len(), 1);
  assert_eq!(report.rows[0].latest_cumulative, 150);
  assert_eq!(report.rows[0].delta_sum, 150);
  assert_eq!(report.total_delta_sum as i64 + report.credit_sum, 150);
  assert_eq!(report.anomalies().count(), 0);
}

#[tokio::test]
async fn uncorrected_reset_is_flagged_not_failed() {
  let e = engine().await;
  let (tenant, track) = tenant_and_track(&e).await;

  // The counter regresses and never corrects upward: a platform reset.
  ingest(&e, tenant, track, day(1), 150).await;
  ingest(&e, tenant, track, day(2), 140).await;

  let report = e.check_conservation(tenant).await.unwrap();
  assert_eq!(report.anomalies().count(), 1);
  assert_eq!(report.rows[0].delta_sum, 150);
  assert_eq!(report.rows[0].latest_cumulative, 140);
}

// ─── Followers ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn follower_deltas_do_not_feed_daily_totals() {
  let e = engine().await;
  let tenant = e.store().add_tenant("Curator".into()).await.unwrap();
  let playlist = e
    .store()
    .add_playlist(NewPlaylist::new(tenant.tenant_id, "37i9dQZF1DXcBWIGoYBM5M"))
    .await
    .unwrap();

  e.ingest_follower(NewFollowerSnapshot {
    tenant_id:   tenant.tenant_id,
    platform:    Platform::Spotify,
    playlist_id: playlist.playlist_id,
    date:        day(1),
    followers:   5000,
  })
  .await
  .unwrap();
  e.ingest_follower(NewFollowerSnapshot {
    tenant_id:   tenant.tenant_id,
    platform:    Platform::Spotify,
    playlist_id: playlist.playlist_id,
    date:        day(2),
    followers:   5200,
  })
  .await
  .unwrap();

  let series = e
    .store()
    .follower_series(
      tenant.tenant_id,
      Platform::Spotify,
      playlist.playlist_id,
      DayWindow::default(),
    )
    .await
    .unwrap();
  assert_eq!(series.len(), 2);
  assert_eq!(series[0].delta, Some(5000));
  assert_eq!(series[1].delta, Some(200));

  // Follower volume never lands in the stream ledger.
  assert!(totals_by_day(&e, tenant.tenant_id).await.is_empty());
}

// ─── Retention & compression ─────────────────────────────────────────────────

#[tokio::test]
async fn retention_refused_inside_lag_window() {
  let e = engine().await;
  let (tenant, _) = tenant_and_track(&e).await;

  let today = Utc::now().date_naive();
  let err = e.apply_retention(tenant, today).await.unwrap_err();
  assert!(matches!(err, Error::RetentionWindow { .. }));
}

#[tokio::test]
async fn retention_refused_while_days_are_unfinalized() {
  let e = engine().await;
  let (tenant, track) = tenant_and_track(&e).await;

  ingest(&e, tenant, track, day(1), 100).await;

  let err = e.apply_retention(tenant, day(10)).await.unwrap_err();
  assert!(matches!(err, Error::Store(_)));

  // No partial effect: the raw rows are still there.
  let snaps = e
    .store()
    .stream_snapshots(tenant, Platform::Spotify, track)
    .await
    .unwrap();
  assert_eq!(snaps.len(), 1);
}

#[tokio::test]
async fn retention_drops_raw_but_keeps_the_reconciled_record() {
  let e = engine().await;
  let (tenant, track) = tenant_and_track(&e).await;

  ingest(&e, tenant, track, day(1), 100).await;
  ingest(&e, tenant, track, day(2), 150).await;
  e.store().finalize_daily_totals(tenant, day(31)).await.unwrap();

  let outcome = e.apply_retention(tenant, day(2)).await.unwrap();
  assert_eq!(outcome.stream_rows, 1);

  let snaps = e
    .store()
    .stream_snapshots(tenant, Platform::Spotify, track)
    .await
    .unwrap();
  assert_eq!(snaps.len(), 1);
  assert_eq!(snaps[0].date, day(2));

  // Daily totals survive retention untouched.
  assert_eq!(
    totals_by_day(&e, tenant).await,
    [(day(1), 100, true), (day(2), 50, true)]
  );
}

#[tokio::test]
async fn compression_keeps_the_baseline_for_future_deltas() {
  let e = engine().await;
  let (tenant, track) = tenant_and_track(&e).await;

  ingest(&e, tenant, track, day(1), 100).await;
  ingest(&e, tenant, track, day(2), 120).await;
  ingest(&e, tenant, track, day(3), 150).await;
  e.store().finalize_daily_totals(tenant, day(31)).await.unwrap();

  let outcome = e.apply_compression(tenant, day(3)).await.unwrap();
  assert_eq!(outcome.stream_rows, 1); // day 1 went; day 2 is the baseline

  let snaps = e
    .store()
    .stream_snapshots(tenant, Platform::Spotify, track)
    .await
    .unwrap();
  let dates: Vec<NaiveDate> = snaps.iter().map(|s| s.date).collect();
  assert_eq!(dates, [day(2), day(3)]);

  // New data derives against the kept baseline; old totals are untouched
  // and no credits appear, because the rewrite window opens at day 4.
  ingest(&e, tenant, track, day(4), 180).await;
  let totals = totals_by_day(&e, tenant).await;
  assert_eq!(
    totals,
    [
      (day(1), 100, true),
      (day(2), 20, true),
      (day(3), 30, true),
      (day(4), 30, false),
    ]
  );
  let credits =
    e.store().lag_credits(tenant, DayWindow::default()).await.unwrap();
  assert!(credits.is_empty());
}

// ─── Concurrency ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_recompute_of_one_entity_serializes() {
  let e = engine().await;
  let (tenant, track) = tenant_and_track(&e).await;
  ingest(&e, tenant, track, day(1), 100).await;

  let (a, b) = tokio::join!(
    e.recompute_track(tenant, Platform::Spotify, track, None),
    e.recompute_track(tenant, Platform::Spotify, track, None),
  );
  assert!(a.is_ok());
  assert!(b.is_ok());
}

#[tokio::test]
async fn recompute_of_distinct_entities_runs_in_parallel() {
  let e = engine().await;
  let tenant = e.store().add_tenant("Label".into()).await.unwrap();
  let t1 = e
    .store()
    .add_track(NewTrack::new(tenant.tenant_id, "GBAYE2500001"))
    .await
    .unwrap();
  let t2 = e
    .store()
    .add_track(NewTrack::new(tenant.tenant_id, "GBAYE2500002"))
    .await
    .unwrap();
  ingest(&e, tenant.tenant_id, t1.track_id, day(1), 10).await;
  ingest(&e, tenant.tenant_id, t2.track_id, day(1), 20).await;

  let (a, b) = tokio::join!(
    e.recompute_track(tenant.tenant_id, Platform::Spotify, t1.track_id, None),
    e.recompute_track(tenant.tenant_id, Platform::Spotify, t2.track_id, None),
  );
  assert!(a.is_ok());
  assert!(b.is_ok());

  assert_eq!(totals_by_day(&e, tenant.tenant_id).await, [(day(1), 30, false)]);
}
