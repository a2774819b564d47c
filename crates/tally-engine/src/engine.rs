//! [`Engine`] — orchestrates ingestion-triggered recomputes, the
//! finalization sweep, and the conservation diagnostic.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{Days, NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use tally_core::{
  catalog::Platform,
  reconcile::{ConservationReport, RecomputeReport},
  snapshot::{DatedDelta, NewFollowerSnapshot, NewStreamSnapshot},
  store::MetricsStore,
};

use crate::{delta::derive_deltas, Error, Result};

/// Restrict derived deltas to the rewrite window.
fn windowed(
  deltas: Vec<DatedDelta>,
  since: Option<NaiveDate>,
) -> Vec<DatedDelta> {
  match since {
    None => deltas,
    Some(s) => deltas.into_iter().filter(|d| d.date >= s).collect(),
  }
}

// ─── Configuration ───────────────────────────────────────────────────────────

/// Tunables for reconciliation policy and lock contention.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Days after a day's date during which corrections update its total in
  /// place. Once the window passes, the finalize sweep freezes the day and
  /// later corrections become lag credits.
  pub lag_window_days: u32,
  /// How many times a recompute re-tries a contended entity lock.
  pub lock_retries:    u32,
  /// Initial backoff between lock retries; doubles on each attempt.
  pub lock_backoff:    Duration,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      lag_window_days: 7,
      lock_retries:    5,
      lock_backoff:    Duration::from_millis(25),
    }
  }
}

// ─── Entity locks ────────────────────────────────────────────────────────────

/// Recompute is serialized per entity, not globally: intra-entity date order
/// matters, entities are independent.
type LockKey = (Uuid, Platform, Uuid);

#[derive(Default)]
struct EntityLocks {
  map: Mutex<HashMap<LockKey, Arc<Mutex<()>>>>,
}

impl EntityLocks {
  async fn lock_for(&self, key: LockKey) -> Arc<Mutex<()>> {
    let mut map = self.map.lock().await;
    map.entry(key).or_default().clone()
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// The computation layer over a [`MetricsStore`].
///
/// Cloning shares the lock table, so every clone participates in the same
/// per-entity serialization.
#[derive(Clone)]
pub struct Engine<S> {
  store:  Arc<S>,
  config: EngineConfig,
  locks:  Arc<EntityLocks>,
}

impl<S: MetricsStore> Engine<S> {
  pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
    Self { store, config, locks: Arc::new(EntityLocks::default()) }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn config(&self) -> &EngineConfig { &self.config }

  /// The most recent day eligible for finalization (and therefore for
  /// retention) as of `today`.
  pub fn finalization_horizon(&self, today: NaiveDate) -> NaiveDate {
    today
      .checked_sub_days(Days::new(u64::from(self.config.lag_window_days)))
      .unwrap_or(NaiveDate::MIN)
  }

  /// Acquire the per-entity lock, retrying with doubling backoff. A lock
  /// held for the whole budget yields [`Error::Contended`]; the recompute
  /// the caller wanted has either happened or will happen under the holder.
  async fn acquire(&self, key: LockKey) -> Result<OwnedMutexGuard<()>> {
    let lock = self.locks.lock_for(key).await;
    let mut backoff = self.config.lock_backoff;

    for _ in 0..=self.config.lock_retries {
      if let Ok(guard) = Arc::clone(&lock).try_lock_owned() {
        return Ok(guard);
      }
      tokio::time::sleep(backoff).await;
      backoff *= 2;
    }

    Err(Error::Contended { retries: self.config.lock_retries })
  }

  // ── Recompute ─────────────────────────────────────────────────────────────

  /// Re-derive one track's deltas from its current snapshots and fold the
  /// affected days into the tenant's daily totals. Derivation always walks
  /// the full snapshot sequence (each delta depends on the prior value) but
  /// only rows dated `since` onward are rewritten; `None` rewrites the whole
  /// window, which assumes raw history has not been compacted away. Safe to
  /// re-run at any time; identical inputs produce no changes.
  pub async fn recompute_track(
    &self,
    tenant_id: Uuid,
    platform: Platform,
    track_id: Uuid,
    since: Option<NaiveDate>,
  ) -> Result<RecomputeReport> {
    let _guard = self.acquire((tenant_id, platform, track_id)).await?;

    let snapshots = self
      .store
      .stream_snapshots(tenant_id, platform, track_id)
      .await
      .map_err(Error::store)?;
    let deltas = windowed(
      derive_deltas(snapshots.iter().map(|s| (s.date, s.playcount))),
      since,
    );

    let report = self
      .store
      .commit_track_recompute(tenant_id, platform, track_id, since, deltas)
      .await
      .map_err(Error::store)?;

    for (day, credit) in &report.credited {
      tracing::info!(
        %tenant_id, %track_id, %day, credit = *credit,
        "lag credit recorded for finalized day"
      );
    }

    Ok(report)
  }

  /// Re-derive one playlist's follower deltas. Follower deltas are an
  /// independent stream; no daily totals are involved.
  pub async fn recompute_playlist(
    &self,
    tenant_id: Uuid,
    platform: Platform,
    playlist_id: Uuid,
    since: Option<NaiveDate>,
  ) -> Result<usize> {
    let _guard = self.acquire((tenant_id, platform, playlist_id)).await?;

    let snapshots = self
      .store
      .follower_snapshots(tenant_id, platform, playlist_id)
      .await
      .map_err(Error::store)?;
    let deltas = windowed(
      derive_deltas(snapshots.iter().map(|s| (s.date, s.followers))),
      since,
    );

    self
      .store
      .commit_playlist_recompute(tenant_id, platform, playlist_id, since, deltas)
      .await
      .map_err(Error::store)
  }

  // ── Ingestion ─────────────────────────────────────────────────────────────

  /// Upsert a play-count snapshot and recompute the affected track. This is
  /// the collector-facing path: validation errors from the store surface
  /// synchronously; regressions in the counter do not.
  pub async fn ingest_stream(
    &self,
    input: NewStreamSnapshot,
  ) -> Result<RecomputeReport> {
    let (tenant_id, platform, track_id, date) =
      (input.tenant_id, input.platform, input.track_id, input.date);
    self
      .store
      .upsert_stream_snapshot(input)
      .await
      .map_err(Error::store)?;
    // A snapshot at date D can shift D's delta and every later one, so the
    // recompute window opens at D.
    self.recompute_track(tenant_id, platform, track_id, Some(date)).await
  }

  /// Upsert a follower snapshot and recompute the affected playlist.
  pub async fn ingest_follower(
    &self,
    input: NewFollowerSnapshot,
  ) -> Result<usize> {
    let (tenant_id, platform, playlist_id, date) =
      (input.tenant_id, input.platform, input.playlist_id, input.date);
    self
      .store
      .upsert_follower_snapshot(input)
      .await
      .map_err(Error::store)?;
    self
      .recompute_playlist(tenant_id, platform, playlist_id, Some(date))
      .await
  }

  // ── Scheduled sweeps ──────────────────────────────────────────────────────

  /// Finalize every eligible day for one tenant. Returns the number of days
  /// frozen.
  pub async fn finalize_sweep(&self, tenant_id: Uuid) -> Result<usize> {
    let horizon = self.finalization_horizon(Utc::now().date_naive());
    let frozen = self
      .store
      .finalize_daily_totals(tenant_id, horizon)
      .await
      .map_err(Error::store)?;
    if frozen > 0 {
      tracing::info!(%tenant_id, %horizon, frozen, "finalized daily totals");
    }
    Ok(frozen)
  }

  /// Run the conservation diagnostic and log any entity whose summed deltas
  /// exceed its latest cumulative value. Anomalies are observability
  /// signals, never failures.
  pub async fn check_conservation(
    &self,
    tenant_id: Uuid,
  ) -> Result<ConservationReport> {
    let report = self
      .store
      .conservation_report(tenant_id)
      .await
      .map_err(Error::store)?;

    for row in report.anomalies() {
      tracing::warn!(
        %tenant_id,
        track_id = %row.track_id,
        platform = row.platform.as_str(),
        delta_sum = row.delta_sum,
        latest = row.latest_cumulative,
        "summed deltas exceed latest cumulative; uncorrected counter reset?"
      );
    }

    Ok(report)
  }
}
