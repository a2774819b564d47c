//! Retention and compression over raw snapshot partitions.
//!
//! Both passes refuse to touch data still inside the lag window: raw
//! history may only be shed once the days it feeds are finalized, because
//! from then on the daily totals and lag credits — never dropped here — are
//! the record of what happened.

use chrono::{NaiveDate, Utc};
use tally_core::store::{MetricsStore, PruneOutcome};
use uuid::Uuid;

use crate::{Engine, Error, Result};

impl<S: MetricsStore> Engine<S> {
  /// Delete raw snapshots dated strictly before `cutoff` for one tenant.
  ///
  /// Refused with [`Error::RetentionWindow`] if `cutoff` is after the
  /// finalization horizon, and by the store if any affected day is not yet
  /// finalized; either refusal leaves no partial effect.
  pub async fn apply_retention(
    &self,
    tenant_id: Uuid,
    cutoff: NaiveDate,
  ) -> Result<PruneOutcome> {
    self.check_window(cutoff)?;
    let outcome = self
      .store()
      .prune_snapshots(tenant_id, cutoff)
      .await
      .map_err(Error::store)?;
    tracing::info!(
      %tenant_id, %cutoff,
      stream_rows = outcome.stream_rows,
      follower_rows = outcome.follower_rows,
      "retention pass removed raw snapshots"
    );
    Ok(outcome)
  }

  /// Compress raw snapshots dated strictly before `cutoff` down to one
  /// baseline row per entity. Same guards as [`Self::apply_retention`].
  pub async fn apply_compression(
    &self,
    tenant_id: Uuid,
    cutoff: NaiveDate,
  ) -> Result<PruneOutcome> {
    self.check_window(cutoff)?;
    let outcome = self
      .store()
      .compress_snapshots(tenant_id, cutoff)
      .await
      .map_err(Error::store)?;
    tracing::info!(
      %tenant_id, %cutoff,
      stream_rows = outcome.stream_rows,
      follower_rows = outcome.follower_rows,
      "compression pass collapsed raw snapshots"
    );
    Ok(outcome)
  }

  fn check_window(&self, cutoff: NaiveDate) -> Result<()> {
    let horizon = self.finalization_horizon(Utc::now().date_naive());
    if cutoff > horizon {
      return Err(Error::RetentionWindow { cutoff, horizon });
    }
    Ok(())
  }
}
