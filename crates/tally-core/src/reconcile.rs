//! Daily totals and lag credits — the durable reconciled record.
//!
//! A [`DailyTotal`] is mutable until finalized. After finalization its
//! `total_delta` never changes again; corrections that arrive later are
//! recorded as [`LagCredit`] adjustments so that historical totals stay
//! stable while the running grand total stays accurate.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::Platform;

// ─── Daily totals ────────────────────────────────────────────────────────────

/// Aggregate of all per-track stream deltas for one tenant-day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyTotal {
  pub tenant_id:    Uuid,
  pub day:          NaiveDate,
  pub total_delta:  u64,
  pub finalized:    bool,
  pub finalized_at: Option<DateTime<Utc>>,
}

// ─── Lag credits ─────────────────────────────────────────────────────────────

/// Compensation applied to a finalized day.
///
/// `moved_today` is the net volume moved onto (or off, when negative) this
/// day during the most recent recompute pass that touched it. `moved_alltime`
/// accumulates every compensation ever applied. Both are signed: a day's true
/// delta may be revised downward after finalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LagCredit {
  pub tenant_id:     Uuid,
  pub day:           NaiveDate,
  pub moved_today:   i64,
  pub moved_alltime: i64,
}

// ─── Recompute outcome ───────────────────────────────────────────────────────

/// What one atomic recompute commit did to the derived tables.
#[derive(Debug, Clone, Default)]
pub struct RecomputeReport {
  /// Delta rows written for the entity (its full current window).
  pub delta_rows:  usize,
  /// Days whose daily total was created or overwritten in place.
  pub days_folded: Vec<NaiveDate>,
  /// Finalized days that received a lag credit, with the signed credit.
  pub credited:    Vec<(NaiveDate, i64)>,
}

// ─── Conservation diagnostic ─────────────────────────────────────────────────

/// Per-entity comparison of summed deltas against the latest cumulative
/// snapshot. When the two disagree the difference is either pending
/// reconciliation or a permanent clamp shortfall from a platform reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConservationRow {
  pub platform:          Platform,
  pub track_id:          Uuid,
  pub delta_sum:         u64,
  pub latest_cumulative: u64,
}

/// Tenant-level conservation summary.
///
/// The tracked identity is
/// `total_delta_sum + credit_sum == Σ latest cumulative per entity`,
/// which holds whenever every regression in the raw snapshots was a
/// correction (and was therefore re-derived or credited) rather than a
/// platform reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConservationReport {
  pub tenant_id:       Uuid,
  pub rows:            Vec<ConservationRow>,
  pub total_delta_sum: u64,
  pub credit_sum:      i64,
}

impl ConservationReport {
  /// Entities whose summed deltas exceed their latest cumulative value —
  /// the signature of an uncorrected counter reset.
  pub fn anomalies(&self) -> impl Iterator<Item = &ConservationRow> {
    self.rows.iter().filter(|r| r.delta_sum > r.latest_cumulative)
  }
}
