//! Pure delta derivation over an ordered snapshot sequence.

use chrono::NaiveDate;
use tally_core::snapshot::DatedDelta;

/// Derive per-date increments from cumulative snapshots, ordered ascending
/// by date.
///
/// The first snapshot contributes its full value (there is no earlier
/// baseline to subtract). Every later delta is clamped at zero: a regression
/// in the raw counter is the expected signature of a correction or platform
/// reset, not an error, and reconciliation resolves any volume it displaces.
///
/// Referentially transparent over its input — recomputation with identical
/// snapshots yields identical deltas, which is what makes whole-window
/// recompute safe to re-run from any point.
pub fn derive_deltas<I>(snapshots: I) -> Vec<DatedDelta>
where
  I: IntoIterator<Item = (NaiveDate, u64)>,
{
  let mut out = Vec::new();
  let mut prev: Option<u64> = None;

  for (date, value) in snapshots {
    let delta = match prev {
      None => value,
      Some(p) => value.saturating_sub(p),
    };
    out.push(DatedDelta { date, delta });
    prev = Some(value);
  }

  out
}
