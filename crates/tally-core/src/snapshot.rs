//! Cumulative counter snapshots — the raw facts.
//!
//! A snapshot is the reported total-to-date counter for one entity on one
//! date. Snapshots are upserted (last write wins on the value) and are never
//! the durable record of "what happened on day D" — that is the daily delta
//! and total layer, derived from them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::Platform;

// ─── Stream snapshots ────────────────────────────────────────────────────────

/// Cumulative play count for one track on one platform at one date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSnapshot {
  pub tenant_id:   Uuid,
  pub platform:    Platform,
  pub track_id:    Uuid,
  pub date:        NaiveDate,
  pub playcount:   u64,
  /// Server-assigned; updated on every overwrite of the same key.
  pub recorded_at: DateTime<Utc>,
}

/// Input to [`crate::store::MetricsStore::upsert_stream_snapshot`].
/// `recorded_at` is always set by the store; it is not accepted from callers.
#[derive(Debug, Clone)]
pub struct NewStreamSnapshot {
  pub tenant_id: Uuid,
  pub platform:  Platform,
  pub track_id:  Uuid,
  pub date:      NaiveDate,
  pub playcount: u64,
}

// ─── Follower snapshots ──────────────────────────────────────────────────────

/// Cumulative follower count for one playlist on one platform at one date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowerSnapshot {
  pub tenant_id:   Uuid,
  pub platform:    Platform,
  pub playlist_id: Uuid,
  pub date:        NaiveDate,
  pub followers:   u64,
  pub recorded_at: DateTime<Utc>,
}

/// Input to [`crate::store::MetricsStore::upsert_follower_snapshot`].
#[derive(Debug, Clone)]
pub struct NewFollowerSnapshot {
  pub tenant_id:   Uuid,
  pub platform:    Platform,
  pub playlist_id: Uuid,
  pub date:        NaiveDate,
  pub followers:   u64,
}

// ─── Derived deltas ──────────────────────────────────────────────────────────

/// A date/increment pair produced by delta derivation. The increment is
/// clamped non-negative; a first-seen snapshot contributes its full value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatedDelta {
  pub date:  NaiveDate,
  pub delta: u64,
}

/// A stored per-track daily play increment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDelta {
  pub tenant_id: Uuid,
  pub platform:  Platform,
  pub track_id:  Uuid,
  pub date:      NaiveDate,
  pub delta:     u64,
}

/// A stored per-playlist daily follower increment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowerDelta {
  pub tenant_id:   Uuid,
  pub platform:    Platform,
  pub playlist_id: Uuid,
  pub date:        NaiveDate,
  pub delta:       u64,
}
