//! Catalogue health snapshots.
//!
//! Per-tenant, per-track, per-check-date availability across platforms.
//! A point-in-time boolean, not a cumulative counter: overwritten per day,
//! no delta derivation, no reconciliation, deleted only via tenant cascade.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Availability of one track across platforms on one check date.
/// `None` means the platform has not been checked on that date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
  pub tenant_id:      Uuid,
  pub track_id:       Uuid,
  pub check_date:     NaiveDate,
  pub spotify_ok:     Option<bool>,
  pub apple_music_ok: Option<bool>,
  pub updated_at:     DateTime<Utc>,
}

impl HealthSnapshot {
  /// Whether the track was available on at least one checked platform.
  pub fn available_anywhere(&self) -> bool {
    self.spotify_ok == Some(true) || self.apple_music_ok == Some(true)
  }
}

/// One point of the catalogue-size series: how much of the catalogue was
/// live anywhere on a given check date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CataloguePoint {
  pub check_date:       NaiveDate,
  pub available_tracks: u64,
  pub checked_tracks:   u64,
}
