//! Catalogue reference data — platforms, tracks, and playlists.
//!
//! These are the stable dimension rows that snapshots hang off. Tracks and
//! playlists are unique per `(tenant, external_code)` pair: two tenants may
//! register the same ISRC and get fully independent rows.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Platform ────────────────────────────────────────────────────────────────

/// The source platforms counters are collected from. A closed set; adding a
/// platform is a schema-level change, not a data-level one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
  Spotify,
  AppleMusic,
}

impl Platform {
  /// The discriminant string stored in platform columns.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Spotify => "spotify",
      Self::AppleMusic => "apple_music",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "spotify" => Ok(Self::Spotify),
      "apple_music" => Ok(Self::AppleMusic),
      other => Err(Error::UnknownPlatform(other.to_owned())),
    }
  }

  pub const ALL: [Self; 2] = [Self::Spotify, Self::AppleMusic];
}

// ─── Track ───────────────────────────────────────────────────────────────────

/// A catalogue track, identified externally by its ISRC-equivalent code.
///
/// Created on first ingestion or explicit catalogue add; never auto-deleted
/// except via tenant cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
  pub track_id:      Uuid,
  pub tenant_id:     Uuid,
  pub external_code: String,
  pub title:         Option<String>,
  pub artist:        Option<String>,
  pub release_date:  Option<NaiveDate>,
  pub created_at:    DateTime<Utc>,
}

/// Input to [`crate::store::MetricsStore::add_track`].
/// `track_id` and `created_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewTrack {
  pub tenant_id:     Uuid,
  pub external_code: String,
  pub title:         Option<String>,
  pub artist:        Option<String>,
  pub release_date:  Option<NaiveDate>,
}

impl NewTrack {
  /// Convenience constructor with no display metadata.
  pub fn new(tenant_id: Uuid, external_code: impl Into<String>) -> Self {
    Self {
      tenant_id,
      external_code: external_code.into(),
      title: None,
      artist: None,
      release_date: None,
    }
  }
}

// ─── Playlist ────────────────────────────────────────────────────────────────

/// A playlist whose follower counter is tracked. Mirrors [`Track`] but is a
/// fully independent entity with its own snapshot and delta streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
  pub playlist_id:   Uuid,
  pub tenant_id:     Uuid,
  pub external_code: String,
  pub name:          Option<String>,
  pub created_at:    DateTime<Utc>,
}

/// Input to [`crate::store::MetricsStore::add_playlist`].
#[derive(Debug, Clone)]
pub struct NewPlaylist {
  pub tenant_id:     Uuid,
  pub external_code: String,
  pub name:          Option<String>,
}

impl NewPlaylist {
  pub fn new(tenant_id: Uuid, external_code: impl Into<String>) -> Self {
    Self { tenant_id, external_code: external_code.into(), name: None }
  }
}

#[cfg(test)]
mod tests {
  use super::Platform;

  #[test]
  fn platform_roundtrip() {
    for p in Platform::ALL {
      assert_eq!(Platform::parse(p.as_str()).unwrap(), p);
    }
  }

  #[test]
  fn platform_rejects_unknown() {
    assert!(Platform::parse("soundcloud").is_err());
  }
}
