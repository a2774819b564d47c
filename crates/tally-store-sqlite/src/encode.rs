//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, calendar dates as ISO 8601
//! (`YYYY-MM-DD`), UUIDs as hyphenated lowercase strings, and platforms as
//! their discriminant strings.

use chrono::{DateTime, NaiveDate, Utc};
use tally_core::{
  catalog::{Platform, Playlist, Track},
  health::HealthSnapshot,
  snapshot::{FollowerSnapshot, StreamSnapshot},
  tenant::Tenant,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Platform ────────────────────────────────────────────────────────────────

pub fn encode_platform(p: Platform) -> &'static str { p.as_str() }

pub fn decode_platform(s: &str) -> Result<Platform> {
  Platform::parse(s).map_err(Error::Core)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `tenants` row.
pub struct RawTenant {
  pub tenant_id:    String,
  pub created_at:   String,
  pub display_name: String,
}

impl RawTenant {
  pub fn into_tenant(self) -> Result<Tenant> {
    Ok(Tenant {
      tenant_id:    decode_uuid(&self.tenant_id)?,
      created_at:   decode_dt(&self.created_at)?,
      display_name: self.display_name,
    })
  }
}

/// Raw strings read directly from a `tracks` row.
pub struct RawTrack {
  pub track_id:      String,
  pub tenant_id:     String,
  pub external_code: String,
  pub title:         Option<String>,
  pub artist:        Option<String>,
  pub release_date:  Option<String>,
  pub created_at:    String,
}

impl RawTrack {
  pub fn into_track(self) -> Result<Track> {
    Ok(Track {
      track_id:      decode_uuid(&self.track_id)?,
      tenant_id:     decode_uuid(&self.tenant_id)?,
      external_code: self.external_code,
      title:         self.title,
      artist:        self.artist,
      release_date:  self
        .release_date
        .as_deref()
        .map(decode_date)
        .transpose()?,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `playlists` row.
pub struct RawPlaylist {
  pub playlist_id:   String,
  pub tenant_id:     String,
  pub external_code: String,
  pub name:          Option<String>,
  pub created_at:    String,
}

impl RawPlaylist {
  pub fn into_playlist(self) -> Result<Playlist> {
    Ok(Playlist {
      playlist_id:   decode_uuid(&self.playlist_id)?,
      tenant_id:     decode_uuid(&self.tenant_id)?,
      external_code: self.external_code,
      name:          self.name,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `stream_snapshots` row.
pub struct RawStreamSnapshot {
  pub tenant_id:     String,
  pub platform:      String,
  pub track_id:      String,
  pub snapshot_date: String,
  pub playcount:     i64,
  pub recorded_at:   String,
}

impl RawStreamSnapshot {
  pub fn into_snapshot(self) -> Result<StreamSnapshot> {
    Ok(StreamSnapshot {
      tenant_id:   decode_uuid(&self.tenant_id)?,
      platform:    decode_platform(&self.platform)?,
      track_id:    decode_uuid(&self.track_id)?,
      date:        decode_date(&self.snapshot_date)?,
      playcount:   self.playcount as u64,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw strings read directly from a `follower_snapshots` row.
pub struct RawFollowerSnapshot {
  pub tenant_id:     String,
  pub platform:      String,
  pub playlist_id:   String,
  pub snapshot_date: String,
  pub followers:     i64,
  pub recorded_at:   String,
}

impl RawFollowerSnapshot {
  pub fn into_snapshot(self) -> Result<FollowerSnapshot> {
    Ok(FollowerSnapshot {
      tenant_id:   decode_uuid(&self.tenant_id)?,
      platform:    decode_platform(&self.platform)?,
      playlist_id: decode_uuid(&self.playlist_id)?,
      date:        decode_date(&self.snapshot_date)?,
      followers:   self.followers as u64,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw strings read directly from a `catalogue_health` row.
pub struct RawHealth {
  pub tenant_id:      String,
  pub track_id:       String,
  pub check_date:     String,
  pub spotify_ok:     Option<i64>,
  pub apple_music_ok: Option<i64>,
  pub updated_at:     String,
}

impl RawHealth {
  pub fn into_snapshot(self) -> Result<HealthSnapshot> {
    Ok(HealthSnapshot {
      tenant_id:      decode_uuid(&self.tenant_id)?,
      track_id:       decode_uuid(&self.track_id)?,
      check_date:     decode_date(&self.check_date)?,
      spotify_ok:     self.spotify_ok.map(|v| v != 0),
      apple_music_ok: self.apple_music_ok.map(|v| v != 0),
      updated_at:     decode_dt(&self.updated_at)?,
    })
  }
}
