//! [`SqliteStore`] — the SQLite implementation of [`MetricsStore`].

use std::{collections::BTreeSet, path::Path};

use chrono::{NaiveDate, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use tally_core::{
  catalog::{NewPlaylist, NewTrack, Platform, Playlist, Track},
  health::{CataloguePoint, HealthSnapshot},
  reconcile::{
    ConservationReport, ConservationRow, DailyTotal, LagCredit,
    RecomputeReport,
  },
  snapshot::{
    DatedDelta, FollowerSnapshot, NewFollowerSnapshot, NewStreamSnapshot,
    StreamDelta, StreamSnapshot,
  },
  store::{
    DayWindow, FollowerPoint, MetricsStore, PruneOutcome, SeriesPoint,
    TopTrackDelta,
  },
  tenant::Tenant,
};

use crate::{
  encode::{
    decode_date, decode_platform, decode_uuid, encode_date, encode_dt,
    encode_platform, encode_uuid, RawFollowerSnapshot, RawHealth,
    RawPlaylist, RawStreamSnapshot, RawTenant, RawTrack,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Tally metrics store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. All calls
/// are serialised on the connection's background thread, which is what makes
/// the recompute transactions atomic with respect to concurrent readers.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Error with [`Error::TenantNotFound`] unless the tenant row exists.
  async fn require_tenant(&self, tenant_id: Uuid) -> Result<()> {
    let id_str = encode_uuid(tenant_id);
    let exists: bool = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM tenants WHERE tenant_id = ?1",
              rusqlite::params![id_str],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;
    if exists { Ok(()) } else { Err(Error::TenantNotFound(tenant_id)) }
  }

  /// Error with [`Error::TrackNotFound`] unless the track exists under the
  /// tenant. The tenant-scoped lookup doubles as the isolation check: a
  /// track id belonging to another tenant is simply not found.
  async fn require_track(&self, tenant_id: Uuid, track_id: Uuid) -> Result<()> {
    match self.get_track(tenant_id, track_id).await? {
      Some(_) => Ok(()),
      None => Err(Error::TrackNotFound(track_id)),
    }
  }

  async fn require_playlist(
    &self,
    tenant_id: Uuid,
    playlist_id: Uuid,
  ) -> Result<()> {
    match self.get_playlist(tenant_id, playlist_id).await? {
      Some(_) => Ok(()),
      None => Err(Error::PlaylistNotFound(playlist_id)),
    }
  }

  /// Reject values that cannot be stored in an SQLite INTEGER column.
  fn check_value(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::ValueOutOfRange(value))
  }

  /// Reject snapshot dates later than the current UTC date.
  fn check_date(date: NaiveDate) -> Result<()> {
    if date > Utc::now().date_naive() {
      return Err(Error::FutureDate(date));
    }
    Ok(())
  }
}

// ─── MetricsStore impl ───────────────────────────────────────────────────────

impl MetricsStore for SqliteStore {
  type Error = Error;

  // ── Tenants ───────────────────────────────────────────────────────────────

  async fn add_tenant(&self, display_name: String) -> Result<Tenant> {
    let tenant = Tenant {
      tenant_id:  Uuid::new_v4(),
      created_at: Utc::now(),
      display_name,
    };

    let id_str   = encode_uuid(tenant.tenant_id);
    let at_str   = encode_dt(tenant.created_at);
    let name     = tenant.display_name.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO tenants (tenant_id, created_at, display_name)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![id_str, at_str, name],
        )?;
        Ok(())
      })
      .await?;

    Ok(tenant)
  }

  async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>> {
    let id_str = encode_uuid(tenant_id);

    let raw: Option<RawTenant> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT tenant_id, created_at, display_name
               FROM tenants WHERE tenant_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawTenant {
                  tenant_id:    row.get(0)?,
                  created_at:   row.get(1)?,
                  display_name: row.get(2)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawTenant::into_tenant).transpose()
  }

  async fn list_tenants(&self) -> Result<Vec<Tenant>> {
    let raws: Vec<RawTenant> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT tenant_id, created_at, display_name
           FROM tenants ORDER BY created_at",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawTenant {
              tenant_id:    row.get(0)?,
              created_at:   row.get(1)?,
              display_name: row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTenant::into_tenant).collect()
  }

  async fn remove_tenant(&self, tenant_id: Uuid) -> Result<()> {
    self.require_tenant(tenant_id).await?;
    let id_str = encode_uuid(tenant_id);

    self
      .conn
      .call(move |conn| {
        // ON DELETE CASCADE takes every owned row with it.
        conn.execute(
          "DELETE FROM tenants WHERE tenant_id = ?1",
          rusqlite::params![id_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Catalogue dimensions ──────────────────────────────────────────────────

  async fn add_track(&self, input: NewTrack) -> Result<Track> {
    self.require_tenant(input.tenant_id).await?;
    if let Some(existing) =
      self.get_track_by_code(input.tenant_id, &input.external_code).await?
    {
      return Err(Error::DuplicateExternalCode {
        tenant_id: existing.tenant_id,
        code:      existing.external_code,
      });
    }

    let track = Track {
      track_id:      Uuid::new_v4(),
      tenant_id:     input.tenant_id,
      external_code: input.external_code,
      title:         input.title,
      artist:        input.artist,
      release_date:  input.release_date,
      created_at:    Utc::now(),
    };

    let id_str      = encode_uuid(track.track_id);
    let tenant_str  = encode_uuid(track.tenant_id);
    let code        = track.external_code.clone();
    let title       = track.title.clone();
    let artist      = track.artist.clone();
    let release_str = track.release_date.map(encode_date);
    let at_str      = encode_dt(track.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO tracks (
             track_id, tenant_id, external_code, title, artist,
             release_date, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            id_str, tenant_str, code, title, artist, release_str, at_str
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(track)
  }

  async fn ensure_track(&self, input: NewTrack) -> Result<Track> {
    if let Some(existing) =
      self.get_track_by_code(input.tenant_id, &input.external_code).await?
    {
      return Ok(existing);
    }
    self.add_track(input).await
  }

  async fn get_track(
    &self,
    tenant_id: Uuid,
    track_id: Uuid,
  ) -> Result<Option<Track>> {
    let tenant_str = encode_uuid(tenant_id);
    let id_str     = encode_uuid(track_id);

    let raw: Option<RawTrack> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT track_id, tenant_id, external_code, title, artist,
                      release_date, created_at
               FROM tracks WHERE tenant_id = ?1 AND track_id = ?2",
              rusqlite::params![tenant_str, id_str],
              map_track_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawTrack::into_track).transpose()
  }

  async fn get_track_by_code(
    &self,
    tenant_id: Uuid,
    external_code: &str,
  ) -> Result<Option<Track>> {
    let tenant_str = encode_uuid(tenant_id);
    let code       = external_code.to_owned();

    let raw: Option<RawTrack> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT track_id, tenant_id, external_code, title, artist,
                      release_date, created_at
               FROM tracks WHERE tenant_id = ?1 AND external_code = ?2",
              rusqlite::params![tenant_str, code],
              map_track_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawTrack::into_track).transpose()
  }

  async fn list_tracks(&self, tenant_id: Uuid) -> Result<Vec<Track>> {
    let tenant_str = encode_uuid(tenant_id);

    let raws: Vec<RawTrack> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT track_id, tenant_id, external_code, title, artist,
                  release_date, created_at
           FROM tracks WHERE tenant_id = ?1 ORDER BY external_code",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![tenant_str], map_track_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTrack::into_track).collect()
  }

  async fn remove_track(&self, tenant_id: Uuid, track_id: Uuid) -> Result<()> {
    self.require_track(tenant_id, track_id).await?;

    let tenant_str = encode_uuid(tenant_id);
    let id_str     = encode_uuid(track_id);

    self
      .conn
      .call(move |conn| {
        // Cascades to snapshots, deltas, and health rows. Daily totals and
        // lag credits survive: they are the durable reconciled record.
        conn.execute(
          "DELETE FROM tracks WHERE tenant_id = ?1 AND track_id = ?2",
          rusqlite::params![tenant_str, id_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn add_playlist(&self, input: NewPlaylist) -> Result<Playlist> {
    self.require_tenant(input.tenant_id).await?;

    let dup: Option<Playlist> = {
      let tenant_str = encode_uuid(input.tenant_id);
      let code       = input.external_code.clone();
      let raw: Option<RawPlaylist> = self
        .conn
        .call(move |conn| {
          Ok(
            conn
              .query_row(
                "SELECT playlist_id, tenant_id, external_code, name, created_at
                 FROM playlists WHERE tenant_id = ?1 AND external_code = ?2",
                rusqlite::params![tenant_str, code],
                map_playlist_row,
              )
              .optional()?,
          )
        })
        .await?;
      raw.map(RawPlaylist::into_playlist).transpose()?
    };
    if let Some(existing) = dup {
      return Err(Error::DuplicateExternalCode {
        tenant_id: existing.tenant_id,
        code:      existing.external_code,
      });
    }

    let playlist = Playlist {
      playlist_id:   Uuid::new_v4(),
      tenant_id:     input.tenant_id,
      external_code: input.external_code,
      name:          input.name,
      created_at:    Utc::now(),
    };

    let id_str     = encode_uuid(playlist.playlist_id);
    let tenant_str = encode_uuid(playlist.tenant_id);
    let code       = playlist.external_code.clone();
    let name       = playlist.name.clone();
    let at_str     = encode_dt(playlist.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO playlists (
             playlist_id, tenant_id, external_code, name, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, tenant_str, code, name, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(playlist)
  }

  async fn ensure_playlist(&self, input: NewPlaylist) -> Result<Playlist> {
    let tenant_str = encode_uuid(input.tenant_id);
    let code       = input.external_code.clone();

    let raw: Option<RawPlaylist> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT playlist_id, tenant_id, external_code, name, created_at
               FROM playlists WHERE tenant_id = ?1 AND external_code = ?2",
              rusqlite::params![tenant_str, code],
              map_playlist_row,
            )
            .optional()?,
        )
      })
      .await?;

    if let Some(existing) = raw.map(RawPlaylist::into_playlist).transpose()? {
      return Ok(existing);
    }
    self.add_playlist(input).await
  }

  async fn get_playlist(
    &self,
    tenant_id: Uuid,
    playlist_id: Uuid,
  ) -> Result<Option<Playlist>> {
    let tenant_str = encode_uuid(tenant_id);
    let id_str     = encode_uuid(playlist_id);

    let raw: Option<RawPlaylist> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT playlist_id, tenant_id, external_code, name, created_at
               FROM playlists WHERE tenant_id = ?1 AND playlist_id = ?2",
              rusqlite::params![tenant_str, id_str],
              map_playlist_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPlaylist::into_playlist).transpose()
  }

  async fn list_playlists(&self, tenant_id: Uuid) -> Result<Vec<Playlist>> {
    let tenant_str = encode_uuid(tenant_id);

    let raws: Vec<RawPlaylist> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT playlist_id, tenant_id, external_code, name, created_at
           FROM playlists WHERE tenant_id = ?1 ORDER BY external_code",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![tenant_str], map_playlist_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPlaylist::into_playlist).collect()
  }

  async fn remove_playlist(
    &self,
    tenant_id: Uuid,
    playlist_id: Uuid,
  ) -> Result<()> {
    self.require_playlist(tenant_id, playlist_id).await?;

    let tenant_str = encode_uuid(tenant_id);
    let id_str     = encode_uuid(playlist_id);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM playlists WHERE tenant_id = ?1 AND playlist_id = ?2",
          rusqlite::params![tenant_str, id_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Fact store — snapshot upserts ─────────────────────────────────────────

  async fn upsert_stream_snapshot(
    &self,
    input: NewStreamSnapshot,
  ) -> Result<StreamSnapshot> {
    Self::check_date(input.date)?;
    let count_val = Self::check_value(input.playcount)?;
    self.require_track(input.tenant_id, input.track_id).await?;

    let snapshot = StreamSnapshot {
      tenant_id:   input.tenant_id,
      platform:    input.platform,
      track_id:    input.track_id,
      date:        input.date,
      playcount:   input.playcount,
      recorded_at: Utc::now(),
    };

    let tenant_str = encode_uuid(snapshot.tenant_id);
    let plat_str   = encode_platform(snapshot.platform).to_owned();
    let track_str  = encode_uuid(snapshot.track_id);
    let date_str   = encode_date(snapshot.date);
    let at_str     = encode_dt(snapshot.recorded_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO stream_snapshots (
             tenant_id, platform, track_id, snapshot_date, playcount,
             recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT (tenant_id, platform, track_id, snapshot_date)
           DO UPDATE SET playcount   = excluded.playcount,
                         recorded_at = excluded.recorded_at",
          rusqlite::params![
            tenant_str, plat_str, track_str, date_str, count_val, at_str
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(snapshot)
  }

  async fn stream_snapshots(
    &self,
    tenant_id: Uuid,
    platform: Platform,
    track_id: Uuid,
  ) -> Result<Vec<StreamSnapshot>> {
    let tenant_str = encode_uuid(tenant_id);
    let plat_str   = encode_platform(platform).to_owned();
    let track_str  = encode_uuid(track_id);

    let raws: Vec<RawStreamSnapshot> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT tenant_id, platform, track_id, snapshot_date, playcount,
                  recorded_at
           FROM stream_snapshots
           WHERE tenant_id = ?1 AND platform = ?2 AND track_id = ?3
           ORDER BY snapshot_date",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![tenant_str, plat_str, track_str], |row| {
            Ok(RawStreamSnapshot {
              tenant_id:     row.get(0)?,
              platform:      row.get(1)?,
              track_id:      row.get(2)?,
              snapshot_date: row.get(3)?,
              playcount:     row.get(4)?,
              recorded_at:   row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawStreamSnapshot::into_snapshot).collect()
  }

  async fn upsert_follower_snapshot(
    &self,
    input: NewFollowerSnapshot,
  ) -> Result<FollowerSnapshot> {
    Self::check_date(input.date)?;
    let count_val = Self::check_value(input.followers)?;
    self.require_playlist(input.tenant_id, input.playlist_id).await?;

    let snapshot = FollowerSnapshot {
      tenant_id:   input.tenant_id,
      platform:    input.platform,
      playlist_id: input.playlist_id,
      date:        input.date,
      followers:   input.followers,
      recorded_at: Utc::now(),
    };

    let tenant_str = encode_uuid(snapshot.tenant_id);
    let plat_str   = encode_platform(snapshot.platform).to_owned();
    let list_str   = encode_uuid(snapshot.playlist_id);
    let date_str   = encode_date(snapshot.date);
    let at_str     = encode_dt(snapshot.recorded_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO follower_snapshots (
             tenant_id, platform, playlist_id, snapshot_date, followers,
             recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT (tenant_id, platform, playlist_id, snapshot_date)
           DO UPDATE SET followers   = excluded.followers,
                         recorded_at = excluded.recorded_at",
          rusqlite::params![
            tenant_str, plat_str, list_str, date_str, count_val, at_str
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(snapshot)
  }

  async fn follower_snapshots(
    &self,
    tenant_id: Uuid,
    platform: Platform,
    playlist_id: Uuid,
  ) -> Result<Vec<FollowerSnapshot>> {
    let tenant_str = encode_uuid(tenant_id);
    let plat_str   = encode_platform(platform).to_owned();
    let list_str   = encode_uuid(playlist_id);

    let raws: Vec<RawFollowerSnapshot> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT tenant_id, platform, playlist_id, snapshot_date, followers,
                  recorded_at
           FROM follower_snapshots
           WHERE tenant_id = ?1 AND platform = ?2 AND playlist_id = ?3
           ORDER BY snapshot_date",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![tenant_str, plat_str, list_str], |row| {
            Ok(RawFollowerSnapshot {
              tenant_id:     row.get(0)?,
              platform:      row.get(1)?,
              playlist_id:   row.get(2)?,
              snapshot_date: row.get(3)?,
              followers:     row.get(4)?,
              recorded_at:   row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFollowerSnapshot::into_snapshot).collect()
  }

  // ── Derived rows — recompute/reconcile ────────────────────────────────────

  async fn commit_track_recompute(
    &self,
    tenant_id: Uuid,
    platform: Platform,
    track_id: Uuid,
    since: Option<NaiveDate>,
    deltas: Vec<DatedDelta>,
  ) -> Result<RecomputeReport> {
    self.require_track(tenant_id, track_id).await?;

    let tenant_str = encode_uuid(tenant_id);
    let plat_str   = encode_platform(platform).to_owned();
    let track_str  = encode_uuid(track_id);
    let since_str  = since.map(encode_date);
    let delta_rows: Vec<(String, i64)> = deltas
      .iter()
      .map(|d| Ok((encode_date(d.date), Self::check_value(d.delta)?)))
      .collect::<Result<_>>()?;

    let (count, folded, credited): (usize, Vec<String>, Vec<(String, i64)>) =
      self
        .conn
        .call(move |conn| {
          let tx = conn.transaction()?;

          // Affected days: everything inside the window that held a delta
          // before plus everything that holds one after, so volume leaving
          // a day is folded back too.
          let mut affected: BTreeSet<String> = {
            let mut stmt = tx.prepare(
              "SELECT delta_date FROM stream_deltas
               WHERE tenant_id = ?1 AND platform = ?2 AND track_id = ?3
                 AND (?4 IS NULL OR delta_date >= ?4)",
            )?;
            stmt
              .query_map(
                rusqlite::params![tenant_str, plat_str, track_str, since_str],
                |r| r.get(0),
              )?
              .collect::<rusqlite::Result<_>>()?
          };

          tx.execute(
            "DELETE FROM stream_deltas
             WHERE tenant_id = ?1 AND platform = ?2 AND track_id = ?3
               AND (?4 IS NULL OR delta_date >= ?4)",
            rusqlite::params![tenant_str, plat_str, track_str, since_str],
          )?;
          for (date_str, delta) in &delta_rows {
            tx.execute(
              "INSERT INTO stream_deltas (
                 tenant_id, platform, track_id, delta_date, delta
               ) VALUES (?1, ?2, ?3, ?4, ?5)",
              rusqlite::params![tenant_str, plat_str, track_str, date_str, delta],
            )?;
            affected.insert(date_str.clone());
          }

          let mut folded   = Vec::new();
          let mut credited = Vec::new();

          for day in &affected {
            let new_total: i64 = tx.query_row(
              "SELECT COALESCE(SUM(delta), 0) FROM stream_deltas
               WHERE tenant_id = ?1 AND delta_date = ?2",
              rusqlite::params![tenant_str, day],
              |r| r.get(0),
            )?;

            let existing: Option<(i64, bool)> = tx
              .query_row(
                "SELECT total_delta, finalized FROM daily_totals
                 WHERE tenant_id = ?1 AND day = ?2",
                rusqlite::params![tenant_str, day],
                |r| Ok((r.get(0)?, r.get::<_, i64>(1)? != 0)),
              )
              .optional()?;

            match existing {
              None => {
                if new_total != 0 {
                  tx.execute(
                    "INSERT INTO daily_totals (tenant_id, day, total_delta)
                     VALUES (?1, ?2, ?3)",
                    rusqlite::params![tenant_str, day, new_total],
                  )?;
                  folded.push(day.clone());
                }
              }
              Some((old_total, false)) => {
                if new_total != old_total {
                  tx.execute(
                    "UPDATE daily_totals SET total_delta = ?3
                     WHERE tenant_id = ?1 AND day = ?2",
                    rusqlite::params![tenant_str, day, new_total],
                  )?;
                  folded.push(day.clone());
                }
              }
              Some((old_total, true)) => {
                // The reconciled view of a finalized day is its frozen
                // total plus everything already credited; only the
                // remainder is new volume to move.
                let already: i64 = tx
                  .query_row(
                    "SELECT moved_alltime FROM lag_credits
                     WHERE tenant_id = ?1 AND day = ?2",
                    rusqlite::params![tenant_str, day],
                    |r| r.get(0),
                  )
                  .optional()?
                  .unwrap_or(0);

                let credit = new_total - old_total - already;
                if credit != 0 {
                  tx.execute(
                    "INSERT INTO lag_credits (
                       tenant_id, day, moved_today, moved_alltime
                     ) VALUES (?1, ?2, ?3, ?3)
                     ON CONFLICT (tenant_id, day) DO UPDATE SET
                       moved_today   = excluded.moved_today,
                       moved_alltime = lag_credits.moved_alltime
                                       + excluded.moved_today",
                    rusqlite::params![tenant_str, day, credit],
                  )?;
                  credited.push((day.clone(), credit));
                }
              }
            }
          }

          tx.commit()?;
          Ok((delta_rows.len(), folded, credited))
        })
        .await?;

    Ok(RecomputeReport {
      delta_rows:  count,
      days_folded: folded
        .iter()
        .map(|d| decode_date(d))
        .collect::<Result<_>>()?,
      credited:    credited
        .iter()
        .map(|(d, c)| Ok((decode_date(d)?, *c)))
        .collect::<Result<_>>()?,
    })
  }

  async fn commit_playlist_recompute(
    &self,
    tenant_id: Uuid,
    platform: Platform,
    playlist_id: Uuid,
    since: Option<NaiveDate>,
    deltas: Vec<DatedDelta>,
  ) -> Result<usize> {
    self.require_playlist(tenant_id, playlist_id).await?;

    let tenant_str = encode_uuid(tenant_id);
    let plat_str   = encode_platform(platform).to_owned();
    let list_str   = encode_uuid(playlist_id);
    let since_str  = since.map(encode_date);
    let delta_rows: Vec<(String, i64)> = deltas
      .iter()
      .map(|d| Ok((encode_date(d.date), Self::check_value(d.delta)?)))
      .collect::<Result<_>>()?;

    let count = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM follower_deltas
           WHERE tenant_id = ?1 AND platform = ?2 AND playlist_id = ?3
             AND (?4 IS NULL OR delta_date >= ?4)",
          rusqlite::params![tenant_str, plat_str, list_str, since_str],
        )?;
        for (date_str, delta) in &delta_rows {
          tx.execute(
            "INSERT INTO follower_deltas (
               tenant_id, platform, playlist_id, delta_date, delta
             ) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![tenant_str, plat_str, list_str, date_str, delta],
          )?;
        }
        tx.commit()?;
        Ok(delta_rows.len())
      })
      .await?;

    Ok(count)
  }

  async fn stream_deltas(
    &self,
    tenant_id: Uuid,
    platform: Platform,
    track_id: Uuid,
  ) -> Result<Vec<StreamDelta>> {
    let tenant_str = encode_uuid(tenant_id);
    let plat_str   = encode_platform(platform).to_owned();
    let track_str  = encode_uuid(track_id);

    let rows: Vec<(String, String, String, String, i64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT tenant_id, platform, track_id, delta_date, delta
           FROM stream_deltas
           WHERE tenant_id = ?1 AND platform = ?2 AND track_id = ?3
           ORDER BY delta_date",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![tenant_str, plat_str, track_str], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(tenant, plat, track, date, delta)| {
        Ok(StreamDelta {
          tenant_id: decode_uuid(&tenant)?,
          platform:  decode_platform(&plat)?,
          track_id:  decode_uuid(&track)?,
          date:      decode_date(&date)?,
          delta:     delta as u64,
        })
      })
      .collect()
  }

  async fn finalize_daily_totals(
    &self,
    tenant_id: Uuid,
    through: NaiveDate,
  ) -> Result<usize> {
    let tenant_str  = encode_uuid(tenant_id);
    let through_str = encode_date(through);
    let now_str     = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE daily_totals SET finalized = 1, finalized_at = ?3
           WHERE tenant_id = ?1 AND day <= ?2 AND finalized = 0",
          rusqlite::params![tenant_str, through_str, now_str],
        )?)
      })
      .await?;

    Ok(changed)
  }

  // ── Reads — serving layer ─────────────────────────────────────────────────

  async fn daily_totals(
    &self,
    tenant_id: Uuid,
    window: DayWindow,
  ) -> Result<Vec<DailyTotal>> {
    let tenant_str = encode_uuid(tenant_id);
    let from_str   = window.from.map(encode_date);
    let to_str     = window.to.map(encode_date);

    let rows: Vec<(String, i64, i64, Option<String>)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT day, total_delta, finalized, finalized_at
           FROM daily_totals
           WHERE tenant_id = ?1
             AND (?2 IS NULL OR day >= ?2)
             AND (?3 IS NULL OR day <= ?3)
           ORDER BY day",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![tenant_str, from_str, to_str], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(day, total, finalized, finalized_at)| {
        Ok(DailyTotal {
          tenant_id,
          day:          decode_date(&day)?,
          total_delta:  total as u64,
          finalized:    finalized != 0,
          finalized_at: finalized_at.as_deref().map(crate::encode::decode_dt).transpose()?,
        })
      })
      .collect()
  }

  async fn lag_credits(
    &self,
    tenant_id: Uuid,
    window: DayWindow,
  ) -> Result<Vec<LagCredit>> {
    let tenant_str = encode_uuid(tenant_id);
    let from_str   = window.from.map(encode_date);
    let to_str     = window.to.map(encode_date);

    let rows: Vec<(String, i64, i64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT day, moved_today, moved_alltime
           FROM lag_credits
           WHERE tenant_id = ?1
             AND (?2 IS NULL OR day >= ?2)
             AND (?3 IS NULL OR day <= ?3)
           ORDER BY day",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![tenant_str, from_str, to_str], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(day, today, alltime)| {
        Ok(LagCredit {
          tenant_id,
          day:           decode_date(&day)?,
          moved_today:   today,
          moved_alltime: alltime,
        })
      })
      .collect()
  }

  async fn top_track_deltas(
    &self,
    tenant_id: Uuid,
    day: NaiveDate,
    limit: usize,
  ) -> Result<Vec<TopTrackDelta>> {
    let tenant_str = encode_uuid(tenant_id);
    let day_str    = encode_date(day);
    let limit_val  = limit as i64;

    let rows: Vec<(RawTrack, i64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT t.track_id, t.tenant_id, t.external_code, t.title,
                  t.artist, t.release_date, t.created_at,
                  SUM(d.delta) AS day_delta
           FROM stream_deltas d
           JOIN tracks t ON t.track_id = d.track_id
           WHERE d.tenant_id = ?1 AND d.delta_date = ?2
           GROUP BY d.track_id
           ORDER BY day_delta DESC, t.external_code
           LIMIT ?3",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![tenant_str, day_str, limit_val], |row| {
            Ok((
              RawTrack {
                track_id:      row.get(0)?,
                tenant_id:     row.get(1)?,
                external_code: row.get(2)?,
                title:         row.get(3)?,
                artist:        row.get(4)?,
                release_date:  row.get(5)?,
                created_at:    row.get(6)?,
              },
              row.get(7)?,
            ))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(raw, delta)| {
        Ok(TopTrackDelta { track: raw.into_track()?, delta: delta as u64 })
      })
      .collect()
  }

  async fn track_delta_series(
    &self,
    tenant_id: Uuid,
    platform: Platform,
    track_id: Uuid,
    window: DayWindow,
  ) -> Result<Vec<SeriesPoint>> {
    let tenant_str = encode_uuid(tenant_id);
    let plat_str   = encode_platform(platform).to_owned();
    let track_str  = encode_uuid(track_id);
    let from_str   = window.from.map(encode_date);
    let to_str     = window.to.map(encode_date);

    let rows: Vec<(String, i64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT delta_date, delta FROM stream_deltas
           WHERE tenant_id = ?1 AND platform = ?2 AND track_id = ?3
             AND (?4 IS NULL OR delta_date >= ?4)
             AND (?5 IS NULL OR delta_date <= ?5)
           ORDER BY delta_date",
        )?;
        let rows = stmt
          .query_map(
            rusqlite::params![tenant_str, plat_str, track_str, from_str, to_str],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(date, delta)| {
        Ok(SeriesPoint { date: decode_date(&date)?, value: delta as u64 })
      })
      .collect()
  }

  async fn follower_series(
    &self,
    tenant_id: Uuid,
    platform: Platform,
    playlist_id: Uuid,
    window: DayWindow,
  ) -> Result<Vec<FollowerPoint>> {
    let tenant_str = encode_uuid(tenant_id);
    let plat_str   = encode_platform(platform).to_owned();
    let list_str   = encode_uuid(playlist_id);
    let from_str   = window.from.map(encode_date);
    let to_str     = window.to.map(encode_date);

    let rows: Vec<(String, i64, Option<i64>)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT s.snapshot_date, s.followers, d.delta
           FROM follower_snapshots s
           LEFT JOIN follower_deltas d
             ON  d.tenant_id   = s.tenant_id
             AND d.platform    = s.platform
             AND d.playlist_id = s.playlist_id
             AND d.delta_date  = s.snapshot_date
           WHERE s.tenant_id = ?1 AND s.platform = ?2 AND s.playlist_id = ?3
             AND (?4 IS NULL OR s.snapshot_date >= ?4)
             AND (?5 IS NULL OR s.snapshot_date <= ?5)
           ORDER BY s.snapshot_date",
        )?;
        let rows = stmt
          .query_map(
            rusqlite::params![tenant_str, plat_str, list_str, from_str, to_str],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(date, followers, delta)| {
        Ok(FollowerPoint {
          date:      decode_date(&date)?,
          followers: followers as u64,
          delta:     delta.map(|d| d as u64),
        })
      })
      .collect()
  }

  async fn conservation_report(
    &self,
    tenant_id: Uuid,
  ) -> Result<ConservationReport> {
    self.require_tenant(tenant_id).await?;
    let tenant_str = encode_uuid(tenant_id);

    type RawRows = (
      Vec<(String, String, i64)>,
      Vec<(String, String, i64)>,
      i64,
      i64,
    );

    let (delta_sums, latest, total_sum, credit_sum): RawRows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT platform, track_id, COALESCE(SUM(delta), 0)
           FROM stream_deltas WHERE tenant_id = ?1
           GROUP BY platform, track_id",
        )?;
        let delta_sums = stmt
          .query_map(rusqlite::params![tenant_str], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
          "SELECT s.platform, s.track_id, s.playcount
           FROM stream_snapshots s
           WHERE s.tenant_id = ?1
             AND s.snapshot_date = (
               SELECT MAX(s2.snapshot_date) FROM stream_snapshots s2
               WHERE s2.tenant_id = s.tenant_id
                 AND s2.platform  = s.platform
                 AND s2.track_id  = s.track_id
             )",
        )?;
        let latest = stmt
          .query_map(rusqlite::params![tenant_str], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let total_sum: i64 = conn.query_row(
          "SELECT COALESCE(SUM(total_delta), 0) FROM daily_totals
           WHERE tenant_id = ?1",
          rusqlite::params![tenant_str],
          |r| r.get(0),
        )?;
        let credit_sum: i64 = conn.query_row(
          "SELECT COALESCE(SUM(moved_alltime), 0) FROM lag_credits
           WHERE tenant_id = ?1",
          rusqlite::params![tenant_str],
          |r| r.get(0),
        )?;

        Ok((delta_sums, latest, total_sum, credit_sum))
      })
      .await?;

    // Only entities whose latest cumulative snapshot still exists can be
    // compared; fully pruned entities are skipped rather than reported
    // against a phantom zero.
    let mut rows = Vec::new();
    for (plat, track, cumulative) in latest {
      let delta_sum = delta_sums
        .iter()
        .find(|(p, t, _)| *p == plat && *t == track)
        .map_or(0, |(_, _, s)| *s);
      rows.push(ConservationRow {
        platform:          decode_platform(&plat)?,
        track_id:          decode_uuid(&track)?,
        delta_sum:         delta_sum as u64,
        latest_cumulative: cumulative as u64,
      });
    }

    Ok(ConservationReport {
      tenant_id,
      rows,
      total_delta_sum: total_sum as u64,
      credit_sum,
    })
  }

  // ── Catalogue health ──────────────────────────────────────────────────────

  async fn record_health(
    &self,
    tenant_id: Uuid,
    track_id: Uuid,
    check_date: NaiveDate,
    platform: Platform,
    available: bool,
  ) -> Result<HealthSnapshot> {
    Self::check_date(check_date)?;
    self.require_track(tenant_id, track_id).await?;

    let tenant_str = encode_uuid(tenant_id);
    let track_str  = encode_uuid(track_id);
    let date_str   = encode_date(check_date);
    let at_str     = encode_dt(Utc::now());
    let column     = match platform {
      Platform::Spotify => "spotify_ok",
      Platform::AppleMusic => "apple_music_ok",
    };

    let raw: RawHealth = self
      .conn
      .call(move |conn| {
        // The column name comes from the closed Platform enum, never from
        // caller input.
        conn.execute(
          &format!(
            "INSERT INTO catalogue_health (
               tenant_id, track_id, check_date, {column}, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (tenant_id, track_id, check_date)
             DO UPDATE SET {column}    = excluded.{column},
                           updated_at = excluded.updated_at"
          ),
          rusqlite::params![tenant_str, track_str, date_str, available, at_str],
        )?;

        Ok(conn.query_row(
          "SELECT tenant_id, track_id, check_date, spotify_ok,
                  apple_music_ok, updated_at
           FROM catalogue_health
           WHERE tenant_id = ?1 AND track_id = ?2 AND check_date = ?3",
          rusqlite::params![tenant_str, track_str, date_str],
          |row| {
            Ok(RawHealth {
              tenant_id:      row.get(0)?,
              track_id:       row.get(1)?,
              check_date:     row.get(2)?,
              spotify_ok:     row.get(3)?,
              apple_music_ok: row.get(4)?,
              updated_at:     row.get(5)?,
            })
          },
        )?)
      })
      .await?;

    raw.into_snapshot()
  }

  async fn health_snapshots(
    &self,
    tenant_id: Uuid,
    window: DayWindow,
  ) -> Result<Vec<HealthSnapshot>> {
    let tenant_str = encode_uuid(tenant_id);
    let from_str   = window.from.map(encode_date);
    let to_str     = window.to.map(encode_date);

    let raws: Vec<RawHealth> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT tenant_id, track_id, check_date, spotify_ok,
                  apple_music_ok, updated_at
           FROM catalogue_health
           WHERE tenant_id = ?1
             AND (?2 IS NULL OR check_date >= ?2)
             AND (?3 IS NULL OR check_date <= ?3)
           ORDER BY check_date, track_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![tenant_str, from_str, to_str], |row| {
            Ok(RawHealth {
              tenant_id:      row.get(0)?,
              track_id:       row.get(1)?,
              check_date:     row.get(2)?,
              spotify_ok:     row.get(3)?,
              apple_music_ok: row.get(4)?,
              updated_at:     row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawHealth::into_snapshot).collect()
  }

  async fn catalogue_size_series(
    &self,
    tenant_id: Uuid,
  ) -> Result<Vec<CataloguePoint>> {
    let tenant_str = encode_uuid(tenant_id);

    let rows: Vec<(String, i64, i64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT check_date,
                  SUM(CASE WHEN spotify_ok = 1 OR apple_music_ok = 1
                      THEN 1 ELSE 0 END),
                  COUNT(*)
           FROM catalogue_health
           WHERE tenant_id = ?1
           GROUP BY check_date
           ORDER BY check_date",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![tenant_str], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(date, available, checked)| {
        Ok(CataloguePoint {
          check_date:       decode_date(&date)?,
          available_tracks: available as u64,
          checked_tracks:   checked as u64,
        })
      })
      .collect()
  }

  // ── Retention & compression ───────────────────────────────────────────────

  async fn prune_snapshots(
    &self,
    tenant_id: Uuid,
    cutoff: NaiveDate,
  ) -> Result<PruneOutcome> {
    self.require_tenant(tenant_id).await?;

    let tenant_str = encode_uuid(tenant_id);
    let cutoff_str = encode_date(cutoff);

    let outcome: std::result::Result<(usize, usize), String> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        if let Some(day) = unfinalized_day(&tx, &tenant_str, &cutoff_str)? {
          return Ok(Err(day));
        }

        let stream_rows = tx.execute(
          "DELETE FROM stream_snapshots
           WHERE tenant_id = ?1 AND snapshot_date < ?2",
          rusqlite::params![tenant_str, cutoff_str],
        )?;
        let follower_rows = tx.execute(
          "DELETE FROM follower_snapshots
           WHERE tenant_id = ?1 AND snapshot_date < ?2",
          rusqlite::params![tenant_str, cutoff_str],
        )?;

        tx.commit()?;
        Ok(Ok((stream_rows, follower_rows)))
      })
      .await?;

    match outcome {
      Ok((stream_rows, follower_rows)) => {
        Ok(PruneOutcome { stream_rows, follower_rows })
      }
      Err(day) => Err(Error::NotFinalized(decode_date(&day)?)),
    }
  }

  async fn compress_snapshots(
    &self,
    tenant_id: Uuid,
    cutoff: NaiveDate,
  ) -> Result<PruneOutcome> {
    self.require_tenant(tenant_id).await?;

    let tenant_str = encode_uuid(tenant_id);
    let cutoff_str = encode_date(cutoff);

    let outcome: std::result::Result<(usize, usize), String> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        if let Some(day) = unfinalized_day(&tx, &tenant_str, &cutoff_str)? {
          return Ok(Err(day));
        }

        // Keep the newest pre-cutoff row per entity: it is the baseline the
        // next delta derivation subtracts from.
        let stream_rows = tx.execute(
          "DELETE FROM stream_snapshots
           WHERE tenant_id = ?1 AND snapshot_date < ?2
             AND snapshot_date < (
               SELECT MAX(s2.snapshot_date) FROM stream_snapshots s2
               WHERE s2.tenant_id = stream_snapshots.tenant_id
                 AND s2.platform  = stream_snapshots.platform
                 AND s2.track_id  = stream_snapshots.track_id
                 AND s2.snapshot_date < ?2
             )",
          rusqlite::params![tenant_str, cutoff_str],
        )?;
        let follower_rows = tx.execute(
          "DELETE FROM follower_snapshots
           WHERE tenant_id = ?1 AND snapshot_date < ?2
             AND snapshot_date < (
               SELECT MAX(s2.snapshot_date) FROM follower_snapshots s2
               WHERE s2.tenant_id   = follower_snapshots.tenant_id
                 AND s2.platform    = follower_snapshots.platform
                 AND s2.playlist_id = follower_snapshots.playlist_id
                 AND s2.snapshot_date < ?2
             )",
          rusqlite::params![tenant_str, cutoff_str],
        )?;

        tx.commit()?;
        Ok(Ok((stream_rows, follower_rows)))
      })
      .await?;

    match outcome {
      Ok((stream_rows, follower_rows)) => {
        Ok(PruneOutcome { stream_rows, follower_rows })
      }
      Err(day) => Err(Error::NotFinalized(decode_date(&day)?)),
    }
  }
}

// ─── Row mappers ─────────────────────────────────────────────────────────────

fn map_track_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawTrack> {
  Ok(RawTrack {
    track_id:      row.get(0)?,
    tenant_id:     row.get(1)?,
    external_code: row.get(2)?,
    title:         row.get(3)?,
    artist:        row.get(4)?,
    release_date:  row.get(5)?,
    created_at:    row.get(6)?,
  })
}

fn map_playlist_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawPlaylist> {
  Ok(RawPlaylist {
    playlist_id:   row.get(0)?,
    tenant_id:     row.get(1)?,
    external_code: row.get(2)?,
    name:          row.get(3)?,
    created_at:    row.get(4)?,
  })
}

/// First non-finalized day at or before `cutoff`, if any — the guard that
/// keeps retention away from data still inside the lag window.
fn unfinalized_day(
  tx: &rusqlite::Transaction<'_>,
  tenant_str: &str,
  cutoff_str: &str,
) -> rusqlite::Result<Option<String>> {
  tx.query_row(
    "SELECT day FROM daily_totals
     WHERE tenant_id = ?1 AND day <= ?2 AND finalized = 0
     ORDER BY day LIMIT 1",
    rusqlite::params![tenant_str, cutoff_str],
    |r| r.get(0),
  )
  .optional()
}
