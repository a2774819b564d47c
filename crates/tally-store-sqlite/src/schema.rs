//! SQL schema for the Tally SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! the `PRAGMA user_version` number.
//!
//! Two tiers of data live here. Raw snapshot tables are ephemeral inputs —
//! retention may drop or compress them once their days finalize. Daily
//! totals and lag credits are the durable reconciled record and are never
//! touched by retention. Every tenant-scoped table carries `tenant_id`
//! directly so isolation is enforceable without joins.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS tenants (
    tenant_id    TEXT PRIMARY KEY,
    created_at   TEXT NOT NULL,
    display_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tracks (
    track_id      TEXT PRIMARY KEY,
    tenant_id     TEXT NOT NULL REFERENCES tenants(tenant_id) ON DELETE CASCADE,
    external_code TEXT NOT NULL,   -- ISRC-equivalent catalogue identifier
    title         TEXT,
    artist        TEXT,
    release_date  TEXT,            -- ISO 8601 date
    created_at    TEXT NOT NULL,
    UNIQUE (tenant_id, external_code)
);

CREATE TABLE IF NOT EXISTS playlists (
    playlist_id   TEXT PRIMARY KEY,
    tenant_id     TEXT NOT NULL REFERENCES tenants(tenant_id) ON DELETE CASCADE,
    external_code TEXT NOT NULL,   -- platform playlist identifier
    name          TEXT,
    created_at    TEXT NOT NULL,
    UNIQUE (tenant_id, external_code)
);

-- Raw cumulative play counts. Upsert-only: a repeated write for the same
-- key overwrites the value. Deltas are never stored here.
CREATE TABLE IF NOT EXISTS stream_snapshots (
    tenant_id     TEXT NOT NULL REFERENCES tenants(tenant_id) ON DELETE CASCADE,
    platform      TEXT NOT NULL,   -- 'spotify' | 'apple_music'
    track_id      TEXT NOT NULL REFERENCES tracks(track_id) ON DELETE CASCADE,
    snapshot_date TEXT NOT NULL,   -- ISO 8601 date
    playcount     INTEGER NOT NULL CHECK (playcount >= 0),
    recorded_at   TEXT NOT NULL,   -- ISO 8601 UTC; server-assigned
    PRIMARY KEY (tenant_id, platform, track_id, snapshot_date)
);

CREATE TABLE IF NOT EXISTS follower_snapshots (
    tenant_id     TEXT NOT NULL REFERENCES tenants(tenant_id) ON DELETE CASCADE,
    platform      TEXT NOT NULL,
    playlist_id   TEXT NOT NULL REFERENCES playlists(playlist_id) ON DELETE CASCADE,
    snapshot_date TEXT NOT NULL,
    followers     INTEGER NOT NULL CHECK (followers >= 0),
    recorded_at   TEXT NOT NULL,
    PRIMARY KEY (tenant_id, platform, playlist_id, snapshot_date)
);

-- Derived per-entity daily increments. Replaced wholesale per entity inside
-- one recompute transaction; never patched row-by-row.
CREATE TABLE IF NOT EXISTS stream_deltas (
    tenant_id  TEXT NOT NULL REFERENCES tenants(tenant_id) ON DELETE CASCADE,
    platform   TEXT NOT NULL,
    track_id   TEXT NOT NULL REFERENCES tracks(track_id) ON DELETE CASCADE,
    delta_date TEXT NOT NULL,
    delta      INTEGER NOT NULL CHECK (delta >= 0),
    PRIMARY KEY (tenant_id, platform, track_id, delta_date)
);

CREATE TABLE IF NOT EXISTS follower_deltas (
    tenant_id   TEXT NOT NULL REFERENCES tenants(tenant_id) ON DELETE CASCADE,
    platform    TEXT NOT NULL,
    playlist_id TEXT NOT NULL REFERENCES playlists(playlist_id) ON DELETE CASCADE,
    delta_date  TEXT NOT NULL,
    delta       INTEGER NOT NULL CHECK (delta >= 0),
    PRIMARY KEY (tenant_id, platform, playlist_id, delta_date)
);

-- The durable record of 'what happened on day D'. total_delta is mutable
-- until finalized; afterwards corrections land in lag_credits instead.
-- No FK to tracks: the record outlives catalogue edits.
CREATE TABLE IF NOT EXISTS daily_totals (
    tenant_id    TEXT NOT NULL REFERENCES tenants(tenant_id) ON DELETE CASCADE,
    day          TEXT NOT NULL,
    total_delta  INTEGER NOT NULL DEFAULT 0,
    finalized    INTEGER NOT NULL DEFAULT 0,
    finalized_at TEXT,
    PRIMARY KEY (tenant_id, day)
);

CREATE TABLE IF NOT EXISTS lag_credits (
    tenant_id     TEXT NOT NULL REFERENCES tenants(tenant_id) ON DELETE CASCADE,
    day           TEXT NOT NULL,
    moved_today   INTEGER NOT NULL DEFAULT 0,   -- signed; most recent pass
    moved_alltime INTEGER NOT NULL DEFAULT 0,   -- signed; cumulative
    PRIMARY KEY (tenant_id, day)
);

-- Point-in-time availability, one row per track per check date. NULL means
-- the platform was not checked that day.
CREATE TABLE IF NOT EXISTS catalogue_health (
    tenant_id      TEXT NOT NULL REFERENCES tenants(tenant_id) ON DELETE CASCADE,
    track_id       TEXT NOT NULL REFERENCES tracks(track_id) ON DELETE CASCADE,
    check_date     TEXT NOT NULL,
    spotify_ok     INTEGER,
    apple_music_ok INTEGER,
    updated_at     TEXT NOT NULL,
    PRIMARY KEY (tenant_id, track_id, check_date)
);

CREATE INDEX IF NOT EXISTS stream_snapshots_date_idx
    ON stream_snapshots(tenant_id, snapshot_date);
CREATE INDEX IF NOT EXISTS stream_deltas_day_idx
    ON stream_deltas(tenant_id, delta_date);
CREATE INDEX IF NOT EXISTS follower_snapshots_date_idx
    ON follower_snapshots(tenant_id, snapshot_date);
CREATE INDEX IF NOT EXISTS catalogue_health_date_idx
    ON catalogue_health(tenant_id, check_date);

PRAGMA user_version = 1;
";
