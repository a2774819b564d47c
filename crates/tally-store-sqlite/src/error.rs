//! Error type for `tally-store-sqlite`.

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] tally_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("tenant not found: {0}")]
  TenantNotFound(Uuid),

  #[error("track not found: {0}")]
  TrackNotFound(Uuid),

  #[error("playlist not found: {0}")]
  PlaylistNotFound(Uuid),

  #[error("external code {code:?} already registered for tenant {tenant_id}")]
  DuplicateExternalCode { tenant_id: Uuid, code: String },

  #[error("snapshot date {0} is in the future")]
  FutureDate(NaiveDate),

  #[error("counter value {0} exceeds the storable range")]
  ValueOutOfRange(u64),

  /// Retention or compression attempted over a day whose total is not yet
  /// finalized. No rows were touched.
  #[error("day {0} is not finalized; raw data is still within the lag window")]
  NotFinalized(NaiveDate),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
