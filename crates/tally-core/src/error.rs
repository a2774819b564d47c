//! Error types for `tally-core`.

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
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

  #[error("unknown platform: {0:?}")]
  UnknownPlatform(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
