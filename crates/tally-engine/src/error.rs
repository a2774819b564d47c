//! Error type for `tally-engine`.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// Another recompute held the same entity's lock for the whole retry
  /// budget. The caller may simply try again later.
  #[error("entity recompute contended after {retries} retries")]
  Contended { retries: u32 },

  /// Retention or compression requested for data still inside the lag
  /// window. Nothing was touched.
  #[error("cutoff {cutoff} is inside the lag window (horizon {horizon})")]
  RetentionWindow { cutoff: NaiveDate, horizon: NaiveDate },
}

impl Error {
  pub fn store<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
