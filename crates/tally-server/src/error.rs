//! Error mapping from engine/store failures to HTTP responses.
//!
//! Validation failures surface synchronously to the collector (4xx);
//! contention and retention-window refusals are retryable caller errors;
//! anything else is a 500.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;

/// Wrapper turning [`tally_engine::Error`] (and bare store errors) into
/// responses.
#[derive(Debug)]
pub struct Error(pub tally_engine::Error);

impl From<tally_engine::Error> for Error {
  fn from(e: tally_engine::Error) -> Self { Self(e) }
}

impl From<tally_store_sqlite::Error> for Error {
  fn from(e: tally_store_sqlite::Error) -> Self {
    Self(tally_engine::Error::store(e))
  }
}

fn store_status(e: &tally_store_sqlite::Error) -> StatusCode {
  use tally_store_sqlite::Error as E;
  match e {
    E::TenantNotFound(_) | E::TrackNotFound(_) | E::PlaylistNotFound(_) => {
      StatusCode::NOT_FOUND
    }
    E::FutureDate(_) | E::ValueOutOfRange(_) | E::DuplicateExternalCode { .. } => {
      StatusCode::BAD_REQUEST
    }
    E::NotFinalized(_) => StatusCode::CONFLICT,
    E::Core(_) => StatusCode::BAD_REQUEST,
    _ => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    use tally_engine::Error as E;
    let status = match &self.0 {
      E::Contended { .. } => StatusCode::SERVICE_UNAVAILABLE,
      E::RetentionWindow { .. } => StatusCode::CONFLICT,
      E::Store(inner) => inner
        .downcast_ref::<tally_store_sqlite::Error>()
        .map_or(StatusCode::INTERNAL_SERVER_ERROR, store_status),
    };
    (status, Json(json!({ "error": self.0.to_string() }))).into_response()
  }
}
