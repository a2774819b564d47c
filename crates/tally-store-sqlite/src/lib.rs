//! SQLite backend for the Tally metrics store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. A side effect worth relying on: every
//! store call is serialised on that thread, so the multi-statement
//! transactions in [`SqliteStore`] commit atomically with respect to readers.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
