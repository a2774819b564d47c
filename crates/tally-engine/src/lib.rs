//! The Tally computation layer: delta derivation, reconciliation sweeps,
//! and retention policy, over any [`tally_core::store::MetricsStore`].
//!
//! The engine owns no state beyond per-entity locks; every durable mutation
//! goes through the store's recompute/reconcile contract, and re-running any
//! pass over unchanged inputs is a no-op.

pub mod delta;
pub mod engine;
pub mod error;
pub mod retention;

pub use delta::derive_deltas;
pub use engine::{Engine, EngineConfig};
pub use error::{Error, Result};

#[cfg(test)]
mod tests;
