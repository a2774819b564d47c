//! Tenant — the multi-tenancy boundary.
//!
//! Every fact, derived row, and aggregate is scoped to exactly one tenant.
//! Deleting a tenant cascades to all of its data; nothing survives it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An account that owns a catalogue and all metrics derived from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
  pub tenant_id:    Uuid,
  pub created_at:   DateTime<Utc>,
  pub display_name: String,
}
