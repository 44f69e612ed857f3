//! Attempt log — one row per enrollment attempt, successful or not.
//!
//! Rows are never deduplicated or updated; the log exists for per-IP rate
//! limiting and audit only.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
  pub attempt_id:   Uuid,
  pub ip_address:   String,
  pub user_agent:   Option<String>,
  /// Raw address as submitted, if any.
  pub email:        Option<String>,
  pub success:      bool,
  pub reason:       Option<String>,
  pub attempted_at: DateTime<Utc>,
}

/// Input form; id and timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewAttempt {
  pub ip_address: String,
  pub user_agent: Option<String>,
  pub email:      Option<String>,
  pub success:    bool,
  pub reason:     Option<String>,
}
