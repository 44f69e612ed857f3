//! Suppression ledger entries — permanent do-not-send records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why an identity is suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
  HardBounce,
}

/// One suppressed canonical identity.
///
/// Created on the first hard bounce, updated (never duplicated) on repeats.
/// Entries are permanent within this core; removal is an external
/// administrative action.
#[derive(Debug, Clone, Serialize)]
pub struct SuppressionEntry {
  pub email_normalized: String,
  pub reason:           SuppressionReason,
  pub provider:         Option<String>,
  /// Structured diagnostic payload from the most recent bounce.
  pub evidence:         serde_json::Value,
  pub created_at:       DateTime<Utc>,
  pub last_seen_at:     DateTime<Utc>,
}

/// Diagnostic payload recorded with a bounce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BounceEvidence {
  pub error_code:    String,
  pub error_message: String,
  pub occurred_at:   DateTime<Utc>,
}
