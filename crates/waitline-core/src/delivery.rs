//! Delivery audit trail — one record per send attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryRecordStatus {
  Queued,
  Sent,
  Failed,
  Suppressed,
}

/// One recorded send attempt.
///
/// `submission_id` is absent for attempts short-circuited by the suppression
/// ledger before any submission existed.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryRecord {
  pub delivery_id:   Uuid,
  pub submission_id: Option<Uuid>,
  pub to_normalized: String,
  pub template_name: String,
  pub subject:       String,
  pub provider:      String,
  pub message_id:    Option<String>,
  pub status:        DeliveryRecordStatus,
  pub error_code:    Option<String>,
  pub error_message: Option<String>,
  pub sent_at:       Option<DateTime<Utc>>,
  pub created_at:    DateTime<Utc>,
}

/// Input form; id and `created_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewDeliveryRecord {
  pub submission_id: Option<Uuid>,
  pub to_normalized: String,
  pub template_name: String,
  pub subject:       String,
  pub provider:      String,
  pub message_id:    Option<String>,
  pub status:        DeliveryRecordStatus,
  pub error_code:    Option<String>,
  pub error_message: Option<String>,
  pub sent_at:       Option<DateTime<Utc>>,
}
