//! Submission — one row per canonical subscriber identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subscriber lifecycle state. Only `Active` rows count toward waitlist
/// ordering and totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberStatus {
  Active,
  Unsubscribed,
}

/// Outcome of the most recent delivery attempt for a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
  #[default]
  None,
  Sent,
  Failed,
  Suppressed,
}

/// One waitlist enrollment.
///
/// `email_normalized` is globally unique: a row is created at most once per
/// canonical identity, regardless of concurrent requests. `created_at`
/// defines waitlist ordering (the store tie-breaks on insertion order).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
  pub submission_id:      Uuid,
  /// As typed by the user, trimmed.
  pub email:              String,
  /// Canonical dedup key.
  pub email_normalized:   String,
  pub source:             Option<String>,
  pub discovery_source:   Option<String>,
  pub user_agent:         Option<String>,
  pub ip_address:         Option<String>,
  pub status:             SubscriberStatus,
  /// Single opt-in: set at creation; there is no second confirmation step.
  pub confirmed_at:       Option<DateTime<Utc>>,
  pub delivery_state:     DeliveryState,
  pub delivery_provider:  Option<String>,
  pub first_message_id:   Option<String>,
  pub last_error_code:    Option<String>,
  pub last_error_message: Option<String>,
  pub last_delivery_at:   Option<DateTime<Utc>>,
  pub created_at:         DateTime<Utc>,
}

/// Provenance metadata captured alongside a new enrollment.
#[derive(Debug, Clone, Default)]
pub struct EnrollmentMeta {
  pub source:           Option<String>,
  pub discovery_source: Option<String>,
  pub user_agent:       Option<String>,
  pub ip_address:       Option<String>,
}

/// Delivery fields written back onto a submission after a send attempt.
///
/// `message_id` only ever populates `first_message_id` once; repeat updates
/// keep the original. The error fields overwrite unconditionally so a later
/// success clears them.
#[derive(Debug, Clone)]
pub struct DeliveryUpdate {
  pub state:         DeliveryState,
  pub provider:      Option<String>,
  pub message_id:    Option<String>,
  pub error_code:    Option<String>,
  pub error_message: Option<String>,
}

/// One page of the administrative submission listing.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionPage {
  pub items:      Vec<Submission>,
  pub total:      u64,
  pub page_count: u64,
}

/// Aggregate counters for the admin dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct WaitlistStats {
  pub total_active:        u64,
  pub today:               u64,
  pub this_week:           u64,
  pub attempts:            u64,
  pub successful_attempts: u64,
  /// Successful attempts / all attempts, as a percentage. 0 when no attempts.
  pub conversion_rate:     f64,
}
