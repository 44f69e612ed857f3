//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. The suppression `evidence`
//! payload is stored as compact JSON. UUIDs are stored as hyphenated
//! lowercase strings.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use waitline_core::{
  submission::{DeliveryState, Submission, SubscriberStatus},
  suppression::{SuppressionEntry, SuppressionReason},
  delivery::DeliveryRecordStatus,
};

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Status discriminants ─────────────────────────────────────────────────────

pub fn encode_subscriber_status(s: SubscriberStatus) -> &'static str {
  match s {
    SubscriberStatus::Active => "active",
    SubscriberStatus::Unsubscribed => "unsubscribed",
  }
}

pub fn decode_subscriber_status(s: &str) -> Result<SubscriberStatus> {
  match s {
    "active" => Ok(SubscriberStatus::Active),
    "unsubscribed" => Ok(SubscriberStatus::Unsubscribed),
    other => Err(Error::Decode(format!("unknown subscriber status: {other:?}"))),
  }
}

pub fn encode_delivery_state(s: DeliveryState) -> &'static str {
  match s {
    DeliveryState::None => "none",
    DeliveryState::Sent => "sent",
    DeliveryState::Failed => "failed",
    DeliveryState::Suppressed => "suppressed",
  }
}

pub fn decode_delivery_state(s: &str) -> Result<DeliveryState> {
  match s {
    "none" => Ok(DeliveryState::None),
    "sent" => Ok(DeliveryState::Sent),
    "failed" => Ok(DeliveryState::Failed),
    "suppressed" => Ok(DeliveryState::Suppressed),
    other => Err(Error::Decode(format!("unknown delivery state: {other:?}"))),
  }
}

pub fn encode_delivery_record_status(s: DeliveryRecordStatus) -> &'static str {
  match s {
    DeliveryRecordStatus::Queued => "queued",
    DeliveryRecordStatus::Sent => "sent",
    DeliveryRecordStatus::Failed => "failed",
    DeliveryRecordStatus::Suppressed => "suppressed",
  }
}

pub fn encode_suppression_reason(r: SuppressionReason) -> &'static str {
  match r {
    SuppressionReason::HardBounce => "hard_bounce",
  }
}

pub fn decode_suppression_reason(s: &str) -> Result<SuppressionReason> {
  match s {
    "hard_bounce" => Ok(SuppressionReason::HardBounce),
    other => Err(Error::Decode(format!("unknown suppression reason: {other:?}"))),
  }
}

// ─── Raw row types ────────────────────────────────────────────────────────────

/// Column order used by every submission SELECT and the INSERT.
pub const SUBMISSION_COLUMNS: &str = "submission_id, email, email_normalized, \
   source, discovery_source, user_agent, ip_address, status, confirmed_at, \
   delivery_state, delivery_provider, first_message_id, last_error_code, \
   last_error_message, last_delivery_at, created_at";

/// A `submissions` row as raw column text, before domain decoding.
#[derive(Debug, Clone)]
pub struct RawSubmission {
  pub submission_id:      String,
  pub email:              String,
  pub email_normalized:   String,
  pub source:             Option<String>,
  pub discovery_source:   Option<String>,
  pub user_agent:         Option<String>,
  pub ip_address:         Option<String>,
  pub status:             String,
  pub confirmed_at:       Option<String>,
  pub delivery_state:     String,
  pub delivery_provider:  Option<String>,
  pub first_message_id:   Option<String>,
  pub last_error_code:    Option<String>,
  pub last_error_message: Option<String>,
  pub last_delivery_at:   Option<String>,
  pub created_at:         String,
}

impl RawSubmission {
  /// Read one row laid out as [`SUBMISSION_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      submission_id:      row.get(0)?,
      email:              row.get(1)?,
      email_normalized:   row.get(2)?,
      source:             row.get(3)?,
      discovery_source:   row.get(4)?,
      user_agent:         row.get(5)?,
      ip_address:         row.get(6)?,
      status:             row.get(7)?,
      confirmed_at:       row.get(8)?,
      delivery_state:     row.get(9)?,
      delivery_provider:  row.get(10)?,
      first_message_id:   row.get(11)?,
      last_error_code:    row.get(12)?,
      last_error_message: row.get(13)?,
      last_delivery_at:   row.get(14)?,
      created_at:         row.get(15)?,
    })
  }

  pub fn into_submission(self) -> Result<Submission> {
    Ok(Submission {
      submission_id:      decode_uuid(&self.submission_id)?,
      email:              self.email,
      email_normalized:   self.email_normalized,
      source:             self.source,
      discovery_source:   self.discovery_source,
      user_agent:         self.user_agent,
      ip_address:         self.ip_address,
      status:             decode_subscriber_status(&self.status)?,
      confirmed_at:       self.confirmed_at.as_deref().map(decode_dt).transpose()?,
      delivery_state:     decode_delivery_state(&self.delivery_state)?,
      delivery_provider:  self.delivery_provider,
      first_message_id:   self.first_message_id,
      last_error_code:    self.last_error_code,
      last_error_message: self.last_error_message,
      last_delivery_at:   self.last_delivery_at.as_deref().map(decode_dt).transpose()?,
      created_at:         decode_dt(&self.created_at)?,
    })
  }
}

/// A `suppressions` row as raw column text.
#[derive(Debug, Clone)]
pub struct RawSuppression {
  pub email_normalized: String,
  pub reason:           String,
  pub provider:         Option<String>,
  pub evidence:         String,
  pub created_at:       String,
  pub last_seen_at:     String,
}

impl RawSuppression {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      email_normalized: row.get(0)?,
      reason:           row.get(1)?,
      provider:         row.get(2)?,
      evidence:         row.get(3)?,
      created_at:       row.get(4)?,
      last_seen_at:     row.get(5)?,
    })
  }

  pub fn into_entry(self) -> Result<SuppressionEntry> {
    Ok(SuppressionEntry {
      email_normalized: self.email_normalized,
      reason:           decode_suppression_reason(&self.reason)?,
      provider:         self.provider,
      evidence:         serde_json::from_str(&self.evidence)?,
      created_at:       decode_dt(&self.created_at)?,
      last_seen_at:     decode_dt(&self.last_seen_at)?,
    })
  }
}
