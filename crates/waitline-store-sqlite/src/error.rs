//! Error type for `waitline-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored discriminant column held an unknown value.
  #[error("decode error: {0}")]
  Decode(String),

  #[error("submission not found: {0}")]
  SubmissionNotFound(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
