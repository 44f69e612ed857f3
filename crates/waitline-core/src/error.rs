//! Error types for `waitline-core`.

use thiserror::Error;

/// Enrollment rejection and infrastructure error kinds.
///
/// The first four variants are user-fixable and surface to the caller as
/// field-scoped messages. The remaining variants are internal faults; the
/// orchestrator logs them in full and surfaces only a generic failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
  #[error("invalid email format: {0:?}")]
  InvalidFormat(String),

  #[error("human verification failed")]
  CaptchaFailed,

  #[error("disposable email domain: {0}")]
  DisposableEmail(String),

  #[error("rate limit exceeded")]
  RateLimited,

  #[error("verification service unavailable: {0}")]
  VerifierUnavailable(String),

  #[error("storage error: {0}")]
  Storage(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
