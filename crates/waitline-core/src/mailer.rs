//! The `Mailer` trait — the outbound-delivery seam.
//!
//! Transport variants (static-credential SMTP, OAuth2 relay) live in
//! `waitline-mailer`; this crate only defines the contract and the
//! already-classified failure shape they all produce.

use std::future::Future;

use thiserror::Error;

/// A fully rendered message, ready for transport.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
  /// Recipient as typed by the subscriber.
  pub to:            String,
  /// Canonical identity, for audit rows.
  pub to_normalized: String,
  pub template_name: String,
  pub subject:       String,
  pub html_body:     String,
  pub text_body:     String,
}

/// Proof of a successful handoff to the transport.
#[derive(Debug, Clone)]
pub struct SendReceipt {
  pub message_id: String,
}

/// A failed send attempt, already classified by
/// [`crate::bounce::is_hard_bounce`].
#[derive(Debug, Clone, Error)]
#[error("send failed ({code}): {message}")]
pub struct SendFailure {
  /// Short machine-readable failure class, e.g. `smtp_permanent`.
  pub code:        String,
  /// Raw transport error text. Never crosses the API boundary.
  pub message:     String,
  /// True when the recipient address is permanently invalid.
  pub hard_bounce: bool,
}

/// Abstraction over an outbound email transport.
///
/// One best-effort send per call — retry policy is an external concern.
pub trait Mailer: Send + Sync {
  /// Short provider tag recorded on submissions and delivery rows.
  fn name(&self) -> &str;

  /// Attempt one delivery. Blocking network operation, no internal retry.
  fn send<'a>(
    &'a self,
    email: &'a OutboundEmail,
  ) -> impl Future<Output = Result<SendReceipt, SendFailure>> + Send + 'a;

  /// Verify transport reachability without sending anything.
  fn test_connection(&self) -> impl Future<Output = bool> + Send + '_;
}
