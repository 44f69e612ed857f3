//! The `WaitlistStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g.
//! `waitline-store-sqlite`). It covers the four persisted collections —
//! submissions, the attempt log, the suppression ledger, and the delivery
//! audit trail — behind one contract; the orchestrator never touches a
//! table except through it.
//!
//! All methods return `Send` futures so the trait can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`).

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  attempt::{Attempt, NewAttempt},
  delivery::{DeliveryRecord, NewDeliveryRecord},
  identity::CanonicalEmail,
  submission::{
    DeliveryUpdate, EnrollmentMeta, Submission, SubmissionPage, WaitlistStats,
  },
  suppression::{BounceEvidence, SuppressionEntry},
};

pub trait WaitlistStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Submissions ───────────────────────────────────────────────────────

  /// Atomic get-or-create for a canonical identity.
  ///
  /// Returns the submission plus `is_new`. Under N concurrent enrollments
  /// of one identity exactly one caller observes `is_new = true`; the
  /// uniqueness constraint on the normalized address is the arbiter, not
  /// any application-level lock. An existing row has its `confirmed_at`
  /// backfilled when unset.
  fn enroll<'a>(
    &'a self,
    identity: &'a CanonicalEmail,
    meta: EnrollmentMeta,
  ) -> impl Future<Output = Result<(Submission, bool), Self::Error>> + Send + 'a;

  /// Look up a submission by its normalized address.
  fn find_submission<'a>(
    &'a self,
    normalized: &'a str,
  ) -> impl Future<Output = Result<Option<Submission>, Self::Error>> + Send + 'a;

  /// 1-based rank among active submissions, ordered by creation time with
  /// insertion order breaking ties. `None` if the id is unknown.
  ///
  /// Computed as a count of earlier rows on every call — O(n) per lookup,
  /// fine at waitlist scale.
  fn position(
    &self,
    submission_id: Uuid,
  ) -> impl Future<Output = Result<Option<u64>, Self::Error>> + Send + '_;

  /// Number of active submissions.
  fn total_active(
    &self,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Write delivery-outcome fields back onto a submission.
  fn mark_delivery(
    &self,
    submission_id: Uuid,
    update: DeliveryUpdate,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Mark the submission for `normalized` as unsubscribed. Returns whether
  /// a row was affected.
  fn unsubscribe<'a>(
    &'a self,
    normalized: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  // ── Attempt log ───────────────────────────────────────────────────────

  /// Append one attempt row. Rows are never updated or deduplicated.
  fn log_attempt(
    &self,
    attempt: NewAttempt,
  ) -> impl Future<Output = Result<Attempt, Self::Error>> + Send + '_;

  /// Count attempts from `ip` at or after `since` — the rate-limit window
  /// query. Counts every attempt, successful or not.
  fn attempts_since<'a>(
    &'a self,
    ip: &'a str,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Delete attempt rows older than `cutoff`; returns the deleted count.
  fn prune_attempts(
    &self,
    cutoff: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Suppression ledger ────────────────────────────────────────────────

  /// Consulted before every send attempt.
  fn is_suppressed<'a>(
    &'a self,
    normalized: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Upsert: create on first bounce, refresh `last_seen_at` and `evidence`
  /// on repeats. Entries are never deleted by this core.
  fn record_bounce<'a>(
    &'a self,
    normalized: &'a str,
    provider: &'a str,
    evidence: BounceEvidence,
  ) -> impl Future<Output = Result<SuppressionEntry, Self::Error>> + Send + 'a;

  // ── Delivery audit ────────────────────────────────────────────────────

  /// Append one delivery audit row.
  fn record_delivery(
    &self,
    record: NewDeliveryRecord,
  ) -> impl Future<Output = Result<DeliveryRecord, Self::Error>> + Send + '_;

  // ── Read views ────────────────────────────────────────────────────────

  /// Administrative listing, newest first. `page` is 1-based.
  fn list_submissions(
    &self,
    page: u64,
    page_size: u64,
  ) -> impl Future<Output = Result<SubmissionPage, Self::Error>> + Send + '_;

  /// Every submission, newest first — backs the CSV export.
  fn export_rows(
    &self,
  ) -> impl Future<Output = Result<Vec<Submission>, Self::Error>> + Send + '_;

  /// Aggregate counters for the admin dashboard.
  fn stats(
    &self,
  ) -> impl Future<Output = Result<WaitlistStats, Self::Error>> + Send + '_;
}
