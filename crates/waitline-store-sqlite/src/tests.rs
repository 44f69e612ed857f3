//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{Duration, Utc};
use uuid::Uuid;

use waitline_core::{
  delivery::{DeliveryRecordStatus, NewDeliveryRecord},
  attempt::NewAttempt,
  identity::{self, CanonicalEmail},
  store::WaitlistStore,
  submission::{DeliveryState, DeliveryUpdate, EnrollmentMeta, SubscriberStatus},
  suppression::{BounceEvidence, SuppressionReason},
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn canonical(raw: &str) -> CanonicalEmail {
  identity::normalize(raw).expect("valid test address")
}

fn meta() -> EnrollmentMeta {
  EnrollmentMeta {
    source:           Some("waitlist-form".into()),
    discovery_source: Some("search".into()),
    user_agent:       Some("test-agent".into()),
    ip_address:       Some("1.2.3.4".into()),
  }
}

fn evidence(message: &str) -> BounceEvidence {
  BounceEvidence {
    error_code:    "smtp_permanent".into(),
    error_message: message.into(),
    occurred_at:   Utc::now(),
  }
}

// ─── Enroll ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn enroll_creates_then_finds_existing() {
  let s = store().await;
  let id = canonical("A.B+x@Gmail.com");

  let (first, is_new) = s.enroll(&id, meta()).await.unwrap();
  assert!(is_new);
  assert_eq!(first.email, "A.B+x@Gmail.com");
  assert_eq!(first.email_normalized, "ab@gmail.com");
  assert_eq!(first.status, SubscriberStatus::Active);
  assert_eq!(first.delivery_state, DeliveryState::None);
  assert!(first.confirmed_at.is_some());
  assert_eq!(first.source.as_deref(), Some("waitlist-form"));

  // Same canonical identity, different raw spelling.
  let (second, is_new) = s.enroll(&canonical("ab@gmail.com"), meta()).await.unwrap();
  assert!(!is_new);
  assert_eq!(second.submission_id, first.submission_id);
  assert_eq!(second.confirmed_at, first.confirmed_at);

  assert_eq!(s.total_active().await.unwrap(), 1);
}

#[tokio::test]
async fn concurrent_enrolls_have_a_single_winner() {
  let s = store().await;

  let mut handles = Vec::new();
  for _ in 0..20 {
    let s = s.clone();
    handles.push(tokio::spawn(async move {
      let (_, is_new) = s.enroll(&canonical("du.plicate@gmail.com"), meta()).await.unwrap();
      is_new
    }));
  }

  let mut winners = 0;
  for handle in handles {
    if handle.await.unwrap() {
      winners += 1;
    }
  }

  assert_eq!(winners, 1);
  assert_eq!(s.total_active().await.unwrap(), 1);
}

#[tokio::test]
async fn find_submission_missing_returns_none() {
  let s = store().await;
  assert!(s.find_submission("nobody@example.com").await.unwrap().is_none());
}

// ─── Ordering ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn positions_follow_enrollment_order() {
  let s = store().await;

  let (a, _) = s.enroll(&canonical("a@example.com"), meta()).await.unwrap();
  let (b, _) = s.enroll(&canonical("b@example.com"), meta()).await.unwrap();
  let (c, _) = s.enroll(&canonical("c@example.com"), meta()).await.unwrap();

  assert_eq!(s.position(a.submission_id).await.unwrap(), Some(1));
  assert_eq!(s.position(b.submission_id).await.unwrap(), Some(2));
  assert_eq!(s.position(c.submission_id).await.unwrap(), Some(3));
  assert_eq!(s.total_active().await.unwrap(), 3);
}

#[tokio::test]
async fn unsubscribed_rows_leave_the_ranking() {
  let s = store().await;

  let (a, _) = s.enroll(&canonical("a@example.com"), meta()).await.unwrap();
  let (_b, _) = s.enroll(&canonical("b@example.com"), meta()).await.unwrap();
  let (c, _) = s.enroll(&canonical("c@example.com"), meta()).await.unwrap();

  assert!(s.unsubscribe("b@example.com").await.unwrap());

  assert_eq!(s.position(a.submission_id).await.unwrap(), Some(1));
  assert_eq!(s.position(c.submission_id).await.unwrap(), Some(2));
  assert_eq!(s.total_active().await.unwrap(), 2);
}

#[tokio::test]
async fn position_unknown_id_returns_none() {
  let s = store().await;
  assert_eq!(s.position(Uuid::new_v4()).await.unwrap(), None);
}

#[tokio::test]
async fn unsubscribe_unknown_returns_false() {
  let s = store().await;
  assert!(!s.unsubscribe("ghost@example.com").await.unwrap());
}

// ─── Attempt log ─────────────────────────────────────────────────────────────

fn attempt(ip: &str, success: bool) -> NewAttempt {
  NewAttempt {
    ip_address: ip.into(),
    user_agent: Some("test-agent".into()),
    email:      Some("a@example.com".into()),
    success,
    reason:     (!success).then(|| "captcha failed".into()),
  }
}

#[tokio::test]
async fn attempts_counted_per_ip_inside_window() {
  let s = store().await;

  for _ in 0..3 {
    s.log_attempt(attempt("9.9.9.9", false)).await.unwrap();
  }
  s.log_attempt(attempt("8.8.8.8", true)).await.unwrap();

  let since = Utc::now() - Duration::hours(1);
  assert_eq!(s.attempts_since("9.9.9.9", since).await.unwrap(), 3);
  assert_eq!(s.attempts_since("8.8.8.8", since).await.unwrap(), 1);
  assert_eq!(s.attempts_since("7.7.7.7", since).await.unwrap(), 0);

  // A window starting in the future sees nothing.
  let future = Utc::now() + Duration::hours(1);
  assert_eq!(s.attempts_since("9.9.9.9", future).await.unwrap(), 0);
}

#[tokio::test]
async fn prune_removes_only_rows_before_cutoff() {
  let s = store().await;

  s.log_attempt(attempt("9.9.9.9", false)).await.unwrap();
  s.log_attempt(attempt("9.9.9.9", false)).await.unwrap();

  // A cutoff in the past keeps everything.
  let deleted = s.prune_attempts(Utc::now() - Duration::days(30)).await.unwrap();
  assert_eq!(deleted, 0);

  // A cutoff after the writes removes both.
  let deleted = s.prune_attempts(Utc::now() + Duration::seconds(1)).await.unwrap();
  assert_eq!(deleted, 2);

  let since = Utc::now() - Duration::hours(1);
  assert_eq!(s.attempts_since("9.9.9.9", since).await.unwrap(), 0);
}

// ─── Suppression ledger ──────────────────────────────────────────────────────

#[tokio::test]
async fn record_bounce_upserts_single_row() {
  let s = store().await;

  assert!(!s.is_suppressed("gone@example.com").await.unwrap());

  let first = s
    .record_bounce("gone@example.com", "smtp", evidence("550 5.1.1 User unknown"))
    .await
    .unwrap();
  assert!(s.is_suppressed("gone@example.com").await.unwrap());
  assert_eq!(first.reason, SuppressionReason::HardBounce);
  assert_eq!(first.provider.as_deref(), Some("smtp"));

  let second = s
    .record_bounce("gone@example.com", "oauth2", evidence("mailbox unavailable"))
    .await
    .unwrap();

  // Same row: creation stamp preserved, evidence and provider refreshed.
  assert_eq!(second.created_at, first.created_at);
  assert!(second.last_seen_at >= first.last_seen_at);
  assert_eq!(second.provider.as_deref(), Some("oauth2"));
  assert_eq!(
    second.evidence.get("error_message").and_then(|v| v.as_str()),
    Some("mailbox unavailable")
  );
}

// ─── Delivery audit ──────────────────────────────────────────────────────────

#[tokio::test]
async fn delivery_record_roundtrip_and_submission_update() {
  let s = store().await;
  let (submission, _) = s.enroll(&canonical("a@example.com"), meta()).await.unwrap();

  let record = s
    .record_delivery(NewDeliveryRecord {
      submission_id: Some(submission.submission_id),
      to_normalized: "a@example.com".into(),
      template_name: "welcome".into(),
      subject:       "You're on the waitlist!".into(),
      provider:      "smtp".into(),
      message_id:    Some("<m1@test>".into()),
      status:        DeliveryRecordStatus::Sent,
      error_code:    None,
      error_message: None,
      sent_at:       Some(Utc::now()),
    })
    .await
    .unwrap();
  assert_eq!(record.status, DeliveryRecordStatus::Sent);

  s.mark_delivery(submission.submission_id, DeliveryUpdate {
    state:         DeliveryState::Sent,
    provider:      Some("smtp".into()),
    message_id:    Some("<m1@test>".into()),
    error_code:    None,
    error_message: None,
  })
  .await
  .unwrap();

  let row = s.find_submission("a@example.com").await.unwrap().unwrap();
  assert_eq!(row.delivery_state, DeliveryState::Sent);
  assert_eq!(row.first_message_id.as_deref(), Some("<m1@test>"));
  assert!(row.last_delivery_at.is_some());
  assert!(row.last_error_code.is_none());
}

#[tokio::test]
async fn first_message_id_survives_later_failures() {
  let s = store().await;
  let (submission, _) = s.enroll(&canonical("a@example.com"), meta()).await.unwrap();

  s.mark_delivery(submission.submission_id, DeliveryUpdate {
    state:         DeliveryState::Sent,
    provider:      Some("smtp".into()),
    message_id:    Some("<m1@test>".into()),
    error_code:    None,
    error_message: None,
  })
  .await
  .unwrap();

  s.mark_delivery(submission.submission_id, DeliveryUpdate {
    state:         DeliveryState::Failed,
    provider:      Some("smtp".into()),
    message_id:    Some("<m2@test>".into()),
    error_code:    Some("smtp_transient".into()),
    error_message: Some("421 try later".into()),
  })
  .await
  .unwrap();

  let row = s.find_submission("a@example.com").await.unwrap().unwrap();
  assert_eq!(row.first_message_id.as_deref(), Some("<m1@test>"));
  assert_eq!(row.delivery_state, DeliveryState::Failed);
  assert_eq!(row.last_error_code.as_deref(), Some("smtp_transient"));
}

#[tokio::test]
async fn mark_delivery_unknown_submission_errors() {
  let s = store().await;
  let err = s
    .mark_delivery(Uuid::new_v4(), DeliveryUpdate {
      state:         DeliveryState::Sent,
      provider:      None,
      message_id:    None,
      error_code:    None,
      error_message: None,
    })
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::SubmissionNotFound(_)));
}

// ─── Read views ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn listing_paginates_newest_first() {
  let s = store().await;
  for n in 0..5 {
    s.enroll(&canonical(&format!("user{n}@example.com")), meta())
      .await
      .unwrap();
  }

  let page = s.list_submissions(1, 2).await.unwrap();
  assert_eq!(page.total, 5);
  assert_eq!(page.page_count, 3);
  assert_eq!(page.items.len(), 2);
  assert_eq!(page.items[0].email, "user4@example.com");

  let last = s.list_submissions(3, 2).await.unwrap();
  assert_eq!(last.items.len(), 1);
  assert_eq!(last.items[0].email, "user0@example.com");
}

#[tokio::test]
async fn export_returns_all_rows_newest_first() {
  let s = store().await;
  s.enroll(&canonical("first@example.com"), meta()).await.unwrap();
  s.enroll(&canonical("second@example.com"), meta()).await.unwrap();

  let rows = s.export_rows().await.unwrap();
  assert_eq!(rows.len(), 2);
  assert_eq!(rows[0].email, "second@example.com");
  assert_eq!(rows[1].email, "first@example.com");
}

#[tokio::test]
async fn stats_count_submissions_and_attempts() {
  let s = store().await;
  s.enroll(&canonical("a@example.com"), meta()).await.unwrap();
  s.enroll(&canonical("b@example.com"), meta()).await.unwrap();
  s.unsubscribe("b@example.com").await.unwrap();

  s.log_attempt(attempt("1.1.1.1", true)).await.unwrap();
  s.log_attempt(attempt("1.1.1.1", false)).await.unwrap();

  let stats = s.stats().await.unwrap();
  assert_eq!(stats.total_active, 1);
  assert_eq!(stats.today, 1);
  assert_eq!(stats.this_week, 1);
  assert_eq!(stats.attempts, 2);
  assert_eq!(stats.successful_attempts, 1);
  assert!((stats.conversion_rate - 50.0).abs() < f64::EPSILON);
}
