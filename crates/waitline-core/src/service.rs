//! The enrollment orchestrator.
//!
//! Sequences one enrollment call through screening, canonicalisation, the
//! suppression check, idempotent persistence, and the single send attempt:
//!
//! Validating → CheckingSuppression → Persisting → Sending → RecordingOutcome
//!
//! Every call is an independent, stateless invocation; all cross-request
//! correctness (at most one new submission per identity) is delegated to the
//! backing store. Once persistence reports a new row the flow always
//! proceeds to the send attempt and records its outcome — it never re-runs
//! persistence, and no retry happens inline.

use std::sync::Arc;

use chrono::Utc;

use serde::Serialize;
use uuid::Uuid;

use crate::{
  Error,
  attempt::NewAttempt,
  delivery::{DeliveryRecordStatus, NewDeliveryRecord},
  guard::{AbuseGuard, HumanProof, HumanVerifier},
  identity::{self, CanonicalEmail},
  mailer::{Mailer, OutboundEmail, SendFailure},
  store::WaitlistStore,
  submission::{DeliveryState, DeliveryUpdate, EnrollmentMeta},
  suppression::BounceEvidence,
  template,
};

// ─── Request / response types ────────────────────────────────────────────────

/// One enrollment attempt as received from the boundary layer.
#[derive(Debug, Clone)]
pub struct EnrollmentRequest {
  /// Raw address as typed.
  pub email:            String,
  pub proof:            HumanProof,
  pub source:           Option<String>,
  pub discovery_source: Option<String>,
  pub user_agent:       Option<String>,
  /// Requesting IP; the boundary substitutes `"unknown"` when absent.
  pub ip_address:       String,
}

/// Terminal result of one enrollment call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
  /// New subscriber, welcome email sent.
  Ok,
  /// Already enrolled; no new action taken.
  Exists,
  /// Identity is bounce-suppressed; no send attempted.
  Suppressed,
  /// User-fixable rejection, or a hard bounce occurred during this call.
  Invalid,
  /// Soft failure: rate limit, transient send failure, or storage error.
  Failed,
}

/// Field-scoped messages for the caller's form. Raw internal error text
/// never lands here.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FieldErrors {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub email:   Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub captcha: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub general: Option<String>,
}

/// Everything the caller learns about one enrollment call.
#[derive(Debug, Clone, Serialize)]
pub struct Enrollment {
  #[serde(rename = "result")]
  pub outcome:      Outcome,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message_id:   Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub position:     Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub total:        Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub field_errors: Option<FieldErrors>,
  /// The rejection behind `Invalid`/`Failed`, for boundary layers that map
  /// outcomes to transport status codes. Never serialized.
  #[serde(skip)]
  pub rejection:    Option<Error>,
}

impl Enrollment {
  fn terminal(outcome: Outcome) -> Self {
    Self {
      outcome,
      message_id: None,
      position: None,
      total: None,
      field_errors: None,
      rejection: None,
    }
  }

  /// Map a rejection to its terminal outcome and field-scoped message.
  fn rejected(reason: Error) -> Self {
    let (outcome, field_errors) = match &reason {
      Error::InvalidFormat(_) => (Outcome::Invalid, FieldErrors {
        email: Some("Please enter a valid email address.".into()),
        ..Default::default()
      }),
      Error::CaptchaFailed => (Outcome::Invalid, FieldErrors {
        captcha: Some("Incorrect answer. Please try again.".into()),
        ..Default::default()
      }),
      Error::DisposableEmail(_) => (Outcome::Invalid, FieldErrors {
        email: Some("Please use a permanent email address.".into()),
        ..Default::default()
      }),
      Error::RateLimited => (Outcome::Failed, FieldErrors {
        general: Some("Too many attempts. Please try again later.".into()),
        ..Default::default()
      }),
      Error::VerifierUnavailable(_) | Error::Storage(_) => {
        (Outcome::Failed, FieldErrors {
          general: Some("Something went wrong. Please try again.".into()),
          ..Default::default()
        })
      }
    };
    Self {
      field_errors: Some(field_errors),
      rejection: Some(reason),
      ..Self::terminal(outcome)
    }
  }
}

// ─── Service ─────────────────────────────────────────────────────────────────

pub struct WaitlistService<S, M, V> {
  store:  Arc<S>,
  mailer: Arc<M>,
  guard:  AbuseGuard<V>,
}

impl<S, M, V> WaitlistService<S, M, V>
where
  S: WaitlistStore,
  M: Mailer,
  V: HumanVerifier,
{
  pub fn new(store: Arc<S>, mailer: Arc<M>, guard: AbuseGuard<V>) -> Self {
    Self { store, mailer, guard }
  }

  /// Run one enrollment call to a terminal outcome.
  ///
  /// Infallible by design: every internal fault is logged with full detail
  /// and folded into the `Failed` outcome with a generic message. Exactly
  /// one attempt-log row is written per call — by the guard on rejection,
  /// by this method otherwise.
  pub async fn enroll(&self, req: EnrollmentRequest) -> Enrollment {
    // ── Validating ──────────────────────────────────────────────────────
    if let Err(rejection) = self
      .guard
      .screen(
        self.store.as_ref(),
        &req.email,
        &req.proof,
        &req.ip_address,
        req.user_agent.as_deref(),
      )
      .await
    {
      if let Error::VerifierUnavailable(detail) = &rejection {
        tracing::error!(detail, "human-verification service unavailable");
      }
      return Enrollment::rejected(rejection);
    }

    let identity = match identity::normalize(&req.email) {
      Ok(identity) => identity,
      Err(e) => {
        // The guard pre-validates shape, so this is belt-and-braces for
        // callers that bypass it.
        self.log_outcome(&req, false, Some("invalid email format")).await;
        return Enrollment::rejected(e);
      }
    };

    // ── CheckingSuppression ─────────────────────────────────────────────
    match self.store.is_suppressed(&identity.normalized).await {
      Ok(true) => {
        self.audit_suppressed(&identity).await;
        self.log_outcome(&req, false, Some("suppressed")).await;
        return Enrollment::terminal(Outcome::Suppressed);
      }
      Ok(false) => {}
      Err(e) => return self.storage_failed(&req, "suppression check", &e).await,
    }

    // ── Persisting ──────────────────────────────────────────────────────
    let meta = EnrollmentMeta {
      source:           req.source.clone().or_else(|| Some("waitlist-form".into())),
      discovery_source: req.discovery_source.clone(),
      user_agent:       req.user_agent.clone(),
      ip_address:       Some(req.ip_address.clone()),
    };
    let (submission, is_new) = match self.store.enroll(&identity, meta).await {
      Ok(pair) => pair,
      Err(e) => return self.storage_failed(&req, "enroll", &e).await,
    };

    let (position, total) = self.ranking(submission.submission_id).await;

    if !is_new {
      self.log_outcome(&req, false, Some("already enrolled")).await;
      return Enrollment {
        position,
        total,
        ..Enrollment::terminal(Outcome::Exists)
      };
    }

    // ── Sending ─────────────────────────────────────────────────────────
    // The row is committed; from here the flow always records what became
    // of the one send attempt.
    let rendered = template::welcome(position, total);
    let outbound = OutboundEmail {
      to:            identity.original.clone(),
      to_normalized: identity.normalized.clone(),
      template_name: template::WELCOME.to_string(),
      subject:       rendered.subject,
      html_body:     rendered.html,
      text_body:     rendered.text,
    };

    match self.mailer.send(&outbound).await {
      Ok(receipt) => {
        // ── RecordingOutcome: sent ──────────────────────────────────────
        self
          .audit_delivery(NewDeliveryRecord {
            submission_id: Some(submission.submission_id),
            to_normalized: identity.normalized.clone(),
            template_name: outbound.template_name.clone(),
            subject:       outbound.subject.clone(),
            provider:      self.mailer.name().to_string(),
            message_id:    Some(receipt.message_id.clone()),
            status:        DeliveryRecordStatus::Sent,
            error_code:    None,
            error_message: None,
            sent_at:       Some(Utc::now()),
          })
          .await;
        self
          .update_submission(submission.submission_id, DeliveryUpdate {
            state:         DeliveryState::Sent,
            provider:      Some(self.mailer.name().to_string()),
            message_id:    Some(receipt.message_id.clone()),
            error_code:    None,
            error_message: None,
          })
          .await;
        self.log_outcome(&req, true, None).await;

        Enrollment {
          message_id: Some(receipt.message_id),
          position,
          total,
          ..Enrollment::terminal(Outcome::Ok)
        }
      }
      Err(failure) => {
        self
          .record_send_failure(&req, &identity, &submission.submission_id, &outbound, &failure)
          .await
      }
    }
  }

  // ── RecordingOutcome: failed ────────────────────────────────────────────

  async fn record_send_failure(
    &self,
    req: &EnrollmentRequest,
    identity: &CanonicalEmail,
    submission_id: &Uuid,
    outbound: &OutboundEmail,
    failure: &SendFailure,
  ) -> Enrollment {
    tracing::error!(
      code = %failure.code,
      hard_bounce = failure.hard_bounce,
      detail = %failure.message,
      to = %identity.normalized,
      "welcome email send failed"
    );

    self
      .audit_delivery(NewDeliveryRecord {
        submission_id: Some(*submission_id),
        to_normalized: identity.normalized.clone(),
        template_name: outbound.template_name.clone(),
        subject:       outbound.subject.clone(),
        provider:      self.mailer.name().to_string(),
        message_id:    None,
        status:        DeliveryRecordStatus::Failed,
        error_code:    Some(failure.code.clone()),
        error_message: Some(failure.message.clone()),
        sent_at:       None,
      })
      .await;

    let state = if failure.hard_bounce {
      let evidence = BounceEvidence {
        error_code:    failure.code.clone(),
        error_message: failure.message.clone(),
        occurred_at:   Utc::now(),
      };
      if let Err(e) = self
        .store
        .record_bounce(&identity.normalized, self.mailer.name(), evidence)
        .await
      {
        tracing::error!(error = %e, "failed to record bounce suppression");
      }
      DeliveryState::Suppressed
    } else {
      DeliveryState::Failed
    };

    self
      .update_submission(*submission_id, DeliveryUpdate {
        state,
        provider:      Some(self.mailer.name().to_string()),
        message_id:    None,
        error_code:    Some(failure.code.clone()),
        error_message: Some(failure.message.clone()),
      })
      .await;

    if failure.hard_bounce {
      self.log_outcome(req, false, Some("hard bounce")).await;
      Enrollment {
        field_errors: Some(FieldErrors {
          email: Some("This address cannot receive mail. Please use another.".into()),
          ..Default::default()
        }),
        ..Enrollment::terminal(Outcome::Invalid)
      }
    } else {
      self.log_outcome(req, false, Some("send failed")).await;
      Enrollment {
        field_errors: Some(FieldErrors {
          general: Some("We could not send your welcome email. Please try again.".into()),
          ..Default::default()
        }),
        ..Enrollment::terminal(Outcome::Failed)
      }
    }
  }

  // ── Helpers ─────────────────────────────────────────────────────────────

  /// Best-effort rank computation; a storage fault degrades to `None`
  /// rather than failing the call.
  async fn ranking(&self, submission_id: Uuid) -> (Option<u64>, Option<u64>) {
    let position = match self.store.position(submission_id).await {
      Ok(p) => p,
      Err(e) => {
        tracing::warn!(error = %e, "position query failed");
        None
      }
    };
    let total = match self.store.total_active().await {
      Ok(t) => Some(t),
      Err(e) => {
        tracing::warn!(error = %e, "total query failed");
        None
      }
    };
    (position, total)
  }

  async fn audit_suppressed(&self, identity: &CanonicalEmail) {
    let subject = template::welcome(None, None).subject;
    self
      .audit_delivery(NewDeliveryRecord {
        submission_id: None,
        to_normalized: identity.normalized.clone(),
        template_name: template::WELCOME.to_string(),
        subject,
        provider:      self.mailer.name().to_string(),
        message_id:    None,
        status:        DeliveryRecordStatus::Suppressed,
        error_code:    None,
        error_message: Some("recipient is on the suppression ledger".into()),
        sent_at:       None,
      })
      .await;
  }

  async fn audit_delivery(&self, record: NewDeliveryRecord) {
    if let Err(e) = self.store.record_delivery(record).await {
      tracing::error!(error = %e, "failed to write delivery record");
    }
  }

  async fn update_submission(&self, submission_id: Uuid, update: DeliveryUpdate) {
    if let Err(e) = self.store.mark_delivery(submission_id, update).await {
      tracing::error!(error = %e, "failed to update submission delivery state");
    }
  }

  async fn log_outcome(&self, req: &EnrollmentRequest, success: bool, reason: Option<&str>) {
    let attempt = NewAttempt {
      ip_address: req.ip_address.clone(),
      user_agent: req.user_agent.clone(),
      email:      Some(req.email.trim().to_string()),
      success,
      reason:     reason.map(str::to_string),
    };
    if let Err(e) = self.store.log_attempt(attempt).await {
      tracing::warn!(error = %e, "failed to record attempt");
    }
  }

  async fn storage_failed(
    &self,
    req: &EnrollmentRequest,
    stage: &str,
    error: &S::Error,
  ) -> Enrollment {
    tracing::error!(stage, error = %error, "storage failure during enrollment");
    self.log_outcome(req, false, Some("storage error")).await;
    Enrollment::rejected(Error::Storage(error.to_string()))
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
