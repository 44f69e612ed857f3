//! Pre-persistence abuse screening.
//!
//! Four independent checks, short-circuiting on the first failure: per-IP
//! rate limit, email shape, human verification (arithmetic challenge or
//! delegated token), and the disposable-domain deny-list. The rate limit is
//! checked first so a hot IP is turned away regardless of whatever else it
//! sends.
//!
//! Every rejection appends exactly one attempt-log row before returning.
//! The check-then-insert sequence is deliberately not atomic: a small
//! over-admission under extreme concurrent load from one IP is an accepted
//! tradeoff, not a correctness violation.

use std::future::Future;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  attempt::NewAttempt,
  identity,
  store::WaitlistStore,
};

// ─── Human verification ──────────────────────────────────────────────────────

/// Operator of an arithmetic challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengeOp {
  #[serde(rename = "+")]
  Add,
  #[serde(rename = "-")]
  Sub,
  #[serde(rename = "*")]
  Mul,
}

/// A server-generated arithmetic challenge shown to the visitor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Challenge {
  pub lhs: i64,
  pub op:  ChallengeOp,
  pub rhs: i64,
}

impl Challenge {
  pub fn answer(self) -> i64 {
    match self.op {
      ChallengeOp::Add => self.lhs + self.rhs,
      ChallengeOp::Sub => self.lhs - self.rhs,
      ChallengeOp::Mul => self.lhs * self.rhs,
    }
  }
}

/// Evidence that a human is behind the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HumanProof {
  /// The visitor's answer to an arithmetic challenge, echoed back with the
  /// expected value issued alongside it.
  Arithmetic { answer: i64, expected: i64 },
  /// Opaque token for an external verification service.
  Token { token: String },
}

/// Confirms opaque verification tokens with an upstream service.
pub trait HumanVerifier: Send + Sync {
  fn verify<'a>(
    &'a self,
    token: &'a str,
  ) -> impl Future<Output = Result<bool>> + Send + 'a;
}

/// Verifier for deployments with no external service configured: every
/// token is rejected, so only the bundled arithmetic challenge passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullVerifier;

impl HumanVerifier for NullVerifier {
  async fn verify(&self, _token: &str) -> Result<bool> {
    Ok(false)
  }
}

// ─── Configuration ───────────────────────────────────────────────────────────

/// Throwaway-mail providers rejected by default.
pub const DEFAULT_BLOCKED_DOMAINS: &[&str] = &[
  "10minutemail.com",
  "tempmail.org",
  "guerrillamail.com",
  "mailinator.com",
  "yopmail.com",
  "temp-mail.org",
  "throwaway.email",
];

#[derive(Debug, Clone)]
pub struct GuardConfig {
  /// Trailing window for per-IP rate limiting.
  pub rate_window:     Duration,
  /// Attempts allowed per IP inside the window.
  pub rate_limit:      u64,
  /// Domains rejected outright as disposable.
  pub blocked_domains: Vec<String>,
}

impl Default for GuardConfig {
  fn default() -> Self {
    Self {
      rate_window:     Duration::hours(1),
      rate_limit:      5,
      blocked_domains: DEFAULT_BLOCKED_DOMAINS
        .iter()
        .map(|d| d.to_string())
        .collect(),
    }
  }
}

// ─── Guard ───────────────────────────────────────────────────────────────────

pub struct AbuseGuard<V> {
  config:   GuardConfig,
  verifier: V,
}

impl<V: HumanVerifier> AbuseGuard<V> {
  pub fn new(config: GuardConfig, verifier: V) -> Self {
    Self { config, verifier }
  }

  /// Run all checks against one enrollment attempt.
  ///
  /// On rejection, one attempt-log row is appended (best effort — a failed
  /// write is logged and swallowed, never turned into a second error) and
  /// the rejection is returned for the orchestrator to map.
  pub async fn screen<S: WaitlistStore>(
    &self,
    store: &S,
    email: &str,
    proof: &HumanProof,
    ip: &str,
    user_agent: Option<&str>,
  ) -> Result<()> {
    let Err(rejection) = self.run_checks(store, email, proof, ip).await else {
      return Ok(());
    };

    let attempt = NewAttempt {
      ip_address: ip.to_string(),
      user_agent: user_agent.map(str::to_string),
      email:      Some(email.trim().to_string()),
      success:    false,
      reason:     Some(rejection.to_string()),
    };
    if let Err(e) = store.log_attempt(attempt).await {
      tracing::warn!(error = %e, "failed to record rejected attempt");
    }

    Err(rejection)
  }

  async fn run_checks<S: WaitlistStore>(
    &self,
    store: &S,
    email: &str,
    proof: &HumanProof,
    ip: &str,
  ) -> Result<()> {
    // 1. Rate limit — counts every prior attempt from this IP, successful
    //    or not, inside the trailing window.
    let since = Utc::now() - self.config.rate_window;
    let recent = store
      .attempts_since(ip, since)
      .await
      .map_err(|e| Error::Storage(e.to_string()))?;
    if recent >= self.config.rate_limit {
      return Err(Error::RateLimited);
    }

    // 2. Email shape. The normalizer re-derives the canonical form later;
    //    this is only the cheap reject.
    let trimmed = email.trim();
    let lowered = trimmed.to_lowercase();
    if !identity::is_valid_format(&lowered) {
      return Err(Error::InvalidFormat(trimmed.to_string()));
    }

    // 3. Human verification.
    match proof {
      HumanProof::Arithmetic { answer, expected } => {
        if answer != expected {
          return Err(Error::CaptchaFailed);
        }
      }
      HumanProof::Token { token } => {
        if !self.verifier.verify(token).await? {
          return Err(Error::CaptchaFailed);
        }
      }
    }

    // 4. Disposable-domain deny-list.
    if let Some((_, domain)) = lowered.rsplit_once('@')
      && self.config.blocked_domains.iter().any(|d| d == domain)
    {
      return Err(Error::DisposableEmail(domain.to_string()));
    }

    Ok(())
  }
}
