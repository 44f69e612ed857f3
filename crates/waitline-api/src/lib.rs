//! JSON HTTP API for Waitline.
//!
//! Exposes an axum [`Router`] backed by any
//! [`WaitlistStore`](waitline_core::store::WaitlistStore) /
//! [`Mailer`](waitline_core::mailer::Mailer) pair. TLS and reverse-proxy
//! concerns are the caller's responsibility.

pub mod admin;
pub mod auth;
pub mod challenge;
pub mod enroll;
pub mod error;
pub mod queries;
pub mod verify;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use waitline_core::{
  guard::{DEFAULT_BLOCKED_DOMAINS, GuardConfig, HumanVerifier},
  mailer::Mailer,
  service::WaitlistService,
  store::WaitlistStore,
};
use waitline_mailer::{RelayConfig, SenderIdentity};

pub use auth::AuthConfig;
pub use error::ApiError;
pub use verify::{TokenVerifier, VerifierConfig};

// ─── Configuration ───────────────────────────────────────────────────────────

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 8080 }
fn default_rate_window_minutes() -> i64 { 60 }
fn default_rate_limit() -> u64 { 5 }
fn default_blocked_domains() -> Vec<String> {
  DEFAULT_BLOCKED_DOMAINS.iter().map(|d| d.to_string()).collect()
}

/// Runtime server configuration, deserialised from `config.toml` with
/// `WAITLINE_*` environment overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                      String,
  #[serde(default = "default_port")]
  pub port:                      u16,
  pub store_path:                PathBuf,
  pub admin_username:            String,
  /// PHC string; generate with `server --hash-password`.
  pub admin_password_hash:       String,
  #[serde(default = "default_rate_window_minutes")]
  pub rate_limit_window_minutes: i64,
  #[serde(default = "default_rate_limit")]
  pub rate_limit_max_attempts:   u64,
  #[serde(default = "default_blocked_domains")]
  pub blocked_domains:           Vec<String>,
  pub sender:                    SenderIdentity,
  pub relay:                     RelayConfig,
  #[serde(default)]
  pub verifier:                  Option<VerifierConfig>,
}

impl ServerConfig {
  pub fn guard_config(&self) -> GuardConfig {
    GuardConfig {
      rate_window:     chrono::Duration::minutes(self.rate_limit_window_minutes),
      rate_limit:      self.rate_limit_max_attempts,
      blocked_domains: self.blocked_domains.clone(),
    }
  }
}

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S, M, V> {
  pub service: Arc<WaitlistService<S, M, V>>,
  /// Direct handle for the read-only views (count, admin queries).
  pub store:   Arc<S>,
  pub auth:    Arc<AuthConfig>,
}

impl<S, M, V> Clone for AppState<S, M, V> {
  fn clone(&self) -> Self {
    Self {
      service: self.service.clone(),
      store:   self.store.clone(),
      auth:    self.auth.clone(),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the Waitline API.
pub fn router<S, M, V>(state: AppState<S, M, V>) -> Router
where
  S: WaitlistStore + 'static,
  M: Mailer + 'static,
  V: HumanVerifier + 'static,
{
  Router::new()
    .route("/api/waitlist",             post(enroll::handler::<S, M, V>))
    .route("/api/waitlist/challenge",   get(challenge::handler))
    .route("/api/waitlist/count",       get(queries::count::<S, M, V>))
    .route("/api/admin/submissions",    get(admin::list::<S, M, V>))
    .route("/api/admin/export",         get(admin::export_csv::<S, M, V>))
    .route("/api/admin/stats",          get(admin::stats::<S, M, V>))
    .route("/api/admin/unsubscribe",    post(admin::unsubscribe::<S, M, V>))
    .route("/api/admin/attempts/prune", post(admin::prune_attempts::<S, M, V>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;

  use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
  };
  use base64::Engine as _;
  use base64::engine::general_purpose::STANDARD as B64;
  use rand_core::OsRng;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;

  use waitline_core::{
    bounce,
    guard::{AbuseGuard, NullVerifier},
    mailer::{OutboundEmail, SendFailure, SendReceipt},
  };
  use waitline_store_sqlite::SqliteStore;

  // ── Scripted mailer ───────────────────────────────────────────────────

  #[derive(Default)]
  struct MockMailer {
    sends:     AtomicUsize,
    fail_with: Mutex<Option<SendFailure>>,
  }

  impl MockMailer {
    fn failing(message: &str) -> Self {
      let hard = bounce::is_hard_bounce(message);
      Self {
        sends:     AtomicUsize::new(0),
        fail_with: Mutex::new(Some(SendFailure {
          code:        if hard { "smtp_permanent" } else { "smtp_transient" }.into(),
          message:     message.to_string(),
          hard_bounce: hard,
        })),
      }
    }

    fn send_count(&self) -> usize {
      self.sends.load(Ordering::SeqCst)
    }
  }

  impl Mailer for MockMailer {
    fn name(&self) -> &str {
      "mock"
    }

    async fn send(&self, _email: &OutboundEmail) -> Result<SendReceipt, SendFailure> {
      let n = self.sends.fetch_add(1, Ordering::SeqCst);
      match self.fail_with.lock().unwrap().clone() {
        Some(failure) => Err(failure),
        None => Ok(SendReceipt { message_id: format!("<msg-{n}@mock>") }),
      }
    }

    async fn test_connection(&self) -> bool {
      true
    }
  }

  type TestState = AppState<SqliteStore, MockMailer, NullVerifier>;

  // ── Harness ───────────────────────────────────────────────────────────

  async fn make_state(mailer: Arc<MockMailer>) -> TestState {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(b"secret", &salt)
      .unwrap()
      .to_string();

    let service = Arc::new(WaitlistService::new(
      store.clone(),
      mailer,
      AbuseGuard::new(GuardConfig::default(), NullVerifier),
    ));

    AppState {
      service,
      store,
      auth: Arc::new(AuthConfig {
        username:      "admin".to_string(),
        password_hash: hash,
      }),
    }
  }

  async fn state() -> TestState {
    make_state(Arc::new(MockMailer::default())).await
  }

  fn basic_auth() -> String {
    format!("Basic {}", B64.encode("admin:secret"))
  }

  async fn send_request(
    state: TestState,
    method: &str,
    uri: &str,
    headers: Vec<(header::HeaderName, String)>,
    body: Option<Value>,
  ) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
      builder = builder.header(name, value);
    }
    let request = match body {
      Some(json) => builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap(),
      None => builder.body(Body::empty()).unwrap(),
    };
    router(state).oneshot(request).await.unwrap()
  }

  async fn enroll(state: TestState, email: &str, answer: i64, ip: Option<&str>) -> Response {
    let headers = ip
      .map(|ip| vec![(header::HeaderName::from_static("x-forwarded-for"), ip.to_string())])
      .unwrap_or_default();
    send_request(
      state,
      "POST",
      "/api/waitlist",
      headers,
      Some(json!({
        "email": email,
        "proof": { "kind": "arithmetic", "answer": answer, "expected": 4 },
        "source": "test-suite",
      })),
    )
    .await
  }

  async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
      .await
      .unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  // ── Enrollment ────────────────────────────────────────────────────────

  #[tokio::test]
  async fn enroll_created_then_exists() {
    let mailer = Arc::new(MockMailer::default());
    let state = make_state(mailer.clone()).await;

    let response = enroll(state.clone(), "A.B+x@Gmail.com", 4, None).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["result"], "ok");
    assert_eq!(body["position"], 1);
    assert_eq!(body["total"], 1);
    assert!(body["message_id"].as_str().unwrap().starts_with("<msg-"));

    // Same identity under a different spelling.
    let response = enroll(state, "ab@gmail.com", 4, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["result"], "exists");
    assert_eq!(body["position"], 1);

    assert_eq!(mailer.send_count(), 1);
  }

  #[tokio::test]
  async fn malformed_email_is_unprocessable() {
    let response = enroll(state().await, "not-an-email", 4, None).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["result"], "invalid");
    assert!(body["field_errors"]["email"].is_string());
  }

  #[tokio::test]
  async fn wrong_captcha_flags_captcha_field() {
    let response = enroll(state().await, "a@example.com", 3, None).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["result"], "invalid");
    assert!(body["field_errors"]["captcha"].is_string());
  }

  #[tokio::test]
  async fn disposable_domain_rejected() {
    let response = enroll(state().await, "bot@mailinator.com", 4, None).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert!(body["field_errors"]["email"].is_string());
  }

  #[tokio::test]
  async fn sixth_attempt_from_one_ip_is_rate_limited() {
    let state = state().await;

    for _ in 0..5 {
      let response = enroll(state.clone(), "a@example.com", 0, Some("9.9.9.9")).await;
      assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    let response = enroll(state, "a@example.com", 4, Some("9.9.9.9")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(response).await;
    assert_eq!(body["result"], "failed");
    assert!(body["field_errors"]["general"].is_string());
  }

  #[tokio::test]
  async fn hard_bounce_then_suppressed() {
    let mailer = Arc::new(MockMailer::failing("550 5.1.1 User unknown"));
    let state = make_state(mailer.clone()).await;

    let response = enroll(state.clone(), "gone@example.com", 4, Some("1.1.1.1")).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["result"], "invalid");
    assert_eq!(mailer.send_count(), 1);

    // The suppression ledger now short-circuits before the mailer.
    let response = enroll(state, "gone@example.com", 4, Some("1.1.1.2")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["result"], "suppressed");
    assert_eq!(mailer.send_count(), 1);
  }

  // ── Challenge ─────────────────────────────────────────────────────────

  #[tokio::test]
  async fn challenge_is_internally_consistent() {
    let response =
      send_request(state().await, "GET", "/api/waitlist/challenge", vec![], None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let lhs = body["lhs"].as_i64().unwrap();
    let rhs = body["rhs"].as_i64().unwrap();
    let computed = match body["op"].as_str().unwrap() {
      "+" => lhs + rhs,
      "-" => lhs - rhs,
      "*" => lhs * rhs,
      other => panic!("unexpected operator: {other}"),
    };
    assert_eq!(body["expected"].as_i64().unwrap(), computed);
  }

  // ── Public count ──────────────────────────────────────────────────────

  #[tokio::test]
  async fn count_reflects_active_submissions() {
    let state = state().await;
    enroll(state.clone(), "a@example.com", 4, Some("1.1.1.1")).await;
    enroll(state.clone(), "b@example.com", 4, Some("1.1.1.2")).await;

    let response =
      send_request(state, "GET", "/api/waitlist/count", vec![], None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["count"], 2);
  }

  // ── Admin surface ─────────────────────────────────────────────────────

  #[tokio::test]
  async fn admin_requires_auth() {
    let response =
      send_request(state().await, "GET", "/api/admin/submissions", vec![], None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
  }

  #[tokio::test]
  async fn admin_lists_submissions() {
    let state = state().await;
    enroll(state.clone(), "a@example.com", 4, Some("1.1.1.1")).await;
    enroll(state.clone(), "b@example.com", 4, Some("1.1.1.2")).await;

    let response = send_request(
      state,
      "GET",
      "/api/admin/submissions?page=1&page_size=10",
      vec![(header::AUTHORIZATION, basic_auth())],
      None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
    // Newest first.
    assert_eq!(body["items"][0]["email"], "b@example.com");
  }

  #[tokio::test]
  async fn csv_export_has_expected_header_and_rows() {
    let state = state().await;
    enroll(state.clone(), "a@example.com", 4, Some("1.1.1.1")).await;

    let response = send_request(
      state,
      "GET",
      "/api/admin/export",
      vec![(header::AUTHORIZATION, basic_auth())],
      None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
      .headers()
      .get(header::CONTENT_TYPE)
      .unwrap()
      .to_str()
      .unwrap()
      .to_string();
    assert!(content_type.contains("text/csv"), "Content-Type: {content_type}");

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
      .await
      .unwrap();
    let text = std::str::from_utf8(&bytes).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("Email,Date,Time,User Agent,Source,Status"));
    let row = lines.next().unwrap();
    assert!(row.contains("\"a@example.com\""), "row: {row}");
    assert!(row.contains("\"test-suite\""), "row: {row}");
  }

  #[tokio::test]
  async fn admin_stats_reports_counters() {
    let state = state().await;
    enroll(state.clone(), "a@example.com", 4, Some("1.1.1.1")).await;

    let response = send_request(
      state,
      "GET",
      "/api/admin/stats",
      vec![(header::AUTHORIZATION, basic_auth())],
      None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["total_active"], 1);
    assert_eq!(body["attempts"], 1);
    assert_eq!(body["successful_attempts"], 1);
  }

  #[tokio::test]
  async fn admin_unsubscribe_removes_from_count() {
    let state = state().await;
    enroll(state.clone(), "a@example.com", 4, Some("1.1.1.1")).await;

    let response = send_request(
      state.clone(),
      "POST",
      "/api/admin/unsubscribe",
      vec![(header::AUTHORIZATION, basic_auth())],
      Some(json!({ "email": "a@example.com" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response =
      send_request(state, "GET", "/api/waitlist/count", vec![], None).await;
    assert_eq!(body_json(response).await["count"], 0);
  }

  #[tokio::test]
  async fn admin_unsubscribe_unknown_is_404() {
    let response = send_request(
      state().await,
      "POST",
      "/api/admin/unsubscribe",
      vec![(header::AUTHORIZATION, basic_auth())],
      Some(json!({ "email": "ghost@example.com" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn admin_prunes_old_attempts() {
    let state = state().await;
    enroll(state.clone(), "a@example.com", 0, Some("1.1.1.1")).await;

    // Nothing is older than 30 days yet.
    let response = send_request(
      state,
      "POST",
      "/api/admin/attempts/prune",
      vec![(header::AUTHORIZATION, basic_auth())],
      Some(json!({ "older_than_days": 30 })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["deleted"], 0);
  }
}
