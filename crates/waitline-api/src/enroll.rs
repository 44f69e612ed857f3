//! `POST /api/waitlist` — the enrollment endpoint.

use axum::{
  Json,
  extract::State,
  http::{HeaderMap, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde::Deserialize;

use waitline_core::{
  Error,
  guard::{HumanProof, HumanVerifier},
  mailer::Mailer,
  service::{Enrollment, EnrollmentRequest, Outcome},
  store::WaitlistStore,
};

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EnrollBody {
  pub email:            String,
  pub proof:            HumanProof,
  pub source:           Option<String>,
  pub discovery_source: Option<String>,
}

/// `POST /api/waitlist` — body: `{"email": "...", "proof": {...}}`.
///
/// The response body always carries the full result struct; the status code
/// summarises it for plain HTTP clients.
pub async fn handler<S, M, V>(
  State(state): State<AppState<S, M, V>>,
  headers: HeaderMap,
  Json(body): Json<EnrollBody>,
) -> Response
where
  S: WaitlistStore + 'static,
  M: Mailer + 'static,
  V: HumanVerifier + 'static,
{
  let request = EnrollmentRequest {
    email:            body.email,
    proof:            body.proof,
    source:           body.source,
    discovery_source: body.discovery_source,
    user_agent:       headers
      .get(header::USER_AGENT)
      .and_then(|v| v.to_str().ok())
      .map(str::to_string),
    ip_address:       client_ip(&headers),
  };

  let enrollment = state.service.enroll(request).await;
  (status_for(&enrollment), Json(enrollment)).into_response()
}

fn status_for(enrollment: &Enrollment) -> StatusCode {
  if matches!(enrollment.rejection, Some(Error::RateLimited)) {
    return StatusCode::TOO_MANY_REQUESTS;
  }
  match enrollment.outcome {
    Outcome::Ok => StatusCode::CREATED,
    Outcome::Exists | Outcome::Suppressed => StatusCode::OK,
    Outcome::Invalid => StatusCode::UNPROCESSABLE_ENTITY,
    Outcome::Failed => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

/// Requesting IP with the usual proxy-header precedence. `x-forwarded-for`
/// may hold a hop chain; the first entry is the original client.
fn client_ip(headers: &HeaderMap) -> String {
  let get = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

  let ip = get("cf-connecting-ip")
    .map(str::to_string)
    .or_else(|| {
      get("x-forwarded-for").map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
    })
    .or_else(|| get("x-real-ip").map(str::to_string))
    .unwrap_or_else(|| "unknown".to_string());

  if ip == "::1" || ip == "127.0.0.1" {
    "localhost".to_string()
  } else {
    ip
  }
}
