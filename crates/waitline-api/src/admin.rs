//! Administrative endpoints. All of them require Basic auth.
//!
//! Thin read views plus the maintenance operations: these carry no
//! invariants of their own and go straight to the store.

use axum::{
  Json,
  extract::{Query, State},
  http::{StatusCode, header},
  response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use waitline_core::{
  guard::HumanVerifier,
  identity,
  mailer::Mailer,
  store::WaitlistStore,
  submission::{SubmissionPage, SubscriberStatus, WaitlistStats},
};

use crate::{AppState, auth::Authenticated, error::ApiError};

fn store_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> ApiError {
  ApiError::Store(Box::new(e))
}

// ─── Listing ─────────────────────────────────────────────────────────────────

fn default_page() -> u64 { 1 }
fn default_page_size() -> u64 { 50 }

#[derive(Debug, Deserialize)]
pub struct ListParams {
  #[serde(default = "default_page")]
  pub page:      u64,
  #[serde(default = "default_page_size")]
  pub page_size: u64,
}

/// `GET /api/admin/submissions?page=&page_size=`
pub async fn list<S, M, V>(
  _admin: Authenticated,
  State(state): State<AppState<S, M, V>>,
  Query(params): Query<ListParams>,
) -> Result<Json<SubmissionPage>, ApiError>
where
  S: WaitlistStore + 'static,
  M: Mailer + 'static,
  V: HumanVerifier + 'static,
{
  let page = state
    .store
    .list_submissions(params.page, params.page_size)
    .await
    .map_err(store_err)?;
  Ok(Json(page))
}

// ─── CSV export ──────────────────────────────────────────────────────────────

fn csv_field(value: &str) -> String {
  format!("\"{}\"", value.replace('"', "\"\""))
}

/// `GET /api/admin/export` — the full list as CSV, newest first.
pub async fn export_csv<S, M, V>(
  _admin: Authenticated,
  State(state): State<AppState<S, M, V>>,
) -> Result<Response, ApiError>
where
  S: WaitlistStore + 'static,
  M: Mailer + 'static,
  V: HumanVerifier + 'static,
{
  let rows = state.store.export_rows().await.map_err(store_err)?;

  let mut csv = String::from("Email,Date,Time,User Agent,Source,Status\n");
  for row in rows {
    let status = match row.status {
      SubscriberStatus::Active => "active",
      SubscriberStatus::Unsubscribed => "unsubscribed",
    };
    let fields = [
      csv_field(&row.email),
      csv_field(&row.created_at.format("%Y-%m-%d").to_string()),
      csv_field(&row.created_at.format("%H:%M:%S").to_string()),
      csv_field(row.user_agent.as_deref().unwrap_or("Unknown")),
      csv_field(row.source.as_deref().unwrap_or("Unknown")),
      csv_field(status),
    ];
    csv.push_str(&fields.join(","));
    csv.push('\n');
  }

  Ok(
    (
      [
        (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
        (header::CONTENT_DISPOSITION, "attachment; filename=\"waitlist.csv\""),
      ],
      csv,
    )
      .into_response(),
  )
}

// ─── Stats ───────────────────────────────────────────────────────────────────

/// `GET /api/admin/stats`
pub async fn stats<S, M, V>(
  _admin: Authenticated,
  State(state): State<AppState<S, M, V>>,
) -> Result<Json<WaitlistStats>, ApiError>
where
  S: WaitlistStore + 'static,
  M: Mailer + 'static,
  V: HumanVerifier + 'static,
{
  let stats = state.store.stats().await.map_err(store_err)?;
  Ok(Json(stats))
}

// ─── Unsubscribe ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UnsubscribeBody {
  pub email: String,
}

/// `POST /api/admin/unsubscribe` — body: `{"email": "..."}`.
pub async fn unsubscribe<S, M, V>(
  _admin: Authenticated,
  State(state): State<AppState<S, M, V>>,
  Json(body): Json<UnsubscribeBody>,
) -> Result<StatusCode, ApiError>
where
  S: WaitlistStore + 'static,
  M: Mailer + 'static,
  V: HumanVerifier + 'static,
{
  let identity = identity::normalize(&body.email)
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;

  let found = state
    .store
    .unsubscribe(&identity.normalized)
    .await
    .map_err(store_err)?;

  if found {
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(ApiError::NotFound(format!(
      "no submission for {}",
      identity.normalized
    )))
  }
}

// ─── Attempt pruning ─────────────────────────────────────────────────────────

fn default_prune_days() -> u32 { 30 }

#[derive(Debug, Deserialize)]
pub struct PruneBody {
  #[serde(default = "default_prune_days")]
  pub older_than_days: u32,
}

/// `POST /api/admin/attempts/prune` — body: `{"older_than_days": 30}`.
pub async fn prune_attempts<S, M, V>(
  _admin: Authenticated,
  State(state): State<AppState<S, M, V>>,
  Json(body): Json<PruneBody>,
) -> Result<Json<Value>, ApiError>
where
  S: WaitlistStore + 'static,
  M: Mailer + 'static,
  V: HumanVerifier + 'static,
{
  let cutoff = Utc::now() - Duration::days(body.older_than_days as i64);
  let deleted = state
    .store
    .prune_attempts(cutoff)
    .await
    .map_err(store_err)?;
  Ok(Json(json!({ "deleted": deleted })))
}
