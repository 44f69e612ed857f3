//! Public read-only queries.

use axum::{Json, extract::State};
use serde_json::{Value, json};

use waitline_core::{
  guard::HumanVerifier, mailer::Mailer, store::WaitlistStore,
};

use crate::{AppState, error::ApiError};

/// `GET /api/waitlist/count` — number of active submissions.
pub async fn count<S, M, V>(
  State(state): State<AppState<S, M, V>>,
) -> Result<Json<Value>, ApiError>
where
  S: WaitlistStore + 'static,
  M: Mailer + 'static,
  V: HumanVerifier + 'static,
{
  let count = state
    .store
    .total_active()
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(json!({ "count": count })))
}
