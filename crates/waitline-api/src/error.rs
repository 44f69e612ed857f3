//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("unauthorized")]
  Unauthorized,

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match self {
      ApiError::Unauthorized => {
        let mut res = (
          StatusCode::UNAUTHORIZED,
          Json(json!({ "error": "unauthorized" })),
        )
          .into_response();
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Basic realm=\"waitline\""),
        );
        return res;
      }
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
      ApiError::Store(e) => {
        // Full detail stays in the logs; the caller gets a generic message.
        tracing::error!(error = %e, "store error while serving request");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
