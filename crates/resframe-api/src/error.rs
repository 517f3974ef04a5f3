//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use resframe_core::Error as CoreError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  /// No authenticated actor was attached to the request.
  #[error("authentication required")]
  Unauthorized,

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Domain(#[from] CoreError),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Domain(e) => match e {
        CoreError::Validation(_) | CoreError::ReferentialIntegrity(_) => {
          StatusCode::UNPROCESSABLE_ENTITY
        }
        CoreError::Conflict { .. } | CoreError::DuplicateKey { .. } => {
          StatusCode::CONFLICT
        }
        CoreError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
        CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        CoreError::Serialization(_) => StatusCode::BAD_REQUEST,
        CoreError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }
    let mut res = (status, Json(json!({ "error": self.to_string() }))).into_response();
    if status == StatusCode::UNAUTHORIZED {
      res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"resframe\""),
      );
    }
    res
  }
}
