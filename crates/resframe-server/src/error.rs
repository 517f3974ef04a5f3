//! Error types and axum `IntoResponse` implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unauthorized")]
  Unauthorized,

  /// Authenticated, but the role may not use an administrative endpoint.
  #[error("role {0:?} may not administer this server")]
  Forbidden(String),

  #[error(transparent)]
  Domain(#[from] resframe_core::Error),
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    match self {
      Error::Unauthorized => {
        let mut res = (
          StatusCode::UNAUTHORIZED,
          Json(json!({ "error": "unauthorized" })),
        )
          .into_response();
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Basic realm=\"resframe\""),
        );
        res
      }
      Error::Forbidden(_) => {
        (StatusCode::FORBIDDEN, Json(json!({ "error": self.to_string() })))
          .into_response()
      }
      Error::Domain(e) => resframe_api::ApiError::from(e).into_response(),
    }
  }
}
