//! Extractor for the authenticated caller.

use axum::{extract::FromRequestParts, http::request::Parts};
use resframe_core::permission::Actor;

use crate::error::ApiError;

/// The [`Actor`] an outer authentication layer attached to the request.
/// Handlers that take it reject unauthenticated requests with 401.
#[derive(Debug, Clone)]
pub struct CurrentActor(pub Actor);

impl<S: Send + Sync> FromRequestParts<S> for CurrentActor {
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    _state: &S,
  ) -> Result<Self, Self::Rejection> {
    parts
      .extensions
      .get::<Actor>()
      .cloned()
      .map(CurrentActor)
      .ok_or(ApiError::Unauthorized)
  }
}
