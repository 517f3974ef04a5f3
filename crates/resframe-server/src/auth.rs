//! HTTP Basic authentication against the configured user list.
//!
//! A successful check resolves the caller to an [`Actor`] and attaches it to
//! the request extensions, where the API handlers pick it up.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  extract::{Request, State},
  http::HeaderMap,
  middleware::Next,
  response::Response,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use resframe_core::{permission::Actor, store::FrameworkStore};

use crate::{AppState, UserConfig, error::Error};

/// Verify Basic credentials from `headers` and resolve the caller's role.
pub fn verify_auth(headers: &HeaderMap, users: &[UserConfig]) -> Result<Actor, Error> {
  let header_val = headers
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(Error::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(Error::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| Error::Unauthorized)?;
  let creds = std::str::from_utf8(&decoded).map_err(|_| Error::Unauthorized)?;

  let (username, password) = creds.split_once(':').ok_or(Error::Unauthorized)?;

  let user = users
    .iter()
    .find(|u| u.username == username)
    .ok_or(Error::Unauthorized)?;

  let parsed_hash =
    PasswordHash::new(&user.password_hash).map_err(|_| Error::Unauthorized)?;

  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| Error::Unauthorized)?;

  Ok(Actor::new(&user.username, &user.role))
}

/// Middleware: reject unauthenticated requests, tag the rest with their
/// [`Actor`].
pub async fn authenticate<S>(
  State(state): State<AppState<S>>,
  mut req: Request,
  next: Next,
) -> Result<Response, Error>
where
  S: FrameworkStore + 'static,
{
  let actor = verify_auth(req.headers(), &state.config.users).inspect_err(|_| {
    tracing::debug!(path = %req.uri().path(), "authentication failed");
  })?;
  tracing::Span::current().record("user", actor.username.as_str());
  req.extensions_mut().insert(actor);
  Ok(next.run(req).await)
}
