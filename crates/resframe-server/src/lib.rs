//! HTTP server for the results framework.
//!
//! Wraps the [`resframe_api`] router with Basic authentication, request
//! tracing and the administrative grant-reload endpoint.

pub mod auth;
pub mod error;

pub use error::Error;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Json, Router,
  extract::{Request, State},
  middleware,
  routing::post,
};
use resframe_api::CurrentActor;
use resframe_core::{
  service::Framework,
  store::FrameworkStore,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` with
/// `RESFRAME_*` environment overrides.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:        String,
  #[serde(default = "default_port")]
  pub port:        u16,
  pub store_path:  PathBuf,
  /// Roles registered at startup, in addition to those named by `users`.
  #[serde(default)]
  pub roles:       Vec<String>,
  /// Roles allowed to call `POST /admin/reload`.
  #[serde(default)]
  pub admin_roles: Vec<String>,
  #[serde(default)]
  pub users:       Vec<UserConfig>,
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 8080 }

impl ServerConfig {
  /// Every role the configuration mentions, deduplicated and sorted.
  pub fn all_roles(&self) -> Vec<String> {
    let mut roles: Vec<String> = self
      .roles
      .iter()
      .chain(&self.admin_roles)
      .cloned()
      .chain(self.users.iter().map(|u| u.role.clone()))
      .collect();
    roles.sort();
    roles.dedup();
    roles
  }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UserConfig {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
  pub role:          String,
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through the server's own handlers.
pub struct AppState<S> {
  pub framework: Framework<S>,
  pub config:    Arc<ServerConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self { framework: self.framework.clone(), config: Arc::clone(&self.config) }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application router: the JSON API plus `/admin/reload`,
/// all behind authentication and request tracing.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: FrameworkStore + 'static,
{
  Router::new()
    .route("/admin/reload", post(reload::<S>))
    .with_state(state.clone())
    .merge(resframe_api::api_router(state.framework.clone()))
    .layer(middleware::from_fn_with_state(state, auth::authenticate::<S>))
    .layer(TraceLayer::new_for_http().make_span_with(|req: &Request| {
      tracing::info_span!(
        "request",
        method = %req.method(),
        path = %req.uri().path(),
        user = tracing::field::Empty,
      )
    }))
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
  pub grants: usize,
}

/// `POST /admin/reload`: re-read the grant table from the store.
async fn reload<S>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
) -> Result<Json<ReloadResponse>, Error>
where
  S: FrameworkStore + 'static,
{
  if !state.config.admin_roles.contains(&actor.role) {
    return Err(Error::Forbidden(actor.role));
  }
  state.framework.reload_grants().await?;
  let grants = state.framework.grants().snapshot().len();
  tracing::info!(user = %actor.username, grants, "grant table reloaded");
  Ok(Json(ReloadResponse { grants }))
}
