//! JSON REST API for the results framework.
//!
//! Exposes an axum [`Router`] over a permission-gated
//! [`Framework`](resframe_core::service::Framework). The caller
//! authenticates requests and attaches the resulting
//! [`Actor`](resframe_core::permission::Actor) as a request extension;
//! transport and TLS are the caller's responsibility too.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", resframe_api::api_router(framework.clone()))
//! ```

pub mod achievements;
pub mod actor;
pub mod error;
pub mod indicators;
pub mod permissions;
pub mod sections;

use axum::{Router, routing::get};
use resframe_core::{service::Framework, store::FrameworkStore};
use serde::Deserialize;

pub use actor::CurrentActor;
pub use error::ApiError;

/// Build a fully-materialised API router for `framework`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(framework: Framework<S>) -> Router<()>
where
  S: FrameworkStore + 'static,
{
  Router::new()
    // Sections
    .route("/sections", get(sections::list::<S>).post(sections::create::<S>))
    .route(
      "/sections/{id}",
      get(sections::get_one::<S>)
        .patch(sections::update::<S>)
        .delete(sections::delete::<S>),
    )
    // Indicators
    .route("/indicators", get(indicators::list::<S>).post(indicators::create::<S>))
    .route(
      "/indicators/{id}",
      get(indicators::get_one::<S>)
        .patch(indicators::update::<S>)
        .delete(indicators::delete::<S>),
    )
    // Achievements
    .route(
      "/achievements",
      get(achievements::list::<S>).post(achievements::create::<S>),
    )
    .route(
      "/achievements/{id}",
      get(achievements::get_one::<S>)
        .patch(achievements::update::<S>)
        .delete(achievements::delete::<S>),
    )
    // Permissions
    .route("/permissions", get(permissions::handler::<S>))
    .with_state(framework)
}

// ─── Shared request shapes ───────────────────────────────────────────────────

/// `?include_deleted=true` on single-record reads.
#[derive(Debug, Default, Deserialize)]
pub struct GetParams {
  #[serde(default)]
  pub include_deleted: bool,
}

/// `?expected_version=N` on deletes.
#[derive(Debug, Deserialize)]
pub struct DeleteParams {
  pub expected_version: i64,
}

/// A patch body carrying the version the client last read.
#[derive(Debug, Deserialize)]
pub struct Versioned<P> {
  pub expected_version: i64,
  #[serde(flatten)]
  pub patch:            P,
}

#[cfg(test)]
mod tests;
