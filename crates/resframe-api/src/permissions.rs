//! `GET /permissions`: the permission code table as seen by the caller.
//!
//! Every reserved code is listed with its entity type, operation and
//! description, and whether the caller's role currently holds it. The
//! endpoint itself needs no grant so a client can discover what it may do.

use axum::{Json, extract::State};
use resframe_core::{
  entity::EntityType,
  permission::{Operation, PermissionCode},
  service::Framework,
  store::FrameworkStore,
};
use serde::Serialize;

use crate::{actor::CurrentActor, error::ApiError};

#[derive(Debug, Serialize)]
pub struct CodeEntry {
  pub code:        PermissionCode,
  pub entity:      EntityType,
  pub operation:   Operation,
  pub description: String,
  pub granted:     bool,
}

#[derive(Debug, Serialize)]
pub struct PermissionsResponse {
  pub username: String,
  pub role:     String,
  pub codes:    Vec<CodeEntry>,
}

/// `GET /permissions`
pub async fn handler<S: FrameworkStore>(
  State(fw): State<Framework<S>>,
  CurrentActor(actor): CurrentActor,
) -> Result<Json<PermissionsResponse>, ApiError> {
  let snapshot = fw.grants().snapshot();
  let codes = PermissionCode::all()
    .map(|code| {
      let (entity, operation) = code.pair();
      CodeEntry {
        code,
        entity,
        operation,
        description: code.description(),
        granted: snapshot.is_granted(&actor.role, code),
      }
    })
    .collect();
  Ok(Json(PermissionsResponse {
    username: actor.username,
    role: actor.role,
    codes,
  }))
}
