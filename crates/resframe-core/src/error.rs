//! Error types for `resframe-core`.

use thiserror::Error;

use crate::{
  entity::EntityType, integrity::Violation, permission::PermissionCode,
};

#[derive(Debug, Error)]
pub enum Error {
  /// A value-typing or required-field rule was broken.
  #[error("validation failed: {0}")]
  Validation(Violation),

  /// A record names a parent that is missing or soft-deleted, or a parent
  /// still has live children.
  #[error("referential integrity violated: {0}")]
  ReferentialIntegrity(Violation),

  /// The caller's `expected_version` is stale.
  #[error("{entity} {id} is at version {actual}, expected {expected}")]
  Conflict {
    entity:   EntityType,
    id:       i64,
    expected: i64,
    actual:   i64,
  },

  #[error("role {role:?} lacks permission {code}")]
  PermissionDenied { role: String, code: PermissionCode },

  #[error("{entity} {id} not found")]
  NotFound { entity: EntityType, id: i64 },

  #[error("duplicate {entity} key: {key}")]
  DuplicateKey { entity: EntityType, key: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// A backend failure with no domain meaning (I/O, driver, decoding).
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Lift a store backend error into the domain error.
  pub fn backend<E: Into<Error>>(e: E) -> Self { e.into() }
}

impl From<Violation> for Error {
  fn from(v: Violation) -> Self {
    if v.is_referential() {
      Self::ReferentialIntegrity(v)
    } else {
      Self::Validation(v)
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
