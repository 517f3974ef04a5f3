//! Error type for `resframe-store-sqlite`.

use resframe_core::integrity::Violation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A domain failure: conflict, not found, integrity or validation.
  #[error(transparent)]
  Core(#[from] resframe_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored column held a value the domain types cannot represent.
  #[error("corrupt column {column}: {value:?}")]
  Corrupt { column: &'static str, value: String },
}

impl From<Violation> for Error {
  fn from(v: Violation) -> Self { Self::Core(v.into()) }
}

/// Domain failures pass through unchanged; everything else is a backend
/// error to the layers above.
impl From<Error> for resframe_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Core(inner) => inner,
      other => resframe_core::Error::Store(Box::new(other)),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
