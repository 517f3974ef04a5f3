//! SQLite backend for the results-framework store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every write runs in its own
//! transaction; version checks and integrity checks happen inside it.

mod encode;
mod schema;
mod store;
mod write;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
