//! Core types and trait definitions for the results-framework store.
//!
//! This crate is deliberately free of HTTP and database dependencies. It
//! holds the entity model, the value typing rules, the hierarchy integrity
//! checks, the permission layer and the bulk loader. Storage backends
//! implement [`store::FrameworkStore`]; everything else is written against
//! that trait.

// Store implementations write `async fn` against trait methods that declare
// `impl Future + Send`.
#![allow(async_fn_in_trait)]

pub mod entity;
pub mod error;
pub mod integrity;
pub mod permission;
pub mod seed;
pub mod service;
pub mod store;
pub mod value;

pub use error::{Error, Result};
