//! The `FrameworkStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g.
//! `resframe-store-sqlite`). Higher layers depend on this abstraction, not on
//! any concrete backend.

use std::{
  collections::{HashMap, HashSet},
  future::Future,
};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
  entity::{
    Achievement, AchievementPatch, EntityType, Indicator, IndicatorPatch,
    NewAchievement, NewIndicator, NewSection, Section, SectionPatch,
  },
  permission::{Actor, Grant},
};

/// Page size used when a query does not set `limit`.
pub const DEFAULT_LIMIT: usize = 100;

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`FrameworkStore::list_sections`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SectionQuery {
  /// Case-insensitive substring of the name.
  pub text:            Option<String>,
  #[serde(default)]
  pub include_deleted: bool,
  pub limit:           Option<usize>,
  pub offset:          Option<usize>,
}

/// Parameters for [`FrameworkStore::list_indicators`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndicatorQuery {
  pub section_id:      Option<i64>,
  pub text:            Option<String>,
  pub pbc:             Option<String>,
  #[serde(default)]
  pub include_deleted: bool,
  pub limit:           Option<usize>,
  pub offset:          Option<usize>,
}

/// Parameters for [`FrameworkStore::list_achievements`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AchievementQuery {
  pub indicator_id:    Option<i64>,
  /// Inclusive lower bound on `reported_on`.
  pub reported_from:   Option<NaiveDate>,
  /// Inclusive upper bound on `reported_on`.
  pub reported_to:     Option<NaiveDate>,
  #[serde(default)]
  pub include_deleted: bool,
  pub limit:           Option<usize>,
  pub offset:          Option<usize>,
}

/// Rows soft-deleted by [`FrameworkStore::clear_hierarchy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClearCounts {
  pub achievements: usize,
  pub indicators:   usize,
  pub sections:     usize,
}

/// Live rows of one entity type, indexed by the natural key each one owns.
///
/// A row created by the loader owns its `seed_key`; a row created any other
/// way owns its own id. A row's id alone says nothing about the key it was
/// declared with: after a clear, a re-created record can receive an id that
/// another record declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMap {
  /// `seed_key` → id.
  pub seeded:   HashMap<i64, i64>,
  /// Ids of rows with no `seed_key`.
  pub unseeded: HashSet<i64>,
}

impl KeyMap {
  /// The id of the live row that owns `declared`, if any.
  pub fn resolve(&self, declared: i64) -> Option<i64> {
    self
      .seeded
      .get(&declared)
      .copied()
      .or_else(|| self.unseeded.contains(&declared).then_some(declared))
  }

  pub fn contains(&self, declared: i64) -> bool { self.resolve(declared).is_some() }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a results-framework store backend.
///
/// Writes are version-checked and never remove rows: `soft_delete_*` marks a
/// row deleted and bumps its version. Every `create_*`/`update_*` runs the
/// hierarchy integrity checks in the same transaction that writes the row.
/// Updating or deleting a row that is already deleted fails with
/// [`crate::Error::NotFound`].
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait FrameworkStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + Into<crate::Error> + 'static;

  // ── Sections ──────────────────────────────────────────────────────────

  fn create_section<'a>(
    &'a self,
    new: NewSection,
    actor: &'a Actor,
  ) -> impl Future<Output = Result<Section, Self::Error>> + Send + 'a;

  fn update_section<'a>(
    &'a self,
    id: i64,
    expected_version: i64,
    patch: SectionPatch,
    actor: &'a Actor,
  ) -> impl Future<Output = Result<Section, Self::Error>> + Send + 'a;

  /// Fails with a referential-integrity error while live indicators remain.
  fn soft_delete_section<'a>(
    &'a self,
    id: i64,
    expected_version: i64,
    actor: &'a Actor,
  ) -> impl Future<Output = Result<Section, Self::Error>> + Send + 'a;

  fn get_section(
    &self,
    id: i64,
    include_deleted: bool,
  ) -> impl Future<Output = Result<Option<Section>, Self::Error>> + Send + '_;

  fn list_sections<'a>(
    &'a self,
    query: &'a SectionQuery,
  ) -> impl Future<Output = Result<Vec<Section>, Self::Error>> + Send + 'a;

  // ── Indicators ────────────────────────────────────────────────────────

  fn create_indicator<'a>(
    &'a self,
    new: NewIndicator,
    actor: &'a Actor,
  ) -> impl Future<Output = Result<Indicator, Self::Error>> + Send + 'a;

  /// Moving to another section re-validates the parent; changing the kind
  /// is refused while live achievements reference the indicator.
  fn update_indicator<'a>(
    &'a self,
    id: i64,
    expected_version: i64,
    patch: IndicatorPatch,
    actor: &'a Actor,
  ) -> impl Future<Output = Result<Indicator, Self::Error>> + Send + 'a;

  /// Fails with a referential-integrity error while live achievements
  /// remain.
  fn soft_delete_indicator<'a>(
    &'a self,
    id: i64,
    expected_version: i64,
    actor: &'a Actor,
  ) -> impl Future<Output = Result<Indicator, Self::Error>> + Send + 'a;

  fn get_indicator(
    &self,
    id: i64,
    include_deleted: bool,
  ) -> impl Future<Output = Result<Option<Indicator>, Self::Error>> + Send + '_;

  fn list_indicators<'a>(
    &'a self,
    query: &'a IndicatorQuery,
  ) -> impl Future<Output = Result<Vec<Indicator>, Self::Error>> + Send + 'a;

  // ── Achievements ──────────────────────────────────────────────────────

  /// `reported_by` defaults to the actor's username.
  fn create_achievement<'a>(
    &'a self,
    new: NewAchievement,
    actor: &'a Actor,
  ) -> impl Future<Output = Result<Achievement, Self::Error>> + Send + 'a;

  fn update_achievement<'a>(
    &'a self,
    id: i64,
    expected_version: i64,
    patch: AchievementPatch,
    actor: &'a Actor,
  ) -> impl Future<Output = Result<Achievement, Self::Error>> + Send + 'a;

  fn soft_delete_achievement<'a>(
    &'a self,
    id: i64,
    expected_version: i64,
    actor: &'a Actor,
  ) -> impl Future<Output = Result<Achievement, Self::Error>> + Send + 'a;

  fn get_achievement(
    &self,
    id: i64,
    include_deleted: bool,
  ) -> impl Future<Output = Result<Option<Achievement>, Self::Error>> + Send + '_;

  fn list_achievements<'a>(
    &'a self,
    query: &'a AchievementQuery,
  ) -> impl Future<Output = Result<Vec<Achievement>, Self::Error>> + Send + 'a;

  // ── Bulk seeding ──────────────────────────────────────────────────────
  //
  // Each `seed_*` call inserts the whole batch in one transaction, in batch
  // order. A record that collides with a unique key (id or uuid) is skipped
  // and left out of the returned rows; any other failure rolls the whole
  // batch back.

  fn seed_sections<'a>(
    &'a self,
    batch: Vec<NewSection>,
    actor: &'a Actor,
  ) -> impl Future<Output = Result<Vec<Section>, Self::Error>> + Send + 'a;

  fn seed_indicators<'a>(
    &'a self,
    batch: Vec<NewIndicator>,
    actor: &'a Actor,
  ) -> impl Future<Output = Result<Vec<Indicator>, Self::Error>> + Send + 'a;

  fn seed_achievements<'a>(
    &'a self,
    batch: Vec<NewAchievement>,
    actor: &'a Actor,
  ) -> impl Future<Output = Result<Vec<Achievement>, Self::Error>> + Send + 'a;

  fn seed_grants<'a>(
    &'a self,
    batch: Vec<Grant>,
    actor: &'a Actor,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  /// The natural keys owned by live rows of `entity`.
  fn live_keys(
    &self,
    entity: EntityType,
  ) -> impl Future<Output = Result<KeyMap, Self::Error>> + Send + '_;

  /// Soft-delete every live achievement, then indicator, then section, in
  /// one transaction.
  fn clear_hierarchy<'a>(
    &'a self,
    actor: &'a Actor,
  ) -> impl Future<Output = Result<ClearCounts, Self::Error>> + Send + 'a;

  // ── Roles and grants ──────────────────────────────────────────────────

  /// Register a role; a no-op if it already exists.
  fn add_role<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn list_roles(
    &self,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  fn list_grants(
    &self,
  ) -> impl Future<Output = Result<Vec<Grant>, Self::Error>> + Send + '_;
}
