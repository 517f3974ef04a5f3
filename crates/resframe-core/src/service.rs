//! The permission-gated CRUD surface.
//!
//! [`Framework`] pairs a store with the grant table. Every method authorizes
//! the actor first and only then calls into the store, so a denied request
//! never reaches the entity model.

use std::sync::Arc;

use crate::{
  Error, Result,
  entity::{
    Achievement, AchievementPatch, EntityType, Indicator, IndicatorPatch,
    NewAchievement, NewIndicator, NewSection, Section, SectionPatch,
  },
  permission::{Actor, GrantTable, Operation},
  store::{AchievementQuery, FrameworkStore, IndicatorQuery, SectionQuery},
};

pub struct Framework<S> {
  store:  Arc<S>,
  grants: GrantTable,
}

impl<S> Clone for Framework<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), grants: self.grants.clone() }
  }
}

impl<S: FrameworkStore> Framework<S> {
  pub fn new(store: Arc<S>, grants: GrantTable) -> Self { Self { store, grants } }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn grants(&self) -> &GrantTable { &self.grants }

  /// Re-read the grant table from the store.
  pub async fn reload_grants(&self) -> Result<()> {
    self.grants.reload(self.store.as_ref()).await
  }

  fn gate(&self, actor: &Actor, entity: EntityType, op: Operation) -> Result<()> {
    self.grants.authorize(actor, entity, op).map(drop)
  }

  // ── Sections ──────────────────────────────────────────────────────────

  pub async fn search_sections(
    &self,
    actor: &Actor,
    query: &SectionQuery,
  ) -> Result<Vec<Section>> {
    self.gate(actor, EntityType::Section, Operation::Search)?;
    self.store.list_sections(query).await.map_err(Error::backend)
  }

  pub async fn get_section(
    &self,
    actor: &Actor,
    id: i64,
    include_deleted: bool,
  ) -> Result<Section> {
    self.gate(actor, EntityType::Section, Operation::Search)?;
    let found = self.store.get_section(id, include_deleted).await.map_err(Error::backend)?;
    found.ok_or(Error::NotFound { entity: EntityType::Section, id })
  }

  pub async fn create_section(
    &self,
    actor: &Actor,
    new: NewSection,
  ) -> Result<Section> {
    self.gate(actor, EntityType::Section, Operation::Create)?;
    self.store.create_section(new, actor).await.map_err(Error::backend)
  }

  pub async fn update_section(
    &self,
    actor: &Actor,
    id: i64,
    expected_version: i64,
    patch: SectionPatch,
  ) -> Result<Section> {
    self.gate(actor, EntityType::Section, Operation::Update)?;
    self
      .store
      .update_section(id, expected_version, patch, actor)
      .await
      .map_err(Error::backend)
  }

  pub async fn delete_section(
    &self,
    actor: &Actor,
    id: i64,
    expected_version: i64,
  ) -> Result<Section> {
    self.gate(actor, EntityType::Section, Operation::Delete)?;
    self
      .store
      .soft_delete_section(id, expected_version, actor)
      .await
      .map_err(Error::backend)
  }

  // ── Indicators ────────────────────────────────────────────────────────

  pub async fn search_indicators(
    &self,
    actor: &Actor,
    query: &IndicatorQuery,
  ) -> Result<Vec<Indicator>> {
    self.gate(actor, EntityType::Indicator, Operation::Search)?;
    self.store.list_indicators(query).await.map_err(Error::backend)
  }

  pub async fn get_indicator(
    &self,
    actor: &Actor,
    id: i64,
    include_deleted: bool,
  ) -> Result<Indicator> {
    self.gate(actor, EntityType::Indicator, Operation::Search)?;
    let found =
      self.store.get_indicator(id, include_deleted).await.map_err(Error::backend)?;
    found.ok_or(Error::NotFound { entity: EntityType::Indicator, id })
  }

  pub async fn create_indicator(
    &self,
    actor: &Actor,
    new: NewIndicator,
  ) -> Result<Indicator> {
    self.gate(actor, EntityType::Indicator, Operation::Create)?;
    self.store.create_indicator(new, actor).await.map_err(Error::backend)
  }

  pub async fn update_indicator(
    &self,
    actor: &Actor,
    id: i64,
    expected_version: i64,
    patch: IndicatorPatch,
  ) -> Result<Indicator> {
    self.gate(actor, EntityType::Indicator, Operation::Update)?;
    self
      .store
      .update_indicator(id, expected_version, patch, actor)
      .await
      .map_err(Error::backend)
  }

  pub async fn delete_indicator(
    &self,
    actor: &Actor,
    id: i64,
    expected_version: i64,
  ) -> Result<Indicator> {
    self.gate(actor, EntityType::Indicator, Operation::Delete)?;
    self
      .store
      .soft_delete_indicator(id, expected_version, actor)
      .await
      .map_err(Error::backend)
  }

  // ── Achievements ──────────────────────────────────────────────────────

  pub async fn search_achievements(
    &self,
    actor: &Actor,
    query: &AchievementQuery,
  ) -> Result<Vec<Achievement>> {
    self.gate(actor, EntityType::Achievement, Operation::Search)?;
    self.store.list_achievements(query).await.map_err(Error::backend)
  }

  pub async fn get_achievement(
    &self,
    actor: &Actor,
    id: i64,
    include_deleted: bool,
  ) -> Result<Achievement> {
    self.gate(actor, EntityType::Achievement, Operation::Search)?;
    let found =
      self.store.get_achievement(id, include_deleted).await.map_err(Error::backend)?;
    found.ok_or(Error::NotFound { entity: EntityType::Achievement, id })
  }

  pub async fn create_achievement(
    &self,
    actor: &Actor,
    new: NewAchievement,
  ) -> Result<Achievement> {
    self.gate(actor, EntityType::Achievement, Operation::Create)?;
    self.store.create_achievement(new, actor).await.map_err(Error::backend)
  }

  pub async fn update_achievement(
    &self,
    actor: &Actor,
    id: i64,
    expected_version: i64,
    patch: AchievementPatch,
  ) -> Result<Achievement> {
    self.gate(actor, EntityType::Achievement, Operation::Update)?;
    self
      .store
      .update_achievement(id, expected_version, patch, actor)
      .await
      .map_err(Error::backend)
  }

  pub async fn delete_achievement(
    &self,
    actor: &Actor,
    id: i64,
    expected_version: i64,
  ) -> Result<Achievement> {
    self.gate(actor, EntityType::Achievement, Operation::Delete)?;
    self
      .store
      .soft_delete_achievement(id, expected_version, actor)
      .await
      .map_err(Error::backend)
  }
}
