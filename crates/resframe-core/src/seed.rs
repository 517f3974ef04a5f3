//! Idempotent bulk loading of the section → indicator → achievement
//! hierarchy and of the permission grant table.
//!
//! Loading is insert-if-absent: a record whose natural key is already held
//! by a live row is skipped and never overwritten, so the loader can be
//! re-run any number of times. Records whose parent is missing are skipped
//! with a warning and the rest of the batch proceeds. Each phase is handed
//! to the store as one atomic batch.
//!
//! Loader runs must be serialized by the caller; two concurrent runs against
//! one store can race on the existence checks.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  entity::{EntityType, NewAchievement, NewIndicator, NewSection, Section},
  integrity::{self, Violation},
  permission::{Actor, Grant, PermissionCode},
  store::{ClearCounts, FrameworkStore, IndicatorQuery, KeyMap, SectionQuery},
  value::Value,
};

// ─── Dataset ─────────────────────────────────────────────────────────────────

/// A declarative seed dataset. Phases are loaded in field order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Dataset {
  #[serde(default)]
  pub sections:     Vec<SectionRecord>,
  #[serde(default)]
  pub indicators:   Vec<IndicatorRecord>,
  #[serde(default)]
  pub achievements: Vec<AchievementRecord>,
  #[serde(default)]
  pub grants:       Vec<GrantRecord>,
}

impl Dataset {
  pub fn from_json(text: &str) -> Result<Self> { Ok(serde_json::from_str(text)?) }
}

/// Audit fields as exported by another system. They are parsed but not
/// copied: the loader always writes as the system actor. A record declared
/// deleted is not loaded.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeclaredAudit {
  #[serde(default)]
  pub is_deleted: bool,
  pub created_at: Option<DateTime<Utc>>,
  pub updated_at: Option<DateTime<Utc>>,
  pub version:    Option<i64>,
  pub created_by: Option<String>,
  pub updated_by: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SectionRecord {
  pub id:    i64,
  pub uuid:  Option<uuid::Uuid>,
  pub name:  String,
  #[serde(flatten)]
  pub audit: DeclaredAudit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndicatorRecord {
  pub id:          i64,
  pub uuid:        Option<uuid::Uuid>,
  pub section_id:  i64,
  pub name:        String,
  pub pbc:         Option<String>,
  pub baseline:    Value,
  pub target:      Value,
  pub observation: Option<String>,
  #[serde(flatten)]
  pub audit:       DeclaredAudit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AchievementRecord {
  pub id:           i64,
  pub uuid:         Option<uuid::Uuid>,
  pub indicator_id: i64,
  pub value:        Value,
  pub reported_on:  NaiveDate,
  pub reported_by:  Option<String>,
  pub comment:      Option<String>,
  #[serde(flatten)]
  pub audit:        DeclaredAudit,
}

/// The raw code is kept unchecked so an out-of-range entry skips one record
/// instead of rejecting the whole dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct GrantRecord {
  pub role_name:       String,
  pub permission_code: u32,
}

// ─── Options and report ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
  /// Soft-delete the existing hierarchy before loading.
  pub clear:             bool,
  /// Run the achievements phase.
  pub with_achievements: bool,
}

/// Per-phase outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
  pub inserted:   usize,
  /// Key already held by a live row, or repeated within the dataset.
  pub duplicates: usize,
  /// Parent missing or deleted (unknown role, for grants).
  pub orphaned:   usize,
  /// Failed a field or value-kind rule.
  pub invalid:    usize,
  /// Declared deleted in the dataset.
  pub retired:    usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
  pub cleared:      Option<ClearCounts>,
  pub sections:     PhaseReport,
  pub indicators:   PhaseReport,
  pub achievements: Option<PhaseReport>,
  pub grants:       PhaseReport,
  pub warnings:     Vec<String>,
}

// ─── Loader ──────────────────────────────────────────────────────────────────

pub struct Loader<'a, S> {
  store: &'a S,
  actor: Actor,
}

impl<'a, S: FrameworkStore> Loader<'a, S> {
  /// A loader writing as [`Actor::system`].
  pub fn new(store: &'a S) -> Self { Self { store, actor: Actor::system() } }

  pub async fn run(
    &self,
    dataset: &Dataset,
    options: LoadOptions,
  ) -> Result<LoadReport> {
    let mut report = LoadReport::default();

    if options.clear {
      let counts =
        self.store.clear_hierarchy(&self.actor).await.map_err(Error::backend)?;
      tracing::info!(
        achievements = counts.achievements,
        indicators = counts.indicators,
        sections = counts.sections,
        "existing hierarchy cleared"
      );
      report.cleared = Some(counts);
    }

    report.sections =
      self.load_sections(&dataset.sections, &mut report.warnings).await?;
    report.indicators =
      self.load_indicators(&dataset.indicators, &mut report.warnings).await?;
    if options.with_achievements {
      report.achievements = Some(
        self
          .load_achievements(&dataset.achievements, &mut report.warnings)
          .await?,
      );
    }
    report.grants = self.load_grants(&dataset.grants, &mut report.warnings).await?;

    Ok(report)
  }

  async fn live_keys(&self, entity: EntityType) -> Result<KeyMap> {
    self.store.live_keys(entity).await.map_err(Error::backend)
  }

  async fn load_sections(
    &self,
    records: &[SectionRecord],
    warnings: &mut Vec<String>,
  ) -> Result<PhaseReport> {
    let mut report = PhaseReport::default();
    let live_keys = self.live_keys(EntityType::Section).await?;
    let mut seen = HashSet::new();
    let mut batch = Vec::new();

    // A declared id already held by another row (a soft-deleted one after a
    // clear, or a live one re-created earlier under a fresh id) is loaded
    // under a fresh id and uuid; ids are never reused.
    for r in records {
      if r.audit.is_deleted {
        report.retired += 1;
        continue;
      }
      if !seen.insert(r.id) || live_keys.contains(r.id) {
        report.duplicates += 1;
        continue;
      }
      let id_taken =
        self.store.get_section(r.id, true).await.map_err(Error::backend)?.is_some();

      let mut new = NewSection {
        id:       Some(r.id),
        uuid:     r.uuid,
        seed_key: Some(r.id),
        name:     r.name.clone(),
      };
      if id_taken {
        (new.id, new.uuid) = (None, None);
      }
      if let Err(v) = new.validate() {
        skip(warnings, format!("section {}: {v}", r.id));
        report.invalid += 1;
        continue;
      }
      batch.push(new);
    }

    // Records keeping their declared id go first, so an id allocated for a
    // re-created record cannot land on one declared later in the batch.
    batch.sort_by_key(|new| new.id.is_none());
    let attempted = batch.len();
    report.inserted = self
      .store
      .seed_sections(batch, &self.actor)
      .await
      .map_err(Error::backend)?
      .len();
    report.duplicates += attempted - report.inserted;
    tracing::info!(?report, "sections loaded");
    Ok(report)
  }

  async fn load_indicators(
    &self,
    records: &[IndicatorRecord],
    warnings: &mut Vec<String>,
  ) -> Result<PhaseReport> {
    let mut report = PhaseReport::default();
    let section_keys = self.live_keys(EntityType::Section).await?;
    let live_keys = self.live_keys(EntityType::Indicator).await?;
    let mut seen = HashSet::new();
    let mut batch = Vec::new();

    for r in records {
      if r.audit.is_deleted {
        report.retired += 1;
        continue;
      }
      if !seen.insert(r.id) || live_keys.contains(r.id) {
        report.duplicates += 1;
        continue;
      }
      let id_taken =
        self.store.get_indicator(r.id, true).await.map_err(Error::backend)?.is_some();

      let parent = match section_keys.resolve(r.section_id) {
        Some(id) => self.store.get_section(id, false).await.map_err(Error::backend)?,
        None => None,
      };
      let Some(section_id) = parent.as_ref().map(|p| p.id) else {
        let v = Violation::MissingParent {
          entity: EntityType::Section,
          id:     r.section_id,
        };
        skip(warnings, format!("indicator {}: {v}", r.id));
        report.orphaned += 1;
        continue;
      };

      let mut new = NewIndicator {
        id: Some(r.id),
        uuid: r.uuid,
        seed_key: Some(r.id),
        section_id,
        name: r.name.clone(),
        pbc: r.pbc.clone(),
        baseline: r.baseline.clone(),
        target: r.target.clone(),
        observation: r.observation.clone(),
      };
      if id_taken {
        (new.id, new.uuid) = (None, None);
      }
      if let Err(v) = new.validate() {
        skip(warnings, format!("indicator {}: {v}", r.id));
        report.invalid += 1;
        continue;
      }
      batch.push(new);
    }

    batch.sort_by_key(|new| new.id.is_none());
    let attempted = batch.len();
    report.inserted = self
      .store
      .seed_indicators(batch, &self.actor)
      .await
      .map_err(Error::backend)?
      .len();
    report.duplicates += attempted - report.inserted;
    tracing::info!(?report, "indicators loaded");
    Ok(report)
  }

  async fn load_achievements(
    &self,
    records: &[AchievementRecord],
    warnings: &mut Vec<String>,
  ) -> Result<PhaseReport> {
    let mut report = PhaseReport::default();
    let indicator_keys = self.live_keys(EntityType::Indicator).await?;
    let live_keys = self.live_keys(EntityType::Achievement).await?;
    let mut seen = HashSet::new();
    let mut batch = Vec::new();

    for r in records {
      if r.audit.is_deleted {
        report.retired += 1;
        continue;
      }
      if !seen.insert(r.id) || live_keys.contains(r.id) {
        report.duplicates += 1;
        continue;
      }
      let id_taken =
        self.store.get_achievement(r.id, true).await.map_err(Error::backend)?.is_some();

      let parent = match indicator_keys.resolve(r.indicator_id) {
        Some(id) => {
          self.store.get_indicator(id, false).await.map_err(Error::backend)?
        }
        None => None,
      };
      let Some(parent) = parent else {
        let v = Violation::MissingParent {
          entity: EntityType::Indicator,
          id:     r.indicator_id,
        };
        skip(warnings, format!("achievement {}: {v}", r.id));
        report.orphaned += 1;
        continue;
      };
      if let Err(v) = integrity::validate_value_kind(&parent, &r.value) {
        skip(warnings, format!("achievement {}: {v}", r.id));
        report.invalid += 1;
        continue;
      }

      let mut new = NewAchievement {
        id: Some(r.id),
        uuid: r.uuid,
        seed_key: Some(r.id),
        indicator_id: parent.id,
        value: r.value.clone(),
        reported_on: r.reported_on,
        reported_by: r.reported_by.clone(),
        comment: r.comment.clone(),
      };
      if id_taken {
        (new.id, new.uuid) = (None, None);
      }
      batch.push(new);
    }

    batch.sort_by_key(|new| new.id.is_none());
    let attempted = batch.len();
    report.inserted = self
      .store
      .seed_achievements(batch, &self.actor)
      .await
      .map_err(Error::backend)?
      .len();
    report.duplicates += attempted - report.inserted;
    tracing::info!(?report, "achievements loaded");
    Ok(report)
  }

  async fn load_grants(
    &self,
    records: &[GrantRecord],
    warnings: &mut Vec<String>,
  ) -> Result<PhaseReport> {
    let mut report = PhaseReport::default();
    let roles: HashSet<String> =
      self.store.list_roles().await.map_err(Error::backend)?.into_iter().collect();
    let existing: HashSet<Grant> =
      self.store.list_grants().await.map_err(Error::backend)?.into_iter().collect();
    let mut seen = HashSet::new();
    let mut batch = Vec::new();

    for r in records {
      let Some(code) = PermissionCode::new(r.permission_code) else {
        skip(
          warnings,
          format!(
            "grant {}/{}: {}",
            r.role_name,
            r.permission_code,
            Violation::UnknownPermissionCode(r.permission_code)
          ),
        );
        report.invalid += 1;
        continue;
      };
      let grant = Grant { role_name: r.role_name.clone(), code };
      if existing.contains(&grant) || !seen.insert(grant.clone()) {
        report.duplicates += 1;
        continue;
      }
      if !roles.contains(&r.role_name) {
        skip(
          warnings,
          format!("grant {}/{code}: role does not exist", r.role_name),
        );
        report.orphaned += 1;
        continue;
      }
      batch.push(grant);
    }

    report.inserted = self
      .store
      .seed_grants(batch, &self.actor)
      .await
      .map_err(Error::backend)?;
    tracing::info!(?report, "permission grants loaded");
    Ok(report)
  }
}

fn skip(warnings: &mut Vec<String>, message: String) {
  tracing::warn!("{message}; record skipped");
  warnings.push(message);
}

// ─── Summary ─────────────────────────────────────────────────────────────────

/// Live sections with their live indicator counts, in id order.
pub async fn section_breakdown<S: FrameworkStore>(
  store: &S,
) -> Result<Vec<(Section, usize)>> {
  let sections = store
    .list_sections(&SectionQuery { limit: Some(usize::MAX), ..Default::default() })
    .await
    .map_err(Error::backend)?;

  let mut out = Vec::with_capacity(sections.len());
  for section in sections {
    let query = IndicatorQuery {
      section_id: Some(section.id),
      limit: Some(usize::MAX),
      ..Default::default()
    };
    let count = store.list_indicators(&query).await.map_err(Error::backend)?.len();
    out.push((section, count));
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::value::ValueKind;

  const DATASET: &str = r#"{
    "sections": [
      {"id": 5, "name": "Indicateurs intermédiaires",
       "created_at": "2025-04-04T13:12:00Z", "version": 3, "created_by": "admin"}
    ],
    "indicators": [
      {"id": 8, "section_id": 5, "name": "Plaintes traitées", "pbc": null,
       "baseline": {"kind": "boolean_label", "value": "Non"},
       "target":   {"kind": "boolean_label", "value": "Oui"},
       "observation": null, "is_deleted": false}
    ],
    "grants": [{"role_name": "officer", "permission_code": 160009}]
  }"#;

  #[test]
  fn dataset_parses_with_missing_phases() {
    let ds = Dataset::from_json(DATASET).unwrap();
    assert_eq!(ds.sections.len(), 1);
    assert_eq!(ds.sections[0].audit.version, Some(3));
    assert_eq!(ds.indicators[0].baseline.kind(), ValueKind::BooleanLabel);
    assert!(ds.achievements.is_empty());
    assert_eq!(ds.grants[0].permission_code, 160_009);
  }

  #[test]
  fn malformed_label_rejects_the_dataset() {
    let bad = DATASET.replace(r#""value": "Oui""#, r#""value": "Yes""#);
    assert!(Dataset::from_json(&bad).is_err());
  }

  #[test]
  fn keys_resolve_to_the_row_that_owns_them() {
    let keys = KeyMap {
      seeded:   [(5, 17), (1, 3)].into(),
      unseeded: [6].into(),
    };
    assert_eq!(keys.resolve(5), Some(17));
    assert_eq!(keys.resolve(6), Some(6));
    // Row 3 is live but was declared as 1; key 3 belongs to nobody.
    assert_eq!(keys.resolve(3), None);
    assert!(!keys.contains(17));
  }
}
