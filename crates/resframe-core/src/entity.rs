//! Sections, indicators and achievements, with their shared audit block.
//!
//! Records are never physically removed. A soft delete flips `is_deleted`
//! and bumps `version` like any other mutation, and is terminal: nothing
//! clears the flag again.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumIter, IntoStaticStr};
use uuid::Uuid;

use crate::{
  Error, Result,
  integrity::{self, Violation},
  value::{Value, ValueKind},
};

// ─── Entity type ─────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumIter,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityType {
  Section,
  Indicator,
  Achievement,
}

// ─── Audit block ─────────────────────────────────────────────────────────────

/// Provenance and concurrency metadata shared by every entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub created_by: String,
  pub updated_by: String,
  pub is_deleted: bool,
  /// Starts at 1 and grows by exactly 1 per successful mutation.
  pub version:    i64,
}

impl Audit {
  pub fn new(actor: &str, now: DateTime<Utc>) -> Self {
    Self {
      created_at: now,
      updated_at: now,
      created_by: actor.to_owned(),
      updated_by: actor.to_owned(),
      is_deleted: false,
      version:    1,
    }
  }

  /// Optimistic concurrency check against the caller's view of the record.
  pub fn expect_version(
    &self,
    entity: EntityType,
    id: i64,
    expected: i64,
  ) -> Result<()> {
    if self.version != expected {
      return Err(Error::Conflict {
        entity,
        id,
        expected,
        actual: self.version,
      });
    }
    Ok(())
  }

  /// Restamp after a successful mutation.
  pub fn touch(&mut self, actor: &str, now: DateTime<Utc>) {
    self.updated_at = now;
    self.updated_by = actor.to_owned();
    self.version += 1;
  }

  pub fn mark_deleted(&mut self, actor: &str, now: DateTime<Utc>) {
    self.is_deleted = true;
    self.touch(actor, now);
  }
}

// ─── Section ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
  pub id:       i64,
  pub uuid:     Uuid,
  /// Natural key the record was declared with in a seed dataset.
  pub seed_key: Option<i64>,
  pub name:     String,
  #[serde(flatten)]
  pub audit:    Audit,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSection {
  #[serde(default)]
  pub id:       Option<i64>,
  #[serde(default)]
  pub uuid:     Option<Uuid>,
  #[serde(skip)]
  pub seed_key: Option<i64>,
  pub name:     String,
}

impl NewSection {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into(), ..Self::default() }
  }

  pub fn validate(&self) -> Result<(), Violation> {
    integrity::validate_required("name", &self.name)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SectionPatch {
  pub name: Option<String>,
}

impl Section {
  pub fn apply(&mut self, patch: SectionPatch) -> Result<(), Violation> {
    if let Some(name) = patch.name {
      integrity::validate_required("name", &name)?;
      self.name = name;
    }
    Ok(())
  }
}

// ─── Indicator ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicator {
  pub id:          i64,
  pub uuid:        Uuid,
  pub seed_key:    Option<i64>,
  pub section_id:  i64,
  pub name:        String,
  /// Program-specific classification code.
  pub pbc:         Option<String>,
  pub baseline:    Value,
  pub target:      Value,
  pub observation: Option<String>,
  #[serde(flatten)]
  pub audit:       Audit,
}

impl Indicator {
  /// The kind fixed by the baseline/target pair.
  pub fn kind(&self) -> ValueKind { self.baseline.kind() }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewIndicator {
  #[serde(default)]
  pub id:          Option<i64>,
  #[serde(default)]
  pub uuid:        Option<Uuid>,
  #[serde(skip)]
  pub seed_key:    Option<i64>,
  pub section_id:  i64,
  pub name:        String,
  #[serde(default)]
  pub pbc:         Option<String>,
  pub baseline:    Value,
  pub target:      Value,
  #[serde(default)]
  pub observation: Option<String>,
}

impl NewIndicator {
  pub fn new(
    section_id: i64,
    name: impl Into<String>,
    baseline: Value,
    target: Value,
  ) -> Self {
    Self {
      id: None,
      uuid: None,
      seed_key: None,
      section_id,
      name: name.into(),
      pbc: None,
      baseline,
      target,
      observation: None,
    }
  }

  /// Field-level rules that need no parent lookup.
  pub fn validate(&self) -> Result<ValueKind, Violation> {
    integrity::validate_required("name", &self.name)?;
    integrity::validate_indicator_values(&self.baseline, &self.target)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndicatorPatch {
  pub section_id:  Option<i64>,
  pub name:        Option<String>,
  #[serde(default, deserialize_with = "double_option")]
  pub pbc:         Option<Option<String>>,
  pub baseline:    Option<Value>,
  pub target:      Option<Value>,
  #[serde(default, deserialize_with = "double_option")]
  pub observation: Option<Option<String>>,
}

impl Indicator {
  /// Apply `patch` in place. Parent existence and the kind lock are checked
  /// by the store, which can see other rows.
  pub fn apply(&mut self, patch: IndicatorPatch) -> Result<(), Violation> {
    if let Some(name) = patch.name {
      integrity::validate_required("name", &name)?;
      self.name = name;
    }
    if let Some(section_id) = patch.section_id {
      self.section_id = section_id;
    }
    if let Some(pbc) = patch.pbc {
      self.pbc = pbc;
    }
    if let Some(observation) = patch.observation {
      self.observation = observation;
    }
    if let Some(baseline) = patch.baseline {
      self.baseline = baseline;
    }
    if let Some(target) = patch.target {
      self.target = target;
    }
    integrity::validate_indicator_values(&self.baseline, &self.target)?;
    Ok(())
  }
}

// ─── Achievement ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
  pub id:           i64,
  pub uuid:         Uuid,
  pub seed_key:     Option<i64>,
  pub indicator_id: i64,
  pub value:        Value,
  pub reported_on:  NaiveDate,
  pub reported_by:  String,
  pub comment:      Option<String>,
  #[serde(flatten)]
  pub audit:        Audit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAchievement {
  #[serde(default)]
  pub id:           Option<i64>,
  #[serde(default)]
  pub uuid:         Option<Uuid>,
  #[serde(skip)]
  pub seed_key:     Option<i64>,
  pub indicator_id: i64,
  pub value:        Value,
  pub reported_on:  NaiveDate,
  /// Defaults to the creating actor.
  #[serde(default)]
  pub reported_by:  Option<String>,
  #[serde(default)]
  pub comment:      Option<String>,
}

impl NewAchievement {
  pub fn new(indicator_id: i64, value: Value, reported_on: NaiveDate) -> Self {
    Self {
      id: None,
      uuid: None,
      seed_key: None,
      indicator_id,
      value,
      reported_on,
      reported_by: None,
      comment: None,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AchievementPatch {
  pub value:       Option<Value>,
  pub reported_on: Option<NaiveDate>,
  pub reported_by: Option<String>,
  #[serde(default, deserialize_with = "double_option")]
  pub comment:     Option<Option<String>>,
}

impl Achievement {
  /// Apply `patch` in place. The value kind is re-checked against the owning
  /// indicator by the store.
  pub fn apply(&mut self, patch: AchievementPatch) -> Result<(), Violation> {
    if let Some(value) = patch.value {
      integrity::validate_value(&value)?;
      self.value = value;
    }
    if let Some(reported_on) = patch.reported_on {
      self.reported_on = reported_on;
    }
    if let Some(reported_by) = patch.reported_by {
      integrity::validate_required("reported_by", &reported_by)?;
      self.reported_by = reported_by;
    }
    if let Some(comment) = patch.comment {
      self.comment = comment;
    }
    Ok(())
  }
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`), so patches can clear optional text.
fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  Option::<T>::deserialize(de).map(Some)
}

#[cfg(test)]
mod tests {
  use rust_decimal::Decimal;

  use super::*;

  fn indicator() -> Indicator {
    let now = Utc::now();
    Indicator {
      id:          8,
      uuid:        Uuid::new_v4(),
      seed_key:    Some(8),
      section_id:  5,
      name:        "Ménages bénéficiaires".into(),
      pbc:         Some("PBC 1".into()),
      baseline:    Value::boolean_label("Non").unwrap(),
      target:      Value::boolean_label("Oui").unwrap(),
      observation: Some("suivi trimestriel".into()),
      audit:       Audit::new("system", now),
    }
  }

  #[test]
  fn touch_increments_version_by_one() {
    let now = Utc::now();
    let mut audit = Audit::new("alice", now);
    assert_eq!(audit.version, 1);
    audit.touch("bob", now);
    assert_eq!(audit.version, 2);
    assert_eq!(audit.created_by, "alice");
    assert_eq!(audit.updated_by, "bob");
    assert!(!audit.is_deleted);
  }

  #[test]
  fn stale_version_is_a_conflict() {
    let audit = Audit::new("alice", Utc::now());
    let err = audit.expect_version(EntityType::Section, 3, 7).unwrap_err();
    assert!(matches!(
      err,
      Error::Conflict { expected: 7, actual: 1, id: 3, .. }
    ));
    assert!(audit.expect_version(EntityType::Section, 3, 1).is_ok());
  }

  #[test]
  fn patch_with_explicit_null_clears_pbc() {
    let patch: IndicatorPatch =
      serde_json::from_str(r#"{"pbc": null}"#).unwrap();
    let mut ind = indicator();
    ind.apply(patch).unwrap();
    assert_eq!(ind.pbc, None);
    assert_eq!(ind.observation.as_deref(), Some("suivi trimestriel"));
  }

  #[test]
  fn patch_cannot_split_the_kind_pair() {
    let mut ind = indicator();
    let patch = IndicatorPatch {
      target: Some(Value::Percentage(Decimal::new(80, 0))),
      ..IndicatorPatch::default()
    };
    assert!(matches!(
      ind.apply(patch),
      Err(Violation::MixedIndicatorKind { .. })
    ));
  }

  #[test]
  fn blank_section_name_rejected() {
    assert!(matches!(
      NewSection::new("  ").validate(),
      Err(Violation::MissingField("name"))
    ));
  }

  #[test]
  fn serialized_entity_flattens_audit() {
    let json = serde_json::to_value(indicator()).unwrap();
    assert_eq!(json["version"], 1);
    assert_eq!(json["is_deleted"], false);
    assert_eq!(json["baseline"]["kind"], "boolean_label");
  }
}
