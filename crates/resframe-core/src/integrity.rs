//! Hierarchy integrity rules shared by the bulk loader and the live write
//! paths.
//!
//! Every check is pure: callers look the parent up themselves (inside their
//! own transaction, for the store) and hand it in. A failed check names the
//! rule it broke; values are never coerced into shape.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{
  entity::{EntityType, Indicator, Section},
  value::{Value, ValueKind},
};

/// The specific rule a record broke.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
  #[error("{entity} {id} does not exist")]
  MissingParent { entity: EntityType, id: i64 },

  #[error("{entity} {id} is deleted")]
  DeletedParent { entity: EntityType, id: i64 },

  #[error("{entity} {id} still has {count} live {child}(s)")]
  LiveChildren {
    entity: EntityType,
    id:     i64,
    child:  EntityType,
    count:  i64,
  },

  #[error("value kind {found} does not match indicator kind {expected}")]
  KindMismatch { expected: ValueKind, found: ValueKind },

  #[error("baseline kind {baseline} differs from target kind {target}")]
  MixedIndicatorKind {
    baseline: ValueKind,
    target:   ValueKind,
  },

  #[error(
    "indicator {indicator_id} has live achievements; its kind cannot change"
  )]
  KindLocked { indicator_id: i64 },

  #[error("numeric value {0} is negative")]
  NegativeNumeric(Decimal),

  #[error("percentage {0} is outside [0, 100]")]
  PercentageOutOfRange(Decimal),

  #[error("{0:?} is not one of the labels \"Oui\" / \"Non\"")]
  MalformedLabel(String),

  #[error("{0} is not a decimal")]
  MalformedDecimal(String),

  #[error("required field {0:?} is missing or blank")]
  MissingField(&'static str),

  #[error("permission code {0} is outside the reserved range")]
  UnknownPermissionCode(u32),
}

impl Violation {
  /// Whether this is a hierarchy (parent/child) rule rather than a rule on
  /// the record's own fields.
  pub fn is_referential(&self) -> bool {
    matches!(
      self,
      Self::MissingParent { .. }
        | Self::DeletedParent { .. }
        | Self::LiveChildren { .. }
    )
  }
}

/// An indicator's section must exist and be live.
pub fn validate_indicator_parent(
  section_id: i64,
  section: Option<&Section>,
) -> Result<(), Violation> {
  live_parent(EntityType::Section, section_id, section.map(|s| s.audit.is_deleted))
}

/// An achievement's indicator must exist and be live.
pub fn validate_achievement_parent(
  indicator_id: i64,
  indicator: Option<&Indicator>,
) -> Result<(), Violation> {
  live_parent(
    EntityType::Indicator,
    indicator_id,
    indicator.map(|i| i.audit.is_deleted),
  )
}

fn live_parent(
  entity: EntityType,
  id: i64,
  is_deleted: Option<bool>,
) -> Result<(), Violation> {
  match is_deleted {
    None => Err(Violation::MissingParent { entity, id }),
    Some(true) => Err(Violation::DeletedParent { entity, id }),
    Some(false) => Ok(()),
  }
}

/// `value` must be in range and of the indicator's kind.
pub fn validate_value_kind(
  indicator: &Indicator,
  value: &Value,
) -> Result<(), Violation> {
  let expected = indicator.kind();
  let found = value.kind();
  if expected != found {
    return Err(Violation::KindMismatch { expected, found });
  }
  validate_value(value)
}

/// Range rules for a single value regardless of its owner.
pub fn validate_value(value: &Value) -> Result<(), Violation> { value.check() }

/// Baseline and target must both be valid and share one kind, which becomes
/// the indicator's kind.
pub fn validate_indicator_values(
  baseline: &Value,
  target: &Value,
) -> Result<ValueKind, Violation> {
  validate_value(baseline)?;
  validate_value(target)?;
  if baseline.kind() != target.kind() {
    return Err(Violation::MixedIndicatorKind {
      baseline: baseline.kind(),
      target:   target.kind(),
    });
  }
  Ok(baseline.kind())
}

pub fn validate_required(field: &'static str, text: &str) -> Result<(), Violation> {
  if text.trim().is_empty() {
    return Err(Violation::MissingField(field));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use uuid::Uuid;

  use super::*;
  use crate::entity::Audit;

  fn section(id: i64, deleted: bool) -> Section {
    let mut audit = Audit::new("system", Utc::now());
    audit.is_deleted = deleted;
    Section {
      id,
      uuid: Uuid::new_v4(),
      seed_key: None,
      name: "Indicateurs intermédiaires".into(),
      audit,
    }
  }

  fn indicator(baseline: Value, target: Value) -> Indicator {
    Indicator {
      id: 8,
      uuid: Uuid::new_v4(),
      seed_key: None,
      section_id: 5,
      name: "Registre social opérationnel".into(),
      pbc: None,
      baseline,
      target,
      observation: None,
      audit: Audit::new("system", Utc::now()),
    }
  }

  #[test]
  fn indicator_parent_must_exist_and_be_live() {
    assert!(validate_indicator_parent(5, Some(&section(5, false))).is_ok());
    assert_eq!(
      validate_indicator_parent(404, None),
      Err(Violation::MissingParent { entity: EntityType::Section, id: 404 })
    );
    assert_eq!(
      validate_indicator_parent(5, Some(&section(5, true))),
      Err(Violation::DeletedParent { entity: EntityType::Section, id: 5 })
    );
  }

  #[test]
  fn achievement_parent_must_be_live() {
    let mut ind = indicator(
      Value::boolean_label("Non").unwrap(),
      Value::boolean_label("Oui").unwrap(),
    );
    assert!(validate_achievement_parent(8, Some(&ind)).is_ok());
    ind.audit.is_deleted = true;
    let err = validate_achievement_parent(8, Some(&ind)).unwrap_err();
    assert!(err.is_referential());
  }

  #[test]
  fn label_value_against_percentage_indicator_is_a_mismatch() {
    let ind = indicator(
      Value::Percentage(Decimal::ZERO),
      Value::Percentage(Decimal::new(60, 0)),
    );
    let err =
      validate_value_kind(&ind, &Value::boolean_label("Oui").unwrap())
        .unwrap_err();
    assert_eq!(err, Violation::KindMismatch {
      expected: ValueKind::Percentage,
      found:    ValueKind::BooleanLabel,
    });
    assert!(!err.is_referential());
  }

  #[test]
  fn out_of_range_percentage_caught_even_when_built_directly() {
    let ind = indicator(
      Value::Percentage(Decimal::ZERO),
      Value::Percentage(Decimal::new(60, 0)),
    );
    assert!(matches!(
      validate_value_kind(&ind, &Value::Percentage(Decimal::new(101, 0))),
      Err(Violation::PercentageOutOfRange(_))
    ));
  }

  #[test]
  fn mixed_baseline_and_target_rejected() {
    let err = validate_indicator_values(
      &Value::boolean_label("Non").unwrap(),
      &Value::Numeric(Decimal::new(5000, 0)),
    )
    .unwrap_err();
    assert!(matches!(err, Violation::MixedIndicatorKind { .. }));
  }
}
