//! Typed scalars carried by indicator baselines, targets and achievements.
//!
//! Every value is tagged with its [`ValueKind`]. The kind is never inferred
//! from the shape of the payload: `{"kind": "percentage", "value": "50"}` and
//! `{"kind": "numeric", "value": "50"}` are different values.

use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use crate::integrity::Violation;

// ─── Kind ────────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ValueKind {
  Numeric,
  Percentage,
  BooleanLabel,
}

// ─── Boolean label ───────────────────────────────────────────────────────────

/// The two sentinel labels a `boolean_label` value may take. Matching is
/// exact: `"oui"` or `"yes"` are malformed, not coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BooleanLabel {
  Oui,
  Non,
}

impl BooleanLabel {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Oui => "Oui",
      Self::Non => "Non",
    }
  }
}

impl fmt::Display for BooleanLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for BooleanLabel {
  type Err = Violation;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "Oui" => Ok(Self::Oui),
      "Non" => Ok(Self::Non),
      other => Err(Violation::MalformedLabel(other.to_owned())),
    }
  }
}

// ─── Value ───────────────────────────────────────────────────────────────────

/// A kind-tagged scalar.
///
/// Deserialisation goes through the same checks as the constructors, so a
/// value read from JSON is always in range. Values built directly from the
/// variants are re-checked by [`crate::integrity::validate_value`] at every
/// write boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
  tag = "kind",
  content = "value",
  rename_all = "snake_case",
  try_from = "ValueRepr"
)]
pub enum Value {
  /// A non-negative count.
  Numeric(Decimal),
  /// A share in `[0, 100]`.
  Percentage(Decimal),
  BooleanLabel(BooleanLabel),
}

impl Value {
  pub fn numeric(d: Decimal) -> Result<Self, Violation> {
    let v = Self::Numeric(d);
    v.check()?;
    Ok(v)
  }

  pub fn percentage(d: Decimal) -> Result<Self, Violation> {
    let v = Self::Percentage(d);
    v.check()?;
    Ok(v)
  }

  pub fn boolean_label(label: &str) -> Result<Self, Violation> {
    Ok(Self::BooleanLabel(label.parse()?))
  }

  pub fn kind(&self) -> ValueKind {
    match self {
      Self::Numeric(_) => ValueKind::Numeric,
      Self::Percentage(_) => ValueKind::Percentage,
      Self::BooleanLabel(_) => ValueKind::BooleanLabel,
    }
  }

  /// Range rules for the payload of this kind.
  pub fn check(&self) -> Result<(), Violation> {
    match self {
      Self::Numeric(d) if d.is_sign_negative() && !d.is_zero() => {
        Err(Violation::NegativeNumeric(*d))
      }
      Self::Percentage(d) if *d < Decimal::ZERO || *d > Decimal::ONE_HUNDRED => {
        Err(Violation::PercentageOutOfRange(*d))
      }
      _ => Ok(()),
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Numeric(d) => write!(f, "{d}"),
      Self::Percentage(d) => write!(f, "{d}%"),
      Self::BooleanLabel(l) => write!(f, "{l}"),
    }
  }
}

/// Wire shape accepted on input. The payload may be a JSON number or a
/// string for the decimal kinds, and must be a string for labels.
#[derive(Deserialize)]
struct ValueRepr {
  kind:  ValueKind,
  value: serde_json::Value,
}

impl TryFrom<ValueRepr> for Value {
  type Error = Violation;

  fn try_from(repr: ValueRepr) -> Result<Self, Self::Error> {
    match repr.kind {
      ValueKind::Numeric => Value::numeric(decimal_payload(repr.value)?),
      ValueKind::Percentage => Value::percentage(decimal_payload(repr.value)?),
      ValueKind::BooleanLabel => match repr.value {
        serde_json::Value::String(s) => Value::boolean_label(&s),
        other => Err(Violation::MalformedLabel(other.to_string())),
      },
    }
  }
}

fn decimal_payload(raw: serde_json::Value) -> Result<Decimal, Violation> {
  let text = match raw {
    serde_json::Value::Number(n) => n.to_string(),
    serde_json::Value::String(s) => s,
    other => return Err(Violation::MalformedDecimal(other.to_string())),
  };
  Decimal::from_str(&text)
    .or_else(|_| Decimal::from_scientific(&text))
    .map_err(|_| Violation::MalformedDecimal(text))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(json: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(json)
  }

  #[test]
  fn percentage_bounds_are_inclusive() {
    assert!(Value::percentage(Decimal::ZERO).is_ok());
    assert!(Value::percentage(Decimal::ONE_HUNDRED).is_ok());
    assert!(matches!(
      Value::percentage(Decimal::new(1001, 1)),
      Err(Violation::PercentageOutOfRange(_))
    ));
    assert!(matches!(
      Value::percentage(Decimal::new(-1, 0)),
      Err(Violation::PercentageOutOfRange(_))
    ));
  }

  #[test]
  fn negative_numeric_rejected() {
    assert!(matches!(
      Value::numeric(Decimal::new(-3, 0)),
      Err(Violation::NegativeNumeric(_))
    ));
    assert!(Value::numeric(Decimal::new(150_000, 0)).is_ok());
  }

  #[test]
  fn labels_are_matched_exactly() {
    assert_eq!(
      Value::boolean_label("Oui").unwrap(),
      Value::BooleanLabel(BooleanLabel::Oui)
    );
    assert!(matches!(
      Value::boolean_label("oui"),
      Err(Violation::MalformedLabel(_))
    ));
    assert!(matches!(
      Value::boolean_label("Peut-être"),
      Err(Violation::MalformedLabel(_))
    ));
  }

  #[test]
  fn deserialize_accepts_numbers_and_strings() {
    assert_eq!(
      parse(r#"{"kind":"percentage","value":42.5}"#).unwrap(),
      Value::Percentage(Decimal::new(425, 1))
    );
    assert_eq!(
      parse(r#"{"kind":"numeric","value":"1200"}"#).unwrap(),
      Value::Numeric(Decimal::new(1200, 0))
    );
    assert_eq!(
      parse(r#"{"kind":"boolean_label","value":"Non"}"#).unwrap(),
      Value::BooleanLabel(BooleanLabel::Non)
    );
  }

  #[test]
  fn deserialize_runs_range_checks() {
    let err = parse(r#"{"kind":"percentage","value":120}"#).unwrap_err();
    assert!(err.to_string().contains("outside [0, 100]"), "{err}");

    assert!(parse(r#"{"kind":"boolean_label","value":true}"#).is_err());
    assert!(parse(r#"{"kind":"ratio","value":1}"#).is_err());
  }

  #[test]
  fn serialized_form_reads_back() {
    let v = Value::Percentage(Decimal::new(50, 0));
    let json = serde_json::to_string(&v).unwrap();
    assert_eq!(json, r#"{"kind":"percentage","value":"50"}"#);
    assert_eq!(parse(&json).unwrap(), v);
  }
}
