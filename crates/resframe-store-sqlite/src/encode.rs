//! Encoding and decoding between domain types and the plain column
//! representations stored in SQLite.
//!
//! Timestamps are RFC 3339 strings, calendar dates are `YYYY-MM-DD`, UUIDs
//! are hyphenated lowercase and typed values are compact JSON in the
//! `{"kind": .., "value": ..}` shape.

use chrono::{DateTime, NaiveDate, Utc};
use resframe_core::{
  entity::{Achievement, Audit, Indicator, Section},
  value::{Value, ValueKind},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

pub fn encode_kind(kind: ValueKind) -> &'static str { kind.into() }

pub fn encode_value(v: &Value) -> Result<String> { Ok(serde_json::to_string(v)?) }

pub fn decode_value(s: &str) -> Result<Value> { Ok(serde_json::from_str(s)?) }

// ─── Audit columns ───────────────────────────────────────────────────────────

/// The six audit columns, in the order every `SELECT` lists them.
pub const AUDIT_COLUMNS: &str =
  "created_at, updated_at, created_by, updated_by, is_deleted, version";

pub struct RawAudit {
  pub created_at: String,
  pub updated_at: String,
  pub created_by: String,
  pub updated_by: String,
  pub is_deleted: bool,
  pub version:    i64,
}

impl RawAudit {
  /// Read the audit block starting at column `at`.
  fn read(row: &rusqlite::Row<'_>, at: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      created_at: row.get(at)?,
      updated_at: row.get(at + 1)?,
      created_by: row.get(at + 2)?,
      updated_by: row.get(at + 3)?,
      is_deleted: row.get(at + 4)?,
      version:    row.get(at + 5)?,
    })
  }

  fn into_audit(self) -> Result<Audit> {
    Ok(Audit {
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
      created_by: self.created_by,
      updated_by: self.updated_by,
      is_deleted: self.is_deleted,
      version:    self.version,
    })
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const SECTION_COLUMNS: &str = "id, uuid, seed_key, name";

/// Raw values read directly from a `sections` row.
pub struct RawSection {
  pub id:       i64,
  pub uuid:     String,
  pub seed_key: Option<i64>,
  pub name:     String,
  pub audit:    RawAudit,
}

impl RawSection {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:       row.get(0)?,
      uuid:     row.get(1)?,
      seed_key: row.get(2)?,
      name:     row.get(3)?,
      audit:    RawAudit::read(row, 4)?,
    })
  }

  pub fn into_section(self) -> Result<Section> {
    Ok(Section {
      id:       self.id,
      uuid:     decode_uuid(&self.uuid)?,
      seed_key: self.seed_key,
      name:     self.name,
      audit:    self.audit.into_audit()?,
    })
  }
}

pub const INDICATOR_COLUMNS: &str =
  "id, uuid, seed_key, section_id, name, pbc, baseline, target, observation";

pub struct RawIndicator {
  pub id:          i64,
  pub uuid:        String,
  pub seed_key:    Option<i64>,
  pub section_id:  i64,
  pub name:        String,
  pub pbc:         Option<String>,
  pub baseline:    String,
  pub target:      String,
  pub observation: Option<String>,
  pub audit:       RawAudit,
}

impl RawIndicator {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(0)?,
      uuid:        row.get(1)?,
      seed_key:    row.get(2)?,
      section_id:  row.get(3)?,
      name:        row.get(4)?,
      pbc:         row.get(5)?,
      baseline:    row.get(6)?,
      target:      row.get(7)?,
      observation: row.get(8)?,
      audit:       RawAudit::read(row, 9)?,
    })
  }

  pub fn into_indicator(self) -> Result<Indicator> {
    Ok(Indicator {
      id:          self.id,
      uuid:        decode_uuid(&self.uuid)?,
      seed_key:    self.seed_key,
      section_id:  self.section_id,
      name:        self.name,
      pbc:         self.pbc,
      baseline:    decode_value(&self.baseline)?,
      target:      decode_value(&self.target)?,
      observation: self.observation,
      audit:       self.audit.into_audit()?,
    })
  }
}

pub const ACHIEVEMENT_COLUMNS: &str =
  "id, uuid, seed_key, indicator_id, value, reported_on, reported_by, comment";

pub struct RawAchievement {
  pub id:           i64,
  pub uuid:         String,
  pub seed_key:     Option<i64>,
  pub indicator_id: i64,
  pub value:        String,
  pub reported_on:  String,
  pub reported_by:  String,
  pub comment:      Option<String>,
  pub audit:        RawAudit,
}

impl RawAchievement {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      uuid:         row.get(1)?,
      seed_key:     row.get(2)?,
      indicator_id: row.get(3)?,
      value:        row.get(4)?,
      reported_on:  row.get(5)?,
      reported_by:  row.get(6)?,
      comment:      row.get(7)?,
      audit:        RawAudit::read(row, 8)?,
    })
  }

  pub fn into_achievement(self) -> Result<Achievement> {
    Ok(Achievement {
      id:           self.id,
      uuid:         decode_uuid(&self.uuid)?,
      seed_key:     self.seed_key,
      indicator_id: self.indicator_id,
      value:        decode_value(&self.value)?,
      reported_on:  decode_date(&self.reported_on)?,
      reported_by:  self.reported_by,
      comment:      self.comment,
      audit:        self.audit.into_audit()?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dates_are_plain_iso() {
    let d = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
    assert_eq!(encode_date(d), "2024-03-09");
    assert_eq!(decode_date("2024-03-09").unwrap(), d);
    assert!(decode_date("09/03/2024").is_err());
  }

  #[test]
  fn values_keep_their_kind() {
    let v = Value::boolean_label("Non").unwrap();
    let s = encode_value(&v).unwrap();
    assert_eq!(s, r#"{"kind":"boolean_label","value":"Non"}"#);
    assert_eq!(decode_value(&s).unwrap(), v);
    assert_eq!(encode_kind(ValueKind::BooleanLabel), "boolean_label");
  }
}
