//! Synchronous write paths, run on the database thread inside one
//! transaction each.
//!
//! Every function here takes the open transaction (as a plain
//! `&Connection`) and does its own parent lookups, so the integrity checks
//! see exactly the rows the write will commit against.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension as _, params};
use uuid::Uuid;

use resframe_core::{
  entity::{
    Achievement, AchievementPatch, Audit, EntityType, Indicator, IndicatorPatch,
    NewAchievement, NewIndicator, NewSection, Section, SectionPatch,
  },
  integrity::{self, Violation},
  permission::{Actor, Grant},
  store::ClearCounts,
};

use crate::{
  Error, Result,
  encode::{
    ACHIEVEMENT_COLUMNS, AUDIT_COLUMNS, INDICATOR_COLUMNS, RawAchievement,
    RawIndicator, RawSection, SECTION_COLUMNS, encode_date, encode_dt,
    encode_kind, encode_uuid, encode_value,
  },
};

pub fn table(entity: EntityType) -> &'static str {
  match entity {
    EntityType::Section => "sections",
    EntityType::Indicator => "indicators",
    EntityType::Achievement => "achievements",
  }
}

// ─── Lookups ─────────────────────────────────────────────────────────────────

pub fn fetch_section(conn: &Connection, id: i64) -> Result<Option<Section>> {
  let sql = format!("SELECT {SECTION_COLUMNS}, {AUDIT_COLUMNS} FROM sections WHERE id = ?1");
  conn
    .query_row(&sql, params![id], RawSection::from_row)
    .optional()?
    .map(RawSection::into_section)
    .transpose()
}

pub fn fetch_indicator(conn: &Connection, id: i64) -> Result<Option<Indicator>> {
  let sql =
    format!("SELECT {INDICATOR_COLUMNS}, {AUDIT_COLUMNS} FROM indicators WHERE id = ?1");
  conn
    .query_row(&sql, params![id], RawIndicator::from_row)
    .optional()?
    .map(RawIndicator::into_indicator)
    .transpose()
}

pub fn fetch_achievement(conn: &Connection, id: i64) -> Result<Option<Achievement>> {
  let sql = format!(
    "SELECT {ACHIEVEMENT_COLUMNS}, {AUDIT_COLUMNS} FROM achievements WHERE id = ?1"
  );
  conn
    .query_row(&sql, params![id], RawAchievement::from_row)
    .optional()?
    .map(RawAchievement::into_achievement)
    .transpose()
}

/// A row that may be mutated: present, live, and at `expected` version.
fn mutable<T>(
  found: Option<T>,
  audit: impl Fn(&T) -> &Audit,
  entity: EntityType,
  id: i64,
  expected: i64,
) -> Result<T> {
  let row = found
    .filter(|r| !audit(r).is_deleted)
    .ok_or(resframe_core::Error::NotFound { entity, id })?;
  audit(&row).expect_version(entity, id, expected)?;
  Ok(row)
}

fn live_children(
  conn: &Connection,
  child: EntityType,
  parent_column: &str,
  parent_id: i64,
) -> Result<i64> {
  let sql = format!(
    "SELECT COUNT(*) FROM {} WHERE {parent_column} = ?1 AND is_deleted = 0",
    table(child)
  );
  Ok(conn.query_row(&sql, params![parent_id], |r| r.get(0))?)
}

fn refuse_live_children(
  conn: &Connection,
  entity: EntityType,
  id: i64,
  child: EntityType,
  parent_column: &str,
) -> Result<()> {
  let count = live_children(conn, child, parent_column, id)?;
  if count > 0 {
    return Err(Violation::LiveChildren { entity, id, child, count }.into());
  }
  Ok(())
}

/// Turn a unique or primary-key failure into a domain duplicate error.
fn duplicate_key(
  err: rusqlite::Error,
  entity: EntityType,
  id: Option<i64>,
  uuid: Uuid,
) -> Error {
  use rusqlite::ffi::{SQLITE_CONSTRAINT_PRIMARYKEY, SQLITE_CONSTRAINT_UNIQUE};
  match err {
    rusqlite::Error::SqliteFailure(f, _)
      if f.extended_code == SQLITE_CONSTRAINT_UNIQUE
        || f.extended_code == SQLITE_CONSTRAINT_PRIMARYKEY =>
    {
      let key = match id {
        Some(id) => format!("id {id} / uuid {uuid}"),
        None => format!("uuid {uuid}"),
      };
      resframe_core::Error::DuplicateKey { entity, key }.into()
    }
    other => other.into(),
  }
}

/// Guard against a concurrent writer having moved the row on.
fn ensure_written(
  conn: &Connection,
  changed: usize,
  entity: EntityType,
  id: i64,
  expected: i64,
) -> Result<()> {
  if changed == 1 {
    return Ok(());
  }
  let sql = format!("SELECT version FROM {} WHERE id = ?1", table(entity));
  let actual: i64 = conn.query_row(&sql, params![id], |r| r.get(0))?;
  Err(resframe_core::Error::Conflict { entity, id, expected, actual }.into())
}

// ─── Sections ────────────────────────────────────────────────────────────────

pub fn insert_section(
  conn: &Connection,
  new: NewSection,
  actor: &Actor,
  now: DateTime<Utc>,
) -> Result<Section> {
  new.validate()?;
  let uuid = new.uuid.unwrap_or_else(Uuid::new_v4);
  let audit = Audit::new(&actor.username, now);

  conn
    .execute(
      "INSERT INTO sections (
         id, uuid, seed_key, name,
         created_at, updated_at, created_by, updated_by, is_deleted, version
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
      params![
        new.id,
        encode_uuid(uuid),
        new.seed_key,
        new.name,
        encode_dt(audit.created_at),
        encode_dt(audit.updated_at),
        audit.created_by,
        audit.updated_by,
        audit.is_deleted,
        audit.version,
      ],
    )
    .map_err(|e| duplicate_key(e, EntityType::Section, new.id, uuid))?;

  Ok(Section {
    id: conn.last_insert_rowid(),
    uuid,
    seed_key: new.seed_key,
    name: new.name,
    audit,
  })
}

fn store_section(conn: &Connection, s: &Section, expected: i64) -> Result<()> {
  let changed = conn.execute(
    "UPDATE sections
        SET name = ?1, updated_at = ?2, updated_by = ?3, is_deleted = ?4, version = ?5
      WHERE id = ?6 AND version = ?7",
    params![
      s.name,
      encode_dt(s.audit.updated_at),
      s.audit.updated_by,
      s.audit.is_deleted,
      s.audit.version,
      s.id,
      expected,
    ],
  )?;
  ensure_written(conn, changed, EntityType::Section, s.id, expected)
}

pub fn update_section(
  conn: &Connection,
  id: i64,
  expected: i64,
  patch: SectionPatch,
  actor: &Actor,
  now: DateTime<Utc>,
) -> Result<Section> {
  let mut section =
    mutable(fetch_section(conn, id)?, |s| &s.audit, EntityType::Section, id, expected)?;
  section.apply(patch)?;
  section.audit.touch(&actor.username, now);
  store_section(conn, &section, expected)?;
  Ok(section)
}

pub fn soft_delete_section(
  conn: &Connection,
  id: i64,
  expected: i64,
  actor: &Actor,
  now: DateTime<Utc>,
) -> Result<Section> {
  let mut section =
    mutable(fetch_section(conn, id)?, |s| &s.audit, EntityType::Section, id, expected)?;
  refuse_live_children(conn, EntityType::Section, id, EntityType::Indicator, "section_id")?;
  section.audit.mark_deleted(&actor.username, now);
  store_section(conn, &section, expected)?;
  Ok(section)
}

// ─── Indicators ──────────────────────────────────────────────────────────────

pub fn insert_indicator(
  conn: &Connection,
  new: NewIndicator,
  actor: &Actor,
  now: DateTime<Utc>,
) -> Result<Indicator> {
  let kind = new.validate()?;
  let section = fetch_section(conn, new.section_id)?;
  integrity::validate_indicator_parent(new.section_id, section.as_ref())?;

  let uuid = new.uuid.unwrap_or_else(Uuid::new_v4);
  let audit = Audit::new(&actor.username, now);

  conn
    .execute(
      "INSERT INTO indicators (
         id, uuid, seed_key, section_id, name, pbc, value_kind, baseline, target,
         observation, created_at, updated_at, created_by, updated_by, is_deleted, version
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
      params![
        new.id,
        encode_uuid(uuid),
        new.seed_key,
        new.section_id,
        new.name,
        new.pbc,
        encode_kind(kind),
        encode_value(&new.baseline)?,
        encode_value(&new.target)?,
        new.observation,
        encode_dt(audit.created_at),
        encode_dt(audit.updated_at),
        audit.created_by,
        audit.updated_by,
        audit.is_deleted,
        audit.version,
      ],
    )
    .map_err(|e| duplicate_key(e, EntityType::Indicator, new.id, uuid))?;

  Ok(Indicator {
    id: conn.last_insert_rowid(),
    uuid,
    seed_key: new.seed_key,
    section_id: new.section_id,
    name: new.name,
    pbc: new.pbc,
    baseline: new.baseline,
    target: new.target,
    observation: new.observation,
    audit,
  })
}

fn store_indicator(conn: &Connection, i: &Indicator, expected: i64) -> Result<()> {
  let changed = conn.execute(
    "UPDATE indicators
        SET section_id = ?1, name = ?2, pbc = ?3, value_kind = ?4, baseline = ?5,
            target = ?6, observation = ?7, updated_at = ?8, updated_by = ?9,
            is_deleted = ?10, version = ?11
      WHERE id = ?12 AND version = ?13",
    params![
      i.section_id,
      i.name,
      i.pbc,
      encode_kind(i.kind()),
      encode_value(&i.baseline)?,
      encode_value(&i.target)?,
      i.observation,
      encode_dt(i.audit.updated_at),
      i.audit.updated_by,
      i.audit.is_deleted,
      i.audit.version,
      i.id,
      expected,
    ],
  )?;
  ensure_written(conn, changed, EntityType::Indicator, i.id, expected)
}

pub fn update_indicator(
  conn: &Connection,
  id: i64,
  expected: i64,
  patch: IndicatorPatch,
  actor: &Actor,
  now: DateTime<Utc>,
) -> Result<Indicator> {
  let mut indicator = mutable(
    fetch_indicator(conn, id)?,
    |i| &i.audit,
    EntityType::Indicator,
    id,
    expected,
  )?;
  let (old_section, old_kind) = (indicator.section_id, indicator.kind());
  indicator.apply(patch)?;

  if indicator.section_id != old_section {
    let section = fetch_section(conn, indicator.section_id)?;
    integrity::validate_indicator_parent(indicator.section_id, section.as_ref())?;
  }
  if indicator.kind() != old_kind
    && live_children(conn, EntityType::Achievement, "indicator_id", id)? > 0
  {
    return Err(Violation::KindLocked { indicator_id: id }.into());
  }

  indicator.audit.touch(&actor.username, now);
  store_indicator(conn, &indicator, expected)?;
  Ok(indicator)
}

pub fn soft_delete_indicator(
  conn: &Connection,
  id: i64,
  expected: i64,
  actor: &Actor,
  now: DateTime<Utc>,
) -> Result<Indicator> {
  let mut indicator = mutable(
    fetch_indicator(conn, id)?,
    |i| &i.audit,
    EntityType::Indicator,
    id,
    expected,
  )?;
  refuse_live_children(
    conn,
    EntityType::Indicator,
    id,
    EntityType::Achievement,
    "indicator_id",
  )?;
  indicator.audit.mark_deleted(&actor.username, now);
  store_indicator(conn, &indicator, expected)?;
  Ok(indicator)
}

// ─── Achievements ────────────────────────────────────────────────────────────

/// The owning indicator must be live and share the value's kind.
fn check_achievement_value(
  conn: &Connection,
  indicator_id: i64,
  value: &resframe_core::value::Value,
) -> Result<()> {
  let indicator = fetch_indicator(conn, indicator_id)?;
  integrity::validate_achievement_parent(indicator_id, indicator.as_ref())?;
  if let Some(indicator) = indicator {
    integrity::validate_value_kind(&indicator, value)?;
  }
  Ok(())
}

pub fn insert_achievement(
  conn: &Connection,
  new: NewAchievement,
  actor: &Actor,
  now: DateTime<Utc>,
) -> Result<Achievement> {
  integrity::validate_value(&new.value)?;
  let reported_by = new.reported_by.unwrap_or_else(|| actor.username.clone());
  integrity::validate_required("reported_by", &reported_by)?;
  check_achievement_value(conn, new.indicator_id, &new.value)?;

  let uuid = new.uuid.unwrap_or_else(Uuid::new_v4);
  let audit = Audit::new(&actor.username, now);

  conn
    .execute(
      "INSERT INTO achievements (
         id, uuid, seed_key, indicator_id, value_kind, value, reported_on,
         reported_by, comment, created_at, updated_at, created_by, updated_by,
         is_deleted, version
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
      params![
        new.id,
        encode_uuid(uuid),
        new.seed_key,
        new.indicator_id,
        encode_kind(new.value.kind()),
        encode_value(&new.value)?,
        encode_date(new.reported_on),
        reported_by,
        new.comment,
        encode_dt(audit.created_at),
        encode_dt(audit.updated_at),
        audit.created_by,
        audit.updated_by,
        audit.is_deleted,
        audit.version,
      ],
    )
    .map_err(|e| duplicate_key(e, EntityType::Achievement, new.id, uuid))?;

  Ok(Achievement {
    id: conn.last_insert_rowid(),
    uuid,
    seed_key: new.seed_key,
    indicator_id: new.indicator_id,
    value: new.value,
    reported_on: new.reported_on,
    reported_by,
    comment: new.comment,
    audit,
  })
}

fn store_achievement(conn: &Connection, a: &Achievement, expected: i64) -> Result<()> {
  let changed = conn.execute(
    "UPDATE achievements
        SET value_kind = ?1, value = ?2, reported_on = ?3, reported_by = ?4,
            comment = ?5, updated_at = ?6, updated_by = ?7, is_deleted = ?8,
            version = ?9
      WHERE id = ?10 AND version = ?11",
    params![
      encode_kind(a.value.kind()),
      encode_value(&a.value)?,
      encode_date(a.reported_on),
      a.reported_by,
      a.comment,
      encode_dt(a.audit.updated_at),
      a.audit.updated_by,
      a.audit.is_deleted,
      a.audit.version,
      a.id,
      expected,
    ],
  )?;
  ensure_written(conn, changed, EntityType::Achievement, a.id, expected)
}

pub fn update_achievement(
  conn: &Connection,
  id: i64,
  expected: i64,
  patch: AchievementPatch,
  actor: &Actor,
  now: DateTime<Utc>,
) -> Result<Achievement> {
  let mut achievement = mutable(
    fetch_achievement(conn, id)?,
    |a| &a.audit,
    EntityType::Achievement,
    id,
    expected,
  )?;
  achievement.apply(patch)?;
  check_achievement_value(conn, achievement.indicator_id, &achievement.value)?;
  achievement.audit.touch(&actor.username, now);
  store_achievement(conn, &achievement, expected)?;
  Ok(achievement)
}

pub fn soft_delete_achievement(
  conn: &Connection,
  id: i64,
  expected: i64,
  actor: &Actor,
  now: DateTime<Utc>,
) -> Result<Achievement> {
  let mut achievement = mutable(
    fetch_achievement(conn, id)?,
    |a| &a.audit,
    EntityType::Achievement,
    id,
    expected,
  )?;
  achievement.audit.mark_deleted(&actor.username, now);
  store_achievement(conn, &achievement, expected)?;
  Ok(achievement)
}

// ─── Maintenance ─────────────────────────────────────────────────────────────

/// Soft-delete every live row, children first.
pub fn clear_hierarchy(
  conn: &Connection,
  actor: &Actor,
  now: DateTime<Utc>,
) -> Result<ClearCounts> {
  let now = encode_dt(now);
  let clear = |entity: EntityType| -> Result<usize> {
    let sql = format!(
      "UPDATE {}
          SET is_deleted = 1, version = version + 1, updated_at = ?1, updated_by = ?2
        WHERE is_deleted = 0",
      table(entity)
    );
    Ok(conn.execute(&sql, params![now, actor.username])?)
  };
  Ok(ClearCounts {
    achievements: clear(EntityType::Achievement)?,
    indicators:   clear(EntityType::Indicator)?,
    sections:     clear(EntityType::Section)?,
  })
}

/// Insert grants that are not already present; returns how many were new.
pub fn insert_grants(
  conn: &Connection,
  grants: &[Grant],
  actor: &Actor,
  now: DateTime<Utc>,
) -> Result<usize> {
  let now = encode_dt(now);
  let mut stmt = conn.prepare(
    "INSERT OR IGNORE INTO grants (role_name, permission_code, granted_at, granted_by)
     VALUES (?1, ?2, ?3, ?4)",
  )?;
  let mut inserted = 0;
  for g in grants {
    inserted +=
      stmt.execute(params![g.role_name, g.code.get(), now, actor.username])?;
  }
  Ok(inserted)
}

#[cfg(test)]
mod tests {
  use resframe_core::value::Value;

  use super::*;
  use crate::schema::SCHEMA;

  fn conn() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    conn
  }

  fn editor() -> Actor { Actor::new("amina", "editor") }

  fn boolean_indicator(conn: &Connection) -> Indicator {
    let section =
      insert_section(conn, NewSection::new("Effets"), &editor(), Utc::now()).unwrap();
    insert_indicator(
      conn,
      NewIndicator::new(
        section.id,
        "Plaintes traitées",
        Value::boolean_label("Non").unwrap(),
        Value::boolean_label("Oui").unwrap(),
      ),
      &editor(),
      Utc::now(),
    )
    .unwrap()
  }

  #[test]
  fn unwritten_row_reports_the_stored_version() {
    let conn = conn();
    let section =
      insert_section(&conn, NewSection::new("Effets"), &editor(), Utc::now()).unwrap();
    // Another writer moves the row on between the read and the UPDATE.
    conn
      .execute("UPDATE sections SET version = 2 WHERE id = ?1", params![section.id])
      .unwrap();

    assert!(ensure_written(&conn, 1, EntityType::Section, section.id, 1).is_ok());
    let err = ensure_written(&conn, 0, EntityType::Section, section.id, 1).unwrap_err();
    assert!(matches!(
      err,
      Error::Core(resframe_core::Error::Conflict { expected: 1, actual: 2, .. })
    ));
  }

  #[test]
  fn stored_kind_cannot_drift_from_the_values() {
    let conn = conn();
    let indicator = boolean_indicator(&conn);

    let drift = conn.execute(
      "UPDATE indicators SET value_kind = 'numeric' WHERE id = ?1",
      params![indicator.id],
    );
    assert!(drift.is_err());

    let mixed = conn.execute(
      "UPDATE indicators SET target = ?1 WHERE id = ?2",
      params![r#"{"kind":"numeric","value":"3"}"#, indicator.id],
    );
    assert!(mixed.is_err());

    let achievement = insert_achievement(
      &conn,
      NewAchievement::new(
        indicator.id,
        Value::boolean_label("Oui").unwrap(),
        chrono::NaiveDate::from_ymd_opt(2025, 4, 30).unwrap(),
      ),
      &editor(),
      Utc::now(),
    )
    .unwrap();
    let drift = conn.execute(
      "UPDATE achievements SET value_kind = 'percentage' WHERE id = ?1",
      params![achievement.id],
    );
    assert!(drift.is_err());
  }
}
