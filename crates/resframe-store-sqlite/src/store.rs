//! [`SqliteStore`], the SQLite implementation of [`FrameworkStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, params};

use resframe_core::{
  entity::{
    Achievement, AchievementPatch, EntityType, Indicator, IndicatorPatch,
    NewAchievement, NewIndicator, NewSection, Section, SectionPatch,
  },
  permission::{Actor, Grant, PermissionCode},
  store::{
    AchievementQuery, ClearCounts, DEFAULT_LIMIT, FrameworkStore, IndicatorQuery,
    KeyMap, SectionQuery,
  },
};

use crate::{
  Error, Result,
  encode::{
    ACHIEVEMENT_COLUMNS, AUDIT_COLUMNS, INDICATOR_COLUMNS, RawAchievement,
    RawIndicator, RawSection, SECTION_COLUMNS, encode_date, encode_dt,
  },
  schema::SCHEMA,
  write,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A results-framework store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    tracing::info!(path = %path.display(), "store opened");
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` inside one transaction on the database thread. The
  /// transaction commits only if `f` succeeds.
  async fn in_transaction<R, F>(&self, f: F) -> Result<R>
  where
    F: FnOnce(&Connection) -> Result<R> + Send + 'static,
    R: Send + 'static,
  {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let out = match f(&tx) {
          Ok(out) => out,
          Err(e) => return Ok(Err(e)),
        };
        tx.commit()?;
        Ok(Ok(out))
      })
      .await?
  }

  /// Run a read-only closure on the database thread.
  async fn read<R, F>(&self, f: F) -> Result<R>
  where
    F: FnOnce(&Connection) -> Result<R> + Send + 'static,
    R: Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }
}

/// Insert each record of a seed batch. A record colliding with a unique key
/// is skipped; any other failure aborts the whole batch.
fn seed_each<N, T>(
  batch: Vec<N>,
  mut insert: impl FnMut(N) -> Result<T>,
) -> Result<Vec<T>> {
  let mut out = Vec::with_capacity(batch.len());
  for new in batch {
    match insert(new) {
      Ok(row) => out.push(row),
      Err(Error::Core(resframe_core::Error::DuplicateKey { entity, key })) => {
        tracing::warn!(%entity, %key, "duplicate key; record skipped");
      }
      Err(e) => return Err(e),
    }
  }
  Ok(out)
}

/// SQLite wants `i64`; an unbounded page is clamped rather than wrapped.
fn page(limit: Option<usize>, offset: Option<usize>) -> (i64, i64) {
  let clamp = |n: usize| i64::try_from(n).unwrap_or(i64::MAX);
  (clamp(limit.unwrap_or(DEFAULT_LIMIT)), clamp(offset.unwrap_or(0)))
}

/// `LIKE` pattern for a case-insensitive substring match.
fn contains(text: Option<&str>) -> Option<String> {
  text.map(str::trim).filter(|t| !t.is_empty()).map(|t| format!("%{t}%"))
}

// ─── FrameworkStore impl ─────────────────────────────────────────────────────

impl FrameworkStore for SqliteStore {
  type Error = Error;

  // ── Sections ──────────────────────────────────────────────────────────────

  async fn create_section(&self, new: NewSection, actor: &Actor) -> Result<Section> {
    let actor = actor.clone();
    let section = self
      .in_transaction(move |tx| write::insert_section(tx, new, &actor, Utc::now()))
      .await?;
    tracing::debug!(id = section.id, "section created");
    Ok(section)
  }

  async fn update_section(
    &self,
    id: i64,
    expected_version: i64,
    patch: SectionPatch,
    actor: &Actor,
  ) -> Result<Section> {
    let actor = actor.clone();
    self
      .in_transaction(move |tx| {
        write::update_section(tx, id, expected_version, patch, &actor, Utc::now())
      })
      .await
  }

  async fn soft_delete_section(
    &self,
    id: i64,
    expected_version: i64,
    actor: &Actor,
  ) -> Result<Section> {
    let actor = actor.clone();
    self
      .in_transaction(move |tx| {
        write::soft_delete_section(tx, id, expected_version, &actor, Utc::now())
      })
      .await
  }

  async fn get_section(&self, id: i64, include_deleted: bool) -> Result<Option<Section>> {
    let found = self.read(move |conn| write::fetch_section(conn, id)).await?;
    Ok(found.filter(|s| include_deleted || !s.audit.is_deleted))
  }

  async fn list_sections(&self, query: &SectionQuery) -> Result<Vec<Section>> {
    let pattern = contains(query.text.as_deref());
    let include_deleted = query.include_deleted;
    let (limit, offset) = page(query.limit, query.offset);

    let raws: Vec<RawSection> = self
      .read(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SECTION_COLUMNS}, {AUDIT_COLUMNS} FROM sections
            WHERE (?1 OR is_deleted = 0)
              AND (?2 IS NULL OR name LIKE ?2)
            ORDER BY id
            LIMIT ?3 OFFSET ?4"
        ))?;
        let rows = stmt
          .query_map(
            params![include_deleted, pattern, limit, offset],
            RawSection::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSection::into_section).collect()
  }

  // ── Indicators ────────────────────────────────────────────────────────────

  async fn create_indicator(
    &self,
    new: NewIndicator,
    actor: &Actor,
  ) -> Result<Indicator> {
    let actor = actor.clone();
    let indicator = self
      .in_transaction(move |tx| write::insert_indicator(tx, new, &actor, Utc::now()))
      .await?;
    tracing::debug!(id = indicator.id, section = indicator.section_id, "indicator created");
    Ok(indicator)
  }

  async fn update_indicator(
    &self,
    id: i64,
    expected_version: i64,
    patch: IndicatorPatch,
    actor: &Actor,
  ) -> Result<Indicator> {
    let actor = actor.clone();
    self
      .in_transaction(move |tx| {
        write::update_indicator(tx, id, expected_version, patch, &actor, Utc::now())
      })
      .await
  }

  async fn soft_delete_indicator(
    &self,
    id: i64,
    expected_version: i64,
    actor: &Actor,
  ) -> Result<Indicator> {
    let actor = actor.clone();
    self
      .in_transaction(move |tx| {
        write::soft_delete_indicator(tx, id, expected_version, &actor, Utc::now())
      })
      .await
  }

  async fn get_indicator(
    &self,
    id: i64,
    include_deleted: bool,
  ) -> Result<Option<Indicator>> {
    let found = self.read(move |conn| write::fetch_indicator(conn, id)).await?;
    Ok(found.filter(|i| include_deleted || !i.audit.is_deleted))
  }

  async fn list_indicators(&self, query: &IndicatorQuery) -> Result<Vec<Indicator>> {
    let pattern = contains(query.text.as_deref());
    let section_id = query.section_id;
    let pbc = query.pbc.clone();
    let include_deleted = query.include_deleted;
    let (limit, offset) = page(query.limit, query.offset);

    let raws: Vec<RawIndicator> = self
      .read(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {INDICATOR_COLUMNS}, {AUDIT_COLUMNS} FROM indicators
            WHERE (?1 OR is_deleted = 0)
              AND (?2 IS NULL OR section_id = ?2)
              AND (?3 IS NULL OR name LIKE ?3)
              AND (?4 IS NULL OR pbc = ?4)
            ORDER BY id
            LIMIT ?5 OFFSET ?6"
        ))?;
        let rows = stmt
          .query_map(
            params![include_deleted, section_id, pattern, pbc, limit, offset],
            RawIndicator::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawIndicator::into_indicator).collect()
  }

  // ── Achievements ──────────────────────────────────────────────────────────

  async fn create_achievement(
    &self,
    new: NewAchievement,
    actor: &Actor,
  ) -> Result<Achievement> {
    let actor = actor.clone();
    let achievement = self
      .in_transaction(move |tx| write::insert_achievement(tx, new, &actor, Utc::now()))
      .await?;
    tracing::debug!(
      id = achievement.id,
      indicator = achievement.indicator_id,
      "achievement recorded"
    );
    Ok(achievement)
  }

  async fn update_achievement(
    &self,
    id: i64,
    expected_version: i64,
    patch: AchievementPatch,
    actor: &Actor,
  ) -> Result<Achievement> {
    let actor = actor.clone();
    self
      .in_transaction(move |tx| {
        write::update_achievement(tx, id, expected_version, patch, &actor, Utc::now())
      })
      .await
  }

  async fn soft_delete_achievement(
    &self,
    id: i64,
    expected_version: i64,
    actor: &Actor,
  ) -> Result<Achievement> {
    let actor = actor.clone();
    self
      .in_transaction(move |tx| {
        write::soft_delete_achievement(tx, id, expected_version, &actor, Utc::now())
      })
      .await
  }

  async fn get_achievement(
    &self,
    id: i64,
    include_deleted: bool,
  ) -> Result<Option<Achievement>> {
    let found = self.read(move |conn| write::fetch_achievement(conn, id)).await?;
    Ok(found.filter(|a| include_deleted || !a.audit.is_deleted))
  }

  async fn list_achievements(
    &self,
    query: &AchievementQuery,
  ) -> Result<Vec<Achievement>> {
    let indicator_id = query.indicator_id;
    let from = query.reported_from.map(encode_date);
    let to = query.reported_to.map(encode_date);
    let include_deleted = query.include_deleted;
    let (limit, offset) = page(query.limit, query.offset);

    let raws: Vec<RawAchievement> = self
      .read(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ACHIEVEMENT_COLUMNS}, {AUDIT_COLUMNS} FROM achievements
            WHERE (?1 OR is_deleted = 0)
              AND (?2 IS NULL OR indicator_id = ?2)
              AND (?3 IS NULL OR reported_on >= ?3)
              AND (?4 IS NULL OR reported_on <= ?4)
            ORDER BY reported_on, id
            LIMIT ?5 OFFSET ?6"
        ))?;
        let rows = stmt
          .query_map(
            params![include_deleted, indicator_id, from, to, limit, offset],
            RawAchievement::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAchievement::into_achievement).collect()
  }

  // ── Bulk seeding ──────────────────────────────────────────────────────────

  async fn seed_sections(
    &self,
    batch: Vec<NewSection>,
    actor: &Actor,
  ) -> Result<Vec<Section>> {
    let actor = actor.clone();
    self
      .in_transaction(move |tx| {
        let now = Utc::now();
        seed_each(batch, |new| write::insert_section(tx, new, &actor, now))
      })
      .await
  }

  async fn seed_indicators(
    &self,
    batch: Vec<NewIndicator>,
    actor: &Actor,
  ) -> Result<Vec<Indicator>> {
    let actor = actor.clone();
    self
      .in_transaction(move |tx| {
        let now = Utc::now();
        seed_each(batch, |new| write::insert_indicator(tx, new, &actor, now))
      })
      .await
  }

  async fn seed_achievements(
    &self,
    batch: Vec<NewAchievement>,
    actor: &Actor,
  ) -> Result<Vec<Achievement>> {
    let actor = actor.clone();
    self
      .in_transaction(move |tx| {
        let now = Utc::now();
        seed_each(batch, |new| write::insert_achievement(tx, new, &actor, now))
      })
      .await
  }

  async fn seed_grants(&self, batch: Vec<Grant>, actor: &Actor) -> Result<usize> {
    let actor = actor.clone();
    self
      .in_transaction(move |tx| write::insert_grants(tx, &batch, &actor, Utc::now()))
      .await
  }

  async fn live_keys(&self, entity: EntityType) -> Result<KeyMap> {
    let sql = format!(
      "SELECT id, seed_key FROM {} WHERE is_deleted = 0",
      write::table(entity)
    );
    self
      .read(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut keys = KeyMap::default();
        while let Some(row) = rows.next()? {
          let id: i64 = row.get(0)?;
          match row.get::<_, Option<i64>>(1)? {
            Some(seed_key) => {
              keys.seeded.insert(seed_key, id);
            }
            None => {
              keys.unseeded.insert(id);
            }
          }
        }
        Ok(keys)
      })
      .await
  }

  async fn clear_hierarchy(&self, actor: &Actor) -> Result<ClearCounts> {
    let actor = actor.clone();
    let counts = self
      .in_transaction(move |tx| write::clear_hierarchy(tx, &actor, Utc::now()))
      .await?;
    tracing::info!(
      achievements = counts.achievements,
      indicators = counts.indicators,
      sections = counts.sections,
      "hierarchy cleared"
    );
    Ok(counts)
  }

  // ── Roles and grants ──────────────────────────────────────────────────────

  async fn add_role(&self, name: &str) -> Result<()> {
    let name = name.to_owned();
    let at = encode_dt(Utc::now());
    self
      .in_transaction(move |tx| {
        tx.execute(
          "INSERT OR IGNORE INTO roles (name, created_at) VALUES (?1, ?2)",
          params![name, at],
        )?;
        Ok(())
      })
      .await
  }

  async fn list_roles(&self) -> Result<Vec<String>> {
    self
      .read(|conn| {
        let mut stmt = conn.prepare("SELECT name FROM roles ORDER BY name")?;
        let names = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
      })
      .await
  }

  async fn list_grants(&self) -> Result<Vec<Grant>> {
    let rows: Vec<(String, u32)> = self
      .read(|conn| {
        let mut stmt = conn.prepare(
          "SELECT role_name, permission_code FROM grants
            ORDER BY role_name, permission_code",
        )?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(role_name, raw)| {
        let code = PermissionCode::new(raw).ok_or(Error::Corrupt {
          column: "grants.permission_code",
          value:  raw.to_string(),
        })?;
        Ok(Grant { role_name, code })
      })
      .collect()
  }
}
