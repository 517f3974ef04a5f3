//! Permission codes, role grants and the authorization check.
//!
//! Every `(entity type, operation)` pair maps to one code in the reserved
//! range [`PERMISSION_RANGE`]. Roles are granted sets of codes. The CRUD
//! service asks [`GrantTable::authorize`] before touching the store; the
//! store itself never checks permissions.

use std::{
  collections::{HashMap, HashSet},
  fmt,
  ops::RangeInclusive,
  sync::{Arc, RwLock},
};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator as _};

use crate::{
  Error, Result, entity::EntityType, integrity::Violation,
  store::FrameworkStore,
};

/// Codes reserved for the results framework.
pub const PERMISSION_RANGE: RangeInclusive<u32> = 160_005..=160_016;

/// Role and username of the actor the bulk loader writes as.
pub const SYSTEM_ACTOR: &str = "system";

// ─── Operations and codes ────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
  Search,
  Create,
  Update,
  Delete,
}

/// A permission code from the reserved range. Codes are unique per pair;
/// their numeric order carries no meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PermissionCode {
  entity:    EntityType,
  operation: Operation,
}

impl PermissionCode {
  /// Accept a raw code only if it belongs to the reserved range.
  pub fn new(raw: u32) -> Option<Self> { Self::all().find(|c| c.get() == raw) }

  /// The code required for `operation` on `entity`.
  pub fn required(entity: EntityType, operation: Operation) -> Self {
    Self { entity, operation }
  }

  pub fn get(self) -> u32 {
    use EntityType as E;
    use Operation as O;
    match (self.entity, self.operation) {
      (E::Section, O::Search) => 160_005,
      (E::Section, O::Create) => 160_006,
      (E::Section, O::Update) => 160_007,
      (E::Section, O::Delete) => 160_008,
      (E::Indicator, O::Search) => 160_009,
      (E::Indicator, O::Create) => 160_010,
      (E::Indicator, O::Update) => 160_011,
      (E::Indicator, O::Delete) => 160_012,
      (E::Achievement, O::Search) => 160_013,
      (E::Achievement, O::Create) => 160_014,
      (E::Achievement, O::Update) => 160_015,
      (E::Achievement, O::Delete) => 160_016,
    }
  }

  pub fn pair(self) -> (EntityType, Operation) { (self.entity, self.operation) }

  /// Every code in table order.
  pub fn all() -> impl Iterator<Item = Self> {
    EntityType::iter()
      .flat_map(|e| Operation::iter().map(move |o| Self::required(e, o)))
  }

  pub fn description(self) -> String {
    let verb = match self.operation {
      Operation::Search => "Search and view",
      Operation::Create => "Create new",
      Operation::Update => "Update existing",
      Operation::Delete => "Delete",
    };
    let noun = match self.entity {
      EntityType::Section => "sections in results framework",
      EntityType::Indicator => "indicators",
      EntityType::Achievement => "indicator achievements",
    };
    format!("{verb} {noun}")
  }
}

impl TryFrom<u32> for PermissionCode {
  type Error = Violation;

  fn try_from(raw: u32) -> Result<Self, Self::Error> {
    Self::new(raw).ok_or(Violation::UnknownPermissionCode(raw))
  }
}

impl From<PermissionCode> for u32 {
  fn from(code: PermissionCode) -> Self { code.get() }
}

impl PartialOrd for PermissionCode {
  fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for PermissionCode {
  fn cmp(&self, other: &Self) -> std::cmp::Ordering { self.get().cmp(&other.get()) }
}

impl fmt::Display for PermissionCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.get())
  }
}

// ─── Actors and grants ───────────────────────────────────────────────────────

/// The authenticated caller of a CRUD operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
  pub username: String,
  pub role:     String,
}

impl Actor {
  pub fn new(username: impl Into<String>, role: impl Into<String>) -> Self {
    Self { username: username.into(), role: role.into() }
  }

  /// The maintenance identity used by the bulk loader.
  pub fn system() -> Self { Self::new(SYSTEM_ACTOR, SYSTEM_ACTOR) }
}

/// One `(role, code)` row of the grant table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grant {
  pub role_name: String,
  pub code:      PermissionCode,
}

/// An immutable view of the grant table.
#[derive(Debug, Clone, Default)]
pub struct GrantSnapshot {
  by_role: HashMap<String, HashSet<PermissionCode>>,
}

impl GrantSnapshot {
  pub fn is_granted(&self, role: &str, code: PermissionCode) -> bool {
    self.by_role.get(role).is_some_and(|codes| codes.contains(&code))
  }

  pub fn codes(&self, role: &str) -> Vec<PermissionCode> {
    let mut codes: Vec<_> = self
      .by_role
      .get(role)
      .map(|c| c.iter().copied().collect())
      .unwrap_or_default();
    codes.sort();
    codes
  }

  /// Total `(role, code)` pairs.
  pub fn len(&self) -> usize { self.by_role.values().map(HashSet::len).sum() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl FromIterator<Grant> for GrantSnapshot {
  fn from_iter<I: IntoIterator<Item = Grant>>(iter: I) -> Self {
    let mut by_role: HashMap<String, HashSet<PermissionCode>> = HashMap::new();
    for g in iter {
      by_role.entry(g.role_name).or_default().insert(g.code);
    }
    Self { by_role }
  }
}

/// Process-wide, read-only grant lookup with an explicit reload hook.
///
/// Cloning is cheap and every clone observes reloads. A reload builds the
/// new snapshot completely before swapping it in.
#[derive(Debug, Clone, Default)]
pub struct GrantTable {
  current: Arc<RwLock<Arc<GrantSnapshot>>>,
}

impl GrantTable {
  pub fn new(snapshot: GrantSnapshot) -> Self {
    Self { current: Arc::new(RwLock::new(Arc::new(snapshot))) }
  }

  /// Build a table from the grants currently held by `store`.
  pub async fn load<S: FrameworkStore>(store: &S) -> Result<Self> {
    let table = Self::default();
    table.reload(store).await?;
    Ok(table)
  }

  /// Re-read the grant rows from `store` and swap them in.
  pub async fn reload<S: FrameworkStore>(&self, store: &S) -> Result<()> {
    let grants = store.list_grants().await.map_err(Error::backend)?;
    let count = grants.len();
    self.replace(grants.into_iter().collect());
    tracing::info!(grants = count, "permission grants loaded");
    Ok(())
  }

  pub fn replace(&self, snapshot: GrantSnapshot) {
    let mut guard = match self.current.write() {
      Ok(g) => g,
      Err(poisoned) => poisoned.into_inner(),
    };
    *guard = Arc::new(snapshot);
  }

  pub fn snapshot(&self) -> Arc<GrantSnapshot> {
    match self.current.read() {
      Ok(g) => Arc::clone(&*g),
      Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
    }
  }

  /// Check that `actor`'s role holds the code for `operation` on `entity`.
  pub fn authorize(
    &self,
    actor: &Actor,
    entity: EntityType,
    operation: Operation,
  ) -> Result<PermissionCode> {
    let code = PermissionCode::required(entity, operation);
    if !self.snapshot().is_granted(&actor.role, code) {
      tracing::debug!(
        user = %actor.username,
        role = %actor.role,
        %code,
        "permission denied"
      );
      return Err(Error::PermissionDenied { role: actor.role.clone(), code });
    }
    Ok(code)
  }
}
