//! SQL schema for the results-framework SQLite store.
//!
//! Applied at connection startup. `PRAGMA user_version` records the schema
//! revision so later migrations can be gated on it.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Rows are never removed. A soft delete sets is_deleted and bumps version.
CREATE TABLE IF NOT EXISTS sections (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid        TEXT NOT NULL UNIQUE,
    seed_key    INTEGER,                -- natural key declared by a dataset
    name        TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    created_by  TEXT NOT NULL,
    updated_by  TEXT NOT NULL,
    is_deleted  INTEGER NOT NULL DEFAULT 0,
    version     INTEGER NOT NULL DEFAULT 1 CHECK (version >= 1)
);

CREATE TABLE IF NOT EXISTS indicators (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid        TEXT NOT NULL UNIQUE,
    seed_key    INTEGER,
    section_id  INTEGER NOT NULL REFERENCES sections(id),
    name        TEXT NOT NULL,
    pbc         TEXT,
    value_kind  TEXT NOT NULL,          -- copy of the "kind" tag in baseline/target
    baseline    TEXT NOT NULL,          -- JSON-encoded Value
    target      TEXT NOT NULL,          -- JSON-encoded Value
    observation TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    created_by  TEXT NOT NULL,
    updated_by  TEXT NOT NULL,
    is_deleted  INTEGER NOT NULL DEFAULT 0,
    version     INTEGER NOT NULL DEFAULT 1 CHECK (version >= 1),
    CHECK (value_kind = json_extract(baseline, '$.kind')
       AND value_kind = json_extract(target, '$.kind'))
);

CREATE TABLE IF NOT EXISTS achievements (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid         TEXT NOT NULL UNIQUE,
    seed_key     INTEGER,
    indicator_id INTEGER NOT NULL REFERENCES indicators(id),
    value_kind   TEXT NOT NULL,         -- copy of the "kind" tag in value
    value        TEXT NOT NULL,         -- JSON-encoded Value
    reported_on  TEXT NOT NULL,         -- YYYY-MM-DD
    reported_by  TEXT NOT NULL,
    comment      TEXT,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    created_by   TEXT NOT NULL,
    updated_by   TEXT NOT NULL,
    is_deleted   INTEGER NOT NULL DEFAULT 0,
    version      INTEGER NOT NULL DEFAULT 1 CHECK (version >= 1),
    CHECK (value_kind = json_extract(value, '$.kind'))
);

CREATE TABLE IF NOT EXISTS roles (
    name        TEXT PRIMARY KEY,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS grants (
    role_name       TEXT NOT NULL REFERENCES roles(name),
    permission_code INTEGER NOT NULL CHECK (permission_code BETWEEN 160005 AND 160016),
    granted_at      TEXT NOT NULL,
    granted_by      TEXT NOT NULL,
    PRIMARY KEY (role_name, permission_code)
);

-- At most one live row per declared natural key.
CREATE UNIQUE INDEX IF NOT EXISTS sections_seed_live_idx
    ON sections(seed_key) WHERE seed_key IS NOT NULL AND is_deleted = 0;
CREATE UNIQUE INDEX IF NOT EXISTS indicators_seed_live_idx
    ON indicators(seed_key) WHERE seed_key IS NOT NULL AND is_deleted = 0;
CREATE UNIQUE INDEX IF NOT EXISTS achievements_seed_live_idx
    ON achievements(seed_key) WHERE seed_key IS NOT NULL AND is_deleted = 0;

CREATE INDEX IF NOT EXISTS indicators_section_idx    ON indicators(section_id);
CREATE INDEX IF NOT EXISTS achievements_indicator_idx ON achievements(indicator_id);
CREATE INDEX IF NOT EXISTS achievements_reported_idx ON achievements(reported_on);

PRAGMA user_version = 1;
"#;
