//! SQL DDL for the event queue.
//!
//! `AUTOINCREMENT` keeps row ids strictly increasing across deletes, so a
//! watermark never matches a newer record.

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Queue table name.
pub const EVENTS_TABLE: &str = "events";

pub(crate) const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS events (
    _id INTEGER PRIMARY KEY AUTOINCREMENT,
    data TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS time_idx ON events(created_at);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
";

pub(crate) const PRAGMAS: &str = r"
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
";
