//! Archive schema definitions and creation

use crate::error::ArchiveResult;
use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: u32 = 1;

/// One row per parcel; the JSON body is the full record
const CREATE_PARCELS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS parcels (
    parcel_key TEXT PRIMARY KEY,
    status TEXT NOT NULL,          -- registered, active, finished, finalised, failed
    outcome TEXT,                  -- success, failure, or NULL while in flight
    supporting_function TEXT NOT NULL,
    body TEXT NOT NULL,
    archived_at TEXT NOT NULL      -- RFC 3339
)
"#;

const CREATE_ARCHIVE_INFO_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS archive_info (
    key TEXT PRIMARY KEY,
    value TEXT
)
"#;

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_parcels_status ON parcels(status)",
    "CREATE INDEX IF NOT EXISTS idx_parcels_function ON parcels(supporting_function)",
];

/// Durability over speed: every archive write is a critical write
const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = FULL;
"#;

/// Create and configure the archive database
pub fn create_archive(conn: &Connection) -> ArchiveResult<()> {
    conn.execute_batch(PRAGMAS)?;

    conn.execute(CREATE_PARCELS_TABLE, [])?;
    conn.execute(CREATE_ARCHIVE_INFO_TABLE, [])?;
    for sql in CREATE_INDEXES {
        conn.execute(sql, [])?;
    }

    conn.execute(
        "INSERT OR REPLACE INTO archive_info (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}
