//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the scrapedex database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    completed_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    collected_documents INTEGER NOT NULL DEFAULT 0
);

-- One row per extracted record, deduplicated by content
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_hash TEXT NOT NULL UNIQUE,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    created_at TEXT NOT NULL
);

-- Field values of each document
CREATE TABLE IF NOT EXISTS field_values (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL REFERENCES documents(id),
    run_id INTEGER NOT NULL REFERENCES runs(id),
    field_name TEXT NOT NULL,
    variable_name TEXT,
    url TEXT NOT NULL,
    link_path TEXT NOT NULL,
    attribute TEXT NOT NULL DEFAULT '',
    value TEXT NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE(field_name, run_id, url, document_id)
);

CREATE INDEX IF NOT EXISTS idx_field_values_field ON field_values(field_name);
CREATE INDEX IF NOT EXISTS idx_field_values_document ON field_values(document_id);

-- Link table snapshot written at the end of a run
CREATE TABLE IF NOT EXISTS links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    url TEXT NOT NULL,
    depth INTEGER NOT NULL,
    visited INTEGER NOT NULL,
    UNIQUE(run_id, url)
);

CREATE INDEX IF NOT EXISTS idx_links_run ON links(run_id);

-- Per-run statistics as JSON
CREATE TABLE IF NOT EXISTS run_statistics (
    run_id INTEGER PRIMARY KEY REFERENCES runs(id),
    statistics TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)
}
