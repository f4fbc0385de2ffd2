//! Storage module for persisting crawl output
//!
//! This module handles all database operations for the scraper, including:
//! - SQLite database initialization and schema management
//! - Run status and collected-document counters
//! - Content-hash deduplicated documents and their field values
//! - The link table and per-run statistics written at the end of a run

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{
    CrawlRecordStore, DocumentStore, FieldValueSource, RunStatusStore, StorageError,
    StorageResult,
};

use crate::state::RunState;
use std::path::Path;

/// Opens (or creates) the storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// A crawl run as stored in the database
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub config_hash: String,
    pub state: RunState,
}

/// A field value about to be written for a new document
#[derive(Debug, Clone)]
pub struct NewFieldValue<'a> {
    pub document_id: i64,
    pub run_id: i64,
    pub field_name: &'a str,
    pub variable_name: Option<&'a str>,
    pub url: &'a str,
    pub link_path: &'a str,
    pub attribute: &'a str,
    pub value: &'a str,
}

/// A persisted field value
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValueRecord {
    pub id: i64,
    pub document_id: i64,
    pub run_id: i64,
    pub field_name: String,
    pub variable_name: Option<String>,
    pub url: String,
    pub link_path: String,
    pub attribute: String,
    pub value: String,
}
