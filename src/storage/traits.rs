//! Storage traits and error types
//!
//! The crawl engine and the search service only see these traits; the
//! SQLite backend implements all of them on one connection.

use crate::crawler::stats::CrawlStatistics;
use crate::state::{Link, RunState, RunStatus};
use crate::storage::{FieldValueRecord, NewFieldValue, RunRecord};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl StorageError {
    /// Returns true for UNIQUE/constraint failures
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Documents and their field values
pub trait DocumentStore: Send + Sync {
    /// Creates a document for a content hash together with its field values
    ///
    /// The document row and every value are written in one transaction,
    /// so a failure leaves neither behind. The `document_id` of each value
    /// is ignored and replaced by the new document's ID.
    ///
    /// # Returns
    ///
    /// * `Ok(id)` - The new document ID
    /// * `Err(StorageError::ConstraintViolation)` - A document with this
    ///   hash already exists (a concurrent worker won the race)
    fn create_document_with_values(
        &self,
        content_hash: &str,
        run_id: i64,
        values: &[NewFieldValue<'_>],
    ) -> StorageResult<i64>;

    /// Looks up a document by its content hash
    fn find_document_by_hash(&self, content_hash: &str) -> StorageResult<Option<i64>>;

    /// Inserts a field value, or refreshes the one already stored for the
    /// same (field, run, url, document)
    fn upsert_field_value(&self, value: &NewFieldValue<'_>) -> StorageResult<i64>;

    fn count_documents(&self) -> StorageResult<u64>;
}

/// Run lifecycle and the shared stop signal
pub trait RunStatusStore: Send + Sync {
    /// Creates a run in status `New`
    fn create_run(&self, config_hash: &str) -> StorageResult<i64>;

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run, if any
    fn latest_run(&self) -> StorageResult<Option<RunRecord>>;

    fn get_status(&self, run_id: i64) -> StorageResult<RunStatus>;

    fn set_status(&self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Adds to the collected-document counter and returns the new total
    fn add_collected(&self, run_id: i64, count: u64) -> StorageResult<u64>;

    /// Stores the final status and the completion timestamp
    fn finish_run(&self, run_id: i64, status: RunStatus) -> StorageResult<RunState>;
}

/// Link table and statistics written at the end of a run
pub trait CrawlRecordStore: Send + Sync {
    fn save_links(&self, run_id: i64, links: &[Link]) -> StorageResult<()>;

    fn save_statistics(&self, run_id: i64, stats: &CrawlStatistics) -> StorageResult<()>;

    fn load_statistics(&self, run_id: i64) -> StorageResult<Option<CrawlStatistics>>;
}

/// Read access for the indexer
pub trait FieldValueSource: Send + Sync {
    /// Every live value of the named fields, in creation order
    fn field_values_for(&self, field_names: &[String]) -> StorageResult<Vec<FieldValueRecord>>;

    /// Every live value belonging to one document
    fn field_values_of_document(&self, document_id: i64) -> StorageResult<Vec<FieldValueRecord>>;

    /// Marks all values of a run as deleted; returns how many changed
    fn soft_delete_run_values(&self, run_id: i64) -> StorageResult<usize>;
}
