//! SQLite storage implementation
//!
//! One connection behind a mutex serves every worker. Each trait method
//! takes the lock for exactly one statement (or one short transaction), so
//! contention stays low next to page fetch latency.

use crate::crawler::stats::CrawlStatistics;
use crate::state::{Link, RunState, RunStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    CrawlRecordStore, DocumentStore, FieldValueSource, RunStatusStore, StorageError,
    StorageResult,
};
use crate::storage::{FieldValueRecord, NewFieldValue, RunRecord};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_optional_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => parse_timestamp(row, idx).map(Some),
        None => Ok(None),
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let status: String = row.get(4)?;
    let collected: i64 = row.get(5)?;
    Ok(RunRecord {
        id: row.get(0)?,
        config_hash: row.get(3)?,
        state: RunState {
            status: RunStatus::from_db_string(&status).unwrap_or(RunStatus::Exit),
            collected_documents: collected.max(0) as u64,
            created_at: parse_timestamp(row, 1)?,
            completed_at: parse_optional_timestamp(row, 2)?,
        },
    })
}

fn field_value_from_row(row: &Row<'_>) -> rusqlite::Result<FieldValueRecord> {
    Ok(FieldValueRecord {
        id: row.get(0)?,
        document_id: row.get(1)?,
        run_id: row.get(2)?,
        field_name: row.get(3)?,
        variable_name: row.get(4)?,
        url: row.get(5)?,
        link_path: row.get(6)?,
        attribute: row.get(7)?,
        value: row.get(8)?,
    })
}

const RUN_COLUMNS: &str =
    "SELECT id, created_at, completed_at, config_hash, status, collected_documents FROM runs";

const FIELD_VALUE_COLUMNS: &str = "SELECT id, document_id, run_id, field_name, variable_name, \
     url, link_path, attribute, value FROM field_values";

/// Maps UNIQUE failures to `ConstraintViolation`, everything else to `Sqlite`
fn classify(err: rusqlite::Error) -> StorageError {
    match &err {
        rusqlite::Error::SqliteFailure(e, msg) if e.code == ErrorCode::ConstraintViolation => {
            StorageError::ConstraintViolation(msg.clone().unwrap_or_else(|| e.to_string()))
        }
        _ => StorageError::Sqlite(err),
    }
}

/// Inserts or refreshes one field value on an open connection or transaction
fn upsert_value(conn: &Connection, value: &NewFieldValue<'_>) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO field_values
            (document_id, run_id, field_name, variable_name, url, link_path, attribute, value, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(field_name, run_id, url, document_id) DO UPDATE SET
            variable_name = excluded.variable_name,
            link_path = excluded.link_path,
            attribute = excluded.attribute,
            value = excluded.value,
            deleted = 0",
        params![
            value.document_id,
            value.run_id,
            value.field_name,
            value.variable_name,
            value.url,
            value.link_path,
            value.attribute,
            value.value,
            now()
        ],
    )?;

    conn.query_row(
        "SELECT id FROM field_values
         WHERE field_name = ?1 AND run_id = ?2 AND url = ?3 AND document_id = ?4",
        params![value.field_name, value.run_id, value.url, value.document_id],
        |row| row.get(0),
    )
}

impl DocumentStore for SqliteStorage {
    fn create_document_with_values(
        &self,
        content_hash: &str,
        run_id: i64,
        values: &[NewFieldValue<'_>],
    ) -> StorageResult<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO documents (content_hash, run_id, created_at) VALUES (?1, ?2, ?3)",
            params![content_hash, run_id, now()],
        )
        .map_err(classify)?;
        let document_id = tx.last_insert_rowid();

        for value in values {
            upsert_value(
                &tx,
                &NewFieldValue {
                    document_id,
                    ..value.clone()
                },
            )?;
        }

        tx.commit()?;
        Ok(document_id)
    }

    fn find_document_by_hash(&self, content_hash: &str) -> StorageResult<Option<i64>> {
        let id = self
            .conn()
            .query_row(
                "SELECT id FROM documents WHERE content_hash = ?1",
                params![content_hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn upsert_field_value(&self, value: &NewFieldValue<'_>) -> StorageResult<i64> {
        upsert_value(&self.conn(), value).map_err(classify)
    }

    fn count_documents(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl RunStatusStore for SqliteStorage {
    fn create_run(&self, config_hash: &str) -> StorageResult<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO runs (created_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now(), config_hash, RunStatus::New.to_db_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn()
            .query_row(
                &format!("{} WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn()
            .query_row(
                &format!("{} ORDER BY id DESC LIMIT 1", RUN_COLUMNS),
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn get_status(&self, run_id: i64) -> StorageResult<RunStatus> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT status FROM runs WHERE id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;

        let raw = raw.ok_or(StorageError::RunNotFound(run_id))?;
        RunStatus::from_db_string(&raw)
            .ok_or_else(|| StorageError::Database(format!("unknown run status '{}'", raw)))
    }

    fn set_status(&self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let changed = self.conn().execute(
            "UPDATE runs SET status = ?1 WHERE id = ?2",
            params![status.to_db_string(), run_id],
        )?;
        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn add_collected(&self, run_id: i64, count: u64) -> StorageResult<u64> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE runs SET collected_documents = collected_documents + ?1 WHERE id = ?2",
            params![count as i64, run_id],
        )?;
        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }

        let total: i64 = conn.query_row(
            "SELECT collected_documents FROM runs WHERE id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(total as u64)
    }

    fn finish_run(&self, run_id: i64, status: RunStatus) -> StorageResult<RunState> {
        let changed = self.conn().execute(
            "UPDATE runs SET status = ?1, completed_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now(), run_id],
        )?;
        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(self.get_run(run_id)?.state)
    }
}

impl CrawlRecordStore for SqliteStorage {
    fn save_links(&self, run_id: i64, links: &[Link]) -> StorageResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO links (run_id, url, depth, visited) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(run_id, url) DO UPDATE SET depth = excluded.depth, visited = excluded.visited",
            )?;
            for link in links {
                stmt.execute(params![run_id, link.url, link.depth, link.visited])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn save_statistics(&self, run_id: i64, stats: &CrawlStatistics) -> StorageResult<()> {
        let json =
            serde_json::to_string(stats).map_err(|e| StorageError::Serialization(e.to_string()))?;

        self.conn().execute(
            "INSERT INTO run_statistics (run_id, statistics, recorded_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(run_id) DO UPDATE SET statistics = excluded.statistics, recorded_at = excluded.recorded_at",
            params![run_id, json, now()],
        )?;
        Ok(())
    }

    fn load_statistics(&self, run_id: i64) -> StorageResult<Option<CrawlStatistics>> {
        let json: Option<String> = self
            .conn()
            .query_row(
                "SELECT statistics FROM run_statistics WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|raw| {
            serde_json::from_str(&raw).map_err(|e| StorageError::Serialization(e.to_string()))
        })
        .transpose()
    }
}

impl FieldValueSource for SqliteStorage {
    fn field_values_for(&self, field_names: &[String]) -> StorageResult<Vec<FieldValueRecord>> {
        if field_names.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (1..=field_names.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "{} WHERE deleted = 0 AND field_name IN ({}) ORDER BY id",
            FIELD_VALUE_COLUMNS, placeholders
        );

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                rusqlite::params_from_iter(field_names.iter()),
                field_value_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn field_values_of_document(&self, document_id: i64) -> StorageResult<Vec<FieldValueRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE deleted = 0 AND document_id = ?1 ORDER BY id",
            FIELD_VALUE_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![document_id], field_value_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn soft_delete_run_values(&self, run_id: i64) -> StorageResult<usize> {
        let changed = self.conn().execute(
            "UPDATE field_values SET deleted = 1 WHERE run_id = ?1 AND deleted = 0",
            params![run_id],
        )?;
        Ok(changed)
    }
}
