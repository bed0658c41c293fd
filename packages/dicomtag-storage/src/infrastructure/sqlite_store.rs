//! SQLite Store
//!
//! File-based persistent storage for every port: catalog, error log, index
//! partitions, instances and reindex jobs. One connection behind a mutex;
//! each port call is a single statement or a single transaction.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use dicomtag_core::{
    AttributeSet, EntityKey, IndexDataType, IndexValue, InstanceIdentifier, InstanceRecord,
    QueryTagStatus, TagCatalogEntry, TagDefinition, ValidationErrorCode,
};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{
    EntityStore, ExtendedQueryTagStore, IndexStore, ReindexJob, ReindexJobStatus,
    ReindexJobStore, TagError, TagErrorStore, TagFilter,
};
use crate::error::{Result, StorageError};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS extended_query_tags (
    tag_key INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL,
    vr TEXT NOT NULL,
    private_creator TEXT NOT NULL DEFAULT '',
    level TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Rows being deleted no longer hold their path
CREATE UNIQUE INDEX IF NOT EXISTS idx_tags_live_path
    ON extended_query_tags(path, private_creator)
    WHERE status <> 'deleting';

CREATE TABLE IF NOT EXISTS extended_query_tag_errors (
    tag_key INTEGER NOT NULL,
    watermark INTEGER NOT NULL,
    error_code INTEGER NOT NULL,
    created_time INTEGER NOT NULL,
    PRIMARY KEY (tag_key, watermark)
);

CREATE INDEX IF NOT EXISTS idx_tag_errors_created
    ON extended_query_tag_errors(tag_key, created_time);

CREATE TABLE IF NOT EXISTS reindex_jobs (
    operation_id TEXT PRIMARY KEY,
    tag_keys TEXT NOT NULL,
    end_watermark INTEGER,
    end_watermark_resolved INTEGER NOT NULL,
    next_watermark INTEGER NOT NULL,
    status TEXT NOT NULL,
    attempt INTEGER NOT NULL,
    error TEXT,
    resumed_from TEXT,
    not_before TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS instances (
    watermark INTEGER PRIMARY KEY,
    study_instance_uid TEXT NOT NULL,
    series_instance_uid TEXT NOT NULL,
    sop_instance_uid TEXT NOT NULL,
    attributes TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS index_string (
    tag_key INTEGER NOT NULL,
    entity_key TEXT NOT NULL,
    watermark INTEGER NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (tag_key, entity_key)
);

CREATE TABLE IF NOT EXISTS index_long (
    tag_key INTEGER NOT NULL,
    entity_key TEXT NOT NULL,
    watermark INTEGER NOT NULL,
    value INTEGER NOT NULL,
    PRIMARY KEY (tag_key, entity_key)
);

CREATE TABLE IF NOT EXISTS index_double (
    tag_key INTEGER NOT NULL,
    entity_key TEXT NOT NULL,
    watermark INTEGER NOT NULL,
    value REAL NOT NULL,
    PRIMARY KEY (tag_key, entity_key)
);

CREATE TABLE IF NOT EXISTS index_datetime (
    tag_key INTEGER NOT NULL,
    entity_key TEXT NOT NULL,
    watermark INTEGER NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (tag_key, entity_key)
);

CREATE TABLE IF NOT EXISTS index_person_name (
    tag_key INTEGER NOT NULL,
    entity_key TEXT NOT NULL,
    watermark INTEGER NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (tag_key, entity_key)
);
";

const INDEX_TABLES: &[&str] = &[
    "index_string",
    "index_long",
    "index_double",
    "index_datetime",
    "index_person_name",
];

fn index_table(data_type: IndexDataType) -> &'static str {
    match data_type {
        IndexDataType::String => "index_string",
        IndexDataType::Long => "index_long",
        IndexDataType::Double => "index_double",
        IndexDataType::DateTime => "index_datetime",
        IndexDataType::PersonName => "index_person_name",
    }
}

fn conversion_error(idx: usize, message: impl Into<String>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        Box::new(StorageError::serialization(message)),
    )
}

fn parse_column<T: FromStr<Err = String>>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    raw.parse().map_err(|e: String| conversion_error(idx, e))
}

fn parse_uuid(idx: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| conversion_error(idx, e.to_string()))
}

const ENTRY_COLUMNS: &str = "tag_key, path, vr, private_creator, level, status";

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TagCatalogEntry> {
    let creator: String = row.get(3)?;
    Ok(TagCatalogEntry {
        key: row.get(0)?,
        path: row.get(1)?,
        vr: parse_column(2, &row.get::<_, String>(2)?)?,
        private_creator: (!creator.is_empty()).then_some(creator),
        level: parse_column(4, &row.get::<_, String>(4)?)?,
        status: parse_column(5, &row.get::<_, String>(5)?)?,
    })
}

const JOB_COLUMNS: &str = "operation_id, tag_keys, end_watermark, end_watermark_resolved, \
     next_watermark, status, attempt, error, resumed_from, not_before, created_at, updated_at";

fn job_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReindexJob> {
    let tag_keys: String = row.get(1)?;
    let resumed_from: Option<String> = row.get(8)?;
    Ok(ReindexJob {
        operation_id: parse_uuid(0, &row.get::<_, String>(0)?)?,
        tag_keys: serde_json::from_str(&tag_keys).map_err(|e| conversion_error(1, e.to_string()))?,
        end_watermark: row.get(2)?,
        end_watermark_resolved: row.get(3)?,
        next_watermark: row.get(4)?,
        status: parse_column(5, &row.get::<_, String>(5)?)?,
        attempt: row.get(6)?,
        error: row.get(7)?,
        resumed_from: resumed_from.map(|raw| parse_uuid(8, &raw)).transpose()?,
        not_before: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn error_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TagError> {
    let code: i32 = row.get(2)?;
    let micros: i64 = row.get(3)?;
    Ok(TagError {
        tag_key: row.get(0)?,
        watermark: row.get(1)?,
        error_code: ValidationErrorCode::from_code(code)
            .ok_or_else(|| conversion_error(2, format!("Unknown error code {}", code)))?,
        created_time: DateTime::<Utc>::from_timestamp_micros(micros)
            .ok_or_else(|| conversion_error(3, format!("Invalid timestamp {}", micros)))?,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

/// SQLite-backed implementation of all storage ports
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        // Other worker processes may hold the write lock briefly
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory SQLite store (for testing)
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Host-side ingestion of an instance
    pub fn insert_instance(&self, record: &InstanceRecord) -> Result<()> {
        let attributes = serde_json::to_string(&record.attributes)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO instances
                (watermark, study_instance_uid, series_instance_uid, sop_instance_uid, attributes)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.watermark,
                &record.identifier.study_instance_uid,
                &record.identifier.series_instance_uid,
                &record.identifier.sop_instance_uid,
                attributes
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl ExtendedQueryTagStore for SqliteStore {
    async fn add_tags(&self, definitions: &[TagDefinition], max_allowed: usize) -> Result<Vec<i32>> {
        let mut conn = self.conn.lock();
        // IMMEDIATE takes the write lock up front so the count and uniqueness
        // checks cannot interleave with another writer
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: i64 =
            tx.query_row("SELECT COUNT(*) FROM extended_query_tags", [], |row| row.get(0))?;
        let total = existing as usize + definitions.len();
        if total > max_allowed {
            return Err(StorageError::tag_count_exceeded(max_allowed, total));
        }

        let mut keys = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let creator = definition.private_creator.as_deref().unwrap_or("");
            let inserted = tx.execute(
                "INSERT INTO extended_query_tags (path, vr, private_creator, level, status)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    &definition.path,
                    definition.vr.as_str(),
                    creator,
                    definition.level.as_str(),
                    QueryTagStatus::Adding.as_str()
                ],
            );
            match inserted {
                Ok(_) => keys.push(tx.last_insert_rowid() as i32),
                Err(err) if is_constraint_violation(&err) => {
                    return Err(StorageError::duplicate_tag(&definition.path).with_source(err));
                }
                Err(err) => return Err(err.into()),
            }
        }

        tx.commit()?;
        debug!(count = keys.len(), "Inserted catalog entries");
        Ok(keys)
    }

    async fn get_tags(&self, filter: &TagFilter) -> Result<Vec<TagCatalogEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM extended_query_tags
             WHERE (?1 IS NULL OR level = ?1) AND (?2 IS NULL OR status = ?2)
             ORDER BY tag_key
             LIMIT ?3 OFFSET ?4",
            ENTRY_COLUMNS
        ))?;
        let limit = filter.limit.map_or(-1, |limit| limit as i64);
        let entries = stmt
            .query_map(
                params![
                    filter.level.map(|l| l.as_str()),
                    filter.status.map(|s| s.as_str()),
                    limit,
                    filter.offset as i64
                ],
                entry_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    async fn get_tag(&self, key: i32) -> Result<Option<TagCatalogEntry>> {
        let conn = self.conn.lock();
        let entry = conn
            .query_row(
                &format!("SELECT {} FROM extended_query_tags WHERE tag_key = ?1", ENTRY_COLUMNS),
                params![key],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    async fn compare_and_swap_status(
        &self,
        key: i32,
        expected: QueryTagStatus,
        next: QueryTagStatus,
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE extended_query_tags SET status = ?3 WHERE tag_key = ?1 AND status = ?2",
            params![key, expected.as_str(), next.as_str()],
        )?;
        Ok(updated == 1)
    }

    async fn remove_tag(&self, key: i32) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM extended_query_tags WHERE tag_key = ?1 AND status = ?2",
            params![key, QueryTagStatus::Deleting.as_str()],
        )?;
        Ok(deleted == 1)
    }
}

#[async_trait]
impl TagErrorStore for SqliteStore {
    async fn upsert_error(&self, error: &TagError) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO extended_query_tag_errors (tag_key, watermark, error_code, created_time)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (tag_key, watermark) DO UPDATE SET
                error_code = excluded.error_code,
                created_time = excluded.created_time",
            params![
                error.tag_key,
                error.watermark,
                error.error_code.code(),
                error.created_time.timestamp_micros()
            ],
        )?;
        Ok(())
    }

    async fn get_errors(&self, tag_key: i32) -> Result<Vec<TagError>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT tag_key, watermark, error_code, created_time
             FROM extended_query_tag_errors
             WHERE tag_key = ?1
             ORDER BY created_time, watermark",
        )?;
        let errors = stmt
            .query_map(params![tag_key], error_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(errors)
    }

    async fn delete_errors_for_tag(&self, tag_key: i32) -> Result<u64> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM extended_query_tag_errors WHERE tag_key = ?1",
            params![tag_key],
        )?;
        Ok(deleted as u64)
    }
}

#[async_trait]
impl IndexStore for SqliteStore {
    async fn upsert(
        &self,
        tag_key: i32,
        entity_key: &EntityKey,
        watermark: i64,
        value: &IndexValue,
    ) -> Result<()> {
        let table = index_table(value.data_type());
        let sql = format!(
            "INSERT INTO {table} (tag_key, entity_key, watermark, value)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (tag_key, entity_key) DO UPDATE SET
                watermark = excluded.watermark,
                value = excluded.value
             WHERE excluded.watermark >= {table}.watermark"
        );

        let conn = self.conn.lock();
        let key = entity_key.as_str();
        match value {
            IndexValue::String(v) | IndexValue::PersonName(v) => {
                conn.execute(&sql, params![tag_key, key, watermark, v])?
            }
            IndexValue::Long(v) => conn.execute(&sql, params![tag_key, key, watermark, v])?,
            IndexValue::Double(v) => conn.execute(&sql, params![tag_key, key, watermark, v])?,
            IndexValue::DateTime(v) => conn.execute(&sql, params![tag_key, key, watermark, v])?,
        };
        Ok(())
    }

    async fn get_value(
        &self,
        tag_key: i32,
        data_type: IndexDataType,
        entity_key: &EntityKey,
    ) -> Result<Option<IndexValue>> {
        let sql = format!(
            "SELECT value FROM {} WHERE tag_key = ?1 AND entity_key = ?2",
            index_table(data_type)
        );
        let conn = self.conn.lock();
        let key = entity_key.as_str();
        let value = match data_type {
            IndexDataType::String => conn
                .query_row(&sql, params![tag_key, key], |row| row.get::<_, String>(0))
                .optional()?
                .map(IndexValue::String),
            IndexDataType::PersonName => conn
                .query_row(&sql, params![tag_key, key], |row| row.get::<_, String>(0))
                .optional()?
                .map(IndexValue::PersonName),
            IndexDataType::Long => conn
                .query_row(&sql, params![tag_key, key], |row| row.get::<_, i64>(0))
                .optional()?
                .map(IndexValue::Long),
            IndexDataType::Double => conn
                .query_row(&sql, params![tag_key, key], |row| row.get::<_, f64>(0))
                .optional()?
                .map(IndexValue::Double),
            IndexDataType::DateTime => conn
                .query_row(&sql, params![tag_key, key], |row| row.get::<_, NaiveDateTime>(0))
                .optional()?
                .map(IndexValue::DateTime),
        };
        Ok(value)
    }

    async fn count_rows(&self, tag_key: i32) -> Result<u64> {
        let conn = self.conn.lock();
        let mut total = 0u64;
        for table in INDEX_TABLES {
            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE tag_key = ?1", table),
                params![tag_key],
                |row| row.get(0),
            )?;
            total += count as u64;
        }
        Ok(total)
    }

    async fn delete_rows_for_tag(&self, tag_key: i32) -> Result<u64> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut deleted = 0u64;
        for table in INDEX_TABLES {
            deleted += tx.execute(
                &format!("DELETE FROM {} WHERE tag_key = ?1", table),
                params![tag_key],
            )? as u64;
        }
        tx.commit()?;
        Ok(deleted)
    }
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn max_watermark(&self) -> Result<Option<i64>> {
        let conn = self.conn.lock();
        let max = conn.query_row("SELECT MAX(watermark) FROM instances", [], |row| {
            row.get::<_, Option<i64>>(0)
        })?;
        Ok(max)
    }

    async fn enumerate_watermarks(&self, start: i64, end: i64) -> Result<Vec<i64>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT watermark FROM instances
             WHERE watermark BETWEEN ?1 AND ?2
             ORDER BY watermark",
        )?;
        let watermarks = stmt
            .query_map(params![start, end], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(watermarks)
    }

    async fn get_instance(&self, watermark: i64) -> Result<Option<InstanceRecord>> {
        let row = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT study_instance_uid, series_instance_uid, sop_instance_uid, attributes
                 FROM instances WHERE watermark = ?1",
                params![watermark],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?
        };

        let Some((study, series, sop, attributes)) = row else {
            return Ok(None);
        };
        let attributes: AttributeSet = serde_json::from_str(&attributes)?;
        Ok(Some(InstanceRecord {
            watermark,
            identifier: InstanceIdentifier::new(study, series, sop),
            attributes,
        }))
    }
}

#[async_trait]
impl ReindexJobStore for SqliteStore {
    async fn save_job(&self, job: &ReindexJob) -> Result<()> {
        let tag_keys = serde_json::to_string(&job.tag_keys)?;
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO reindex_jobs ({})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                JOB_COLUMNS
            ),
            params![
                job.operation_id.to_string(),
                tag_keys,
                job.end_watermark,
                job.end_watermark_resolved,
                job.next_watermark,
                job.status.as_str(),
                job.attempt,
                &job.error,
                job.resumed_from.map(|id| id.to_string()),
                job.not_before,
                job.created_at,
                job.updated_at
            ],
        )?;
        Ok(())
    }

    async fn get_job(&self, operation_id: Uuid) -> Result<Option<ReindexJob>> {
        let conn = self.conn.lock();
        let job = conn
            .query_row(
                &format!("SELECT {} FROM reindex_jobs WHERE operation_id = ?1", JOB_COLUMNS),
                params![operation_id.to_string()],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    async fn list_jobs(&self) -> Result<Vec<ReindexJob>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM reindex_jobs ORDER BY created_at, operation_id",
            JOB_COLUMNS
        ))?;
        let jobs = stmt
            .query_map([], job_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }
}
