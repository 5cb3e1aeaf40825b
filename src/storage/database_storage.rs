use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use log::{debug, error, info};
use sqlx::Row;

use crate::error_handling::types::{SessionError, StorageError};
use crate::storage::connection::DatabaseConnection;
use crate::storage::storage_trait::StorageHandler;
use crate::storage::types::{SessionRecord, TableSchema};

// SQL for one table mapping, rendered once at construction
#[derive(Debug, Clone)]
struct Queries {
    select_data: String,
    select_record: String,
    update: String,
    insert: String,
    delete: String,
    delete_expired: String,
    count: String,
}

impl Queries {
    fn render(schema: &TableSchema) -> Self {
        let t = &schema.table;
        let c = &schema.columns;
        Self {
            select_data: format!("SELECT {} FROM {} WHERE {} = ?1", c.data, t, c.session_id),
            select_record: format!(
                "SELECT {}, {}, {}, {} FROM {} WHERE {} = ?1",
                c.session_id, c.created, c.last_impression, c.data, t, c.session_id
            ),
            update: format!(
                "UPDATE {} SET {} = ?1, {} = ?2 WHERE {} = ?3",
                t, c.last_impression, c.data, c.session_id
            ),
            // a concurrent insert for the same id turns into an update instead of a
            // duplicate-key failure; `created` keeps its first value
            insert: format!(
                "INSERT INTO {t} ({id}, {cr}, {li}, {d}) VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT({id}) DO UPDATE SET {li} = excluded.{li}, {d} = excluded.{d}",
                t = t,
                id = c.session_id,
                cr = c.created,
                li = c.last_impression,
                d = c.data
            ),
            delete: format!("DELETE FROM {} WHERE {} = ?1", t, c.session_id),
            delete_expired: format!("DELETE FROM {} WHERE {} < ?1", t, c.last_impression),
            count: format!("SELECT COUNT(*) FROM {}", t),
        }
    }
}

/// Session handler keeping one row per session in a relational table.
///
/// Payloads are stored base64-encoded so that arbitrary bytes survive a TEXT column.
/// The connection is shared: several handlers built on the same `DatabaseConnection`
/// observe the same rows.
///
/// Example table (default mapping):
///
/// ```sql
/// CREATE TABLE sessions (
///     session_id VARCHAR(128) PRIMARY KEY,
///     created INTEGER,
///     last_impression INTEGER,
///     data TEXT
/// )
/// ```
pub struct DatabaseStorage {
    conn: Arc<DatabaseConnection>,
    schema: TableSchema,
    queries: Queries,
}

impl DatabaseStorage {
    /// Handler over the default `sessions` table and column names.
    pub fn new(conn: Arc<DatabaseConnection>) -> Self {
        let schema = TableSchema::default();
        let queries = Queries::render(&schema);
        Self {
            conn,
            schema,
            queries,
        }
    }

    /// Handler over a custom table mapping. Fails if the table name is unusable.
    pub fn with_schema(
        conn: Arc<DatabaseConnection>,
        schema: TableSchema,
    ) -> Result<Self, SessionError> {
        schema.validate()?;
        let queries = Queries::render(&schema);
        debug!("DatabaseStorage bound to table {}", schema.table);
        Ok(Self {
            conn,
            schema,
            queries,
        })
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Deletes expired rows and reports how many went away.
    pub fn purge_expired(&self, max_age: i64) -> Result<u64, StorageError> {
        let cutoff = Utc::now().timestamp().saturating_sub(max_age);
        let removed = self.conn.block_on(async {
            sqlx::query(&self.queries.delete_expired)
                .bind(cutoff)
                .execute(self.conn.pool())
                .await
                .map_err(|e| {
                    error!("Failed to delete expired sessions from {}: {}", self.schema.table, e);
                    StorageError::GcFailed
                })
        })?;
        info!(
            "Removed {} expired session(s) from {} (cutoff: {})",
            removed.rows_affected(),
            self.schema.table,
            cutoff
        );
        Ok(removed.rows_affected())
    }

    /// Full row for `id`, payload decoded.
    pub fn fetch_record(&self, id: &str) -> Result<Option<SessionRecord>, StorageError> {
        self.conn.block_on(async {
            let row = sqlx::query(&self.queries.select_record)
                .bind(id)
                .fetch_optional(self.conn.pool())
                .await
                .map_err(|e| {
                    error!("Failed to read session {} from {}: {}", id, self.schema.table, e);
                    StorageError::ReadFailed
                })?;
            let Some(row) = row else {
                return Ok(None);
            };
            let read_i64 = |idx: usize| -> Result<i64, StorageError> {
                row.try_get::<Option<i64>, _>(idx)
                    .map(|v| v.unwrap_or(0))
                    .map_err(|e| {
                        error!("Unexpected column type in {}: {}", self.schema.table, e);
                        StorageError::ReadFailed
                    })
            };
            let stored_id: String = row.try_get(0).map_err(|e| {
                error!("Unexpected column type in {}: {}", self.schema.table, e);
                StorageError::ReadFailed
            })?;
            let created = read_i64(1)?;
            let last_impression = read_i64(2)?;
            let encoded: Option<String> = row.try_get(3).map_err(|e| {
                error!("Unexpected column type in {}: {}", self.schema.table, e);
                StorageError::ReadFailed
            })?;
            Ok(Some(SessionRecord {
                id: stored_id,
                created,
                last_impression,
                data: decode_payload(encoded.as_deref())?,
            }))
        })
    }

    /// Number of rows currently in the table.
    pub fn count(&self) -> Result<i64, StorageError> {
        self.conn.block_on(async {
            sqlx::query_scalar::<_, i64>(&self.queries.count)
                .fetch_one(self.conn.pool())
                .await
                .map_err(|e| {
                    error!("Failed to count sessions in {}: {}", self.schema.table, e);
                    StorageError::ReadFailed
                })
        })
    }
}

fn decode_payload(encoded: Option<&str>) -> Result<Vec<u8>, StorageError> {
    match encoded {
        None | Some("") => Ok(Vec::new()),
        Some(text) => BASE64.decode(text).map_err(|e| {
            error!("Stored session payload is not valid base64: {}", e);
            StorageError::ReadFailed
        }),
    }
}

impl StorageHandler for DatabaseStorage {
    fn open(&self, _save_path: &str, _name: &str) -> Result<bool, StorageError> {
        Ok(true)
    }

    fn close(&self) -> Result<bool, StorageError> {
        Ok(true)
    }

    fn read(&self, id: &str) -> Result<Vec<u8>, StorageError> {
        self.conn.block_on(async {
            let row = sqlx::query(&self.queries.select_data)
                .bind(id)
                .fetch_optional(self.conn.pool())
                .await
                .map_err(|e| {
                    error!("Failed to read session {} from {}: {}", id, self.schema.table, e);
                    StorageError::ReadFailed
                })?;
            match row {
                Some(row) => {
                    let encoded: Option<String> = row.try_get(0).map_err(|e| {
                        error!("Unexpected data column type in {}: {}", self.schema.table, e);
                        StorageError::ReadFailed
                    })?;
                    decode_payload(encoded.as_deref())
                }
                None => {
                    debug!("No stored data for session {}", id);
                    Ok(Vec::new())
                }
            }
        })
    }

    fn write(&self, id: &str, data: &[u8]) -> Result<bool, StorageError> {
        let encoded = BASE64.encode(data);
        let now = Utc::now().timestamp();
        self.conn.block_on(async {
            let existing = sqlx::query(&self.queries.select_data)
                .bind(id)
                .fetch_optional(self.conn.pool())
                .await
                .map_err(|e| {
                    error!("Failed to probe session {} in {}: {}", id, self.schema.table, e);
                    StorageError::WriteFailed
                })?;
            let result = if existing.is_some() {
                sqlx::query(&self.queries.update)
                    .bind(now)
                    .bind(&encoded)
                    .bind(id)
                    .execute(self.conn.pool())
                    .await
            } else {
                sqlx::query(&self.queries.insert)
                    .bind(id)
                    .bind(now)
                    .bind(now)
                    .bind(&encoded)
                    .execute(self.conn.pool())
                    .await
            };
            result.map_err(|e| {
                error!("Failed to write session {} to {}: {}", id, self.schema.table, e);
                StorageError::WriteFailed
            })?;
            debug!("Wrote {} byte(s) for session {}", data.len(), id);
            Ok(true)
        })
    }

    fn destroy(&self, id: &str) -> Result<bool, StorageError> {
        self.conn.block_on(async {
            sqlx::query(&self.queries.delete)
                .bind(id)
                .execute(self.conn.pool())
                .await
                .map_err(|e| {
                    error!("Failed to destroy session {} in {}: {}", id, self.schema.table, e);
                    StorageError::DestroyFailed
                })?;
            debug!("Destroyed session {}", id);
            Ok(true)
        })
    }

    fn gc(&self, max_age: i64) -> Result<bool, StorageError> {
        self.purge_expired(max_age).map(|_| true)
    }
}
