use std::env;
use std::future::Future;
use std::path::Path;
use std::str::FromStr;

use log::{debug, error, info};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};

use crate::error_handling::types::StorageError;
use crate::storage::types::TableSchema;

/// Environment variable overriding the database location used by `DatabaseConnection::new`.
pub const DB_PATH_ENV: &str = "SESSIONSTORE_DB_PATH";

/// Live handle to the SQLite database backing the session table.
///
/// Handlers never create this themselves: the host opens one connection and hands an
/// `Arc<DatabaseConnection>` to every handler that should share it. Queries are async
/// (`sqlx`) but the handler contract is synchronous, so the connection carries its own
/// current-thread runtime and drives each query with `block_on`. It must therefore not be
/// used from inside another tokio runtime.
pub struct DatabaseConnection {
    pool: Pool<Sqlite>,
    rt: tokio::runtime::Runtime,
}

impl DatabaseConnection {
    /// Default database filename used in the application's working directory
    const DEFAULT_DB_FILE: &'static str = "sessions.sqlite3";

    /// Open the database named by `SESSIONSTORE_DB_PATH`, or the default file in the
    /// current working directory.
    pub fn new() -> Result<Self, StorageError> {
        if let Ok(path) = env::var(DB_PATH_ENV) {
            info!("Using session database from {}: {}", DB_PATH_ENV, path);
            return Self::new_file(path);
        }
        let cwd = env::current_dir().map_err(|e| {
            error!("Failed to get current dir: {}", e);
            StorageError::ConnectionFailed
        })?;
        Self::new_file(cwd.join(Self::DEFAULT_DB_FILE))
    }

    pub fn new_file<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    error!("Failed to create database dir {}: {}", parent.display(), e);
                    StorageError::ConnectionFailed
                })?;
            }
        }
        let opts = SqliteConnectOptions::new()
            .filename(path_ref)
            .create_if_missing(true);
        let conn = Self::connect(opts, SqlitePoolOptions::new().max_connections(5))?;
        info!("Session database opened at {}", path_ref.display());
        Ok(conn)
    }

    /// Private in-memory database.
    ///
    /// Every SQLite in-memory connection is its own database, so the pool is pinned to a
    /// single connection that is never recycled.
    pub fn in_memory() -> Result<Self, StorageError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            error!("Invalid in-memory connection string: {}", e);
            StorageError::ConnectionFailed
        })?;
        let pool_opts = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
        let conn = Self::connect(opts, pool_opts)?;
        debug!("In-memory session database opened");
        Ok(conn)
    }

    fn connect(
        opts: SqliteConnectOptions,
        pool_opts: SqlitePoolOptions,
    ) -> Result<Self, StorageError> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                error!("Failed to build database runtime: {}", e);
                StorageError::ConnectionFailed
            })?;
        let pool = rt
            .block_on(pool_opts.connect_with(opts))
            .map_err(|e| {
                error!("Failed to connect to session database: {}", e);
                StorageError::ConnectionFailed
            })?;
        Ok(Self { pool, rt })
    }

    /// Create the session table described by `schema` if it does not exist yet.
    pub fn create_schema(&self, schema: &TableSchema) -> Result<(), StorageError> {
        let sql = schema.create_table_sql();
        self.block_on(sqlx::query(&sql).execute(&self.pool))
            .map_err(|e| {
                error!("Failed to create session table {}: {}", schema.table, e);
                StorageError::SchemaFailed
            })?;
        info!("Session table {} is ready", schema.table);
        Ok(())
    }

    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub(crate) fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.rt.block_on(fut)
    }
}
