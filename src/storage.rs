//! Storage subsystem
//!
//! This module provides the persistence side of sessions: the handler contract the
//! session engine talks to, and the backends implementing it.
//!
//! Components:
//! - `storage_trait`: the `StorageHandler` trait (open/close/read/write/destroy/gc).
//! - `types`: table mapping and stored record types.
//! - `connection`: the shared SQLite connection injected into database handlers.
//! - `database_storage`: relational-table implementation using `sqlx`.
//! - `file_storage`: one-file-per-session implementation.

pub mod connection;
pub mod database_storage;
pub mod file_storage;
pub mod storage_trait;
pub mod types;

pub use connection::DatabaseConnection;
pub use database_storage::DatabaseStorage;
pub use file_storage::FileStorage;
pub use storage_trait::StorageHandler;
pub use types::{ColumnMap, SessionRecord, TableSchema};
