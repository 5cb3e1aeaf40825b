//! Storage Handler Trait
//!
//! This module defines the `StorageHandler` trait, the contract between the session engine
//! and whatever durably keeps session payloads (a SQL table, a directory of files, ...).
//!
//! Implementors of this trait are responsible for:
//! - Returning the stored payload for an id, or an empty payload when there is none
//! - Upserting the payload for an id
//! - Deleting a single session
//! - Reclaiming sessions whose last write is older than a given age
//!
//! Payloads are opaque bytes. Handlers must store them losslessly, whatever they contain.

use crate::error_handling::types::StorageError;

/// The `StorageHandler` trait defines the interface for session storage backends.
///
/// The session engine calls `open` then `read` when a session starts, `write` then `close`
/// when it is flushed, and `destroy` then `close` when it is destroyed. `gc` is only ever
/// called explicitly by the host.
pub trait StorageHandler: Send + Sync {
    /// Prepares the handler for one session. `save_path` and `name` come from the session
    /// options; handlers that do not need them ignore them.
    fn open(&self, save_path: &str, name: &str) -> Result<bool, StorageError>;

    /// Releases whatever `open` acquired.
    fn close(&self) -> Result<bool, StorageError>;

    /// Returns the payload stored for `id`. A session that was never written yields an
    /// empty payload, not an error.
    fn read(&self, id: &str) -> Result<Vec<u8>, StorageError>;

    /// Stores `data` under `id`, creating the session if needed.
    fn write(&self, id: &str, data: &[u8]) -> Result<bool, StorageError>;

    /// Removes the session `id`. Removing an unknown id succeeds.
    fn destroy(&self, id: &str) -> Result<bool, StorageError>;

    /// Removes every session last written more than `max_age` seconds ago.
    ///
    /// A negative `max_age` puts the cutoff in the future and therefore removes everything.
    fn gc(&self, max_age: i64) -> Result<bool, StorageError>;
}
