//! Error types shared by the storage handlers, the session manager and the
//! configuration loader.

pub mod types;

pub use types::{ConfigError, SessionError, StorageError};
