use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::InvalidValue(e) => write!(f, "Invalid configuration value: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// Failure reported by a storage handler.
///
/// The variants only name the operation that failed. The driver error is logged where it
/// happens and never carried across the handler boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    ConnectionFailed,
    SchemaFailed,
    ReadFailed,
    WriteFailed,
    DestroyFailed,
    GcFailed,
}

impl StorageError {
    /// Operation context of the failure ("read", "write", "destroy", "gc", ...).
    pub fn context(&self) -> &'static str {
        match self {
            StorageError::ConnectionFailed => "connect",
            StorageError::SchemaFailed => "schema",
            StorageError::ReadFailed => "read",
            StorageError::WriteFailed => "write",
            StorageError::DestroyFailed => "destroy",
            StorageError::GcFailed => "gc",
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed => write!(f, "Storage connection failed"),
            StorageError::SchemaFailed => write!(f, "Storage schema creation failed"),
            StorageError::ReadFailed => write!(f, "Storage failed to read the session data"),
            StorageError::WriteFailed => write!(f, "Storage failed to write the session data"),
            StorageError::DestroyFailed => write!(f, "Storage failed to destroy the session"),
            StorageError::GcFailed => write!(f, "Storage failed to delete expired sessions"),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug)]
pub enum SessionError {
    InvalidConfiguration(String),
    InvalidArgument(String),
    InvalidState(String),
    StorageFailure(StorageError),
    StartFailure(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::InvalidConfiguration(e) => write!(f, "Invalid configuration: {}", e),
            SessionError::InvalidArgument(e) => write!(f, "Invalid argument: {}", e),
            SessionError::InvalidState(e) => write!(f, "Invalid state: {}", e),
            SessionError::StorageFailure(e) => write!(f, "Storage failure ({}): {}", e.context(), e),
            SessionError::StartFailure(e) => write!(f, "Could not start the session: {}", e),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::StorageFailure(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        SessionError::StorageFailure(err)
    }
}
