pub mod configuration;
pub use configuration::Config;

pub mod error_handling;
pub use error_handling::*;

pub mod session_management;
pub use session_management::{SessionManager, SessionOptions, SessionStatus};

pub mod storage;
pub use storage::{DatabaseConnection, DatabaseStorage, FileStorage, StorageHandler, TableSchema};
