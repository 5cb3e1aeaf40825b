use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::storage::types::{ColumnMap, TableSchema, DEFAULT_TABLE};

/// `[database]` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file holding the session table. Overridden by `SESSIONSTORE_DB_PATH`.
    pub path: Option<PathBuf>,
    pub table: String,
    pub columns: ColumnMap,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            table: DEFAULT_TABLE.into(),
            columns: ColumnMap::default(),
        }
    }
}

impl DatabaseConfig {
    pub fn schema(&self) -> TableSchema {
        TableSchema::new(self.table.clone(), self.columns.clone())
    }
}
