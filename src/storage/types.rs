use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error_handling::types::SessionError;

/// Default name of the sessions table.
pub const DEFAULT_TABLE: &str = "sessions";

// Plain or schema-qualified identifier
static TABLE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("valid regex")
});

/// Physical column names for the four logical roles of a session row.
///
/// Every field defaults to the role name, so a partial mapping (for example from a TOML
/// table that only renames `data`) keeps the remaining defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub session_id: String,
    pub created: String,
    pub last_impression: String,
    pub data: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            session_id: "session_id".into(),
            created: "created".into(),
            last_impression: "last_impression".into(),
            data: "data".into(),
        }
    }
}

/// Table name plus column mapping used by `DatabaseStorage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableSchema {
    pub table: String,
    pub columns: ColumnMap,
}

impl Default for TableSchema {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.into(),
            columns: ColumnMap::default(),
        }
    }
}

impl TableSchema {
    pub fn new<S: Into<String>>(table: S, columns: ColumnMap) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }

    /// Checks the table name. Column names are not validated against the real schema.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.table.trim().is_empty() {
            return Err(SessionError::InvalidConfiguration(
                "a non-empty table name must be provided for the database session handler".into(),
            ));
        }
        if !TABLE_NAME_RE.is_match(&self.table) {
            return Err(SessionError::InvalidConfiguration(format!(
                "invalid session table name \"{}\"",
                self.table
            )));
        }
        Ok(())
    }

    /// Reference DDL for a table matching this mapping.
    pub fn create_table_sql(&self) -> String {
        let c = &self.columns;
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({} VARCHAR(128) PRIMARY KEY, {} INTEGER, {} INTEGER, {} TEXT)",
            self.table, c.session_id, c.created, c.last_impression, c.data
        )
    }
}

/// A stored session row with its payload already decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub created: i64,
    pub last_impression: i64,
    pub data: Vec<u8>,
}
