use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::types::DatabaseConfig;
use crate::error_handling::types::{ConfigError, StorageError};
use crate::session_management::options::SessionOptions;
use crate::storage::connection::{DatabaseConnection, DB_PATH_ENV};

/// Application configuration loaded from a TOML file.
///
/// Every section is optional, so an empty file yields the defaults:
///
/// ```toml
/// log_level = "debug"
///
/// [database]
/// path = "/var/lib/app/sessions.sqlite3"
/// table = "web_sessions"
///
/// [database.columns]
/// data = "payload"
///
/// [session]
/// name = "APPSESSID"
/// gc_maxlifetime = 3600
/// cookie_httponly = true
/// ```
///
/// # Fields Overview
///
/// - `log_level`: default `env_logger` filter, `RUST_LOG` still wins
/// - `database`: location of the SQLite file and mapping of the session table
/// - `session`: session options, checked against the allow-list by `session_options`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub database: DatabaseConfig,
    pub session: BTreeMap<String, toml::Value>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.database.schema().validate().map_err(|e| {
            ConfigError::InvalidValue(format!("database.table: {}", e))
        })?;
        Ok(config)
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    /// Default options overlaid with the `[session]` section.
    pub fn session_options(&self) -> Result<SessionOptions, ConfigError> {
        let mut pending = Vec::with_capacity(self.session.len());
        for (name, value) in &self.session {
            let text = match value {
                toml::Value::String(s) => s.clone(),
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
                other => {
                    return Err(ConfigError::InvalidValue(format!(
                        "session.{} must be a string, number or boolean, got {}",
                        name,
                        other.type_str()
                    )))
                }
            };
            pending.push((name.clone(), text));
        }
        let mut options = SessionOptions::default();
        options
            .set_many(pending)
            .map_err(|e| ConfigError::InvalidValue(format!("session: {}", e)))?;
        Ok(options)
    }

    /// Opens the configured database. `SESSIONSTORE_DB_PATH` takes precedence over
    /// `database.path`.
    pub fn connect(&self) -> Result<DatabaseConnection, StorageError> {
        if env::var_os(DB_PATH_ENV).is_some() {
            return DatabaseConnection::new();
        }
        match &self.database.path {
            Some(path) => {
                debug!("Using session database from configuration");
                DatabaseConnection::new_file(path)
            }
            None => DatabaseConnection::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageHandler;
    use crate::storage::DatabaseStorage;
    use serial_test::serial;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.log_level(), "info");
        assert_eq!(config.database.table, "sessions");
        assert_eq!(config.session_options().unwrap(), SessionOptions::default());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
log_level = "debug"

[database]
path = "/tmp/app/sessions.sqlite3"
table = "web_sessions"

[database.columns]
data = "payload"

[session]
name = "APPSESSID"
gc_maxlifetime = 3600
cookie_httponly = true
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.log_level(), "debug");
        let schema = config.database.schema();
        assert_eq!(schema.table, "web_sessions");
        assert_eq!(schema.columns.data, "payload");
        assert_eq!(schema.columns.session_id, "session_id");

        let options = config.session_options().unwrap();
        assert_eq!(options.name(), "APPSESSID");
        assert_eq!(options.gc_maxlifetime(), 3600);
        assert!(options.cookie_params().httponly);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = Config::from_file(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            Config::from_toml("log_level = "),
            Err(ConfigError::TomlError(_))
        ));
    }

    #[test]
    fn test_invalid_table_name() {
        assert!(matches!(
            Config::from_toml("[database]\ntable = \"drop table;\""),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_unknown_session_option() {
        let config = Config::from_toml("[session]\nnot_an_option = 1").unwrap();
        assert!(matches!(
            config.session_options(),
            Err(ConfigError::InvalidValue(_))
        ));
        let config = Config::from_toml("[session]\nname = [1, 2]").unwrap();
        assert!(config.session_options().is_err());
    }

    #[test]
    #[serial]
    fn test_connect_uses_configured_path() {
        env::remove_var(DB_PATH_ENV);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("sessions.sqlite3");
        let config = Config {
            database: DatabaseConfig {
                path: Some(path.clone()),
                ..DatabaseConfig::default()
            },
            ..Config::default()
        };

        let conn = Arc::new(config.connect().unwrap());
        conn.create_schema(&config.database.schema()).unwrap();
        let storage = DatabaseStorage::new(conn);
        assert!(storage.write("abc", b"{}").unwrap());
        assert!(path.exists());
    }

    #[test]
    #[serial]
    fn test_env_overrides_configured_path() {
        let dir = TempDir::new().unwrap();
        let from_env = dir.path().join("env.sqlite3");
        let from_config = dir.path().join("config.sqlite3");
        env::set_var(DB_PATH_ENV, &from_env);
        let config = Config {
            database: DatabaseConfig {
                path: Some(from_config.clone()),
                ..DatabaseConfig::default()
            },
            ..Config::default()
        };

        let result = config.connect();
        env::remove_var(DB_PATH_ENV);
        result.unwrap();
        assert!(from_env.exists());
        assert!(!from_config.exists());
    }
}
