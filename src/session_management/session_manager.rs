use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, error, info};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::error_handling::types::SessionError;
use crate::session_management::cookie::{CookieTransport, SetCookieBuffer};
use crate::session_management::engine::SessionEngine;
use crate::session_management::options::SessionOptions;
use crate::session_management::session::{flash_key, is_reserved, SessionData, RESERVED_PREFIX};
use crate::session_management::SessionStatus;
use crate::storage::storage_trait::StorageHandler;

/// Cookie lifetime used by `remember_me` callers that have no better value (two weeks).
pub const DEFAULT_REMEMBER_ME_SECS: i64 = 1_209_600;

static SESSION_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]+$").expect("valid regex"));

/// Facade over one request's session.
///
/// The manager owns the lifecycle state, the session identifier and the key/value data.
/// Persistence goes through the `SessionEngine`, which invokes the registered
/// `StorageHandler` when the session starts, is closed, is destroyed or changes id; the
/// manager never calls the handler itself.
///
/// Data accessors start the session lazily. A manager dropped while its session is active
/// writes the session back, so data is not lost when a request forgets to call `close`.
///
/// ```no_run
/// use std::sync::Arc;
/// use sessionstore::session_management::session_manager::SessionManager;
/// use sessionstore::storage::{DatabaseConnection, DatabaseStorage};
///
/// # fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let conn = Arc::new(DatabaseConnection::new()?);
/// let mut session = SessionManager::with_handler(Arc::new(DatabaseStorage::new(conn)));
/// session.set("user_id", 42)?;
/// session.flash("notice", Some("Profile saved".into()))?;
/// session.close()?;
/// # Ok(())
/// # }
/// ```
pub struct SessionManager {
    engine: SessionEngine,
    options: SessionOptions,
    status: SessionStatus,
    id: Option<String>,
    data: SessionData,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    /// Manager with default options, cookie-based transport and no handler registered
    /// (file storage is used on first start).
    pub fn new() -> Self {
        Self {
            engine: SessionEngine::new(Arc::new(SetCookieBuffer::new())),
            options: SessionOptions::for_manager(),
            status: SessionStatus::NotStarted,
            id: None,
            data: SessionData::default(),
        }
    }

    pub fn with_handler(handler: Arc<dyn StorageHandler>) -> Self {
        let mut manager = Self::new();
        manager.register(handler);
        manager
    }

    /// Manager whose constructor defaults are overlaid with `options`. Any unknown option
    /// rejects the whole call.
    pub fn with_options<I, K, V>(
        options: I,
        handler: Option<Arc<dyn StorageHandler>>,
    ) -> Result<Self, SessionError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: ToString,
    {
        let mut manager = Self::new();
        manager.options.set_many(options)?;
        if let Some(handler) = handler {
            manager.register(handler);
        }
        Ok(manager)
    }

    fn register(&mut self, handler: Arc<dyn StorageHandler>) {
        self.engine.register_handler(handler);
        self.options.mark_user_handler();
    }

    pub fn set_cookie_transport(&mut self, transport: Arc<dyn CookieTransport>) {
        self.engine.set_transport(transport);
    }

    /// All options and their current values.
    pub fn get_options(&self) -> BTreeMap<String, String> {
        self.options.all()
    }

    /// Value of a single option; unknown names are an `InvalidArgument`.
    pub fn get_option(&self, name: &str) -> Result<String, SessionError> {
        self.options.get(name).map(str::to_string)
    }

    /// Applies options from the allow-list. Any unknown name rejects the whole call.
    pub fn set_options<I, K, V>(&mut self, options: I) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: ToString,
    {
        self.options.set_many(options)
    }

    pub fn save_handler(&self) -> Option<Arc<dyn StorageHandler>> {
        self.engine.handler()
    }

    pub fn set_save_handler(&mut self, handler: Arc<dyn StorageHandler>) -> Result<(), SessionError> {
        if self.is_started() {
            return Err(SessionError::InvalidState(
                "the save handler must be set before the session starts".into(),
            ));
        }
        self.register(handler);
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Starts the session unless it is already active.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.is_started() {
            return Ok(());
        }
        let started = self.engine.start(self.id.as_deref(), &self.options)?;
        info!(
            "Session {} started ({})",
            started.id,
            if started.fresh { "new" } else { "resumed" }
        );
        self.id = Some(started.id);
        self.data = started.data;
        self.status = SessionStatus::Active;
        Ok(())
    }

    /// Writes the session data and releases the session. Data stays readable in memory;
    /// the next accessor call starts the session again.
    pub fn close(&mut self) -> Result<(), SessionError> {
        if !self.is_started() {
            return Ok(());
        }
        let id = self.current_id()?;
        self.engine.write_close(&id, &self.data)?;
        self.status = SessionStatus::Closed;
        debug!("Session {} closed", id);
        Ok(())
    }

    /// Clears all data, expires the session cookie and deletes the stored session. A later
    /// `start` allocates a new identifier.
    pub fn destroy(&mut self) -> Result<(), SessionError> {
        if !self.is_started() {
            return Ok(());
        }
        let id = self.current_id()?;
        self.data.clear();
        if self.options.use_cookies() {
            self.engine.expire_cookie(&self.options);
        }
        self.engine.destroy(&id)?;
        self.id = None;
        self.status = SessionStatus::NotStarted;
        Ok(())
    }

    pub fn get_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id(&mut self, value: &str) -> Result<(), SessionError> {
        if self.is_started() {
            return Err(SessionError::InvalidState(
                "the session id must be set before the session starts".into(),
            ));
        }
        SessionEngine::validate_id(value)?;
        self.id = Some(value.to_string());
        Ok(())
    }

    /// Moves the active session to a new identifier, optionally deleting the old one.
    pub fn regenerate_id(&mut self, delete_old: bool) -> Result<(), SessionError> {
        if !self.is_started() {
            return Err(SessionError::InvalidState(
                "the session id can only be regenerated while the session is active".into(),
            ));
        }
        let old = self.current_id()?;
        let new_id = self
            .engine
            .regenerate(&old, &self.data, delete_old, &self.options)?;
        self.id = Some(new_id);
        Ok(())
    }

    pub fn get_name(&self) -> &str {
        self.options.name()
    }

    pub fn set_name(&mut self, value: &str) -> Result<(), SessionError> {
        if self.is_started() {
            return Err(SessionError::InvalidState(
                "the session name must be set before the session starts".into(),
            ));
        }
        if !SESSION_NAME_RE.is_match(value) {
            return Err(SessionError::InvalidConfiguration(
                "the session name should contain only alphanumeric characters".into(),
            ));
        }
        self.options.set("name", value)
    }

    // A new lifetime only reaches the client with a new cookie, hence the regeneration
    fn set_cookie_lifetime(&mut self, lifetime: i64) -> Result<(), SessionError> {
        self.options.set("cookie_lifetime", &lifetime.to_string())?;
        if self.is_started() {
            self.regenerate_id(true)?;
        }
        Ok(())
    }

    /// Keeps the session cookie for `lifetime` seconds. Must be called before `start`.
    pub fn remember_me(&mut self, lifetime: i64) -> Result<(), SessionError> {
        if self.is_started() {
            return Err(SessionError::InvalidState(
                "remember_me must be called before the session starts".into(),
            ));
        }
        if lifetime < 0 {
            return Err(SessionError::InvalidArgument(
                "lifetime must be a positive integer or zero".into(),
            ));
        }
        self.set_cookie_lifetime(lifetime)
    }

    /// Turns the session cookie back into a browser-session cookie. On an active session
    /// this regenerates the identifier.
    pub fn forget_me(&mut self) -> Result<(), SessionError> {
        self.set_cookie_lifetime(0)
    }

    pub fn get(&mut self, key: &str) -> Result<Option<Value>, SessionError> {
        self.start()?;
        Ok(self.data.get(key).cloned())
    }

    pub fn get_or(&mut self, key: &str, default: Value) -> Result<Value, SessionError> {
        Ok(self.get(key)?.filter(|v| !v.is_null()).unwrap_or(default))
    }

    pub fn set<V: Serialize>(&mut self, key: &str, value: V) -> Result<(), SessionError> {
        self.start()?;
        if key.is_empty() {
            return Err(SessionError::InvalidArgument("key must be a non-empty string".into()));
        }
        if is_reserved(key) {
            return Err(SessionError::InvalidArgument(format!(
                "key cannot start with the reserved prefix \"{}\"",
                RESERVED_PREFIX
            )));
        }
        let value = serde_json::to_value(value).map_err(|e| {
            SessionError::InvalidArgument(format!("value for \"{}\" is not serializable: {}", key, e))
        })?;
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    /// `true` when `key` holds a non-null value.
    pub fn has(&mut self, key: &str) -> Result<bool, SessionError> {
        self.start()?;
        Ok(self.data.get(key).is_some_and(|v| !v.is_null()))
    }

    pub fn remove(&mut self, key: &str) -> Result<Option<Value>, SessionError> {
        self.start()?;
        Ok(self.data.remove(key))
    }

    /// Drops every entry, flash messages included.
    pub fn remove_all(&mut self) -> Result<(), SessionError> {
        self.start()?;
        self.data.clear();
        Ok(())
    }

    /// Application entries, without flash messages.
    pub fn get_all(&mut self) -> Result<BTreeMap<String, Value>, SessionError> {
        self.start()?;
        Ok(self.data.public_entries())
    }

    /// Stores a flash message when `value` is given (and not null), otherwise returns the
    /// stored message and removes it.
    pub fn flash(&mut self, key: &str, value: Option<Value>) -> Result<Option<Value>, SessionError> {
        if key.is_empty() {
            return Err(SessionError::InvalidArgument("key must be a non-empty string".into()));
        }
        self.start()?;
        let full_key = flash_key(key);
        match value {
            Some(value) if !value.is_null() => {
                self.data.insert(full_key, value.clone());
                Ok(Some(value))
            }
            _ => Ok(self.data.remove(&full_key)),
        }
    }

    /// Deletes stored sessions idle for longer than `gc_maxlifetime`. Works without a
    /// started session.
    pub fn gc(&mut self) -> Result<bool, SessionError> {
        let max_age = self.options.gc_maxlifetime();
        self.gc_with_max_age(max_age)
    }

    pub fn gc_with_max_age(&mut self, max_age: i64) -> Result<bool, SessionError> {
        self.engine.gc(max_age, &self.options)
    }

    fn current_id(&self) -> Result<String, SessionError> {
        self.id
            .clone()
            .ok_or_else(|| SessionError::InvalidState("active session without an id".into()))
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if self.is_started() {
            if let Err(e) = self.close() {
                error!("Failed to write the session on shutdown: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::types::StorageError;
    use crate::storage::{DatabaseConnection, DatabaseStorage, TableSchema};
    use serde_json::json;

    fn storage() -> Arc<DatabaseStorage> {
        let conn = DatabaseConnection::in_memory().unwrap();
        conn.create_schema(&TableSchema::default()).unwrap();
        Arc::new(DatabaseStorage::new(Arc::new(conn)))
    }

    fn manager() -> (SessionManager, Arc<DatabaseStorage>, Arc<SetCookieBuffer>) {
        let storage = storage();
        let cookies = Arc::new(SetCookieBuffer::new());
        let mut session = SessionManager::with_handler(storage.clone());
        session.set_cookie_transport(cookies.clone());
        (session, storage, cookies)
    }

    #[test]
    fn test_get_options() {
        let (session, _, _) = manager();
        let options = session.get_options();
        assert!(options.contains_key("name"));
        assert_eq!(session.get_option("name").unwrap(), options["name"]);
        assert_eq!(session.get_option("save_handler").unwrap(), "user");
        assert_eq!(session.get_option("cache_limiter").unwrap(), "");
        assert!(matches!(
            session.get_option("invalid_option"),
            Err(SessionError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_with_options_overlays_constructor_defaults() {
        let session = SessionManager::with_options(
            [("name", "AppSess"), ("cookie_httponly", "1")],
            Some(storage()),
        )
        .unwrap();
        assert_eq!(session.get_name(), "AppSess");
        assert_eq!(session.get_option("cookie_httponly").unwrap(), "1");
        assert_eq!(session.get_option("cache_limiter").unwrap(), "");
        assert_eq!(session.get_option("save_handler").unwrap(), "user");

        let rejected = SessionManager::with_options([("bogus", "1")], None);
        assert!(matches!(rejected, Err(SessionError::InvalidArgument(_))));
    }

    #[test]
    fn test_set_options() {
        let (mut session, _, _) = manager();
        session
            .set_options([("name", "MySess"), ("cookie_lifetime", "0")])
            .unwrap();
        assert_eq!(session.get_name(), "MySess");
        assert_eq!(session.get_option("cookie_lifetime").unwrap(), "0");
        assert!(matches!(
            session.set_options([("invalid_option", "val")]),
            Err(SessionError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_start_is_lazy_and_idempotent() {
        let (mut session, _, cookies) = manager();
        assert!(!session.is_started());
        assert_eq!(session.status(), SessionStatus::NotStarted);
        assert!(session.get_id().is_none());

        session.start().unwrap();
        let id = session.get_id().unwrap().to_string();
        session.start().unwrap();
        assert_eq!(session.get_id().unwrap(), id);
        assert_eq!(cookies.headers().len(), 1);
    }

    #[test]
    fn test_close_writes_through_handler() {
        let (mut session, storage, _) = manager();
        session.set("key", "value").unwrap();
        let id = session.get_id().unwrap().to_string();
        assert!(storage.read(&id).unwrap().is_empty());

        session.close().unwrap();
        assert!(!session.is_started());
        assert_eq!(session.status(), SessionStatus::Closed);
        assert_eq!(storage.read(&id).unwrap(), br#"{"key":"value"}"#);
        // closing again is a no-op
        session.close().unwrap();
    }

    #[test]
    fn test_start_reads_stored_data() {
        let storage = storage();
        storage.write("abc123", br#"{"user":7}"#).unwrap();

        let mut session = SessionManager::with_handler(storage.clone());
        session.set_id("abc123").unwrap();
        assert_eq!(session.get("user").unwrap(), Some(json!(7)));
    }

    #[test]
    fn test_closed_session_restarts_with_same_id() {
        let (mut session, _, _) = manager();
        session.set("n", 1).unwrap();
        let id = session.get_id().unwrap().to_string();
        session.close().unwrap();

        assert_eq!(session.get("n").unwrap(), Some(json!(1)));
        assert!(session.is_started());
        assert_eq!(session.get_id().unwrap(), id);
    }

    #[test]
    fn test_destroy() {
        let (mut session, storage, cookies) = manager();
        session.set("key", "value").unwrap();
        let id = session.get_id().unwrap().to_string();
        session.close().unwrap();
        session.start().unwrap();
        assert!(!storage.read(&id).unwrap().is_empty());

        session.destroy().unwrap();
        assert!(!session.is_started());
        assert_eq!(session.status(), SessionStatus::NotStarted);
        assert!(session.get_id().is_none());
        assert!(storage.read(&id).unwrap().is_empty());
        let last = cookies.headers().pop().unwrap();
        assert!(last.starts_with("SESSID=; expires="));
        assert!(last.contains("Max-Age=0"));

        assert_eq!(session.get("key").unwrap(), None);
        assert_ne!(session.get_id().unwrap(), id);
    }

    #[test]
    fn test_destroy_without_cookies_sends_nothing() {
        let (mut session, _, cookies) = manager();
        session.set_options([("use_cookies", "0")]).unwrap();
        session.start().unwrap();
        session.destroy().unwrap();
        assert!(cookies.headers().is_empty());
    }

    #[test]
    fn test_destroy_when_not_started_is_noop() {
        let (mut session, _, cookies) = manager();
        session.destroy().unwrap();
        assert!(cookies.headers().is_empty());
        assert_eq!(session.status(), SessionStatus::NotStarted);
    }

    #[test]
    fn test_set_id() {
        let (mut session, _, _) = manager();
        session.set_id("my-id").unwrap();
        assert_eq!(session.get_id(), Some("my-id"));
        session.start().unwrap();
        assert_eq!(session.get_id(), Some("my-id"));

        assert!(matches!(
            session.set_id("other-id"),
            Err(SessionError::InvalidState(_))
        ));
    }

    #[test]
    fn test_set_id_rejects_unsafe_ids() {
        let (mut session, _, _) = manager();
        assert!(matches!(
            session.set_id("../../etc"),
            Err(SessionError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_regenerate_id() {
        let (mut session, storage, cookies) = manager();
        assert!(matches!(
            session.regenerate_id(true),
            Err(SessionError::InvalidState(_))
        ));

        session.set("k", "v").unwrap();
        let old = session.get_id().unwrap().to_string();
        session.regenerate_id(false).unwrap();
        let new = session.get_id().unwrap().to_string();
        assert_ne!(old, new);
        assert_eq!(storage.read(&old).unwrap(), br#"{"k":"v"}"#);
        assert_eq!(cookies.headers().last().unwrap(), &format!("SESSID={}; path=/", new));

        session.close().unwrap();
        assert_eq!(storage.read(&new).unwrap(), br#"{"k":"v"}"#);
    }

    #[test]
    fn test_set_name() {
        let (mut session, _, _) = manager();
        assert!(matches!(
            session.set_name("MySess!"),
            Err(SessionError::InvalidConfiguration(_))
        ));
        session.set_name("MySess").unwrap();
        assert_eq!(session.get_name(), "MySess");

        session.start().unwrap();
        assert!(matches!(
            session.set_name("Other"),
            Err(SessionError::InvalidState(_))
        ));
    }

    #[test]
    fn test_remember_me() {
        let (mut session, _, cookies) = manager();
        assert!(matches!(
            session.remember_me(-1),
            Err(SessionError::InvalidArgument(_))
        ));
        session.remember_me(DEFAULT_REMEMBER_ME_SECS).unwrap();
        session.start().unwrap();
        assert_eq!(session.get_option("cookie_lifetime").unwrap(), "1209600");
        assert!(cookies.headers()[0].contains("; Max-Age="));

        assert!(matches!(
            session.remember_me(60),
            Err(SessionError::InvalidState(_))
        ));
    }

    #[test]
    fn test_forget_me_on_active_session_regenerates() {
        let (mut session, _, _) = manager();
        session.remember_me(3600).unwrap();
        session.start().unwrap();
        let id = session.get_id().unwrap().to_string();

        session.forget_me().unwrap();
        assert_eq!(session.get_option("cookie_lifetime").unwrap(), "0");
        assert_ne!(session.get_id().unwrap(), id);
    }

    #[test]
    fn test_get_set_has_remove() {
        let (mut session, _, _) = manager();
        assert_eq!(session.get("missing").unwrap(), None);
        assert_eq!(session.get_or("missing", json!("dflt")).unwrap(), json!("dflt"));

        session.set("count", 3).unwrap();
        session.set("nothing", Value::Null).unwrap();
        assert!(session.has("count").unwrap());
        assert!(!session.has("nothing").unwrap());
        assert_eq!(session.get("count").unwrap(), Some(json!(3)));

        assert_eq!(session.remove("count").unwrap(), Some(json!(3)));
        assert!(!session.has("count").unwrap());
        assert_eq!(session.remove("count").unwrap(), None);
    }

    #[test]
    fn test_set_rejects_bad_keys() {
        let (mut session, _, _) = manager();
        assert!(matches!(session.set("", 1), Err(SessionError::InvalidArgument(_))));
        assert!(matches!(
            session.set("__sess.notice", 1),
            Err(SessionError::InvalidArgument(_))
        ));
        assert!(matches!(
            session.set("__sessions", 1),
            Err(SessionError::InvalidArgument(_))
        ));
        session.set("_private", 1).unwrap();
    }

    #[test]
    fn test_get_all_and_remove_all() {
        let (mut session, _, _) = manager();
        session.set("a", 1).unwrap();
        session.set("b", "two").unwrap();
        session.flash("notice", Some(json!("hidden"))).unwrap();

        let all = session.get_all().unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.keys().all(|k| !is_reserved(k)));

        session.remove_all().unwrap();
        assert!(session.get_all().unwrap().is_empty());
        assert_eq!(session.flash("notice", None).unwrap(), None);
    }

    #[test]
    fn test_flash_reads_once() {
        let (mut session, _, _) = manager();
        assert_eq!(
            session.flash("notice", Some(json!("Saved"))).unwrap(),
            Some(json!("Saved"))
        );
        assert_eq!(session.flash("notice", None).unwrap(), Some(json!("Saved")));
        assert_eq!(session.flash("notice", None).unwrap(), None);
    }

    #[test]
    fn test_flash_survives_close() {
        let (mut session, _, _) = manager();
        session.flash("notice", Some(json!({"level": "info"}))).unwrap();
        let id = session.get_id().unwrap().to_string();
        session.close().unwrap();

        let storage = session.save_handler().unwrap();
        let mut next = SessionManager::with_handler(storage);
        next.set_id(&id).unwrap();
        assert_eq!(
            next.flash("notice", None).unwrap(),
            Some(json!({"level": "info"}))
        );
        assert_eq!(next.flash("notice", None).unwrap(), None);
    }

    #[test]
    fn test_flash_null_value_reads() {
        let (mut session, _, _) = manager();
        session.flash("n", Some(json!(5))).unwrap();
        assert_eq!(session.flash("n", Some(Value::Null)).unwrap(), Some(json!(5)));
        assert!(matches!(
            session.flash("", Some(json!(1))),
            Err(SessionError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_gc_uses_configured_lifetime() {
        let (mut session, storage, _) = manager();
        storage.write("old", b"{}").unwrap();
        session.set_options([("gc_maxlifetime", "-1")]).unwrap();
        assert!(session.gc().unwrap());
        assert_eq!(storage.count().unwrap(), 0);
    }

    #[test]
    fn test_drop_writes_active_session() {
        let storage = storage();
        let id = {
            let mut session = SessionManager::with_handler(storage.clone());
            session.set("kept", true).unwrap();
            session.get_id().unwrap().to_string()
        };
        assert_eq!(storage.read(&id).unwrap(), br#"{"kept":true}"#);
    }

    #[test]
    fn test_defaults_to_file_storage_under_save_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut session = SessionManager::new();
        assert!(session.save_handler().is_none());
        assert_eq!(session.get_option("save_handler").unwrap(), "files");
        session
            .set_options([("save_path", dir.path().to_string_lossy())])
            .unwrap();

        session.set("k", "v").unwrap();
        let id = session.get_id().unwrap().to_string();
        session.close().unwrap();
        assert!(session.save_handler().is_some());
        let stored = std::fs::read(dir.path().join(format!("sess_{}", id))).unwrap();
        assert_eq!(stored, br#"{"k":"v"}"#);
    }

    #[test]
    fn test_remember_me_with_huge_lifetime() {
        let (mut session, _, cookies) = manager();
        session.remember_me(i64::MAX).unwrap();
        session.start().unwrap();
        assert!(session.is_started());
        let header = cookies.headers().pop().unwrap();
        assert!(header.contains(" GMT; Max-Age="));

        session.regenerate_id(true).unwrap();
        assert_eq!(cookies.headers().len(), 2);
    }

    #[test]
    fn test_gc_before_start_uses_save_path() {
        let save_dir = tempfile::TempDir::new().unwrap();
        let stale = save_dir.path().join("sess_stale1");
        std::fs::write(&stale, b"{}").unwrap();
        let foreign =
            std::env::temp_dir().join(format!("sess_{}", SessionEngine::generate_id()));
        std::fs::write(&foreign, b"{}").unwrap();

        let mut session = SessionManager::new();
        session
            .set_options([("save_path", save_dir.path().to_string_lossy())])
            .unwrap();
        let collected = session.gc_with_max_age(-10);
        let foreign_kept = foreign.exists();
        let _ = std::fs::remove_file(&foreign);

        assert!(collected.unwrap());
        assert!(!stale.exists());
        assert!(foreign_kept);
        assert_eq!(session.status(), SessionStatus::NotStarted);
    }

    struct RefusingStorage {
        fail: bool,
    }

    impl StorageHandler for RefusingStorage {
        fn open(&self, _save_path: &str, _name: &str) -> Result<bool, StorageError> {
            if self.fail {
                Err(StorageError::ConnectionFailed)
            } else {
                Ok(false)
            }
        }

        fn close(&self) -> Result<bool, StorageError> {
            Ok(true)
        }

        fn read(&self, _id: &str) -> Result<Vec<u8>, StorageError> {
            Ok(Vec::new())
        }

        fn write(&self, _id: &str, _data: &[u8]) -> Result<bool, StorageError> {
            Ok(true)
        }

        fn destroy(&self, _id: &str) -> Result<bool, StorageError> {
            Ok(true)
        }

        fn gc(&self, _max_age: i64) -> Result<bool, StorageError> {
            Ok(true)
        }
    }

    #[test]
    fn test_start_fails_when_handler_will_not_open() {
        for fail in [false, true] {
            let mut session = SessionManager::with_handler(Arc::new(RefusingStorage { fail }));
            assert!(matches!(session.start(), Err(SessionError::StartFailure(_))));
            assert!(matches!(session.get("k"), Err(SessionError::StartFailure(_))));
            assert_eq!(session.status(), SessionStatus::NotStarted);
            assert!(session.get_id().is_none());
        }
    }

    #[test]
    fn test_gc_fails_when_handler_will_not_open() {
        let mut session = SessionManager::with_handler(Arc::new(RefusingStorage { fail: false }));
        assert!(matches!(
            session.gc(),
            Err(SessionError::StorageFailure(StorageError::GcFailed))
        ));
        let mut session = SessionManager::with_handler(Arc::new(RefusingStorage { fail: true }));
        assert!(matches!(
            session.gc(),
            Err(SessionError::StorageFailure(StorageError::ConnectionFailed))
        ));
    }

    #[test]
    fn test_get_or_treats_null_as_missing() {
        let (mut session, _, _) = manager();
        session.set("nothing", Value::Null).unwrap();
        assert_eq!(session.get("nothing").unwrap(), Some(Value::Null));
        assert_eq!(session.get_or("nothing", json!("dflt")).unwrap(), json!("dflt"));
        assert!(!session.has("nothing").unwrap());
    }

    #[test]
    fn test_set_save_handler_rejected_while_active() {
        let (mut session, _, _) = manager();
        session.start().unwrap();
        assert!(matches!(
            session.set_save_handler(storage()),
            Err(SessionError::InvalidState(_))
        ));
    }
}
