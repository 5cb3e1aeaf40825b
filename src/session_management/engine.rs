//! Session engine.
//!
//! The engine is the only component that talks to the registered `StorageHandler`. The
//! manager drives lifecycle transitions and the engine runs the matching handler hooks:
//!
//! | transition     | handler calls                         |
//! |----------------|---------------------------------------|
//! | start          | `open`, `read`                        |
//! | write-close    | `write`, `close`                      |
//! | destroy        | `destroy`, `close`                    |
//! | regenerate     | `destroy(old)` or `write(old, data)`  |
//! | gc             | `gc`                                  |
//!
//! It also allocates identifiers and emits the `Set-Cookie` instructions that go with
//! starting or rotating a session.

use std::sync::Arc;

use log::{debug, error, info};
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::error_handling::types::{SessionError, StorageError};
use crate::session_management::cookie::{CookieTransport, SessionCookie};
use crate::session_management::options::SessionOptions;
use crate::session_management::session::SessionData;
use crate::storage::file_storage::FileStorage;
use crate::storage::storage_trait::StorageHandler;

/// Longest identifier accepted from callers.
pub const MAX_ID_LEN: usize = 256;

static SESSION_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9,-]+$").expect("valid regex"));

/// Outcome of a successful start.
#[derive(Debug)]
pub struct StartedSession {
    pub id: String,
    pub data: SessionData,
    /// `true` when the identifier was allocated by this start.
    pub fresh: bool,
}

pub struct SessionEngine {
    handler: Option<Arc<dyn StorageHandler>>,
    transport: Arc<dyn CookieTransport>,
}

impl SessionEngine {
    pub fn new(transport: Arc<dyn CookieTransport>) -> Self {
        Self {
            handler: None,
            transport,
        }
    }

    pub fn register_handler(&mut self, handler: Arc<dyn StorageHandler>) {
        self.handler = Some(handler);
    }

    pub fn handler(&self) -> Option<Arc<dyn StorageHandler>> {
        self.handler.clone()
    }

    pub fn set_transport(&mut self, transport: Arc<dyn CookieTransport>) {
        self.transport = transport;
    }

    // Falls back to file storage under `save_path`, like a host without a custom handler
    fn active_handler(&mut self) -> Arc<dyn StorageHandler> {
        self.handler
            .get_or_insert_with(|| {
                debug!("No storage handler registered, using file storage");
                Arc::new(FileStorage::unbound())
            })
            .clone()
    }

    fn registered(&self) -> Result<&Arc<dyn StorageHandler>, SessionError> {
        self.handler
            .as_ref()
            .ok_or_else(|| SessionError::InvalidState("no session has been started".into()))
    }

    pub fn generate_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    pub fn validate_id(id: &str) -> Result<(), SessionError> {
        if id.len() > MAX_ID_LEN || !SESSION_ID_RE.is_match(id) {
            return Err(SessionError::InvalidArgument(format!(
                "session id must be 1 to {} characters of [A-Za-z0-9,-]",
                MAX_ID_LEN
            )));
        }
        Ok(())
    }

    /// Opens the handler, reads the payload for `requested_id` (or a fresh id) and decodes
    /// it.
    pub fn start(
        &mut self,
        requested_id: Option<&str>,
        options: &SessionOptions,
    ) -> Result<StartedSession, SessionError> {
        let handler = self.active_handler();
        match handler.open(options.save_path(), options.name()) {
            Ok(true) => {}
            Ok(false) => {
                return Err(SessionError::StartFailure(
                    "storage handler refused to open".into(),
                ))
            }
            Err(e) => {
                error!("Storage handler failed to open: {}", e);
                return Err(SessionError::StartFailure(e.to_string()));
            }
        }

        let (id, fresh) = match requested_id {
            Some(id) => {
                Self::validate_id(id)
                    .map_err(|e| SessionError::StartFailure(e.to_string()))?;
                (id.to_string(), false)
            }
            None => (Self::generate_id(), true),
        };

        let payload = handler.read(&id)?;
        let data = SessionData::from_payload(&payload).map_err(|e| {
            error!("Stored payload for session {} could not be decoded: {}", id, e);
            SessionError::StartFailure(format!("session data could not be decoded: {}", e))
        })?;

        let params = options.cookie_params();
        if options.use_cookies() && (fresh || params.lifetime > 0) {
            self.transport
                .send(&SessionCookie::for_session(options.name(), &id, &params));
        }
        debug!("Session {} started with {} entr(ies)", id, data.len());
        Ok(StartedSession { id, data, fresh })
    }

    /// Persists `data` under `id` and closes the handler.
    pub fn write_close(&self, id: &str, data: &SessionData) -> Result<(), SessionError> {
        let handler = self.registered()?;
        let payload = encode(data)?;
        handler.write(id, &payload)?;
        handler.close()?;
        debug!("Session {} written ({} byte(s))", id, payload.len());
        Ok(())
    }

    /// Removes the stored session `id` and closes the handler.
    pub fn destroy(&self, id: &str) -> Result<(), SessionError> {
        let handler = self.registered()?;
        handler.destroy(id)?;
        handler.close()?;
        info!("Session {} destroyed", id);
        Ok(())
    }

    /// Allocates a new identifier for the active session.
    ///
    /// The row under `old_id` is dropped when `delete_old` is set, otherwise it keeps the
    /// current data. The new identifier is only persisted on the next write-close.
    pub fn regenerate(
        &self,
        old_id: &str,
        data: &SessionData,
        delete_old: bool,
        options: &SessionOptions,
    ) -> Result<String, SessionError> {
        let handler = self.registered()?;
        if delete_old {
            handler.destroy(old_id)?;
        } else {
            handler.write(old_id, &encode(data)?)?;
        }
        let new_id = Self::generate_id();
        if options.use_cookies() {
            self.transport.send(&SessionCookie::for_session(
                options.name(),
                &new_id,
                &options.cookie_params(),
            ));
        }
        info!("Session id regenerated (old id deleted: {})", delete_old);
        Ok(new_id)
    }

    pub fn expire_cookie(&self, options: &SessionOptions) {
        self.transport
            .send(&SessionCookie::expired(options.name(), &options.cookie_params()));
    }

    /// Collects expired sessions. The handler is opened with the configured save path
    /// first, so gc does not depend on a session having been started.
    pub fn gc(&mut self, max_age: i64, options: &SessionOptions) -> Result<bool, SessionError> {
        let handler = self.active_handler();
        match handler.open(options.save_path(), options.name()) {
            Ok(true) => {}
            Ok(false) => {
                error!("Storage handler refused to open for gc");
                return Err(SessionError::StorageFailure(StorageError::GcFailed));
            }
            Err(e) => {
                error!("Storage handler failed to open for gc: {}", e);
                return Err(e.into());
            }
        }
        let collected = handler.gc(max_age)?;
        handler.close()?;
        Ok(collected)
    }
}

fn encode(data: &SessionData) -> Result<Vec<u8>, SessionError> {
    data.to_payload().map_err(|e| {
        error!("Session data could not be serialized: {}", e);
        SessionError::InvalidArgument(format!("session data could not be serialized: {}", e))
    })
}
