//! Session management core module.
//!
//! This module provides the session lifecycle: the `SessionManager` facade used by
//! request code, the `SessionEngine` that drives the storage handler, the option set,
//! the in-memory session data and the cookie transport.

use serde::{Deserialize, Serialize};

/// Session cookies and their transport.
pub mod cookie;
/// Handler invocation, id allocation and payload encoding.
pub mod engine;
/// Allow-listed session options.
pub mod options;
/// Session data structures and utilities.
pub mod session;
/// Session manager implementation.
pub mod session_manager;

pub use cookie::{CookieTransport, SessionCookie, SetCookieBuffer};
pub use options::SessionOptions;
pub use session::SessionData;
pub use session_manager::SessionManager;

/// Lifecycle state of a session.
///
/// Variants:
/// - `NotStarted`: No session has been started, or the last one was destroyed.
/// - `Active`: The session is started and its data is loaded.
/// - `Closed`: The session was written and released; its data is still readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    NotStarted,
    Active,
    Closed,
}
