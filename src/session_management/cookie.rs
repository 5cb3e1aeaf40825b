use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::debug;

use crate::session_management::options::CookieParams;

/// How far in the past an expiring cookie is dated.
pub const EXPIRED_COOKIE_AGE: i64 = 42000;

/// A session cookie instruction for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    /// Absolute expiry in epoch seconds; `None` for a browser-session cookie.
    pub expires: Option<i64>,
    pub path: String,
    pub domain: String,
    pub secure: bool,
    pub httponly: bool,
}

impl SessionCookie {
    /// Cookie carrying `id`, with the lifetime and attributes from `params`.
    pub fn for_session(name: &str, id: &str, params: &CookieParams) -> Self {
        let expires = if params.lifetime > 0 {
            // clamped to the latest instant an `Expires` date can render
            Some(
                Utc::now()
                    .timestamp()
                    .saturating_add(params.lifetime)
                    .min(DateTime::<Utc>::MAX_UTC.timestamp()),
            )
        } else {
            None
        };
        Self::build(name, id, expires, params)
    }

    /// Cookie telling the client to drop the session cookie.
    pub fn expired(name: &str, params: &CookieParams) -> Self {
        Self::build(
            name,
            "",
            Some(Utc::now().timestamp().saturating_sub(EXPIRED_COOKIE_AGE)),
            params,
        )
    }

    fn build(name: &str, value: &str, expires: Option<i64>, params: &CookieParams) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            expires,
            path: params.path.clone(),
            domain: params.domain.clone(),
            secure: params.secure,
            httponly: params.httponly,
        }
    }

    /// Renders the value of a `Set-Cookie` header.
    pub fn header_value(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        if let Some(expires) = self.expires {
            if let Some(at) = DateTime::<Utc>::from_timestamp(expires, 0) {
                out.push_str(&format!(
                    "; expires={}",
                    at.format("%a, %d %b %Y %H:%M:%S GMT")
                ));
            }
            let max_age = expires.saturating_sub(Utc::now().timestamp()).max(0);
            out.push_str(&format!("; Max-Age={}", max_age));
        }
        if !self.path.is_empty() {
            out.push_str(&format!("; path={}", self.path));
        }
        if !self.domain.is_empty() {
            out.push_str(&format!("; domain={}", self.domain));
        }
        if self.secure {
            out.push_str("; secure");
        }
        if self.httponly {
            out.push_str("; HttpOnly");
        }
        out
    }
}

/// Where cookie instructions go. The host decides how they reach the client.
pub trait CookieTransport: Send + Sync {
    fn send(&self, cookie: &SessionCookie);
}

/// Transport that keeps the rendered `Set-Cookie` values until the host collects them.
#[derive(Debug, Default)]
pub struct SetCookieBuffer {
    headers: Mutex<Vec<String>>,
}

impl SetCookieBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headers(&self) -> Vec<String> {
        match self.headers.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Returns and forgets the buffered headers.
    pub fn take(&self) -> Vec<String> {
        match self.headers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl CookieTransport for SetCookieBuffer {
    fn send(&self, cookie: &SessionCookie) {
        let header = cookie.header_value();
        debug!("Set-Cookie: {}", header);
        match self.headers.lock() {
            Ok(mut guard) => guard.push(header),
            Err(poisoned) => poisoned.into_inner().push(header),
        }
    }
}
