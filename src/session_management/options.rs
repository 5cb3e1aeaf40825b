use std::collections::BTreeMap;

use crate::error_handling::types::SessionError;

/// Every option `SessionOptions` knows, with its default value.
const DEFAULTS: &[(&str, &str)] = &[
    ("save_path", ""),
    ("name", "SESSID"),
    ("save_handler", "files"),
    ("gc_probability", "1"),
    ("gc_divisor", "100"),
    ("gc_maxlifetime", "1440"),
    ("serialize_handler", "json"),
    ("cookie_lifetime", "0"),
    ("cookie_path", "/"),
    ("cookie_domain", ""),
    ("cookie_secure", "0"),
    ("cookie_httponly", "0"),
    ("use_cookies", "1"),
    ("use_only_cookies", "1"),
    ("referer_check", ""),
    ("entropy_file", ""),
    ("entropy_length", "0"),
    ("cache_limiter", "nocache"),
    ("cache_expire", "180"),
    ("use_trans_sid", "0"),
    ("hash_function", "0"),
    ("hash_bits_per_character", "4"),
    ("url_rewriter.tags", "a=href,area=href,frame=src,form="),
    ("upload_progress.enabled", "1"),
    ("upload_progress.cleanup", "1"),
    ("upload_progress.prefix", "upload_progress_"),
    ("upload_progress.name", "SESSION_UPLOAD_PROGRESS"),
    ("upload_progress.freq", "1%"),
    ("upload_progress.min_freq", "1"),
];

const INTEGER_OPTIONS: &[&str] = &[
    "gc_probability",
    "gc_divisor",
    "gc_maxlifetime",
    "cookie_lifetime",
    "entropy_length",
    "cache_expire",
    "hash_bits_per_character",
];

const BOOLEAN_OPTIONS: &[&str] = &[
    "cookie_secure",
    "cookie_httponly",
    "use_cookies",
    "use_only_cookies",
    "use_trans_sid",
    "upload_progress.enabled",
    "upload_progress.cleanup",
];

/// Cookie attributes derived from the options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieParams {
    pub lifetime: i64,
    pub path: String,
    pub domain: String,
    pub secure: bool,
    pub httponly: bool,
}

/// Named session options, restricted to a fixed allow-list.
///
/// Values are kept as strings, the way the host configuration stores them. Integer and
/// boolean options are checked when set so the typed accessors below cannot fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    values: BTreeMap<String, String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            values: DEFAULTS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Values a `SessionManager` forces over `DEFAULTS`.
const MANAGER_DEFAULTS: &[(&str, &str)] = &[
    ("use_cookies", "1"),
    ("cookie_lifetime", "0"),
    ("cache_limiter", ""),
];

impl SessionOptions {
    /// Defaults for a session manager: cookie transport with browser-session cookies and
    /// no cache limiter.
    pub fn for_manager() -> Self {
        let mut options = Self::default();
        options.values.extend(
            MANAGER_DEFAULTS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );
        options
    }

    /// Records that a user-supplied storage handler is in use.
    pub fn mark_user_handler(&mut self) {
        self.values.insert("save_handler".into(), "user".into());
    }

    pub fn is_known(name: &str) -> bool {
        DEFAULTS.iter().any(|(k, _)| *k == name)
    }

    /// Current value of `name`.
    pub fn get(&self, name: &str) -> Result<&str, SessionError> {
        self.values
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| SessionError::InvalidArgument(format!("unknown option \"{}\"", name)))
    }

    /// Snapshot of the whole configuration.
    pub fn all(&self) -> BTreeMap<String, String> {
        self.values.clone()
    }

    pub fn set(&mut self, name: &str, value: &str) -> Result<(), SessionError> {
        Self::check(name, value)?;
        self.values.insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Applies several options at once. Nothing is changed if any of them is rejected.
    pub fn set_many<I, K, V>(&mut self, options: I) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: ToString,
    {
        let pending: Vec<(String, String)> = options
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.to_string()))
            .collect();
        for (name, value) in &pending {
            Self::check(name, value)?;
        }
        self.values.extend(pending);
        Ok(())
    }

    fn check(name: &str, value: &str) -> Result<(), SessionError> {
        if !Self::is_known(name) {
            return Err(SessionError::InvalidArgument(format!(
                "unknown option \"{}\"",
                name
            )));
        }
        if INTEGER_OPTIONS.contains(&name) && value.trim().parse::<i64>().is_err() {
            return Err(SessionError::InvalidArgument(format!(
                "option \"{}\" must be an integer, got \"{}\"",
                name, value
            )));
        }
        if BOOLEAN_OPTIONS.contains(&name) && parse_bool(value).is_none() {
            return Err(SessionError::InvalidArgument(format!(
                "option \"{}\" must be a boolean, got \"{}\"",
                name, value
            )));
        }
        Ok(())
    }

    fn int(&self, name: &str) -> i64 {
        self.values
            .get(name)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    fn flag(&self, name: &str) -> bool {
        self.values
            .get(name)
            .and_then(|v| parse_bool(v))
            .unwrap_or(false)
    }

    fn text(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn name(&self) -> &str {
        self.text("name")
    }

    pub fn save_path(&self) -> &str {
        self.text("save_path")
    }

    pub fn cookie_lifetime(&self) -> i64 {
        self.int("cookie_lifetime")
    }

    pub fn gc_maxlifetime(&self) -> i64 {
        self.int("gc_maxlifetime")
    }

    pub fn use_cookies(&self) -> bool {
        self.flag("use_cookies")
    }

    pub fn cookie_params(&self) -> CookieParams {
        CookieParams {
            lifetime: self.cookie_lifetime(),
            path: self.text("cookie_path").to_string(),
            domain: self.text("cookie_domain").to_string(),
            secure: self.flag("cookie_secure"),
            httponly: self.flag("cookie_httponly"),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" | "" => Some(false),
        _ => None,
    }
}
