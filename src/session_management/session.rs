use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Marker starting every key of the internal namespace (flash messages live under
/// `__sess.<name>`). Application keys may not start with it.
pub const RESERVED_PREFIX: &str = "__sess";

/// Key/value data bound to the current session.
///
/// This is the in-memory side of a session: the manager mutates it, the engine turns it
/// into the opaque payload handed to the storage handler (a JSON object) and back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionData {
    entries: BTreeMap<String, Value>,
}

impl SessionData {
    /// Decodes a stored payload. An empty payload is an empty session.
    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        if payload.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Self::default());
        }
        serde_json::from_slice(payload)
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: String, value: Value) {
        self.entries.insert(key, value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry outside the reserved namespace.
    pub fn public_entries(&self) -> BTreeMap<String, Value> {
        self.entries
            .iter()
            .filter(|(k, _)| !is_reserved(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

pub fn is_reserved(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

/// Storage key of the flash message `name`.
pub fn flash_key(name: &str) -> String {
    format!("{}.{}", RESERVED_PREFIX, name)
}
