//! Property map carried as trailing `"key=value"` tokens.
//!
//! Keys are restricted to `[A-Za-z0-9._]` and at most [`MAX_KEY_LENGTH`]
//! characters, which is what lets a reader tell a property token apart from a
//! positional argument. Values are arbitrary strings; numeric and boolean
//! accessors parse them on demand.
//!
//! # Example
//!
//! ```
//! use trax_protocol::codec::Properties;
//!
//! let mut properties = Properties::new();
//! properties.set("trax.confidence", 0.9).unwrap();
//! properties.set("label", "car #3").unwrap();
//!
//! assert_eq!(properties.get_float("trax.confidence"), Some(0.9));
//! assert_eq!(properties.get("label"), Some("car #3"));
//! ```

use std::collections::btree_map;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraxError};

/// Maximum property key length.
pub const MAX_KEY_LENGTH: usize = 64;

/// Check whether `key` can be used as a property key on the wire.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LENGTH
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_')
}

/// String to string mapping with unique, validated keys.
///
/// Iteration order is sorted by key so that encoding is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    /// Create an empty property map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `EncodingFailure` if the key is not a valid wire key.
    pub fn set(&mut self, key: &str, value: impl ToString) -> Result<()> {
        if !is_valid_key(key) {
            return Err(TraxError::encoding(format!(
                "invalid property key '{}'",
                key
            )));
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Get a raw string value.
    #[inline]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Parse a value as an integer.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key)?.trim().parse().ok()
    }

    /// Parse a value as a float.
    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.get(key)?.trim().parse().ok()
    }

    /// Parse a value as a boolean.
    ///
    /// Accepts `true`/`false`, `yes`/`no`, `on`/`off` and `1`/`0`, ignoring case.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)?.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }

    /// Remove a property, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    /// Check whether a key is present.
    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the map is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copy every entry of `other` into this map; `other` wins on conflicts.
    pub fn merge(&mut self, other: &Properties) {
        for (key, value) in other.iter() {
            self.entries.insert(key.to_string(), value.to_string());
        }
    }

    /// Move out every entry whose key starts with `prefix`, with the prefix stripped.
    pub(crate) fn drain_prefixed(&mut self, prefix: &str) -> Vec<(String, String)> {
        let keys: Vec<String> = self
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();

        keys.into_iter()
            .filter_map(|key| {
                let value = self.entries.remove(&key)?;
                Some((key[prefix.len()..].to_string(), value))
            })
            .collect()
    }

    /// Insert an entry decoded from the wire; the key was validated by the reader.
    pub(crate) fn insert_decoded(&mut self, key: String, value: String) {
        self.entries.insert(key, value);
    }
}

impl<'a> IntoIterator for &'a Properties {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
