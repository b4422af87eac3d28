//! Items and continuation cursors
//!
//! Items are flat string-to-string attribute maps. A cursor is the last
//! evaluated primary key handed back by the store; callers never look inside
//! it, they only echo it back on the next call.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// A single stored item: attribute name to string value
pub type Item = HashMap<String, String>;

/// A typed primary key attribute value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyValue {
    /// String attribute
    S(String),

    /// Number attribute, kept in its wire (decimal string) form
    N(String),

    /// Binary attribute
    B(Vec<u8>),
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::S(s) => write!(f, "S:{}", s),
            KeyValue::N(n) => write!(f, "N:{}", n),
            KeyValue::B(b) => write!(f, "B:{} bytes", b.len()),
        }
    }
}

/// Opaque continuation cursor: the key attributes of the last evaluated item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor(BTreeMap<String, KeyValue>);

impl Cursor {
    /// Create an empty cursor
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key attribute
    pub fn with(mut self, name: impl Into<String>, value: KeyValue) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&KeyValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &KeyValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, KeyValue)> for Cursor {
    fn from_iter<I: IntoIterator<Item = (String, KeyValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Cursor {
    type Item = (String, KeyValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, KeyValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}
