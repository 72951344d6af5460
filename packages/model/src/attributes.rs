//! # Node Attributes
//!
//! Keyed values attached to every node. Keys are unique. Insertion order is
//! kept so serialized output is stable, but it does not take part in
//! equality: two attribute sets are equal when they hold the same pairs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered attribute map
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<(String, Value)>", into = "Vec<(String, Value)>")]
pub struct Attributes {
    entries: Vec<(String, Value)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Set a value, returning the previous one.
    ///
    /// An existing key keeps its place in the order.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Set or remove depending on `value`.
    pub fn assign(&mut self, key: &str, value: Option<Value>) {
        match value {
            Some(value) => {
                self.set(key, value);
            }
            None => {
                self.remove(key);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl PartialEq for Attributes {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl From<Vec<(String, Value)>> for Attributes {
    fn from(pairs: Vec<(String, Value)>) -> Self {
        let mut attributes = Attributes::new();
        for (key, value) in pairs {
            attributes.set(key, value);
        }
        attributes
    }
}

impl From<Attributes> for Vec<(String, Value)> {
    fn from(attributes: Attributes) -> Self {
        attributes.entries
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut attributes = Attributes::new();
        for (key, value) in iter {
            attributes.set(key, value);
        }
        attributes
    }
}
