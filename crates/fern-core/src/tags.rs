//! Resource tags.
//!
//! Tags are a set keyed by tag key: adding an existing key replaces its value
//! and removing a key is idempotent. Iteration is in key order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single key/value tag as exchanged with callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// An ordered tag set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a tag, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove a tag by key.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Look up a tag value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Apply removals first, then additions.
    pub fn apply<I, R>(&mut self, add: I, remove: R)
    where
        I: IntoIterator<Item = Tag>,
        R: IntoIterator,
        R::Item: AsRef<str>,
    {
        for key in remove {
            self.0.remove(key.as_ref());
        }
        self.extend(add);
    }

    /// Number of tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tags in key order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Tag> {
        self.0.iter().map(|(k, v)| Tag::new(k.clone(), v.clone())).collect()
    }

    /// Iterate `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Extend<Tag> for TagSet {
    fn extend<I: IntoIterator<Item = Tag>>(&mut self, iter: I) {
        for tag in iter {
            self.0.insert(tag.key, tag.value);
        }
    }
}

impl FromIterator<Tag> for TagSet {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn later_duplicate_key_wins() {
        let set: TagSet = [Tag::new("env", "dev"), Tag::new("env", "prod")].into_iter().collect();
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("env"), Some("prod"));
    }

    #[test]
    fn removals_apply_before_additions() {
        let mut set: TagSet = [Tag::new("a", "1"), Tag::new("b", "2")].into_iter().collect();
        set.apply([Tag::new("a", "new")], ["a", "b", "missing"]);
        assert_eq!(set.to_vec(), vec![Tag::new("a", "new")]);
    }

    #[test]
    fn serializes_as_plain_map() {
        let set: TagSet = [Tag::new("team", "dns")].into_iter().collect();
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"{"team":"dns"}"#);
    }
}
