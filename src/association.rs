//! Association table: which source location produced which value.
//!
//! Reverse-mapping tools read it to go from an output resource back to the XML
//! node it was generated from.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// One `xpath ⇄ value` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Association {
    pub xpath: String,
    pub value: String,
}

/// Insertion-ordered, duplicate-free association list.
#[derive(Debug, Clone, Default)]
pub struct AssociationTable {
    entries: Vec<Association>,
    seen: HashSet<Association>,
}

impl AssociationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pair; returns `false` when it was already present.
    pub fn record(&mut self, xpath: impl Into<String>, value: impl Into<String>) -> bool {
        let entry = Association {
            xpath: xpath.into(),
            value: value.into(),
        };
        if self.seen.contains(&entry) {
            return false;
        }
        self.seen.insert(entry.clone());
        self.entries.push(entry);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Association> {
        self.entries.iter()
    }

    /// Values produced from `xpath`.
    pub fn values_for(&self, xpath: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|a| a.xpath == xpath)
            .map(|a| a.value.as_str())
            .collect()
    }

    /// Source locations that produced `value`.
    pub fn xpaths_for(&self, value: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|a| a.value == value)
            .map(|a| a.xpath.as_str())
            .collect()
    }

    /// JSON array of `{ "xpath": …, "value": … }` objects.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.entries)
    }
}
