//! Pluggable value generators.
//!
//! A generator policy entry may name a `custom` implementation class instead of a
//! pattern. Implementations are looked up in an explicit
//! [`CustomGeneratorRegistry`] by class name; a fresh instance is created for
//! every value, fed its arguments by name, and then asked for its value.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// What a custom generator produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// A URI, prefixed with the policy namespace when relative.
    Uri,
    /// An already absolute identifier; never prefixed.
    Uuid,
    Literal,
}

/// Failure reported by a custom generator.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct CustomGeneratorFailure(pub String);

/// Contract of a custom generator implementation.
pub trait CustomGenerator {
    fn set_argument(&mut self, name: &str, value: &str) -> Result<(), CustomGeneratorFailure>;

    fn value(&self) -> Result<String, CustomGeneratorFailure>;

    fn value_kind(&self) -> ValueKind;

    /// Whether repeated source values arrive joined with the merge delimiter
    /// instead of only the first one.
    fn merges_arguments(&self) -> bool {
        false
    }

    /// Whether a relative URI value is prefixed with the policy namespace.
    fn uses_namespace(&self) -> bool {
        false
    }
}

/// Creates a generator instance. Receives the run's merge delimiter.
pub type CustomGeneratorFactory = Arc<dyn Fn(&str) -> Box<dyn CustomGenerator> + Send + Sync>;

/// Class name → factory table.
#[derive(Clone)]
pub struct CustomGeneratorRegistry {
    factories: BTreeMap<String, CustomGeneratorFactory>,
}

impl CustomGeneratorRegistry {
    /// Registry without any implementation.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    pub fn register<F>(&mut self, class: impl Into<String>, factory: F)
    where
        F: Fn(&str) -> Box<dyn CustomGenerator> + Send + Sync + 'static,
    {
        self.factories.insert(class.into(), Arc::new(factory));
    }

    pub fn with<F>(mut self, class: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&str) -> Box<dyn CustomGenerator> + Send + Sync + 'static,
    {
        self.register(class, factory);
        self
    }

    pub fn contains(&self, class: &str) -> bool {
        self.factories.contains_key(class)
    }

    pub fn create(&self, class: &str, merge_delimiter: &str) -> Option<Box<dyn CustomGenerator>> {
        self.factories.get(class).map(|factory| factory(merge_delimiter))
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl Default for CustomGeneratorRegistry {
    /// Registry holding the bundled generators under their full and short names.
    fn default() -> Self {
        let mut registry = Self::empty();
        for class in ["gr.forth.ConcatMultipleTerms", "ConcatMultipleTerms"] {
            registry.register(class, |delimiter| Box::new(ConcatMultipleTerms::new(delimiter)));
        }
        for class in ["gr.forth.UriExistingOrNew", "UriExistingOrNew"] {
            registry.register(class, |_| Box::new(UriExistingOrNew::default()));
        }
        registry
    }
}

impl fmt::Debug for CustomGeneratorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

/// Joins every value of a repeated element into one literal.
///
/// Arguments: `text` (merged), `delimiter` (default a single space).
#[derive(Debug)]
pub struct ConcatMultipleTerms {
    merge_delimiter: String,
    text: String,
    delimiter: String,
}

impl ConcatMultipleTerms {
    pub fn new(merge_delimiter: &str) -> Self {
        Self {
            merge_delimiter: merge_delimiter.to_string(),
            text: String::new(),
            delimiter: " ".to_string(),
        }
    }
}

impl CustomGenerator for ConcatMultipleTerms {
    fn set_argument(&mut self, name: &str, value: &str) -> Result<(), CustomGeneratorFailure> {
        match name {
            "text" => self.text = value.to_string(),
            "delimiter" => self.delimiter = value.to_string(),
            other => return Err(CustomGeneratorFailure(format!("unexpected argument \"{other}\""))),
        }
        Ok(())
    }

    fn value(&self) -> Result<String, CustomGeneratorFailure> {
        Ok(self
            .text
            .split(self.merge_delimiter.as_str())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(&self.delimiter))
    }

    fn value_kind(&self) -> ValueKind {
        ValueKind::Literal
    }

    fn merges_arguments(&self) -> bool {
        true
    }
}

/// Reuses an identifier from the source when present, otherwise builds one.
///
/// Arguments: `uri`, or `text1`…`textN` joined with `/`.
#[derive(Debug, Default)]
pub struct UriExistingOrNew {
    uri: String,
    texts: BTreeMap<usize, String>,
}

impl CustomGenerator for UriExistingOrNew {
    fn set_argument(&mut self, name: &str, value: &str) -> Result<(), CustomGeneratorFailure> {
        if name == "uri" {
            self.uri = value.trim().to_string();
            return Ok(());
        }
        let index = name
            .strip_prefix("text")
            .and_then(|n| n.parse::<usize>().ok())
            .ok_or_else(|| CustomGeneratorFailure(format!("unexpected argument \"{name}\"")))?;
        self.texts.insert(index, value.trim().to_string());
        Ok(())
    }

    fn value(&self) -> Result<String, CustomGeneratorFailure> {
        if !self.uri.is_empty() {
            return Ok(self.uri.clone());
        }
        let parts: Vec<&str> = self
            .texts
            .values()
            .map(String::as_str)
            .filter(|t| !t.is_empty())
            .collect();
        if parts.is_empty() {
            return Err(CustomGeneratorFailure("neither uri nor any text argument has a value".into()));
        }
        Ok(parts.join("/"))
    }

    fn value_kind(&self) -> ValueKind {
        ValueKind::Uri
    }

    fn uses_namespace(&self) -> bool {
        true
    }
}
