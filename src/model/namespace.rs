//! Namespace prefix table shared by types, relationships and source XPaths.

use std::collections::BTreeMap;

use crate::error::ConfigError;

pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDFS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";
pub const SKOS: &str = "http://www.w3.org/2004/02/skos/core#";
pub const OWL: &str = "http://www.w3.org/2002/07/owl#";

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDFS_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";
pub const RDFS_LITERAL: &str = "http://www.w3.org/2000/01/rdf-schema#Literal";
pub const SKOS_PREF_LABEL: &str = "http://www.w3.org/2004/02/skos/core#prefLabel";
pub const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";

/// Prefix → namespace IRI table.
///
/// Always knows `rdf`, `rdfs`, `xsd`, `skos` and `owl`; documents add their own.
#[derive(Debug, Clone, PartialEq)]
pub struct Namespaces {
    prefixes: BTreeMap<String, String>,
}

impl Default for Namespaces {
    fn default() -> Self {
        let prefixes = [
            ("rdf", RDF),
            ("rdfs", RDFS),
            ("xsd", XSD),
            ("skos", SKOS),
            ("owl", OWL),
        ]
        .into_iter()
        .map(|(p, iri)| (p.to_string(), iri.to_string()))
        .collect();
        Self { prefixes }
    }
}

impl Namespaces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>, iri: impl Into<String>) -> Self {
        self.insert(prefix, iri);
        self
    }

    pub fn insert(&mut self, prefix: impl Into<String>, iri: impl Into<String>) {
        self.prefixes.insert(prefix.into(), iri.into());
    }

    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prefixes.iter().map(|(p, i)| (p.as_str(), i.as_str()))
    }

    /// Expand a prefixed name (`crm:E21_Person`) to an absolute IRI.
    ///
    /// Absolute IRIs and `<...>`-wrapped IRIs pass through unchanged.
    pub fn expand(&self, qname: &str) -> Result<String, ConfigError> {
        let qname = qname.trim();
        if let Some(inner) = qname.strip_prefix('<').and_then(|q| q.strip_suffix('>')) {
            return Ok(inner.to_string());
        }
        if is_absolute_iri(qname) {
            return Ok(qname.to_string());
        }
        match qname.split_once(':') {
            Some((prefix, local)) => match self.prefixes.get(prefix) {
                Some(ns) => Ok(format!("{ns}{local}")),
                None => Err(ConfigError::UnknownPrefix {
                    prefix: prefix.to_string(),
                    qname: qname.to_string(),
                }),
            },
            None => Err(ConfigError::UnknownPrefix {
                prefix: String::new(),
                qname: qname.to_string(),
            }),
        }
    }
}

/// Whether a value already is an absolute IRI and must not be prefixed again.
pub fn is_absolute_iri(value: &str) -> bool {
    value.contains("://") || value.starts_with("urn:") || value.starts_with("uuid:")
}
