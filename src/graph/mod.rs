//! Output graph: the sink contract the engine writes to, and its oxigraph store.
//!
//! The engine only talks to [`GraphSink`]. [`RdfGraph`] implements it on an
//! in-memory oxigraph store and serializes to the usual RDF syntaxes.

pub mod store;

use std::fmt;
use std::str::FromStr;

use oxigraph::io::RdfFormat;
use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::generator::GeneratedValue;
use crate::model::namespace::RDF_TYPE;

pub use self::store::RdfGraph;

/// One statement bound for the output graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub subject: String,
    pub predicate: String,
    pub object: GeneratedValue,
    /// Target named graph; `None` is the default graph.
    pub graph: Option<String>,
}

impl Statement {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: GeneratedValue,
        graph: Option<&str>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object,
            graph: graph.map(str::to_string),
        }
    }
}

/// Receives statements produced by a run.
///
/// `graph` names the target graph; `None` is the default graph.
pub trait GraphSink {
    /// Write every statement or none of them. A rejected term leaves the sink
    /// unchanged. Returns how many statements were new.
    fn add_statements(&mut self, statements: &[Statement]) -> Result<usize, GraphError>;

    /// Write one statement; returns whether it was new.
    fn add_property(
        &mut self,
        subject: &str,
        predicate: &str,
        object: &GeneratedValue,
        graph: Option<&str>,
    ) -> Result<bool, GraphError> {
        let added = self.add_statements(&[Statement::new(subject, predicate, object.clone(), graph)])?;
        Ok(added == 1)
    }

    fn add_type(&mut self, subject: &str, type_iri: &str, graph: Option<&str>) -> Result<bool, GraphError> {
        self.add_property(subject, RDF_TYPE, &GeneratedValue::uri(type_iri), graph)
    }

    fn add_literal(
        &mut self,
        subject: &str,
        predicate: &str,
        value: &str,
        language: Option<&str>,
        graph: Option<&str>,
    ) -> Result<bool, GraphError> {
        let literal = GeneratedValue::literal(value, language.map(str::to_string));
        self.add_property(subject, predicate, &literal, graph)
    }
}

/// Serialization syntax of the output graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    RdfXml,
    Turtle,
    #[serde(rename = "ntriples")]
    #[value(name = "ntriples")]
    NTriples,
    #[serde(rename = "nquads")]
    #[value(name = "nquads")]
    NQuads,
    #[serde(rename = "trig")]
    #[value(name = "trig")]
    TriG,
}

impl OutputFormat {
    pub fn rdf_format(self) -> RdfFormat {
        match self {
            OutputFormat::RdfXml => RdfFormat::RdfXml,
            OutputFormat::Turtle => RdfFormat::Turtle,
            OutputFormat::NTriples => RdfFormat::NTriples,
            OutputFormat::NQuads => RdfFormat::NQuads,
            OutputFormat::TriG => RdfFormat::TriG,
        }
    }

    /// Whether named graphs survive serialization.
    pub fn supports_named_graphs(self) -> bool {
        self.rdf_format().supports_datasets()
    }

    fn name(self) -> &'static str {
        match self {
            OutputFormat::RdfXml => "rdf-xml",
            OutputFormat::Turtle => "turtle",
            OutputFormat::NTriples => "ntriples",
            OutputFormat::NQuads => "nquads",
            OutputFormat::TriG => "trig",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rdf-xml" | "rdfxml" | "xml" => Ok(OutputFormat::RdfXml),
            "turtle" | "ttl" => Ok(OutputFormat::Turtle),
            "ntriples" | "nt" => Ok(OutputFormat::NTriples),
            "nquads" | "nq" => Ok(OutputFormat::NQuads),
            "trig" => Ok(OutputFormat::TriG),
            other => Err(format!("unknown output format \"{other}\"")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_round_trip() {
        for format in [
            OutputFormat::RdfXml,
            OutputFormat::Turtle,
            OutputFormat::NTriples,
            OutputFormat::NQuads,
            OutputFormat::TriG,
        ] {
            assert_eq!(format.to_string().parse::<OutputFormat>().unwrap(), format);
        }
        assert!("json".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn only_dataset_formats_keep_graphs() {
        assert!(OutputFormat::TriG.supports_named_graphs());
        assert!(!OutputFormat::Turtle.supports_named_graphs());
    }

    #[test]
    fn serde_uses_cli_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            format: OutputFormat,
        }
        let w: Wrapper = toml::from_str("format = \"ntriples\"").unwrap();
        assert_eq!(w.format, OutputFormat::NTriples);
        let w: Wrapper = toml::from_str("format = \"rdf-xml\"").unwrap();
        assert_eq!(w.format, OutputFormat::RdfXml);
    }
}
