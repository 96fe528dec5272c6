//! In-memory RDF graph backed by oxigraph.

use std::io::Write;

use oxigraph::io::RdfSerializer;
use oxigraph::model::{GraphName, Literal, NamedNode, Quad, Term, TripleRef};
use oxigraph::store::Store;

use crate::error::GraphError;
use crate::generator::GeneratedValue;
use crate::model::Namespaces;
use crate::model::namespace::RDF_TYPE;

use super::{GraphSink, OutputFormat, Statement};

/// RDF dataset produced by one run.
pub struct RdfGraph {
    store: Store,
    prefixes: Vec<(String, String)>,
}

impl RdfGraph {
    pub fn new() -> Result<Self, GraphError> {
        let store = Store::new().map_err(|e| GraphError::Store {
            message: format!("failed to create oxigraph store: {e}"),
        })?;
        Ok(Self {
            store,
            prefixes: Vec::new(),
        })
    }

    /// Register the prefixes used when serializing to Turtle, TriG or RDF/XML.
    pub fn with_prefixes(mut self, namespaces: &Namespaces) -> Self {
        self.set_prefixes(namespaces);
        self
    }

    pub fn set_prefixes(&mut self, namespaces: &Namespaces) {
        self.prefixes = namespaces
            .iter()
            .map(|(p, iri)| (p.to_string(), iri.to_string()))
            .collect();
    }

    /// Number of quads.
    pub fn len(&self) -> usize {
        self.store.len().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the statement exists in any graph.
    pub fn contains(&self, subject: &str, predicate: &str, object: &GeneratedValue) -> bool {
        let (Ok(s), Ok(p), Ok(o)) = (named_node(subject), named_node(predicate), object_term(object)) else {
            return false;
        };
        self.store
            .quads_for_pattern(Some(s.as_ref().into()), Some(p.as_ref()), Some(o.as_ref()), None)
            .next()
            .is_some()
    }

    /// Whether the statement exists in the named graph `graph` (`None`: default graph).
    pub fn contains_in(&self, subject: &str, predicate: &str, object: &GeneratedValue, graph: Option<&str>) -> bool {
        match quad(subject, predicate, object, graph) {
            Ok(q) => self.store.contains(&q).unwrap_or(false),
            Err(_) => false,
        }
    }

    /// All quads in storage order.
    pub fn quads(&self) -> Result<Vec<Quad>, GraphError> {
        self.store
            .iter()
            .map(|q| {
                q.map_err(|e| GraphError::Store {
                    message: format!("iteration failed: {e}"),
                })
            })
            .collect()
    }

    /// Objects of `(subject, predicate, ?)` across graphs, as lexical values, sorted.
    pub fn objects(&self, subject: &str, predicate: &str) -> Vec<String> {
        let (Ok(s), Ok(p)) = (named_node(subject), named_node(predicate)) else {
            return Vec::new();
        };
        let mut values: Vec<String> = self
            .store
            .quads_for_pattern(Some(s.as_ref().into()), Some(p.as_ref()), None, None)
            .filter_map(Result::ok)
            .map(|q| lexical(&q.object))
            .collect();
        values.sort();
        values.dedup();
        values
    }

    /// Subjects typed with `type_iri`, sorted.
    pub fn subjects_of_type(&self, type_iri: &str) -> Vec<String> {
        let Ok(t) = named_node(type_iri) else {
            return Vec::new();
        };
        let rdf_type = NamedNode::new_unchecked(RDF_TYPE);
        let mut subjects: Vec<String> = self
            .store
            .quads_for_pattern(None, Some(rdf_type.as_ref()), Some(t.as_ref().into()), None)
            .filter_map(Result::ok)
            .map(|q| q.subject.to_string().trim_matches(|c| c == '<' || c == '>').to_string())
            .collect();
        subjects.sort();
        subjects.dedup();
        subjects
    }

    /// Sorted N-Quads lines, for order-independent comparison of runs.
    pub fn to_canonical_lines(&self) -> Result<Vec<String>, GraphError> {
        let mut lines: Vec<String> = self.quads()?.iter().map(|q| format!("{q} .")).collect();
        lines.sort();
        Ok(lines)
    }

    /// Write the graph in `format`. Triple formats flatten named graphs.
    pub fn serialize<W: Write>(&self, format: OutputFormat, writer: W) -> Result<W, GraphError> {
        let mut serializer = RdfSerializer::from_format(format.rdf_format());
        for (prefix, iri) in &self.prefixes {
            serializer = serializer
                .with_prefix(prefix.as_str(), iri.as_str())
                .map_err(|e| GraphError::Serialize {
                    message: format!("invalid prefix {prefix}: {e}"),
                })?;
        }
        let mut out = serializer.for_writer(writer);
        let datasets = format.supports_named_graphs();
        let mut flattened = 0usize;
        for quad in self.quads()? {
            let written = if datasets {
                out.serialize_quad(&quad)
            } else {
                if !quad.graph_name.is_default_graph() {
                    flattened += 1;
                }
                out.serialize_triple(TripleRef::from(quad.as_ref()))
            };
            written.map_err(|e| GraphError::Serialize { message: e.to_string() })?;
        }
        if flattened > 0 {
            tracing::warn!(%format, statements = flattened, "named graphs flattened into the default graph");
        }
        out.finish().map_err(|e| GraphError::Serialize { message: e.to_string() })
    }

    /// Serialize to a string.
    pub fn to_string_in(&self, format: OutputFormat) -> Result<String, GraphError> {
        let bytes = self.serialize(format, Vec::new())?;
        String::from_utf8(bytes).map_err(|e| GraphError::Serialize { message: e.to_string() })
    }

    /// Insert one quad; returns whether it was new.
    fn insert(&self, q: &Quad) -> Result<bool, GraphError> {
        let store_error = |e: oxigraph::store::StorageError| GraphError::Store {
            message: format!("insert failed: {e}"),
        };
        if self.store.contains(q).map_err(store_error)? {
            return Ok(false);
        }
        self.store.insert(q).map_err(store_error)?;
        Ok(true)
    }

    /// Underlying store, for SPARQL over the result.
    pub fn store(&self) -> &Store {
        &self.store
    }
}

impl GraphSink for RdfGraph {
    fn add_statements(&mut self, statements: &[Statement]) -> Result<usize, GraphError> {
        let quads = statements
            .iter()
            .map(|s| quad(&s.subject, &s.predicate, &s.object, s.graph.as_deref()))
            .collect::<Result<Vec<_>, _>>()?;
        let mut added = 0;
        for q in &quads {
            if self.insert(q)? {
                added += 1;
            }
        }
        Ok(added)
    }
}

impl std::fmt::Debug for RdfGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RdfGraph").field("quads", &self.len()).finish()
    }
}

fn named_node(iri: &str) -> Result<NamedNode, GraphError> {
    NamedNode::new(iri).map_err(|e| GraphError::InvalidTerm {
        value: iri.to_string(),
        message: e.to_string(),
    })
}

fn object_term(value: &GeneratedValue) -> Result<Term, GraphError> {
    Ok(match value {
        GeneratedValue::Uri(iri) => named_node(iri)?.into(),
        GeneratedValue::Literal {
            value,
            language: Some(language),
        } => Literal::new_language_tagged_literal(value.as_str(), language.as_str())
            .map_err(|e| GraphError::InvalidTerm {
                value: language.clone(),
                message: e.to_string(),
            })?
            .into(),
        GeneratedValue::Literal { value, language: None } => Literal::new_simple_literal(value.as_str()).into(),
        GeneratedValue::TypedLiteral { value, datatype } => {
            Literal::new_typed_literal(value.as_str(), named_node(datatype)?).into()
        }
    })
}

fn quad(subject: &str, predicate: &str, object: &GeneratedValue, graph: Option<&str>) -> Result<Quad, GraphError> {
    let graph_name = match graph {
        Some(g) => GraphName::NamedNode(named_node(g)?),
        None => GraphName::DefaultGraph,
    };
    Ok(Quad::new(
        named_node(subject)?,
        named_node(predicate)?,
        object_term(object)?,
        graph_name,
    ))
}

fn lexical(term: &Term) -> String {
    match term {
        Term::NamedNode(n) => n.as_str().to_string(),
        Term::Literal(l) => l.value().to_string(),
        other => other.to_string(),
    }
}
