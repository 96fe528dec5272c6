//! Terminology service: broader, narrower and exact-match queries over a SKOS vocabulary.
//!
//! The engine only consumes the [`Terminology`] trait. [`SkosTerminology`] answers
//! it from an in-memory oxigraph store with SPARQL property paths, so broader
//! terms are the transitive closure over `skos:broader` and inverse
//! `skos:narrower`. [`StaticTerminology`] is a plain in-memory table for tests and
//! embedders that already hold their vocabulary.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::Path;

use oxigraph::io::RdfFormat;
use oxigraph::model::{Literal, NamedNode, Term};
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;

use crate::error::TerminologyError;
use crate::model::namespace::SKOS;

/// Read-only vocabulary queries used by `broader`, `narrower` and `exact_match` conditions.
pub trait Terminology {
    /// Terms broader than `term`, transitively.
    fn broader_terms_of(&self, term: &str) -> Result<Vec<String>, TerminologyError>;

    /// Terms narrower than `term`, transitively.
    fn narrower_terms_of(&self, term: &str) -> Result<Vec<String>, TerminologyError>;

    /// Terms declared equivalent to `term`, transitively and in both directions.
    fn exact_match_terms_of(&self, term: &str) -> Result<Vec<String>, TerminologyError>;
}

const BROADER_PATH: &str = "(skos:broader|^skos:narrower)+";
const NARROWER_PATH: &str = "(skos:narrower|^skos:broader)+";
const EXACT_MATCH_PATH: &str = "(skos:exactMatch|^skos:exactMatch)+";

/// SKOS vocabulary held in an oxigraph store.
///
/// Terms are matched by concept IRI or by `skos:prefLabel`; results carry both the
/// IRIs and the preferred labels of the reached concepts.
pub struct SkosTerminology {
    store: Store,
}

impl SkosTerminology {
    /// Empty vocabulary.
    pub fn new() -> Result<Self, TerminologyError> {
        let store = Store::new().map_err(|e| TerminologyError::Load {
            message: format!("failed to create oxigraph store: {e}"),
        })?;
        Ok(Self { store })
    }

    /// Parse a vocabulary from a string in the given format.
    pub fn parse(data: &str, format: RdfFormat) -> Result<Self, TerminologyError> {
        let terminology = Self::new()?;
        terminology
            .store
            .load_from_reader(format, data.as_bytes())
            .map_err(|e| TerminologyError::Load {
                message: e.to_string(),
            })?;
        Ok(terminology)
    }

    /// Load a vocabulary file, choosing the syntax from its extension.
    pub fn load(path: &Path) -> Result<Self, TerminologyError> {
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some("ttl") => RdfFormat::Turtle,
            Some("nt") => RdfFormat::NTriples,
            Some("rdf" | "xml" | "owl") => RdfFormat::RdfXml,
            other => {
                return Err(TerminologyError::Load {
                    message: format!(
                        "unsupported terminology extension {:?} for {}",
                        other.unwrap_or(""),
                        path.display()
                    ),
                });
            }
        };
        let data = std::fs::read_to_string(path).map_err(|e| TerminologyError::Load {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        let terminology = Self::parse(&data, format)?;
        tracing::info!(path = %path.display(), statements = terminology.len(), "terminology loaded");
        Ok(terminology)
    }

    /// Number of statements in the vocabulary.
    pub fn len(&self) -> usize {
        self.store.len().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn reachable(&self, term: &str, path: &str) -> Result<Vec<String>, TerminologyError> {
        let label = Literal::new_simple_literal(term);
        let by_iri = match NamedNode::new(term) {
            Ok(iri) => format!(" UNION {{ VALUES ?c {{ {iri} }} }}"),
            Err(_) => String::new(),
        };
        let sparql = format!(
            "PREFIX skos: <{SKOS}>
             SELECT DISTINCT ?b ?label WHERE {{
               {{ ?c skos:prefLabel ?cl . FILTER(STR(?cl) = {label}) }}{by_iri}
               ?c {path} ?b .
               OPTIONAL {{ ?b skos:prefLabel ?label }}
             }}"
        );
        let results = self.store.query(&sparql).map_err(|e| TerminologyError::Query {
            message: format!("SPARQL query failed: {e}"),
        })?;

        let mut terms = BTreeSet::new();
        match results {
            QueryResults::Solutions(solutions) => {
                for solution in solutions {
                    let solution = solution.map_err(|e| TerminologyError::Query {
                        message: format!("solution error: {e}"),
                    })?;
                    for var in ["b", "label"] {
                        match solution.get(var) {
                            Some(Term::NamedNode(n)) => {
                                terms.insert(n.as_str().to_string());
                            }
                            Some(Term::Literal(l)) => {
                                terms.insert(l.value().to_string());
                            }
                            _ => {}
                        }
                    }
                }
            }
            _ => {
                return Err(TerminologyError::Query {
                    message: "unexpected result type from terminology query".into(),
                });
            }
        }
        Ok(terms.into_iter().collect())
    }
}

impl Terminology for SkosTerminology {
    fn broader_terms_of(&self, term: &str) -> Result<Vec<String>, TerminologyError> {
        self.reachable(term, BROADER_PATH)
    }

    fn narrower_terms_of(&self, term: &str) -> Result<Vec<String>, TerminologyError> {
        self.reachable(term, NARROWER_PATH)
    }

    fn exact_match_terms_of(&self, term: &str) -> Result<Vec<String>, TerminologyError> {
        self.reachable(term, EXACT_MATCH_PATH)
    }
}

impl std::fmt::Debug for SkosTerminology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkosTerminology").finish()
    }
}

/// In-memory term table. Lookups follow the declared edges transitively.
#[derive(Debug, Clone, Default)]
pub struct StaticTerminology {
    broader: HashMap<String, Vec<String>>,
    exact: HashMap<String, Vec<String>>,
}

impl StaticTerminology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `broader` as a direct broader term of `term`.
    pub fn with_broader(mut self, term: impl Into<String>, broader: impl Into<String>) -> Self {
        self.broader.entry(term.into()).or_default().push(broader.into());
        self
    }

    /// Declare `a` and `b` as exact matches of each other.
    pub fn with_exact_match(mut self, a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        self.exact.entry(a.clone()).or_default().push(b.clone());
        self.exact.entry(b).or_default().push(a);
        self
    }

    fn closure(edges: &HashMap<String, Vec<String>>, term: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([term]);
        while let Some(current) = queue.pop_front() {
            for next in edges.get(current).into_iter().flatten() {
                if seen.insert(next.clone()) {
                    queue.push_back(next);
                }
            }
        }
        seen.into_iter().collect()
    }
}

impl Terminology for StaticTerminology {
    fn broader_terms_of(&self, term: &str) -> Result<Vec<String>, TerminologyError> {
        Ok(Self::closure(&self.broader, term))
    }

    fn narrower_terms_of(&self, term: &str) -> Result<Vec<String>, TerminologyError> {
        let mut narrower: HashMap<String, Vec<String>> = HashMap::new();
        for (child, parents) in &self.broader {
            for parent in parents {
                narrower.entry(parent.clone()).or_default().push(child.clone());
            }
        }
        Ok(Self::closure(&narrower, term))
    }

    fn exact_match_terms_of(&self, term: &str) -> Result<Vec<String>, TerminologyError> {
        let mut terms = Self::closure(&self.exact, term);
        terms.retain(|t| t != term);
        Ok(terms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOCAB: &str = r#"
@prefix skos: <http://www.w3.org/2004/02/skos/core#> .
@prefix ex: <http://example.org/> .
ex:painting skos:prefLabel "painting" ; skos:broader ex:artwork .
ex:artwork skos:prefLabel "artwork" .
ex:object skos:prefLabel "object" ; skos:narrower ex:artwork .
ex:gemaelde skos:prefLabel "Gemälde" ; skos:exactMatch ex:painting .
"#;

    #[test]
    fn skos_broader_is_transitive_over_both_directions() {
        let t = SkosTerminology::parse(VOCAB, RdfFormat::Turtle).unwrap();
        let broader = t.broader_terms_of("painting").unwrap();
        assert!(broader.contains(&"artwork".to_string()));
        assert!(broader.contains(&"object".to_string()));
        assert!(broader.contains(&"http://example.org/object".to_string()));
        assert!(!broader.contains(&"painting".to_string()));
    }

    #[test]
    fn skos_narrower_inverts_broader() {
        let t = SkosTerminology::parse(VOCAB, RdfFormat::Turtle).unwrap();
        let narrower = t.narrower_terms_of("object").unwrap();
        assert!(narrower.contains(&"artwork".to_string()));
        assert!(narrower.contains(&"painting".to_string()));
        assert!(t.narrower_terms_of("painting").unwrap().is_empty());
    }

    #[test]
    fn skos_terms_match_by_iri() {
        let t = SkosTerminology::parse(VOCAB, RdfFormat::Turtle).unwrap();
        let broader = t.broader_terms_of("http://example.org/artwork").unwrap();
        assert_eq!(broader, vec!["http://example.org/object".to_string(), "object".to_string()]);
    }

    #[test]
    fn skos_exact_match_is_symmetric() {
        let t = SkosTerminology::parse(VOCAB, RdfFormat::Turtle).unwrap();
        assert!(t.exact_match_terms_of("painting").unwrap().contains(&"Gemälde".to_string()));
        assert!(t.exact_match_terms_of("Gemälde").unwrap().contains(&"painting".to_string()));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = SkosTerminology::load(Path::new("vocab.csv")).unwrap_err();
        assert!(matches!(err, TerminologyError::Load { .. }));
    }

    #[test]
    fn static_terminology_walks_edges() {
        let t = StaticTerminology::new()
            .with_broader("oil painting", "painting")
            .with_broader("painting", "artwork")
            .with_exact_match("painting", "Gemälde");
        assert_eq!(t.broader_terms_of("oil painting").unwrap(), vec!["artwork", "painting"]);
        assert_eq!(t.exact_match_terms_of("Gemälde").unwrap(), vec!["painting"]);
        assert!(t.broader_terms_of("artwork").unwrap().is_empty());
        assert_eq!(t.narrower_terms_of("artwork").unwrap(), vec!["oil painting", "painting"]);
    }
}
