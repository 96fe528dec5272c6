// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # x3ml
//!
//! An X3ML mapping engine: applies a declarative mapping document to an XML
//! source and produces an RDF graph, typically CIDOC-CRM shaped.
//!
//! ## Architecture
//!
//! - **Mapping model** (`model`): the domain/path/range rule tree and its loader
//! - **Source adapter** (`source`): XPath subset over `roxmltree`, join indexes
//! - **Conditions** (`condition`): `exists`/`equals`/`broader`/`narrower`/`exact_match` trees
//! - **Generators** (`generator`): built-ins, URI templates, custom plugins
//! - **Engine** (`engine`): context chain, entity resolution, linking
//! - **Graph** (`graph`): oxigraph-backed output with RDF/XML, Turtle, N-Triples, N-Quads, TriG
//!
//! ## Library usage
//!
//! ```no_run
//! use x3ml::engine::Engine;
//! use x3ml::generator::GeneratorPolicy;
//! use x3ml::graph::OutputFormat;
//! use x3ml::model::loader::load_mapping;
//!
//! let mapping = load_mapping(&std::fs::read_to_string("mapping.x3ml").unwrap()).unwrap();
//! let engine = Engine::new(mapping, GeneratorPolicy::default());
//! let report = engine.execute_str("<people><person><name>Ada</name></person></people>").unwrap();
//! for diagnostic in &report.diagnostics {
//!     eprintln!("{}: {}", diagnostic.xpath, diagnostic.message);
//! }
//! println!("{}", report.graph.to_string_in(OutputFormat::Turtle).unwrap());
//! ```

pub mod association;
pub mod condition;
pub mod config;
pub mod engine;
pub mod error;
pub mod generator;
pub mod graph;
pub mod model;
pub mod source;
pub mod terminology;

pub use engine::{Engine, RunDiagnostic, RunReport, RunStats};
pub use error::{X3mlError, X3mlResult};
