//! Rich diagnostic error types for the X3ML engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. Errors fall into two families:
//!
//! - **fatal** ([`ConfigError`], [`TerminologyError`], [`LoadError`], [`GraphError`]):
//!   abort the run and surface as [`X3mlError`];
//! - **recoverable** ([`ResolutionError`]): dropped at the domain/link boundary and
//!   recorded as a run diagnostic.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the X3ML engine.
#[derive(Debug, Error, Diagnostic)]
pub enum X3mlError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Terminology(#[from] TerminologyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    ConfigFile(#[from] ConfigFileError),
}

// ---------------------------------------------------------------------------
// Configuration errors (fatal)
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown generator: \"{name}\"")]
    #[diagnostic(
        code(x3ml::config::unknown_generator),
        help(
            "The generator is neither a built-in (UUID, Literal, Constant, prefLabel, \
             namedgraphURI) nor declared in the generator policy. Add it to the policy \
             document or fix the name in the mapping."
        )
    )]
    UnknownGenerator { name: String },

    #[error("generator \"{generator}\" has no argument \"{argument}\"")]
    #[diagnostic(
        code(x3ml::config::missing_argument),
        help("Declare the argument in the mapping's generator call: <arg name=\"{argument}\">.")
    )]
    MissingArgument { generator: String, argument: String },

    #[error("typed literal needs exactly one target type, found {count}")]
    #[diagnostic(
        code(x3ml::config::ambiguous_typed_literal),
        help(
            "An entity producing a literal value must declare a single type, \
             e.g. rdfs:Literal or xsd:dateTime."
        )
    )]
    AmbiguousTypedLiteral { count: usize },

    #[error("target relation has {relationships} relationship(s) for {entities} intermediate entit(y/ies)")]
    #[diagnostic(
        code(x3ml::config::malformed_relation),
        help("A path's target relation alternates relationship/entity and must end with a relationship.")
    )]
    MalformedRelation {
        relationships: usize,
        entities: usize,
    },

    #[error("entity has neither an instance generator nor a variable reference")]
    #[diagnostic(
        code(x3ml::config::missing_instance_generator),
        help("Add an <instance_generator> to the entity or give it a variable bound elsewhere.")
    )]
    MissingInstanceGenerator,

    #[error("entity declares no target type")]
    #[diagnostic(
        code(x3ml::config::missing_type),
        help("Every entity needs at least one <type> element.")
    )]
    MissingType,

    #[error("unknown namespace prefix \"{prefix}\" in \"{qname}\"")]
    #[diagnostic(
        code(x3ml::config::unknown_prefix),
        help("Declare the prefix in the mapping's <namespaces> block.")
    )]
    UnknownPrefix { prefix: String, qname: String },

    #[error("invalid IRI \"{iri}\": {message}")]
    #[diagnostic(
        code(x3ml::config::invalid_iri),
        help("Type and relationship names must expand to absolute IRIs.")
    )]
    InvalidIri { iri: String, message: String },

    #[error("invalid XPath expression \"{expression}\": {message}")]
    #[diagnostic(
        code(x3ml::config::xpath),
        help("Only an XPath 1.0 subset is supported; see the source module documentation.")
    )]
    XPath { expression: String, message: String },

    #[error("unknown custom generator class \"{class}\"")]
    #[diagnostic(
        code(x3ml::config::unknown_custom_generator),
        help("Register the implementation with CustomGeneratorRegistry::register before running.")
    )]
    UnknownCustomGenerator { class: String },

    #[error("malformed equality join \"{relation}\"")]
    #[diagnostic(
        code(x3ml::config::malformed_join),
        help(
            "A join relation has the form `domainKey==rangeKey`, optionally followed by \
             one intermediate <node> and a second `key==key` relation."
        )
    )]
    MalformedJoin { relation: String },
}

// ---------------------------------------------------------------------------
// Resolution errors (recoverable)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error, Diagnostic)]
pub enum ResolutionError {
    #[error("no value for argument \"{argument}\" of generator \"{generator}\"")]
    #[diagnostic(code(x3ml::resolve::missing_value))]
    MissingValue { generator: String, argument: String },

    #[error("generator \"{generator}\" produced an empty literal")]
    #[diagnostic(code(x3ml::resolve::empty_literal))]
    EmptyLiteral { generator: String },

    #[error("variable \"{name}\" is referenced but was never bound")]
    #[diagnostic(
        code(x3ml::resolve::unbound_variable),
        help(
            "The entity that binds this variable was skipped or is resolved later \
             in document order. Bind it in an earlier link or the domain."
        )
    )]
    UnboundVariable { name: String },

    #[error("intermediate node {index} resolved to no value")]
    #[diagnostic(code(x3ml::resolve::intermediate))]
    IntermediateUnresolved { index: usize },

    #[error("domain entity must be a URI, got {kind}")]
    #[diagnostic(code(x3ml::resolve::domain_not_uri))]
    DomainNotUri { kind: String },

    #[error("value \"{value}\" is not a valid IRI: {message}")]
    #[diagnostic(code(x3ml::resolve::invalid_iri))]
    InvalidIri { value: String, message: String },

    #[error("custom generator \"{class}\" failed: {message}")]
    #[diagnostic(code(x3ml::resolve::custom_generator))]
    CustomGenerator { class: String, message: String },

    #[error("named graph generator produced a non-URI value")]
    #[diagnostic(code(x3ml::resolve::named_graph))]
    NamedGraphNotUri,
}

// ---------------------------------------------------------------------------
// Terminology errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TerminologyError {
    #[error("condition \"{condition}\" needs a terminology, but none was loaded")]
    #[diagnostic(
        code(x3ml::terminology::missing),
        help("Pass a SKOS vocabulary with --terminology or Engine::with_terminology.")
    )]
    Missing { condition: String },

    #[error("failed to load terminology: {message}")]
    #[diagnostic(
        code(x3ml::terminology::load),
        help("Supported formats are Turtle (.ttl), N-Triples (.nt) and RDF/XML (.rdf, .xml).")
    )]
    Load { message: String },

    #[error("terminology query failed: {message}")]
    #[diagnostic(code(x3ml::terminology::query))]
    Query { message: String },
}

// ---------------------------------------------------------------------------
// Document loading errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LoadError {
    #[error("failed to read {path}")]
    #[diagnostic(code(x3ml::load::io), help("Ensure the file exists and is readable."))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed XML in {document}: {message}")]
    #[diagnostic(code(x3ml::load::xml), help("Check that the document is well-formed XML."))]
    Xml { document: String, message: String },

    #[error("invalid {document} structure: {message}")]
    #[diagnostic(
        code(x3ml::load::structure),
        help("The document parsed as XML but does not follow the expected element layout.")
    )]
    Structure { document: String, message: String },
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("\"{value}\" cannot be used as an RDF term: {message}")]
    #[diagnostic(code(x3ml::graph::invalid_term))]
    InvalidTerm { value: String, message: String },

    #[error("graph store error: {message}")]
    #[diagnostic(code(x3ml::graph::store))]
    Store { message: String },

    #[error("serialization failed: {message}")]
    #[diagnostic(
        code(x3ml::graph::serialize),
        help("Check that the output is writable and the format supports named graphs if any were produced.")
    )]
    Serialize { message: String },
}

// ---------------------------------------------------------------------------
// Configuration file errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigFileError {
    #[error("failed to read config file: {path}")]
    #[diagnostic(code(x3ml::config_file::read))]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config file: {path}")]
    #[diagnostic(code(x3ml::config_file::write))]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {message}")]
    #[diagnostic(code(x3ml::config_file::parse), help("See EngineConfig for the accepted keys."))]
    Parse { path: String, message: String },
}

/// Convenience alias for functions returning X3ML results.
pub type X3mlResult<T> = std::result::Result<T, X3mlError>;

/// Outcome of a failed resolution step inside the engine.
///
/// `Skip` is caught at the nearest domain/link/intermediate boundary and becomes a
/// run diagnostic; `Abort` ends the run.
#[derive(Debug)]
pub enum ResolveFault {
    Abort(X3mlError),
    Skip(ResolutionError),
}

impl From<ResolutionError> for ResolveFault {
    fn from(err: ResolutionError) -> Self {
        ResolveFault::Skip(err)
    }
}

impl From<X3mlError> for ResolveFault {
    fn from(err: X3mlError) -> Self {
        ResolveFault::Abort(err)
    }
}

macro_rules! abort_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for ResolveFault {
            fn from(err: $ty) -> Self {
                ResolveFault::Abort(err.into())
            }
        })*
    };
}

abort_from!(ConfigError, TerminologyError, LoadError, GraphError, ConfigFileError);

pub type ResolveResult<T> = std::result::Result<T, ResolveFault>;
