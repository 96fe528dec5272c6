//! Mapping execution engine.
//!
//! An [`Engine`] holds everything that stays fixed across runs: the mapping
//! document, the generator policy, the optional terminology and the
//! configuration. [`Engine::execute`] applies it to one source document and
//! returns a [`RunReport`]. All mutable state (caches, variables, counters,
//! diagnostics) lives in a fresh run state per call, so runs never observe
//! each other.
//!
//! Execution is single-threaded and sequential: mapping by mapping, domain
//! node by domain node, in document order.

mod context;
mod link;
mod resolver;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::association::AssociationTable;
use crate::config::EngineConfig;
use crate::error::{ConfigError, ResolutionError, ResolveFault, ResolveResult, X3mlResult};
use crate::generator::{CustomGeneratorRegistry, GeneratedValue, GeneratorPolicy, UuidSource};
use crate::graph::RdfGraph;
use crate::model::{Entity, GeneratorCall, MappingDocument};
use crate::source::{SourceAdapter, XNode};
use crate::terminology::Terminology;

use self::context::ContextArena;

/// A mapping document bound to a generator policy, ready to run.
pub struct Engine {
    mapping: MappingDocument,
    policy: GeneratorPolicy,
    terminology: Option<Box<dyn Terminology>>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(mapping: MappingDocument, policy: GeneratorPolicy) -> Self {
        Self {
            mapping,
            policy,
            terminology: None,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Vocabulary for `broader`, `narrower` and `exact_match` conditions.
    pub fn with_terminology(mut self, terminology: impl Terminology + 'static) -> Self {
        self.terminology = Some(Box::new(terminology));
        self
    }

    /// Replace the custom generator registry (the bundled generators by default).
    pub fn with_custom_generators(mut self, registry: CustomGeneratorRegistry) -> Self {
        self.policy.set_custom_generators(registry);
        self
    }

    pub fn mapping(&self) -> &MappingDocument {
        &self.mapping
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Check the mapping against the policy and namespaces without running it.
    ///
    /// Every fatal configuration problem that does not depend on the source
    /// document is reported here, before any output is produced.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let namespaces = &self.mapping.namespaces;
        for mapping in self.mapping.mappings.iter().filter(|m| !m.skip) {
            self.validate_entity(&mapping.domain.target.entity, true)?;
            if let Some(call) = &mapping.domain.named_graph {
                self.policy.check(call)?;
            }
            if let Some(graph) = &mapping.named_graph {
                namespaces.expand(graph)?;
            }
            for link in mapping.links.iter().filter(|l| !l.skip) {
                let target = &link.path.target_relation;
                if link.path.source_relation.is_join() {
                    link::JoinSpec::parse(&link.path.source_relation)?;
                }
                if let Some(graph) = &link.named_graph {
                    namespaces.expand(graph)?;
                }
                if target.is_merge() {
                    self.validate_entity(&link.range.target.entity, false)?;
                    continue;
                }
                if target.relationships.len() != target.entities.len() + 1 {
                    return Err(ConfigError::MalformedRelation {
                        relationships: target.relationships.len(),
                        entities: target.entities.len(),
                    });
                }
                for relationship in &target.relationships {
                    namespaces.expand(relationship)?;
                }
                for entity in &target.entities {
                    self.validate_entity(entity, true)?;
                }
                self.validate_entity(&link.range.target.entity, true)?;
            }
        }
        Ok(())
    }

    fn validate_entity(&self, entity: &Entity, needs_identity: bool) -> Result<(), ConfigError> {
        if entity.types.is_empty() {
            return Err(ConfigError::MissingType);
        }
        for t in &entity.types {
            self.mapping.namespaces.expand(t)?;
        }
        match &entity.instance_generator {
            Some(call) => self.policy.check(call)?,
            None if needs_identity && entity.variable.is_none() && entity.global_variable.is_none() => {
                return Err(ConfigError::MissingInstanceGenerator);
            }
            None => {}
        }
        for call in &entity.label_generators {
            self.policy.check(call)?;
        }
        for additional in &entity.additionals {
            self.mapping.namespaces.expand(&additional.relationship)?;
            self.validate_entity(&additional.entity, true)?;
        }
        Ok(())
    }

    /// Apply the mapping to `document`.
    ///
    /// Fatal errors abort with `Err`. Recoverable errors drop the offending
    /// context and are listed in [`RunReport::diagnostics`]; callers must check
    /// it to detect partial output.
    pub fn execute<'a, 'i>(&self, document: &'a roxmltree::Document<'i>) -> X3mlResult<RunReport> {
        self.validate()?;
        let graph = RdfGraph::new()?.with_prefixes(&self.mapping.namespaces);
        let source = SourceAdapter::new(document, self.mapping.namespaces.clone())
            .with_merge_delimiter(self.config.merge_delimiter.clone());
        let mut run = Run {
            engine: self,
            source,
            state: RunState::new(UuidSource::from_test_size(self.config.uuid_test_size)),
            graph,
            contexts: ContextArena::default(),
        };

        tracing::info!(mappings = self.mapping.mappings.len(), "run started");
        for (index, mapping) in self.mapping.mappings.iter().enumerate() {
            if mapping.skip {
                tracing::debug!(mapping = index + 1, "mapping skipped");
                continue;
            }
            run.run_mapping(index + 1, mapping)?;
        }

        let report = run.finish();
        tracing::info!(
            triples = report.graph.len(),
            diagnostics = report.diagnostics.len(),
            domains = report.stats.domains_matched,
            "run finished"
        );
        Ok(report)
    }

    /// Parse `xml` and [`execute`](Self::execute) it.
    pub fn execute_str(&self, xml: &str) -> X3mlResult<RunReport> {
        let document = roxmltree::Document::parse(xml).map_err(|e| crate::error::LoadError::Xml {
            document: "source".into(),
            message: e.to_string(),
        })?;
        self.execute(&document)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("mappings", &self.mapping.mappings.len())
            .field("generators", &self.policy.len())
            .field("terminology", &self.terminology.is_some())
            .finish()
    }
}

/// A recovered resolution error, attributed to where it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDiagnostic {
    /// 1-based mapping ordinal.
    pub mapping: usize,
    /// 1-based link ordinal within the mapping; `None` for domain failures.
    pub link: Option<usize>,
    /// Structural path of the node being resolved.
    pub xpath: String,
    pub message: String,
}

/// Counters of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub domains_matched: usize,
    /// Domain nodes discarded by their condition.
    pub domains_filtered: usize,
    /// Domain nodes dropped by a resolution error.
    pub domains_failed: usize,
    pub links_attempted: usize,
    /// Range contexts written to the graph.
    pub ranges_linked: usize,
    /// Join indexes built; one per distinct join, however many domain nodes use it.
    pub range_maps_built: usize,
}

/// Everything a run produced.
#[derive(Debug)]
pub struct RunReport {
    pub graph: RdfGraph,
    pub diagnostics: Vec<RunDiagnostic>,
    pub associations: AssociationTable,
    pub stats: RunStats,
}

impl RunReport {
    /// No resolution error was recovered.
    pub fn is_complete(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Diagnostics and counters as JSON, for `--report`.
    pub fn to_json(&self) -> serde_json::Result<String> {
        #[derive(Serialize)]
        struct Report<'r> {
            triples: usize,
            stats: &'r RunStats,
            diagnostics: &'r [RunDiagnostic],
        }
        serde_json::to_string_pretty(&Report {
            triples: self.graph.len(),
            stats: &self.stats,
            diagnostics: &self.diagnostics,
        })
    }
}

/// Mutable state of one run.
#[derive(Debug)]
pub(crate) struct RunState {
    pub(crate) uuids: UuidSource,
    /// Generated values keyed by structural path plus disambiguators.
    pub(crate) cache: HashMap<String, GeneratedValue>,
    pub(crate) globals: HashMap<String, GeneratedValue>,
    pub(crate) associations: AssociationTable,
    pub(crate) diagnostics: Vec<RunDiagnostic>,
    pub(crate) stats: RunStats,
    pub(crate) mapping_index: usize,
    pub(crate) link_index: usize,
    pub(crate) mapping_graph: Option<String>,
    pub(crate) domain_graph: Option<String>,
}

impl RunState {
    pub(crate) fn new(uuids: UuidSource) -> Self {
        Self {
            uuids,
            cache: HashMap::new(),
            globals: HashMap::new(),
            associations: AssociationTable::new(),
            diagnostics: Vec::new(),
            stats: RunStats::default(),
            mapping_index: 0,
            link_index: 0,
            mapping_graph: None,
            domain_graph: None,
        }
    }

    /// Named graph for domain-owned statements.
    pub(crate) fn domain_graph(&self) -> Option<String> {
        self.domain_graph.clone().or_else(|| self.mapping_graph.clone())
    }
}

/// One execution in progress.
pub(crate) struct Run<'e, 'a, 'i> {
    engine: &'e Engine,
    source: SourceAdapter<'a, 'i>,
    state: RunState,
    graph: RdfGraph,
    contexts: ContextArena<'a, 'i>,
}

impl<'e, 'a, 'i> Run<'e, 'a, 'i> {
    fn run_mapping(&mut self, index: usize, mapping: &crate::model::Mapping) -> X3mlResult<()> {
        self.contexts.clear();
        self.state.mapping_index = index;
        self.state.link_index = 0;
        self.state.mapping_graph = match &mapping.named_graph {
            Some(graph) => Some(self.engine.mapping.namespaces.expand(graph)?),
            None => None,
        };

        let root = self.source.root();
        let nodes = self.source.select(root, &mapping.domain.source_node)?;
        tracing::debug!(mapping = index, domain = %mapping.domain.source_node, nodes = nodes.len(), "mapping");
        self.state.stats.domains_matched += nodes.len();

        for (i, node) in nodes.into_iter().enumerate() {
            self.state.link_index = 0;
            let mark = self.contexts.len();
            let outcome = self.run_domain(mapping, node, i + 1);
            self.contexts.truncate(mark);
            match outcome {
                Ok(()) => {}
                Err(ResolveFault::Skip(err)) => {
                    self.state.stats.domains_failed += 1;
                    self.diagnose(node, &err);
                }
                Err(ResolveFault::Abort(err)) => return Err(err),
            }
        }
        Ok(())
    }

    fn run_domain(
        &mut self,
        mapping: &crate::model::Mapping,
        node: XNode<'a, 'i>,
        position: usize,
    ) -> ResolveResult<()> {
        let domain = self.contexts.push(context::ContextKind::Domain, node, position, None);
        if self.condition_fails(mapping.domain.target.condition.as_ref(), node)? {
            self.state.stats.domains_filtered += 1;
            return Ok(());
        }

        let resolved = self.resolve_entity(&mapping.domain.target.entity, domain)?;
        if !resolved.value.is_uri() {
            return Err(ResolutionError::DomainNotUri {
                kind: resolved.value.kind().to_string(),
            }
            .into());
        }

        self.state.domain_graph = match &mapping.domain.named_graph {
            Some(call) => Some(self.named_graph(call, node, position)?),
            None => None,
        };
        let graph = self.state.domain_graph();
        self.link_context(domain, graph.as_deref())?;

        for (index, link) in mapping.links.iter().enumerate() {
            if link.skip {
                continue;
            }
            self.state.link_index = index + 1;
            let outcome = self.run_link(mapping, link, domain);
            self.isolate(node, outcome)?;
        }
        Ok(())
    }

    fn named_graph(&mut self, call: &GeneratorCall, node: XNode<'a, 'i>, position: usize) -> ResolveResult<String> {
        match self.generate(call, node, position)? {
            GeneratedValue::Uri(uri) => Ok(uri),
            _ => Err(ResolutionError::NamedGraphNotUri.into()),
        }
    }

    /// Record a recovered error against the current mapping and link.
    fn diagnose(&mut self, node: XNode<'a, 'i>, err: &ResolutionError) {
        let link = (self.state.link_index > 0).then_some(self.state.link_index);
        let xpath = node.structural_path();
        tracing::warn!(
            mapping = self.state.mapping_index,
            link = ?link,
            xpath = %xpath,
            error = %err,
            "resolution failed, skipping node"
        );
        self.state.diagnostics.push(RunDiagnostic {
            mapping: self.state.mapping_index,
            link,
            xpath,
            message: err.to_string(),
        });
    }

    /// Turn a skipped branch into a diagnostic; only aborts propagate.
    fn isolate(&mut self, node: XNode<'a, 'i>, outcome: ResolveResult<()>) -> ResolveResult<()> {
        match outcome {
            Err(ResolveFault::Skip(err)) => {
                self.diagnose(node, &err);
                Ok(())
            }
            other => other,
        }
    }

    fn finish(mut self) -> RunReport {
        self.state.stats.range_maps_built = self.source.range_maps.builds();
        RunReport {
            graph: self.graph,
            diagnostics: self.state.diagnostics,
            associations: self.state.associations,
            stats: self.state.stats,
        }
    }
}
