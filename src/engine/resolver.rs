//! Entity Resolver: one entity description, one context, one value.
//!
//! Resolution picks the entity's identity (a bound variable, a cached value or a
//! freshly generated one), shapes it by the declared types, and resolves the
//! label and additional nodes hanging off URI entities. Results are stored on
//! the context, so a second resolution of the same context is free and writes
//! nothing. Statements are staged into a [`Batch`] and only reach the graph
//! through [`Run::commit`], all of them or none.

use std::rc::Rc;

use crate::condition::Condition;
use crate::error::{ConfigError, GraphError, ResolutionError, ResolveFault, ResolveResult, X3mlError};
use crate::generator::{ArgResolver, ArgValue, GeneratedValue, GeneratorEnv, PREF_LABEL};
use crate::graph::{GraphSink, Statement};
use crate::model::namespace::{RDF_TYPE, RDFS_LABEL, RDFS_LITERAL, SKOS_PREF_LABEL, XSD_DATE_TIME};
use crate::model::{ArgSource, Entity, GeneratorArg, GeneratorCall};
use crate::source::{SourceAdapter, XNode};

use super::Run;
use super::context::{ContextId, ContextKind};

/// A resolved entity with its dependents, ready to be linked.
#[derive(Debug)]
pub(crate) struct Resolved {
    pub value: GeneratedValue,
    /// Expanded type IRIs.
    pub types: Vec<String>,
    /// `(predicate, literal)` pairs from label generators.
    pub labels: Vec<(String, GeneratedValue)>,
    /// `(predicate, entity)` pairs from additional nodes.
    pub additionals: Vec<(String, Rc<Resolved>)>,
}

/// Argument values read relative to one context node.
struct ContextArgs<'s, 'a, 'i> {
    source: &'s mut SourceAdapter<'a, 'i>,
    node: XNode<'a, 'i>,
    position: usize,
}

impl ArgResolver for ContextArgs<'_, '_, '_> {
    fn resolve(&mut self, arg: &GeneratorArg, merged: bool) -> Result<ArgValue, X3mlError> {
        Ok(match arg.source {
            ArgSource::Constant => ArgValue {
                value: arg.value.clone(),
                language: arg.language.clone(),
            },
            ArgSource::Position => ArgValue::new(self.position.to_string()),
            ArgSource::XPathPosition => {
                let nodes = self.source.select(self.node, &arg.value)?;
                ArgValue::new(nodes.first().map(XNode::structural_path).unwrap_or_default())
            }
            ArgSource::XPath if merged => ArgValue {
                value: self.source.scalar_merged(self.node, &arg.value)?,
                language: arg
                    .language
                    .clone()
                    .or_else(|| self.node.language().map(str::to_string)),
            },
            ArgSource::XPath => {
                let (value, found) = self.source.scalar_with_node(self.node, &arg.value)?;
                let language = arg
                    .language
                    .clone()
                    .or_else(|| found.unwrap_or(self.node).language().map(str::to_string));
                ArgValue { value, language }
            }
        })
    }
}

impl<'e, 'a, 'i> Run<'e, 'a, 'i> {
    /// Run a generator against `node`.
    pub(super) fn generate(
        &mut self,
        call: &GeneratorCall,
        node: XNode<'a, 'i>,
        position: usize,
    ) -> ResolveResult<GeneratedValue> {
        let engine = self.engine;
        let mut args = ContextArgs {
            source: &mut self.source,
            node,
            position,
        };
        let mut env = GeneratorEnv {
            namespaces: &engine.mapping.namespaces,
            uuids: &mut self.state.uuids,
            default_language: engine.config.default_language.as_deref(),
            merge_delimiter: &engine.config.merge_delimiter,
        };
        engine.policy.generate(call, &mut args, &mut env)
    }

    pub(super) fn condition_fails(&mut self, condition: Option<&Condition>, node: XNode<'a, 'i>) -> ResolveResult<bool> {
        let engine = self.engine;
        Ok(crate::condition::condition_fails(
            condition,
            &mut self.source,
            node,
            engine.terminology.as_deref(),
        )?)
    }

    pub(super) fn resolve_entity(&mut self, entity: &Entity, ctx: ContextId) -> ResolveResult<Rc<Resolved>> {
        self.resolve_with(entity, ctx, None)
    }

    /// Resolve `entity` in `ctx`. With `identity`, the entity takes that value
    /// instead of generating one (used to merge a range onto its domain).
    pub(super) fn resolve_with(
        &mut self,
        entity: &Entity,
        ctx: ContextId,
        identity: Option<GeneratedValue>,
    ) -> ResolveResult<Rc<Resolved>> {
        if let Some(resolved) = &self.contexts.get(ctx).resolved {
            return Ok(Rc::clone(resolved));
        }
        if entity.types.is_empty() {
            return Err(ConfigError::MissingType.into());
        }
        let namespaces = &self.engine.mapping.namespaces;
        let types = entity
            .types
            .iter()
            .map(|t| namespaces.expand(t))
            .collect::<Result<Vec<_>, _>>()?;

        let value = match identity {
            Some(value) => value,
            None => shape(self.entity_value(entity, ctx, &types)?, &types)?,
        };
        let (node, position) = {
            let context = self.contexts.get(ctx);
            (context.node, context.position)
        };
        self.state.associations.record(node.structural_path(), value.as_str());

        let mut labels = Vec::new();
        let mut additionals = Vec::new();
        if value.is_uri() {
            for call in &entity.label_generators {
                match self.generate(call, node, position) {
                    Ok(label) => labels.push((label_predicate(call).to_string(), as_label(label))),
                    Err(ResolveFault::Skip(
                        err @ (ResolutionError::EmptyLiteral { .. } | ResolutionError::MissingValue { .. }),
                    )) => {
                        tracing::warn!(
                            xpath = %node.structural_path(),
                            generator = %call.name,
                            error = %err,
                            "empty label value, label skipped"
                        );
                    }
                    Err(err) => return Err(err),
                }
            }
            for (k, additional) in entity.additionals.iter().enumerate() {
                let predicate = self.engine.mapping.namespaces.expand(&additional.relationship)?;
                let child = self.contexts.push(ContextKind::Additional(k), node, position, Some(ctx));
                self.contexts.get_mut(child).discriminator = Some(format!("{predicate}@{}", value.as_str()));
                let resolved = self.resolve_entity(&additional.entity, child)?;
                additionals.push((predicate, resolved));
            }
        }

        let resolved = Rc::new(Resolved {
            value,
            types,
            labels,
            additionals,
        });
        self.contexts.get_mut(ctx).resolved = Some(Rc::clone(&resolved));
        Ok(resolved)
    }

    /// Identity of an entity: variable scope first, then the structural cache.
    fn entity_value(&mut self, entity: &Entity, ctx: ContextId, types: &[String]) -> ResolveResult<GeneratedValue> {
        if let Some(name) = &entity.global_variable {
            if let Some(value) = self.state.globals.get(name) {
                return Ok(value.clone());
            }
            let value = self.bound_value(entity, ctx, name)?;
            self.state.globals.insert(name.clone(), value.clone());
            return Ok(value);
        }
        if let Some(name) = &entity.variable {
            if let Some(value) = self.contexts.variable(ctx, name) {
                return Ok(value.clone());
            }
            let value = self.bound_value(entity, ctx, name)?;
            self.contexts.bind_variable(ctx, name, value.clone());
            return Ok(value);
        }

        let call = entity
            .instance_generator
            .as_ref()
            .ok_or(ConfigError::MissingInstanceGenerator)?;
        let key = self.cache_key(ctx, types);
        if let Some(value) = self.state.cache.get(&key) {
            return Ok(value.clone());
        }
        let (node, position) = {
            let context = self.contexts.get(ctx);
            (context.node, context.position)
        };
        let value = self.generate(call, node, position)?;
        self.state.cache.insert(key, value.clone());
        Ok(value)
    }

    /// First value of a variable: generated, or an error when nothing can bind it.
    fn bound_value(&mut self, entity: &Entity, ctx: ContextId, name: &str) -> ResolveResult<GeneratedValue> {
        let Some(call) = &entity.instance_generator else {
            return Err(ResolutionError::UnboundVariable { name: name.to_string() }.into());
        };
        let (node, position) = {
            let context = self.contexts.get(ctx);
            (context.node, context.position)
        };
        self.generate(call, node, position)
    }

    /// Structural cache key of an entity in a context.
    ///
    /// Additional and intermediate nodes get their ordinal (and owner) appended so
    /// siblings of the same type stay distinct; literal-typed entities get the
    /// mapping, link and role appended so each one generates its own value.
    fn cache_key(&self, ctx: ContextId, types: &[String]) -> String {
        let context = self.contexts.get(ctx);
        let mut sorted = types.to_vec();
        sorted.sort();
        let mut key = format!("{}|{}", context.node.structural_path(), sorted.join(","));
        match context.kind {
            ContextKind::Additional(k) => key.push_str(&format!("-A{k}")),
            ContextKind::Intermediate(k) => key.push_str(&format!("-int{k}")),
            ContextKind::Domain | ContextKind::Path | ContextKind::Range => {}
        }
        if let Some(discriminator) = &context.discriminator {
            key.push_str(&format!("@{discriminator}"));
        }
        if sorted.iter().any(|t| t == RDFS_LITERAL || t == XSD_DATE_TIME) {
            key.push_str(&format!(
                "-lit:m{}:l{}:{:?}:{}",
                self.state.mapping_index, self.state.link_index, context.kind, context.position
            ));
        }
        key
    }

    /// Write the type, label and additional statements of a context once.
    pub(super) fn link_context(&mut self, ctx: ContextId, graph: Option<&str>) -> ResolveResult<()> {
        let mut batch = Batch::default();
        self.stage_context(&mut batch, ctx, graph);
        self.commit(batch)
    }

    /// Stage the dependents of a resolved context unless they were written already.
    pub(super) fn stage_context(&self, batch: &mut Batch, ctx: ContextId, graph: Option<&str>) {
        let context = self.contexts.get(ctx);
        if context.linked || batch.linked.contains(&ctx) {
            return;
        }
        if let Some(resolved) = &context.resolved {
            batch.stage_dependents(resolved, graph);
            batch.linked.push(ctx);
        }
    }

    /// Write a batch. A rejected IRI drops the whole batch and is recoverable.
    pub(super) fn commit(&mut self, batch: Batch) -> ResolveResult<()> {
        match self.graph.add_statements(&batch.statements) {
            Ok(_) => {}
            Err(GraphError::InvalidTerm { value, message }) => {
                return Err(ResolutionError::InvalidIri { value, message }.into());
            }
            Err(err) => return Err(X3mlError::from(err).into()),
        }
        for ctx in batch.linked {
            self.contexts.get_mut(ctx).linked = true;
        }
        Ok(())
    }
}

/// Statements of one context branch, committed together.
#[derive(Debug, Default)]
pub(crate) struct Batch {
    statements: Vec<Statement>,
    /// Contexts whose dependents are staged here.
    linked: Vec<ContextId>,
}

impl Batch {
    pub(super) fn push(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    fn stage_dependents(&mut self, resolved: &Resolved, graph: Option<&str>) {
        let GeneratedValue::Uri(subject) = &resolved.value else {
            return;
        };
        for t in &resolved.types {
            self.push(Statement::new(subject.as_str(), RDF_TYPE, GeneratedValue::uri(t.as_str()), graph));
        }
        for (predicate, label) in &resolved.labels {
            self.push(Statement::new(subject.as_str(), predicate.as_str(), label.clone(), graph));
        }
        for (predicate, additional) in &resolved.additionals {
            self.push(Statement::new(
                subject.as_str(),
                predicate.as_str(),
                additional.value.clone(),
                graph,
            ));
            self.stage_dependents(additional, graph);
        }
    }
}

/// Shape a generated value by the entity's declared types.
///
/// Literals typed `rdfs:Literal` stay plain (language-tagged) literals; any other
/// single type becomes the datatype. More than one type is ambiguous.
fn shape(value: GeneratedValue, types: &[String]) -> Result<GeneratedValue, ConfigError> {
    match value {
        GeneratedValue::Literal { value, language } => match types {
            [t] if t == RDFS_LITERAL => Ok(GeneratedValue::Literal { value, language }),
            [t] => Ok(GeneratedValue::TypedLiteral {
                value,
                datatype: t.clone(),
            }),
            _ => Err(ConfigError::AmbiguousTypedLiteral { count: types.len() }),
        },
        GeneratedValue::TypedLiteral { .. } if types.len() != 1 => {
            Err(ConfigError::AmbiguousTypedLiteral { count: types.len() })
        }
        other => Ok(other),
    }
}

fn label_predicate(call: &GeneratorCall) -> &'static str {
    if call.name == PREF_LABEL {
        SKOS_PREF_LABEL
    } else {
        RDFS_LABEL
    }
}

fn as_label(value: GeneratedValue) -> GeneratedValue {
    match value {
        GeneratedValue::Uri(uri) => GeneratedValue::literal(uri, None),
        other => other,
    }
}
