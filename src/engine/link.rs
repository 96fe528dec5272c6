//! Link orchestration: paths, intermediates, ranges, joins and merges.

use crate::error::{ConfigError, ResolutionError, ResolveFault, ResolveResult};
use crate::graph::Statement;
use crate::model::{Link, Mapping, SourceRelation};
use crate::source::XNode;
use crate::source::range_map::range_map_key;

use super::Run;
use super::context::{ContextId, ContextKind};
use super::resolver::Batch;

/// A parsed equality join: `domainKey==rangeKey`, optionally through one hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct JoinSpec {
    /// Key read from the domain node.
    pub domain_key: String,
    /// Key read from the joined node (the hop node when there is one).
    pub range_key: String,
    pub hop: Option<JoinHop>,
}

/// Second leg of a two-step join: hop nodes are joined first, then ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct JoinHop {
    pub node: String,
    pub domain_key: String,
    pub range_key: String,
}

impl JoinSpec {
    pub(crate) fn parse(relation: &SourceRelation) -> Result<Self, ConfigError> {
        let malformed = || ConfigError::MalformedJoin {
            relation: relation.expression(),
        };
        match (relation.relations.as_slice(), relation.nodes.as_slice()) {
            ([only], []) => {
                let (domain_key, range_key) = split_keys(only).ok_or_else(malformed)?;
                Ok(Self {
                    domain_key,
                    range_key,
                    hop: None,
                })
            }
            ([first, second], [node]) if !node.trim().is_empty() => {
                let (domain_key, range_key) = split_keys(first).ok_or_else(malformed)?;
                let (hop_domain, hop_range) = split_keys(second).ok_or_else(malformed)?;
                Ok(Self {
                    domain_key,
                    range_key,
                    hop: Some(JoinHop {
                        node: node.trim().to_string(),
                        domain_key: hop_domain,
                        range_key: hop_range,
                    }),
                })
            }
            _ => Err(malformed()),
        }
    }
}

fn split_keys(relation: &str) -> Option<(String, String)> {
    let (lhs, rhs) = relation.split_once("==")?;
    let (lhs, rhs) = (lhs.trim(), rhs.trim());
    if lhs.is_empty() || rhs.is_empty() || rhs.contains("==") {
        return None;
    }
    Some((lhs.to_string(), rhs.to_string()))
}

/// Range expression to evaluate against a path node.
///
/// A range written as a continuation of the path relation (`names/name` under
/// relation `names`) keeps only the part below the path node.
fn range_remainder<'r>(range: &'r str, relation: &str) -> &'r str {
    let (range, relation) = (range.trim(), relation.trim());
    if relation.is_empty() {
        return range;
    }
    match range.strip_prefix(relation) {
        Some("") => "",
        Some(rest) if rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => range,
    }
}

impl<'e, 'a, 'i> Run<'e, 'a, 'i> {
    pub(super) fn run_link(&mut self, mapping: &Mapping, link: &Link, domain: ContextId) -> ResolveResult<()> {
        self.state.stats.links_attempted += 1;
        let graph = match &link.named_graph {
            Some(graph) => Some(self.engine.mapping.namespaces.expand(graph)?),
            None => self.state.domain_graph(),
        };
        let graph = graph.as_deref();

        if link.path.target_relation.is_merge() {
            return self.link_merge(link, domain, graph);
        }
        if link.path.source_relation.is_join() {
            return self.link_join(mapping, link, domain, graph);
        }

        let domain_node = self.contexts.get(domain).node;
        let relation = link.path.source_relation.expression();
        let path_nodes = self.source.select(domain_node, &relation)?;
        tracing::debug!(
            link = self.state.link_index,
            relation = %relation,
            paths = path_nodes.len(),
            "link"
        );
        for (i, path_node) in path_nodes.into_iter().enumerate() {
            let outcome = self.link_path(link, domain, path_node, i + 1, graph, None);
            self.isolate(path_node, outcome)?;
        }
        Ok(())
    }

    /// One path context and everything hanging off it. With `joined`, the range
    /// node is already known and is not selected from the path node.
    fn link_path(
        &mut self,
        link: &Link,
        domain: ContextId,
        path_node: XNode<'a, 'i>,
        position: usize,
        graph: Option<&str>,
        joined: Option<XNode<'a, 'i>>,
    ) -> ResolveResult<()> {
        let path = self.contexts.push(ContextKind::Path, path_node, position, Some(domain));
        if self.condition_fails(link.path.target_relation.condition.as_ref(), path_node)? {
            return Ok(());
        }
        let intermediates = self.resolve_intermediates(link, path)?;

        let ranges: Vec<(XNode<'a, 'i>, usize)> = match joined {
            Some(node) => vec![(node, position)],
            None => {
                let relation = link.path.source_relation.expression();
                let expression = range_remainder(&link.range.source_node, &relation);
                self.source
                    .select(path_node, expression)?
                    .into_iter()
                    .enumerate()
                    .map(|(i, node)| (node, i + 1))
                    .collect()
            }
        };
        for (range_node, range_position) in ranges {
            let outcome = self.link_range(link, domain, path, &intermediates, range_node, range_position, graph);
            self.isolate(range_node, outcome)?;
        }
        Ok(())
    }

    /// Resolve a path's intermediate entities; each must yield a resource.
    fn resolve_intermediates(&mut self, link: &Link, path: ContextId) -> ResolveResult<Vec<ContextId>> {
        let (node, position) = {
            let context = self.contexts.get(path);
            (context.node, context.position)
        };
        let mut intermediates = Vec::with_capacity(link.path.target_relation.entities.len());
        for (k, entity) in link.path.target_relation.entities.iter().enumerate() {
            let ctx = self.contexts.push(ContextKind::Intermediate(k), node, position, Some(path));
            match self.resolve_entity(entity, ctx) {
                Ok(resolved) if resolved.value.is_uri() => intermediates.push(ctx),
                Ok(_) => return Err(ResolutionError::IntermediateUnresolved { index: k + 1 }.into()),
                Err(ResolveFault::Skip(cause)) => {
                    tracing::debug!(index = k + 1, error = %cause, "intermediate failed");
                    return Err(ResolutionError::IntermediateUnresolved { index: k + 1 }.into());
                }
                Err(abort) => return Err(abort),
            }
        }
        Ok(intermediates)
    }

    #[allow(clippy::too_many_arguments)]
    fn link_range(
        &mut self,
        link: &Link,
        domain: ContextId,
        path: ContextId,
        intermediates: &[ContextId],
        range_node: XNode<'a, 'i>,
        position: usize,
        graph: Option<&str>,
    ) -> ResolveResult<()> {
        let range = self.contexts.push(ContextKind::Range, range_node, position, Some(path));
        if self.condition_fails(link.range.target.condition.as_ref(), range_node)? {
            return Ok(());
        }
        let resolved = self.resolve_entity(&link.range.target.entity, range)?;
        let Some(domain_value) = self.resolved_value(domain) else {
            return Ok(());
        };

        let namespaces = &self.engine.mapping.namespaces;
        let relationships = link
            .path
            .target_relation
            .relationships
            .iter()
            .map(|r| namespaces.expand(r))
            .collect::<Result<Vec<_>, _>>()?;

        let mut batch = Batch::default();
        let domain_graph = self.state.domain_graph();
        self.stage_context(&mut batch, domain, domain_graph.as_deref());
        for &ctx in intermediates {
            self.stage_context(&mut batch, ctx, graph);
        }
        let mut subject = domain_value.as_str().to_string();
        for (predicate, &ctx) in relationships.iter().zip(intermediates) {
            let Some(value) = self.resolved_value(ctx) else {
                continue;
            };
            let next = value.as_str().to_string();
            batch.push(Statement::new(subject, predicate.as_str(), value, graph));
            subject = next;
        }
        if let Some(last) = relationships.last() {
            batch.push(Statement::new(subject, last.as_str(), resolved.value.clone(), graph));
        }
        self.stage_context(&mut batch, range, graph);
        self.commit(batch)?;
        self.state.stats.ranges_linked += 1;
        Ok(())
    }

    /// Equality join: range nodes are found through the range-key index.
    fn link_join(
        &mut self,
        mapping: &Mapping,
        link: &Link,
        domain: ContextId,
        graph: Option<&str>,
    ) -> ResolveResult<()> {
        let spec = JoinSpec::parse(&link.path.source_relation)?;
        let domain_node = self.contexts.get(domain).node;
        let ranges = self.join_range_nodes(&mapping.domain.source_node, link, &spec, domain_node)?;
        tracing::debug!(link = self.state.link_index, ranges = ranges.len(), "join");
        for (i, range_node) in ranges.into_iter().enumerate() {
            let outcome = self.link_path(link, domain, range_node, i + 1, graph, Some(range_node));
            self.isolate(range_node, outcome)?;
        }
        Ok(())
    }

    fn join_range_nodes(
        &mut self,
        domain_expr: &str,
        link: &Link,
        spec: &JoinSpec,
        domain_node: XNode<'a, 'i>,
    ) -> ResolveResult<Vec<XNode<'a, 'i>>> {
        let key_value = self.source.scalar(domain_node, &spec.domain_key)?;
        if key_value.is_empty() {
            tracing::warn!(
                xpath = %domain_node.structural_path(),
                key = %spec.domain_key,
                "empty join key on domain node"
            );
            return Ok(Vec::new());
        }
        let path_expr = link.path.source_relation.expression();
        let range_expr = link.range.source_node.trim();

        let Some(hop) = &spec.hop else {
            return self.joined(domain_expr, &path_expr, range_expr, &spec.range_key, &key_value, domain_node);
        };
        let hops = self.joined(domain_expr, &path_expr, &hop.node, &spec.range_key, &key_value, domain_node)?;
        let mut ranges = Vec::new();
        for hop_node in hops {
            let hop_value = self.source.scalar(hop_node, &hop.domain_key)?;
            if hop_value.is_empty() {
                continue;
            }
            for node in self.joined(domain_expr, &path_expr, range_expr, &hop.range_key, &hop_value, domain_node)? {
                if !ranges.contains(&node) {
                    ranges.push(node);
                }
            }
        }
        Ok(ranges)
    }

    /// Nodes selected by `expr` whose `key` equals `value`, through the run's
    /// range-map cache. Relative expressions are evaluated against the domain
    /// node's parent so sibling collections can be joined.
    fn joined(
        &mut self,
        domain_expr: &str,
        path_expr: &str,
        expr: &str,
        key: &str,
        value: &str,
        domain_node: XNode<'a, 'i>,
    ) -> ResolveResult<Vec<XNode<'a, 'i>>> {
        let (base, base_path) = if expr.trim_start().starts_with('/') {
            (self.source.root(), None)
        } else {
            let base = domain_node.parent().map(XNode::Node).unwrap_or_else(|| self.source.root());
            (base, Some(base.structural_path()))
        };
        let cache_key = range_map_key(domain_expr, path_expr, &format!("{expr}#{key}"), base_path.as_deref());
        Ok(self.source.joined_range_nodes(&cache_key, base, expr, key, value)?)
    }

    /// MERGE: the range is resolved on the domain node and takes the domain's
    /// identity, so its types, labels and additionals land on the domain resource.
    fn link_merge(&mut self, link: &Link, domain: ContextId, graph: Option<&str>) -> ResolveResult<()> {
        let (node, position) = {
            let context = self.contexts.get(domain);
            (context.node, context.position)
        };
        let path = self.contexts.push(ContextKind::Path, node, position, Some(domain));
        if self.condition_fails(link.path.target_relation.condition.as_ref(), node)? {
            return Ok(());
        }
        let range = self.contexts.push(ContextKind::Range, node, position, Some(path));
        if self.condition_fails(link.range.target.condition.as_ref(), node)? {
            return Ok(());
        }
        let Some(identity) = self.resolved_value(domain) else {
            return Ok(());
        };
        self.resolve_with(&link.range.target.entity, range, Some(identity))?;
        self.link_context(range, graph)?;
        self.state.stats.ranges_linked += 1;
        Ok(())
    }

    fn resolved_value(&self, ctx: ContextId) -> Option<crate::generator::GeneratedValue> {
        self.contexts.get(ctx).resolved.as_ref().map(|r| r.value.clone())
    }
}
