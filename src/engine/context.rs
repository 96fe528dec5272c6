//! Resolution contexts and variable scopes.
//!
//! Contexts live in an arena that only holds the subtree of the domain node
//! being resolved: it is truncated back after every domain node. Each context records the source node it wraps, its ordinal position among
//! its siblings and the index of its parent; scope lookups walk parent indices
//! up to the owning domain context, which holds the mapping-scoped variables.

use std::collections::HashMap;
use std::rc::Rc;

use crate::generator::GeneratedValue;
use crate::source::XNode;

use super::resolver::Resolved;

pub(crate) type ContextId = usize;

/// What a context resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContextKind {
    Domain,
    Path,
    Range,
    /// The k-th additional node of its owner.
    Additional(usize),
    /// The k-th intermediate entity of a path.
    Intermediate(usize),
}

#[derive(Debug)]
pub(crate) struct Context<'a, 'i> {
    pub kind: ContextKind,
    pub node: XNode<'a, 'i>,
    /// 1-based position among the nodes selected together with this one.
    pub position: usize,
    pub parent: Option<ContextId>,
    /// Extra cache-key material; additional nodes carry their owner and relationship.
    pub discriminator: Option<String>,
    pub resolved: Option<Rc<Resolved>>,
    /// Whether the dependents of `resolved` were written to the graph.
    pub linked: bool,
    variables: HashMap<String, GeneratedValue>,
}

#[derive(Debug, Default)]
pub(crate) struct ContextArena<'a, 'i> {
    contexts: Vec<Context<'a, 'i>>,
}

impl<'a, 'i> ContextArena<'a, 'i> {
    pub fn clear(&mut self) {
        self.contexts.clear();
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Drop every context pushed after the first `len`.
    pub fn truncate(&mut self, len: usize) {
        self.contexts.truncate(len);
    }

    pub fn push(
        &mut self,
        kind: ContextKind,
        node: XNode<'a, 'i>,
        position: usize,
        parent: Option<ContextId>,
    ) -> ContextId {
        self.contexts.push(Context {
            kind,
            node,
            position,
            parent,
            discriminator: None,
            resolved: None,
            linked: false,
            variables: HashMap::new(),
        });
        self.contexts.len() - 1
    }

    /// Panics on an id not produced by this arena since the last clear or truncate.
    pub fn get(&self, id: ContextId) -> &Context<'a, 'i> {
        &self.contexts[id]
    }

    pub fn get_mut(&mut self, id: ContextId) -> &mut Context<'a, 'i> {
        &mut self.contexts[id]
    }

    /// The domain context `id` descends from (itself for a domain).
    pub fn owning_domain(&self, id: ContextId) -> ContextId {
        let mut current = id;
        loop {
            let ctx = &self.contexts[current];
            match (ctx.kind, ctx.parent) {
                (ContextKind::Domain, _) | (_, None) => return current,
                (_, Some(parent)) => current = parent,
            }
        }
    }

    pub fn variable(&self, id: ContextId, name: &str) -> Option<&GeneratedValue> {
        self.contexts[self.owning_domain(id)].variables.get(name)
    }

    pub fn bind_variable(&mut self, id: ContextId, name: &str, value: GeneratedValue) {
        let domain = self.owning_domain(id);
        self.contexts[domain].variables.insert(name.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variables_live_on_the_owning_domain() {
        let doc = roxmltree::Document::parse("<a><b/><b/></a>").unwrap();
        let node = XNode::Node(doc.root_element());
        let mut arena = ContextArena::default();
        let d1 = arena.push(ContextKind::Domain, node, 1, None);
        let p = arena.push(ContextKind::Path, node, 1, Some(d1));
        let r = arena.push(ContextKind::Range, node, 1, Some(p));
        let add = arena.push(ContextKind::Additional(0), node, 1, Some(r));
        let d2 = arena.push(ContextKind::Domain, node, 2, None);

        arena.bind_variable(add, "event", GeneratedValue::uri("urn:e"));
        assert_eq!(arena.owning_domain(add), d1);
        assert_eq!(arena.variable(p, "event"), Some(&GeneratedValue::uri("urn:e")));
        assert_eq!(arena.variable(d2, "event"), None);
    }

    #[test]
    fn truncate_releases_later_contexts() {
        let doc = roxmltree::Document::parse("<a><b/></a>").unwrap();
        let node = XNode::Node(doc.root_element());
        let mut arena = ContextArena::default();
        let d1 = arena.push(ContextKind::Domain, node, 1, None);
        arena.bind_variable(d1, "x", GeneratedValue::uri("urn:x"));
        let mark = arena.len();
        let d2 = arena.push(ContextKind::Domain, node, 2, None);
        arena.push(ContextKind::Path, node, 1, Some(d2));
        arena.truncate(mark);
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.variable(d1, "x"), Some(&GeneratedValue::uri("urn:x")));
        assert_eq!(arena.push(ContextKind::Domain, node, 3, None), 1);
    }

    #[test]
    fn clear_drops_everything() {
        let doc = roxmltree::Document::parse("<a/>").unwrap();
        let mut arena = ContextArena::default();
        let d = arena.push(ContextKind::Domain, XNode::Node(doc.root_element()), 1, None);
        arena.bind_variable(d, "x", GeneratedValue::uri("urn:x"));
        arena.clear();
        let fresh = arena.push(ContextKind::Domain, XNode::Node(doc.root_element()), 1, None);
        assert_eq!(fresh, 0);
        assert_eq!(arena.variable(fresh, "x"), None);
    }
}
