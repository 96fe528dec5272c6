//! Mapping Model: the immutable rule tree the engine interprets.
//!
//! A [`MappingDocument`] is an ordered list of [`Mapping`]s, each anchored on a
//! [`Domain`] and carrying zero or more [`Link`]s (a [`Path`] plus a [`Range`]).
//! Every target description bottoms out in an [`Entity`]: its types, the
//! generator producing its identity, label generators and additional nodes.
//!
//! The tree is produced by [`loader::load_mapping`] (or built programmatically
//! with the `new`/`with_*` constructors) and is only ever read by the engine.

pub mod loader;
pub mod namespace;

pub use namespace::Namespaces;

pub use crate::condition::Condition;

/// Relationship tag that merges a range onto its domain instead of linking it.
pub const MERGE: &str = "MERGE";

/// A complete mapping document.
#[derive(Debug, Clone, Default)]
pub struct MappingDocument {
    pub namespaces: Namespaces,
    pub mappings: Vec<Mapping>,
}

impl MappingDocument {
    pub fn new(namespaces: Namespaces) -> Self {
        Self {
            namespaces,
            mappings: Vec::new(),
        }
    }

    pub fn with_mapping(mut self, mapping: Mapping) -> Self {
        self.mappings.push(mapping);
        self
    }
}

/// One domain anchored rule with its links.
#[derive(Debug, Clone)]
pub struct Mapping {
    pub domain: Domain,
    pub links: Vec<Link>,
    /// Named graph for every triple of this mapping, unless overridden.
    pub named_graph: Option<String>,
    pub skip: bool,
}

impl Mapping {
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            links: Vec::new(),
            named_graph: None,
            skip: false,
        }
    }

    pub fn with_link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }

    pub fn with_named_graph(mut self, graph: impl Into<String>) -> Self {
        self.named_graph = Some(graph.into());
        self
    }
}

/// The anchor entity of a mapping.
#[derive(Debug, Clone)]
pub struct Domain {
    /// XPath selecting the domain nodes, evaluated against the document root.
    pub source_node: String,
    pub target: TargetNode,
    /// Generator deriving a per-domain-node named graph.
    pub named_graph: Option<GeneratorCall>,
}

impl Domain {
    pub fn new(source_node: impl Into<String>, entity: Entity) -> Self {
        Self {
            source_node: source_node.into(),
            target: TargetNode::new(entity),
            named_graph: None,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.target.condition = Some(condition);
        self
    }

    pub fn with_named_graph(mut self, generator: GeneratorCall) -> Self {
        self.named_graph = Some(generator);
        self
    }
}

/// An entity together with the condition gating it.
#[derive(Debug, Clone)]
pub struct TargetNode {
    pub entity: Entity,
    pub condition: Option<Condition>,
}

impl TargetNode {
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            condition: None,
        }
    }
}

/// A Path + Range pair under a mapping.
#[derive(Debug, Clone)]
pub struct Link {
    pub path: Path,
    pub range: Range,
    pub named_graph: Option<String>,
    pub skip: bool,
}

impl Link {
    pub fn new(path: Path, range: Range) -> Self {
        Self {
            path,
            range,
            named_graph: None,
            skip: false,
        }
    }

    pub fn with_named_graph(mut self, graph: impl Into<String>) -> Self {
        self.named_graph = Some(graph.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct Path {
    pub source_relation: SourceRelation,
    pub target_relation: TargetRelation,
}

impl Path {
    /// A path with a single source relation and a single target property.
    pub fn new(relation: impl Into<String>, relationship: impl Into<String>) -> Self {
        Self {
            source_relation: SourceRelation::new(relation),
            target_relation: TargetRelation::new(relationship),
        }
    }

    /// A path whose target relation runs through intermediate entities.
    pub fn chained(
        relation: impl Into<String>,
        relationships: Vec<String>,
        entities: Vec<Entity>,
    ) -> Self {
        Self {
            source_relation: SourceRelation::new(relation),
            target_relation: TargetRelation {
                condition: None,
                relationships,
                entities,
            },
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.target_relation.condition = Some(condition);
        self
    }
}

/// How the path walks the source document.
///
/// `relations` and `nodes` alternate: `relation (node relation)*`. A relation
/// containing `==` turns the path into an equality join.
#[derive(Debug, Clone)]
pub struct SourceRelation {
    pub relations: Vec<String>,
    pub nodes: Vec<String>,
}

impl SourceRelation {
    pub fn new(relation: impl Into<String>) -> Self {
        Self {
            relations: vec![relation.into()],
            nodes: Vec::new(),
        }
    }

    /// `lhs==rhs` join with one intermediate hop.
    pub fn join_via(first: impl Into<String>, node: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            relations: vec![first.into(), second.into()],
            nodes: vec![node.into()],
        }
    }

    pub fn is_join(&self) -> bool {
        self.relations.iter().any(|r| r.contains("=="))
    }

    /// The relation as a single XPath: `relation/node/relation...`.
    pub fn expression(&self) -> String {
        let mut parts = Vec::with_capacity(self.relations.len() + self.nodes.len());
        for (i, relation) in self.relations.iter().enumerate() {
            if i > 0 {
                if let Some(node) = self.nodes.get(i - 1) {
                    parts.push(node.trim());
                }
            }
            parts.push(relation.trim());
        }
        parts.retain(|p| !p.is_empty());
        parts.join("/")
    }
}

/// Target side of a path: `relationship (entity relationship)*`.
#[derive(Debug, Clone)]
pub struct TargetRelation {
    pub condition: Option<Condition>,
    pub relationships: Vec<String>,
    pub entities: Vec<Entity>,
}

impl TargetRelation {
    pub fn new(relationship: impl Into<String>) -> Self {
        Self {
            condition: None,
            relationships: vec![relationship.into()],
            entities: Vec::new(),
        }
    }

    pub fn is_merge(&self) -> bool {
        self.entities.is_empty()
            && self.relationships.len() == 1
            && self.relationships[0].trim() == MERGE
    }
}

#[derive(Debug, Clone)]
pub struct Range {
    /// XPath of the range nodes. When it starts with the path's source relation,
    /// the remainder is evaluated against each path node.
    pub source_node: String,
    pub target: TargetNode,
}

impl Range {
    pub fn new(source_node: impl Into<String>, entity: Entity) -> Self {
        Self {
            source_node: source_node.into(),
            target: TargetNode::new(entity),
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.target.condition = Some(condition);
        self
    }
}

/// Description of one produced entity.
#[derive(Debug, Clone, Default)]
pub struct Entity {
    /// Target types as prefixed names or absolute IRIs.
    pub types: Vec<String>,
    pub instance_generator: Option<GeneratorCall>,
    pub label_generators: Vec<GeneratorCall>,
    pub additionals: Vec<Additional>,
    /// Variable scoped to the current domain node of the mapping.
    pub variable: Option<String>,
    /// Variable shared across all mappings of the run.
    pub global_variable: Option<String>,
}

impl Entity {
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            types: types.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_generator(mut self, generator: GeneratorCall) -> Self {
        self.instance_generator = Some(generator);
        self
    }

    pub fn with_label(mut self, generator: GeneratorCall) -> Self {
        self.label_generators.push(generator);
        self
    }

    pub fn with_additional(mut self, relationship: impl Into<String>, entity: Entity) -> Self {
        self.additionals.push(Additional {
            relationship: relationship.into(),
            entity,
        });
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>) -> Self {
        self.variable = Some(name.into());
        self
    }

    pub fn with_global_variable(mut self, name: impl Into<String>) -> Self {
        self.global_variable = Some(name.into());
        self
    }
}

/// An extra entity hung off a resolved entity by one relationship.
#[derive(Debug, Clone)]
pub struct Additional {
    pub relationship: String,
    pub entity: Entity,
}

/// A reference to a named generator plus its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorCall {
    pub name: String,
    pub args: Vec<GeneratorArg>,
}

impl GeneratorCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: GeneratorArg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn arg(&self, name: &str) -> Option<&GeneratorArg> {
        self.args.iter().find(|a| a.name == name)
    }
}

/// Where a generator argument takes its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ArgSource {
    /// XPath evaluated against the context node.
    #[default]
    XPath,
    /// The literal text of the argument.
    Constant,
    /// The ordinal position of the context node.
    Position,
    /// The structural path of the node the XPath selects.
    XPathPosition,
}

impl ArgSource {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "xpath" | "" => Some(ArgSource::XPath),
            "constant" => Some(ArgSource::Constant),
            "position" => Some(ArgSource::Position),
            "xpathPosition" => Some(ArgSource::XPathPosition),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorArg {
    pub name: String,
    pub source: ArgSource,
    pub value: String,
    pub language: Option<String>,
}

impl GeneratorArg {
    pub fn new(name: impl Into<String>, source: ArgSource, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source,
            value: value.into(),
            language: None,
        }
    }

    pub fn xpath(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::new(name, ArgSource::XPath, expression)
    }

    pub fn constant(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, ArgSource::Constant, value)
    }

    pub fn position(name: impl Into<String>) -> Self {
        Self::new(name, ArgSource::Position, "")
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_relation_expression_interleaves_nodes() {
        let rel = SourceRelation {
            relations: vec!["a".into(), "c".into()],
            nodes: vec!["b".into()],
        };
        assert_eq!(rel.expression(), "a/b/c");
        assert!(!rel.is_join());
    }

    #[test]
    fn join_relation_is_detected() {
        let rel = SourceRelation::new("@id==@ref");
        assert!(rel.is_join());
    }

    #[test]
    fn merge_requires_single_relationship() {
        assert!(TargetRelation::new("MERGE").is_merge());
        assert!(!TargetRelation::new("crm:P1_is_identified_by").is_merge());
        let chained = Path::chained(
            "x",
            vec!["MERGE".into(), "crm:P2".into()],
            vec![Entity::new(["crm:E55_Type"])],
        );
        assert!(!chained.target_relation.is_merge());
    }

    #[test]
    fn arg_source_parses_known_kinds() {
        assert_eq!(ArgSource::parse("constant"), Some(ArgSource::Constant));
        assert_eq!(ArgSource::parse("xpathPosition"), Some(ArgSource::XPathPosition));
        assert_eq!(ArgSource::parse("sql"), None);
    }
}
