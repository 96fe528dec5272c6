//! Source Adapter: path queries over the XML input.
//!
//! The adapter evaluates XPath-subset expressions (see [`xpath`]) relative to a
//! context node, memoizes compiled expressions for the run, and owns the
//! range-key index used by equality-joined links (see [`range_map`]).
//!
//! Attributes are not nodes in `roxmltree`, so results are expressed as
//! [`XNode`], which is either a tree node or an `(owner, index)` attribute handle.

pub mod range_map;
pub(crate) mod xpath;

use std::collections::HashMap;
use std::rc::Rc;

use roxmltree::Node;

use crate::error::ConfigError;
use crate::model::Namespaces;

use self::range_map::RangeMapCache;
use self::xpath::{Expr, Value};

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// A node selected from the source document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum XNode<'a, 'i> {
    Node(Node<'a, 'i>),
    Attribute { owner: Node<'a, 'i>, index: usize },
}

impl<'a, 'i> XNode<'a, 'i> {
    /// Sort key giving document order; attributes follow their owner element.
    pub(crate) fn order_key(&self) -> (u32, usize) {
        match self {
            XNode::Node(n) => (n.id().get(), 0),
            XNode::Attribute { owner, index } => (owner.id().get(), index + 1),
        }
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self, XNode::Attribute { .. })
    }

    /// The element this node belongs to: itself, or the owner of an attribute.
    pub fn element(&self) -> Node<'a, 'i> {
        match self {
            XNode::Node(n) => *n,
            XNode::Attribute { owner, .. } => *owner,
        }
    }

    pub fn parent(&self) -> Option<Node<'a, 'i>> {
        match self {
            XNode::Node(n) => n.parent(),
            XNode::Attribute { owner, .. } => Some(*owner),
        }
    }

    pub(crate) fn document_root(&self) -> Node<'a, 'i> {
        self.element().document().root()
    }

    fn attribute(&self) -> Option<roxmltree::Attribute<'a, 'i>> {
        match self {
            XNode::Attribute { owner, index } => owner.attributes().nth(*index),
            XNode::Node(_) => None,
        }
    }

    /// `(namespace, local name)` of elements and attributes.
    pub(crate) fn expanded_name(&self) -> Option<(Option<&'a str>, &'a str)> {
        match self {
            XNode::Node(n) if n.is_element() => {
                let tag = n.tag_name();
                Some((tag.namespace(), tag.name()))
            }
            XNode::Node(_) => None,
            XNode::Attribute { .. } => self.attribute().map(|a| (a.namespace(), a.name())),
        }
    }

    /// Prefixed name as written in the source, falling back to the local name.
    pub fn qualified_name(&self) -> String {
        let Some((namespace, local)) = self.expanded_name() else {
            return String::new();
        };
        match namespace.and_then(|uri| self.element().lookup_prefix(uri)) {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}:{local}"),
            _ => local.to_string(),
        }
    }

    /// XPath string-value: concatenated descendant text for elements.
    pub fn string_value(&self) -> String {
        match self {
            XNode::Attribute { .. } => self.attribute().map(|a| a.value().to_string()).unwrap_or_default(),
            XNode::Node(n) if n.is_text() || n.is_comment() => n.text().unwrap_or_default().to_string(),
            XNode::Node(n) => n
                .descendants()
                .filter(|d| d.is_text())
                .filter_map(|d| d.text())
                .collect(),
        }
    }

    /// Absolute positional path of the node, e.g. `/people[1]/person[2]/@id`.
    ///
    /// Used as the identity of a context in caches and the association table.
    pub fn structural_path(&self) -> String {
        match self {
            XNode::Attribute { owner, .. } => {
                let name = self.qualified_name();
                format!("{}/@{name}", XNode::Node(*owner).structural_path())
            }
            XNode::Node(n) => {
                let mut segments = Vec::new();
                let mut cur = Some(*n);
                while let Some(node) = cur {
                    if node.is_root() {
                        break;
                    }
                    segments.push(step_label(node));
                    cur = node.parent();
                }
                if segments.is_empty() {
                    return "/".to_string();
                }
                segments.reverse();
                format!("/{}", segments.join("/"))
            }
        }
    }

    /// Nearest inherited `xml:lang`.
    pub fn language(&self) -> Option<&'a str> {
        let mut cur = Some(self.element());
        while let Some(node) = cur {
            if let Some(lang) = node.attribute((XML_NS, "lang")) {
                return Some(lang);
            }
            cur = node.parent();
        }
        None
    }
}

fn step_label(node: Node<'_, '_>) -> String {
    let same_kind = |other: &Node<'_, '_>| -> bool {
        if node.is_element() {
            other.is_element() && other.tag_name() == node.tag_name()
        } else {
            other.node_type() == node.node_type()
        }
    };
    let mut index = 1;
    let mut prev = node.prev_sibling();
    while let Some(sibling) = prev {
        if same_kind(&sibling) {
            index += 1;
        }
        prev = sibling.prev_sibling();
    }
    let name = if node.is_element() {
        XNode::Node(node).qualified_name()
    } else if node.is_text() {
        "text()".to_string()
    } else if node.is_comment() {
        "comment()".to_string()
    } else {
        "processing-instruction()".to_string()
    };
    format!("{name}[{index}]")
}

/// Expression evaluator bound to one source document for one run.
pub struct SourceAdapter<'a, 'i> {
    root: Node<'a, 'i>,
    namespaces: Namespaces,
    merge_delimiter: String,
    compiled: HashMap<String, Rc<Expr>>,
    pub(crate) range_maps: RangeMapCache<'a, 'i>,
}

impl<'a, 'i> SourceAdapter<'a, 'i> {
    pub fn new(document: &'a roxmltree::Document<'i>, namespaces: Namespaces) -> Self {
        Self {
            root: document.root(),
            namespaces,
            merge_delimiter: crate::config::DEFAULT_MERGE_DELIMITER.to_string(),
            compiled: HashMap::new(),
            range_maps: RangeMapCache::default(),
        }
    }

    pub fn with_merge_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.merge_delimiter = delimiter.into();
        self
    }

    /// The document node (parent of the root element).
    pub fn root(&self) -> XNode<'a, 'i> {
        XNode::Node(self.root)
    }

    pub fn merge_delimiter(&self) -> &str {
        &self.merge_delimiter
    }

    fn compile(&mut self, expression: &str) -> Result<Rc<Expr>, ConfigError> {
        let expression = expression.trim();
        if let Some(expr) = self.compiled.get(expression) {
            return Ok(Rc::clone(expr));
        }
        let expr = Rc::new(xpath::parse(expression).map_err(|message| ConfigError::XPath {
            expression: expression.to_string(),
            message,
        })?);
        self.compiled.insert(expression.to_string(), Rc::clone(&expr));
        Ok(expr)
    }

    fn evaluate(&mut self, node: XNode<'a, 'i>, expression: &str) -> Result<Value<'a, 'i>, ConfigError> {
        let expr = self.compile(expression)?;
        xpath::evaluate(&expr, node, &self.namespaces).map_err(|message| ConfigError::XPath {
            expression: expression.trim().to_string(),
            message,
        })
    }

    /// Nodes selected by `expression` relative to `node`, in document order.
    /// An empty expression selects `node` itself.
    pub fn select(&mut self, node: XNode<'a, 'i>, expression: &str) -> Result<Vec<XNode<'a, 'i>>, ConfigError> {
        match self.evaluate(node, expression)? {
            Value::Nodes(nodes) => Ok(nodes),
            _ => Err(ConfigError::XPath {
                expression: expression.trim().to_string(),
                message: "expression does not select nodes".into(),
            }),
        }
    }

    /// First matching value, trimmed; empty when nothing matches.
    pub fn scalar(&mut self, node: XNode<'a, 'i>, expression: &str) -> Result<String, ConfigError> {
        Ok(self.evaluate(node, expression)?.to_string_value().trim().to_string())
    }

    /// Like [`scalar`](Self::scalar) but also returns the node the value came from.
    pub fn scalar_with_node(
        &mut self,
        node: XNode<'a, 'i>,
        expression: &str,
    ) -> Result<(String, Option<XNode<'a, 'i>>), ConfigError> {
        match self.evaluate(node, expression)? {
            Value::Nodes(nodes) => {
                let first = nodes.first().copied();
                Ok((
                    first.map(|n| n.string_value().trim().to_string()).unwrap_or_default(),
                    first,
                ))
            }
            other => Ok((other.to_string_value().trim().to_string(), None)),
        }
    }

    /// All non-empty matching values joined with the merge delimiter.
    pub fn scalar_merged(&mut self, node: XNode<'a, 'i>, expression: &str) -> Result<String, ConfigError> {
        let values: Vec<String> = match self.evaluate(node, expression)? {
            Value::Nodes(nodes) => nodes
                .iter()
                .map(|n| n.string_value().trim().to_string())
                .filter(|v| !v.is_empty())
                .collect(),
            other => vec![other.to_string_value().trim().to_string()],
        };
        Ok(values.join(&self.merge_delimiter))
    }

    /// Whether `expression` yields a value: a selected node with non-blank text,
    /// or a true/non-empty atomic result.
    pub fn has_value(&mut self, node: XNode<'a, 'i>, expression: &str) -> Result<bool, ConfigError> {
        Ok(match self.evaluate(node, expression)? {
            Value::Nodes(nodes) => nodes.iter().any(|n| !n.string_value().trim().is_empty()),
            other => other.to_bool() && !other.to_string_value().trim().is_empty(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &str = r#"<people xml:lang="en">
  <person id="1"><name>Ada</name><name>Augusta</name></person>
  <person id="2"><name xml:lang="fr">Bob</name></person>
</people>"#;

    #[test]
    fn select_and_scalar() {
        let doc = roxmltree::Document::parse(XML).unwrap();
        let mut src = SourceAdapter::new(&doc, Namespaces::new());
        let people = src.select(src.root(), "/people/person").unwrap();
        assert_eq!(people.len(), 2);
        assert_eq!(src.scalar(people[0], "name/text()").unwrap(), "Ada");
        assert_eq!(src.scalar(people[1], "@id").unwrap(), "2");
        assert_eq!(src.scalar(people[1], "missing").unwrap(), "");
    }

    #[test]
    fn empty_expression_selects_context() {
        let doc = roxmltree::Document::parse(XML).unwrap();
        let mut src = SourceAdapter::new(&doc, Namespaces::new());
        let people = src.select(src.root(), "//person").unwrap();
        assert_eq!(src.select(people[0], "").unwrap(), vec![people[0]]);
    }

    #[test]
    fn merged_values_use_delimiter() {
        let doc = roxmltree::Document::parse(XML).unwrap();
        let mut src = SourceAdapter::new(&doc, Namespaces::new()).with_merge_delimiter("|");
        let people = src.select(src.root(), "//person").unwrap();
        assert_eq!(src.scalar_merged(people[0], "name").unwrap(), "Ada|Augusta");
    }

    #[test]
    fn structural_paths_are_positional() {
        let doc = roxmltree::Document::parse(XML).unwrap();
        let mut src = SourceAdapter::new(&doc, Namespaces::new());
        let names = src.select(src.root(), "//name").unwrap();
        assert_eq!(names[1].structural_path(), "/people[1]/person[1]/name[2]");
        let id = src.select(src.root(), "//person[2]/@id").unwrap();
        assert_eq!(id[0].structural_path(), "/people[1]/person[2]/@id");
        let text = src.select(names[0], "text()").unwrap();
        assert_eq!(text[0].structural_path(), "/people[1]/person[1]/name[1]/text()[1]");
    }

    #[test]
    fn language_is_inherited() {
        let doc = roxmltree::Document::parse(XML).unwrap();
        let mut src = SourceAdapter::new(&doc, Namespaces::new());
        let names = src.select(src.root(), "//name").unwrap();
        assert_eq!(names[0].language(), Some("en"));
        assert_eq!(names[2].language(), Some("fr"));
    }

    #[test]
    fn unions_come_back_in_document_order() {
        let doc = roxmltree::Document::parse(XML).unwrap();
        let mut src = SourceAdapter::new(&doc, Namespaces::new());
        let nodes = src.select(src.root(), "//name | //person/@id").unwrap();
        let paths: Vec<String> = nodes.iter().map(XNode::structural_path).collect();
        assert_eq!(
            paths,
            vec![
                "/people[1]/person[1]/@id",
                "/people[1]/person[1]/name[1]",
                "/people[1]/person[1]/name[2]",
                "/people[1]/person[2]/@id",
                "/people[1]/person[2]/name[1]",
            ]
        );
    }

    #[test]
    fn has_value_ignores_blank_nodes() {
        let doc = roxmltree::Document::parse("<r><a/><b> </b><c>x</c></r>").unwrap();
        let mut src = SourceAdapter::new(&doc, Namespaces::new());
        let r = src.select(src.root(), "/r").unwrap()[0];
        assert!(!src.has_value(r, "a").unwrap());
        assert!(!src.has_value(r, "b").unwrap());
        assert!(src.has_value(r, "c").unwrap());
        assert!(src.has_value(r, "a | c").unwrap());
        assert!(!src.has_value(r, "count(a) = 0").unwrap());
    }

    #[test]
    fn syntax_errors_are_config_errors() {
        let doc = roxmltree::Document::parse(XML).unwrap();
        let mut src = SourceAdapter::new(&doc, Namespaces::new());
        assert!(matches!(
            src.select(src.root(), "person["),
            Err(ConfigError::XPath { .. })
        ));
    }
}
