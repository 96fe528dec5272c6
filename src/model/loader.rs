//! X3ML mapping document loader.
//!
//! Reads the XML syntax of a mapping document into a [`MappingDocument`]:
//!
//! ```xml
//! <x3ml>
//!   <namespaces><namespace prefix="crm" uri="http://www.cidoc-crm.org/cidoc-crm/"/></namespaces>
//!   <mappings>
//!     <mapping>
//!       <domain>
//!         <source_node>/people/person</source_node>
//!         <target_node><entity><type>crm:E21_Person</type>
//!           <instance_generator name="UUID"/>
//!         </entity></target_node>
//!       </domain>
//!       <link>
//!         <path>
//!           <source_relation><relation>name</relation></source_relation>
//!           <target_relation><relationship>crm:P1_is_identified_by</relationship></target_relation>
//!         </path>
//!         <range>
//!           <source_node>name</source_node>
//!           <target_node><entity><type>crm:E41_Appellation</type>
//!             <instance_generator name="UUID"/>
//!           </entity></target_node>
//!         </range>
//!       </link>
//!     </mapping>
//!   </mappings>
//! </x3ml>
//! ```
//!
//! Only the element layout is checked here. Rules that depend on the generator
//! policy or on namespace expansion are checked by the engine before a run.

use std::path::Path as FsPath;

use roxmltree::Node;

use crate::error::LoadError;

use super::{
    Additional, ArgSource, Condition, Domain, Entity, GeneratorArg, GeneratorCall, Link, Mapping,
    MappingDocument, Namespaces, Path, Range, SourceRelation, TargetNode, TargetRelation,
};

const DOCUMENT: &str = "mapping";

/// Parse a mapping document.
pub fn load_mapping(xml: &str) -> Result<MappingDocument, LoadError> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| LoadError::Xml {
        document: DOCUMENT.into(),
        message: e.to_string(),
    })?;
    let root = doc.root_element();
    if root.tag_name().name() != "x3ml" {
        return Err(structure(format!("expected <x3ml>, found <{}>", root.tag_name().name())));
    }

    let mut namespaces = Namespaces::new();
    for ns in children(root, "namespaces").flat_map(|n| children(n, "namespace")) {
        let prefix = ns.attribute("prefix").map(str::trim).unwrap_or_default();
        let uri = required_attribute(ns, "uri")?;
        namespaces.insert(prefix, uri);
    }

    let mut document = MappingDocument::new(namespaces);
    for node in children(root, "mappings").flat_map(|n| children(n, "mapping")) {
        document.mappings.push(mapping(node)?);
    }
    tracing::debug!(mappings = document.mappings.len(), "mapping document loaded");
    Ok(document)
}

/// Read and parse a mapping file.
pub fn load_mapping_file(path: &FsPath) -> Result<MappingDocument, LoadError> {
    let xml = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load_mapping(&xml)
}

fn mapping(node: Node<'_, '_>) -> Result<Mapping, LoadError> {
    let domain_node = child(node, "domain")?;
    let target = child(domain_node, "target_node")?;
    let domain = Domain {
        source_node: text_of(child(domain_node, "source_node")?),
        target: target_node(target)?,
        named_graph: match children(target, "named_graph").next() {
            Some(graph) => Some(generator(child(graph, "instance_generator")?)?),
            None => None,
        },
    };

    let links = children(node, "link").map(link).collect::<Result<Vec<_>, _>>()?;
    Ok(Mapping {
        domain,
        links,
        named_graph: named_graph_attribute(node),
        skip: skipped(node),
    })
}

fn link(node: Node<'_, '_>) -> Result<Link, LoadError> {
    let path_node = child(node, "path")?;
    let range_node = child(node, "range")?;

    let mut relations = Vec::new();
    let mut nodes = Vec::new();
    for element in child(path_node, "source_relation")?.children().filter(Node::is_element) {
        match element.tag_name().name() {
            "relation" => relations.push(text_of(element)),
            "node" => nodes.push(text_of(element)),
            other => return Err(structure(format!("unexpected <{other}> in <source_relation>"))),
        }
    }
    if relations.is_empty() {
        return Err(structure("<source_relation> without a <relation>".into()));
    }

    let target = child(path_node, "target_relation")?;
    let mut target_relation = TargetRelation {
        condition: conditions(target)?,
        relationships: Vec::new(),
        entities: Vec::new(),
    };
    for element in target.children().filter(Node::is_element) {
        match element.tag_name().name() {
            "relationship" => target_relation.relationships.push(text_of(element)),
            "entity" => target_relation.entities.push(entity(element)?),
            "if" => {}
            other => return Err(structure(format!("unexpected <{other}> in <target_relation>"))),
        }
    }
    if target_relation.relationships.is_empty() {
        return Err(structure("<target_relation> without a <relationship>".into()));
    }

    Ok(Link {
        path: Path {
            source_relation: SourceRelation { relations, nodes },
            target_relation,
        },
        range: Range {
            source_node: text_of(child(range_node, "source_node")?),
            target: target_node(child(range_node, "target_node")?)?,
        },
        named_graph: named_graph_attribute(node),
        skip: skipped(node),
    })
}

fn target_node(node: Node<'_, '_>) -> Result<TargetNode, LoadError> {
    let mut entities = children(node, "entity");
    let first = entities
        .next()
        .ok_or_else(|| structure("<target_node> without an <entity>".into()))?;
    if entities.next().is_some() {
        return Err(structure("<target_node> declares more than one <entity>".into()));
    }
    Ok(TargetNode {
        entity: entity(first)?,
        condition: conditions(node)?,
    })
}

fn entity(node: Node<'_, '_>) -> Result<Entity, LoadError> {
    let mut entity = Entity {
        variable: non_empty_attribute(node, "variable"),
        global_variable: non_empty_attribute(node, "global_variable"),
        ..Entity::default()
    };
    for element in node.children().filter(Node::is_element) {
        match element.tag_name().name() {
            "type" => entity.types.push(text_of(element)),
            "instance_generator" => {
                if entity.instance_generator.is_some() {
                    return Err(structure("entity declares more than one <instance_generator>".into()));
                }
                entity.instance_generator = Some(generator(element)?);
            }
            "label_generator" => entity.label_generators.push(generator(element)?),
            "additional" => entity.additionals.push(Additional {
                relationship: text_of(child(element, "relationship")?),
                entity: entity_in(element)?,
            }),
            other => return Err(structure(format!("unexpected <{other}> in <entity>"))),
        }
    }
    Ok(entity)
}

fn entity_in(node: Node<'_, '_>) -> Result<Entity, LoadError> {
    entity(child(node, "entity")?)
}

fn generator(node: Node<'_, '_>) -> Result<GeneratorCall, LoadError> {
    let mut call = GeneratorCall::new(required_attribute(node, "name")?);
    for arg in children(node, "arg") {
        let name = required_attribute(arg, "name")?;
        let kind = arg.attribute("type").map(str::trim).unwrap_or_default();
        let source = ArgSource::parse(kind)
            .ok_or_else(|| structure(format!("argument \"{name}\" has unknown type \"{kind}\"")))?;
        let mut value = GeneratorArg::new(name, source, text_of(arg));
        value.language = arg.attribute("language").map(|l| l.trim().to_string());
        call.args.push(value);
    }
    Ok(call)
}

/// The `<if>` children of `node`, combined with `and` when there are several.
fn conditions(node: Node<'_, '_>) -> Result<Option<Condition>, LoadError> {
    let mut all = children(node, "if").map(if_block).collect::<Result<Vec<_>, _>>()?;
    Ok(match all.len() {
        0 => None,
        1 => all.pop(),
        _ => Some(Condition::And(all)),
    })
}

fn if_block(node: Node<'_, '_>) -> Result<Condition, LoadError> {
    let mut elements = node.children().filter(Node::is_element);
    let inner = elements
        .next()
        .ok_or_else(|| structure("empty <if>".into()))?;
    if elements.next().is_some() {
        return Err(structure("<if> holds more than one condition".into()));
    }
    condition(inner)
}

fn condition(node: Node<'_, '_>) -> Result<Condition, LoadError> {
    let expression = || text_of(node);
    let value = || required_attribute(node, "value").map(str::to_string);
    Ok(match node.tag_name().name() {
        "exists" => Condition::exists(expression()),
        "equals" => Condition::equals(expression(), value()?),
        "broader" => Condition::broader(expression(), value()?),
        "narrower" => Condition::narrower(expression(), value()?),
        "exact_match" => Condition::exact_match(expression(), value()?),
        "and" => Condition::And(children(node, "if").map(if_block).collect::<Result<_, _>>()?),
        "or" => Condition::Or(children(node, "if").map(if_block).collect::<Result<_, _>>()?),
        "not" => Condition::not(if_block(child(node, "if")?)?),
        other => return Err(structure(format!("unknown condition <{other}>"))),
    })
}

fn children<'a, 'i>(node: Node<'a, 'i>, name: &'static str) -> impl Iterator<Item = Node<'a, 'i>> {
    node.children().filter(move |n| n.has_tag_name(name))
}

fn child<'a, 'i>(node: Node<'a, 'i>, name: &'static str) -> Result<Node<'a, 'i>, LoadError> {
    children(node, name)
        .next()
        .ok_or_else(|| structure(format!("<{}> without <{name}>", node.tag_name().name())))
}

fn text_of(node: Node<'_, '_>) -> String {
    node.text().unwrap_or_default().trim().to_string()
}

fn required_attribute<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str, LoadError> {
    node.attribute(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| structure(format!("<{}> without a {name} attribute", node.tag_name().name())))
}

fn non_empty_attribute(node: Node<'_, '_>, name: &str) -> Option<String> {
    node.attribute(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn named_graph_attribute(node: Node<'_, '_>) -> Option<String> {
    non_empty_attribute(node, "namedgraph")
}

fn skipped(node: Node<'_, '_>) -> bool {
    matches!(node.attribute("skip").map(str::trim), Some("true" | "yes"))
}

fn structure(message: String) -> LoadError {
    LoadError::Structure {
        document: DOCUMENT.into(),
        message,
    }
}
