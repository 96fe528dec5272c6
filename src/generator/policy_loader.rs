//! Generator policy document loader.
//!
//! ```xml
//! <generator_policy>
//!   <generator name="PersonURI" prefix="ex">
//!     <pattern>person/{id}</pattern>
//!   </generator>
//!   <generator name="Names">
//!     <custom generatorClass="gr.forth.ConcatMultipleTerms">
//!       <set-arg name="text" type="xpath"/>
//!     </custom>
//!   </generator>
//! </generator_policy>
//! ```

use std::path::Path;

use roxmltree::Node;

use crate::error::LoadError;

use super::{GeneratorBody, GeneratorPolicy, GeneratorSpec};

const DOCUMENT: &str = "generator policy";

/// Parse a generator policy document.
pub fn load_policy(xml: &str) -> Result<GeneratorPolicy, LoadError> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| LoadError::Xml {
        document: DOCUMENT.into(),
        message: e.to_string(),
    })?;
    let root = doc.root_element();
    if root.tag_name().name() != "generator_policy" {
        return Err(structure(format!(
            "expected <generator_policy>, found <{}>",
            root.tag_name().name()
        )));
    }

    let mut policy = GeneratorPolicy::new();
    for node in root.children().filter(|n| n.has_tag_name("generator")) {
        let spec = generator(node)?;
        if policy.get(&spec.name).is_some() {
            tracing::warn!(name = %spec.name, "generator declared twice, keeping the last one");
        }
        policy.insert(spec);
    }
    tracing::debug!(generators = policy.len(), "generator policy loaded");
    Ok(policy)
}

/// Read and parse a generator policy file.
pub fn load_policy_file(path: &Path) -> Result<GeneratorPolicy, LoadError> {
    let xml = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load_policy(&xml)
}

fn generator(node: Node<'_, '_>) -> Result<GeneratorSpec, LoadError> {
    let name = node
        .attribute("name")
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| structure("<generator> without a name".into()))?;

    let pattern = node.children().find(|n| n.has_tag_name("pattern"));
    let custom = node.children().find(|n| n.has_tag_name("custom"));
    let body = match (pattern, custom) {
        (Some(pattern), None) => GeneratorBody::Pattern(pattern.text().unwrap_or_default().trim().to_string()),
        (None, Some(custom)) => {
            let class = custom
                .attribute("generatorClass")
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .ok_or_else(|| structure(format!("custom generator \"{name}\" has no generatorClass")))?;
            GeneratorBody::Custom { class: class.to_string() }
        }
        (Some(_), Some(_)) => {
            return Err(structure(format!(
                "generator \"{name}\" declares both a pattern and a custom class"
            )));
        }
        (None, None) => {
            return Err(structure(format!(
                "generator \"{name}\" declares neither a pattern nor a custom class"
            )));
        }
    };

    Ok(GeneratorSpec {
        name: name.to_string(),
        prefix: node
            .attribute("prefix")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string),
        shorten: flag(node, "shorten"),
        uuid: flag(node, "uuid"),
        body,
    })
}

fn flag(node: Node<'_, '_>, name: &str) -> bool {
    matches!(node.attribute(name).map(str::trim), Some("yes" | "true"))
}

fn structure(message: String) -> LoadError {
    LoadError::Structure {
        document: DOCUMENT.into(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_patterns_and_custom_generators() {
        let policy = load_policy(
            r#"<generator_policy>
                 <generator name="PersonURI" prefix="ex" shorten="yes">
                   <pattern>person/{id}</pattern>
                 </generator>
                 <generator name="Title"><pattern>{first} {last}</pattern></generator>
                 <generator name="Names">
                   <custom generatorClass="gr.forth.ConcatMultipleTerms">
                     <set-arg name="text" type="xpath"/>
                   </custom>
                 </generator>
               </generator_policy>"#,
        )
        .unwrap();
        assert_eq!(policy.len(), 3);

        let person = policy.get("PersonURI").unwrap();
        assert_eq!(person.prefix.as_deref(), Some("ex"));
        assert!(person.shorten);
        assert!(!person.uuid);
        assert_eq!(person.body, GeneratorBody::Pattern("person/{id}".into()));

        assert_eq!(policy.get("Title").unwrap().prefix, None);
        assert_eq!(
            policy.get("Names").unwrap().body,
            GeneratorBody::Custom {
                class: "gr.forth.ConcatMultipleTerms".into()
            }
        );
    }

    #[test]
    fn empty_policy_is_valid() {
        assert!(load_policy("<generator_policy/>").unwrap().is_empty());
    }

    #[test]
    fn generator_without_body_is_rejected() {
        let err = load_policy(r#"<generator_policy><generator name="X"/></generator_policy>"#).unwrap_err();
        assert!(matches!(err, LoadError::Structure { .. }));
    }

    #[test]
    fn wrong_root_is_rejected() {
        assert!(matches!(load_policy("<x3ml/>"), Err(LoadError::Structure { .. })));
        assert!(matches!(load_policy("<generator_policy>"), Err(LoadError::Xml { .. })));
    }
}
