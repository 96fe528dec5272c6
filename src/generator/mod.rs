//! Generator Policy: turns a named generator plus arguments into a value.
//!
//! Resolution order for a [`GeneratorCall`]:
//!
//! 1. built-ins, matched by reserved name: `UUID`, `Literal`, `prefLabel`,
//!    `Constant`, `namedgraphURI`;
//! 2. policy entries with a `custom` class, dispatched through the
//!    [`CustomGeneratorRegistry`];
//! 3. policy entries with a pattern and a prefix: URI templates, optionally
//!    shortened to a name-based UUID or suffixed with a fresh UUID;
//! 4. policy entries with a pattern and no prefix: plain string templates
//!    producing a literal.
//!
//! Anything else is [`ConfigError::UnknownGenerator`]; [`GeneratorPolicy::check`]
//! reports it before a run starts.

pub mod custom;
pub mod policy_loader;
mod uuid_source;

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{ConfigError, ResolutionError, ResolveResult, X3mlError};
use crate::model::namespace::is_absolute_iri;
use crate::model::{GeneratorArg, GeneratorCall, Namespaces};

pub use self::custom::{CustomGenerator, CustomGeneratorRegistry, ValueKind};
pub use self::uuid_source::UuidSource;

pub const UUID: &str = "UUID";
pub const LITERAL: &str = "Literal";
pub const PREF_LABEL: &str = "prefLabel";
pub const CONSTANT: &str = "Constant";
pub const NAMED_GRAPH_URI: &str = "namedgraphURI";

const BUILTINS: [&str; 5] = [UUID, LITERAL, PREF_LABEL, CONSTANT, NAMED_GRAPH_URI];

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^}]+)\}").expect("valid regex"));

/// A produced value. Immutable once generated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GeneratedValue {
    Uri(String),
    Literal { value: String, language: Option<String> },
    TypedLiteral { value: String, datatype: String },
}

impl GeneratedValue {
    pub fn uri(value: impl Into<String>) -> Self {
        GeneratedValue::Uri(value.into())
    }

    pub fn literal(value: impl Into<String>, language: Option<String>) -> Self {
        GeneratedValue::Literal {
            value: value.into(),
            language,
        }
    }

    /// The lexical value, without language or datatype.
    pub fn as_str(&self) -> &str {
        match self {
            GeneratedValue::Uri(v) => v,
            GeneratedValue::Literal { value, .. } | GeneratedValue::TypedLiteral { value, .. } => value,
        }
    }

    pub fn is_uri(&self) -> bool {
        matches!(self, GeneratedValue::Uri(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GeneratedValue::Uri(_) => "uri",
            GeneratedValue::Literal { .. } => "literal",
            GeneratedValue::TypedLiteral { .. } => "typed literal",
        }
    }
}

/// An argument value read from the source, with the language it carries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArgValue {
    pub value: String,
    pub language: Option<String>,
}

impl ArgValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            language: None,
        }
    }
}

/// Supplies argument values from the current resolution context.
pub trait ArgResolver {
    /// Value of `arg`. With `merged`, every match of an XPath argument is joined
    /// with the merge delimiter. Returns an empty value when nothing matches.
    fn resolve(&mut self, arg: &GeneratorArg, merged: bool) -> Result<ArgValue, X3mlError>;
}

/// Per-run state a generator may draw on.
pub struct GeneratorEnv<'r> {
    pub namespaces: &'r Namespaces,
    pub uuids: &'r mut UuidSource,
    pub default_language: Option<&'r str>,
    pub merge_delimiter: &'r str,
}

/// How a policy entry produces its value.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratorBody {
    Pattern(String),
    Custom { class: String },
}

/// One entry of the generator policy.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorSpec {
    pub name: String,
    /// Namespace prefix (or absolute namespace IRI) of produced URIs.
    pub prefix: Option<String>,
    /// Replace the expanded local part with a name-based UUID.
    pub shorten: bool,
    /// Append a fresh UUID to the expanded local part.
    pub uuid: bool,
    pub body: GeneratorBody,
}

impl GeneratorSpec {
    pub fn pattern(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: None,
            shorten: false,
            uuid: false,
            body: GeneratorBody::Pattern(pattern.into()),
        }
    }

    pub fn custom(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: None,
            shorten: false,
            uuid: false,
            body: GeneratorBody::Custom { class: class.into() },
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn shortened(mut self) -> Self {
        self.shorten = true;
        self
    }

    pub fn with_uuid(mut self) -> Self {
        self.uuid = true;
        self
    }
}

/// Named generator table plus the custom generator registry.
#[derive(Debug, Clone, Default)]
pub struct GeneratorPolicy {
    generators: BTreeMap<String, GeneratorSpec>,
    custom: CustomGeneratorRegistry,
}

impl GeneratorPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_generator(mut self, spec: GeneratorSpec) -> Self {
        self.insert(spec);
        self
    }

    pub fn insert(&mut self, spec: GeneratorSpec) {
        self.generators.insert(spec.name.clone(), spec);
    }

    pub fn get(&self, name: &str) -> Option<&GeneratorSpec> {
        self.generators.get(name)
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    pub fn custom_generators(&self) -> &CustomGeneratorRegistry {
        &self.custom
    }

    pub fn set_custom_generators(&mut self, registry: CustomGeneratorRegistry) {
        self.custom = registry;
    }

    /// Fail fast on a call that can never resolve.
    pub fn check(&self, call: &GeneratorCall) -> Result<(), ConfigError> {
        if BUILTINS.contains(&call.name.as_str()) {
            return Ok(());
        }
        let spec = self.generators.get(&call.name).ok_or_else(|| ConfigError::UnknownGenerator {
            name: call.name.clone(),
        })?;
        match &spec.body {
            GeneratorBody::Custom { class } if !self.custom.contains(class) => {
                Err(ConfigError::UnknownCustomGenerator { class: class.clone() })
            }
            GeneratorBody::Custom { .. } => Ok(()),
            GeneratorBody::Pattern(pattern) => {
                for name in placeholders(pattern) {
                    if call.arg(name).is_none() {
                        return Err(missing_argument(call, name));
                    }
                }
                Ok(())
            }
        }
    }

    /// Produce the value of `call`.
    pub fn generate(
        &self,
        call: &GeneratorCall,
        args: &mut dyn ArgResolver,
        env: &mut GeneratorEnv<'_>,
    ) -> ResolveResult<GeneratedValue> {
        match call.name.as_str() {
            UUID => return Ok(GeneratedValue::Uri(env.uuids.next_uri())),
            LITERAL | PREF_LABEL => return literal(call, args, env),
            CONSTANT => return constant(call, args, env),
            NAMED_GRAPH_URI => {
                let text = required(call, "text", args, false)?;
                return Ok(GeneratedValue::Uri(text.value));
            }
            _ => {}
        }
        let spec = self.generators.get(&call.name).ok_or_else(|| ConfigError::UnknownGenerator {
            name: call.name.clone(),
        })?;
        match (&spec.body, &spec.prefix) {
            (GeneratorBody::Custom { class }, _) => self.custom_value(spec, class, call, args, env),
            (GeneratorBody::Pattern(pattern), Some(prefix)) => {
                uri_template(spec, pattern, prefix, call, args, env)
            }
            (GeneratorBody::Pattern(pattern), None) => simple_template(pattern, call, args, env),
        }
    }

    fn custom_value(
        &self,
        spec: &GeneratorSpec,
        class: &str,
        call: &GeneratorCall,
        args: &mut dyn ArgResolver,
        env: &mut GeneratorEnv<'_>,
    ) -> ResolveResult<GeneratedValue> {
        let mut generator = self
            .custom
            .create(class, env.merge_delimiter)
            .ok_or_else(|| ConfigError::UnknownCustomGenerator { class: class.to_string() })?;
        let merged = generator.merges_arguments();
        let mut language = None;
        let mut explicit_language = false;
        for arg in &call.args {
            let value = args.resolve(arg, merged)?;
            if arg.name == "language" {
                language = Some(value.value);
                explicit_language = true;
                continue;
            }
            if language.is_none() && !explicit_language {
                language = value.language.clone();
            }
            generator
                .set_argument(&arg.name, &value.value)
                .map_err(|e| custom_failure(class, e))?;
        }
        let value = generator.value().map_err(|e| custom_failure(class, e))?;
        match generator.value_kind() {
            ValueKind::Uuid => Ok(GeneratedValue::Uri(value)),
            ValueKind::Uri => {
                let value = match &spec.prefix {
                    Some(prefix) if generator.uses_namespace() && !is_absolute_iri(&value) => {
                        format!("{}{value}", namespace_iri(prefix, env.namespaces)?)
                    }
                    _ => value,
                };
                Ok(GeneratedValue::Uri(value))
            }
            ValueKind::Literal => {
                if value.trim().is_empty() {
                    return Err(ResolutionError::EmptyLiteral {
                        generator: call.name.clone(),
                    }
                    .into());
                }
                Ok(GeneratedValue::Literal {
                    value,
                    language: effective_language(language, env.default_language),
                })
            }
        }
    }
}

/// Placeholder names of a template, in order of appearance.
pub fn placeholders(pattern: &str) -> impl Iterator<Item = &str> {
    PLACEHOLDER
        .captures_iter(pattern)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str())
}

/// Percent-encode a value for use inside an IRI path segment.
pub fn iri_escape(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' | '_' | '~' => result.push(c),
            '!' | '$' | '&' | '\'' | '(' | ')' | '*' | '+' | ',' | ';' | '=' | ':' | '@' => {
                result.push(c)
            }
            ' ' => result.push_str("%20"),
            _ => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).as_bytes() {
                    result.push_str(&format!("%{byte:02X}"));
                }
            }
        }
    }
    result
}

fn missing_argument(call: &GeneratorCall, argument: &str) -> ConfigError {
    ConfigError::MissingArgument {
        generator: call.name.clone(),
        argument: argument.to_string(),
    }
}

fn custom_failure(class: &str, failure: custom::CustomGeneratorFailure) -> ResolutionError {
    ResolutionError::CustomGenerator {
        class: class.to_string(),
        message: failure.0,
    }
}

/// The declared argument `name`, resolved. Missing declarations are fatal.
fn required(
    call: &GeneratorCall,
    name: &str,
    args: &mut dyn ArgResolver,
    merged: bool,
) -> ResolveResult<ArgValue> {
    let arg = call.arg(name).ok_or_else(|| missing_argument(call, name))?;
    Ok(args.resolve(arg, merged)?)
}

/// Language of a literal: an explicit `language` argument wins (empty strips
/// the tag), then the inherited language, then the configured default.
fn literal_language(
    call: &GeneratorCall,
    inherited: Option<String>,
    args: &mut dyn ArgResolver,
    env: &GeneratorEnv<'_>,
) -> ResolveResult<Option<String>> {
    let explicit = match call.arg("language") {
        Some(arg) => Some(args.resolve(arg, false)?.value),
        None => None,
    };
    Ok(effective_language(explicit.or(inherited), env.default_language))
}

fn effective_language(language: Option<String>, default: Option<&str>) -> Option<String> {
    match language {
        Some(lang) if lang.trim().is_empty() => None,
        Some(lang) => Some(lang.trim().to_string()),
        None => default.map(str::to_string),
    }
}

fn literal(
    call: &GeneratorCall,
    args: &mut dyn ArgResolver,
    env: &mut GeneratorEnv<'_>,
) -> ResolveResult<GeneratedValue> {
    let text = required(call, "text", args, false)?;
    if text.value.is_empty() {
        return Err(ResolutionError::EmptyLiteral {
            generator: call.name.clone(),
        }
        .into());
    }
    let language = literal_language(call, text.language, args, env)?;
    Ok(GeneratedValue::Literal {
        value: text.value,
        language,
    })
}

fn constant(
    call: &GeneratorCall,
    args: &mut dyn ArgResolver,
    env: &mut GeneratorEnv<'_>,
) -> ResolveResult<GeneratedValue> {
    let arg = call.arg("text").ok_or_else(|| missing_argument(call, "text"))?;
    let language = literal_language(call, arg.language.clone(), args, env)?;
    Ok(GeneratedValue::Literal {
        value: arg.value.clone(),
        language,
    })
}

/// Namespace IRI for a policy prefix, which may also be an IRI itself.
fn namespace_iri(prefix: &str, namespaces: &Namespaces) -> Result<String, ConfigError> {
    if is_absolute_iri(prefix) {
        return Ok(prefix.to_string());
    }
    namespaces
        .get(prefix)
        .map(str::to_string)
        .ok_or_else(|| ConfigError::UnknownPrefix {
            prefix: prefix.to_string(),
            qname: format!("{prefix}:"),
        })
}

/// Replace each `{name}` with the resolved argument; `escape` is applied to values.
fn substitute(
    pattern: &str,
    call: &GeneratorCall,
    args: &mut dyn ArgResolver,
    escape: fn(&str) -> String,
) -> ResolveResult<(String, Option<String>)> {
    let mut result = String::with_capacity(pattern.len());
    let mut first_language = None;
    let mut first = true;
    let mut last = 0;
    for cap in PLACEHOLDER.captures_iter(pattern) {
        let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let value = required(call, name.as_str(), args, false)?;
        if value.value.is_empty() {
            return Err(ResolutionError::MissingValue {
                generator: call.name.clone(),
                argument: name.as_str().to_string(),
            }
            .into());
        }
        if first {
            first_language = value.language.clone();
            first = false;
        }
        result.push_str(&pattern[last..whole.start()]);
        result.push_str(&escape(&value.value));
        last = whole.end();
    }
    result.push_str(&pattern[last..]);
    Ok((result, first_language))
}

fn uri_template(
    spec: &GeneratorSpec,
    pattern: &str,
    prefix: &str,
    call: &GeneratorCall,
    args: &mut dyn ArgResolver,
    env: &mut GeneratorEnv<'_>,
) -> ResolveResult<GeneratedValue> {
    let (mut local, _) = substitute(pattern, call, args, iri_escape)?;
    if spec.shorten {
        local = ::uuid::Uuid::new_v5(&::uuid::Uuid::NAMESPACE_URL, local.as_bytes()).to_string();
    } else if spec.uuid {
        local.push_str(&env.uuids.next_suffix());
    }
    if is_absolute_iri(&local) {
        return Ok(GeneratedValue::Uri(local));
    }
    Ok(GeneratedValue::Uri(format!("{}{local}", namespace_iri(prefix, env.namespaces)?)))
}

fn simple_template(
    pattern: &str,
    call: &GeneratorCall,
    args: &mut dyn ArgResolver,
    env: &mut GeneratorEnv<'_>,
) -> ResolveResult<GeneratedValue> {
    let (value, inherited) = substitute(pattern, call, args, str::to_string)?;
    let language = literal_language(call, inherited, args, env)?;
    Ok(GeneratedValue::Literal { value, language })
}
