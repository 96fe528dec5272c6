//! Condition Evaluator.
//!
//! Conditions gate domain, path and range contexts. Evaluation answers whether a
//! condition **fails**: a failing condition discards the context it guards.
//!
//! | condition | fails when |
//! |---|---|
//! | none | never |
//! | `exists(e)` | `e` yields no value: no node with text, or false/empty |
//! | `equals(e, v)` | the value of `e` differs from `v` |
//! | `broader(e, v)` | the value of `e` is neither `v` nor a broader term of `v` |
//! | `narrower(e, v)` | the value of `e` is neither `v` nor a narrower term of `v` |
//! | `exact_match(e, v)` | the value of `e` is neither `v` nor an exact match of `v` |
//! | `and(cs)` | any child fails (`and([])` never fails) |
//! | `or(cs)` | every child fails (`or([])` always fails) |
//! | `not(c)` | `c` does not fail |
//!
//! Terminology leaves need a terminology even when the value equals `v`.

use std::fmt;

use crate::error::{TerminologyError, X3mlResult};
use crate::source::{SourceAdapter, XNode};
use crate::terminology::Terminology;

/// Boolean rule tree guarding a context.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Exists { expression: String },
    Equals { expression: String, value: String },
    Broader { expression: String, value: String },
    Narrower { expression: String, value: String },
    ExactMatch { expression: String, value: String },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn exists(expression: impl Into<String>) -> Self {
        Condition::Exists {
            expression: expression.into(),
        }
    }

    pub fn equals(expression: impl Into<String>, value: impl Into<String>) -> Self {
        Condition::Equals {
            expression: expression.into(),
            value: value.into(),
        }
    }

    pub fn broader(expression: impl Into<String>, value: impl Into<String>) -> Self {
        Condition::Broader {
            expression: expression.into(),
            value: value.into(),
        }
    }

    pub fn narrower(expression: impl Into<String>, value: impl Into<String>) -> Self {
        Condition::Narrower {
            expression: expression.into(),
            value: value.into(),
        }
    }

    pub fn exact_match(expression: impl Into<String>, value: impl Into<String>) -> Self {
        Condition::ExactMatch {
            expression: expression.into(),
            value: value.into(),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(condition: Condition) -> Self {
        Condition::Not(Box::new(condition))
    }

    /// Whether this condition fails for `node`.
    ///
    /// Terminology conditions without a terminology are a fatal error.
    pub fn fails<'a, 'i>(
        &self,
        source: &mut SourceAdapter<'a, 'i>,
        node: XNode<'a, 'i>,
        terminology: Option<&dyn Terminology>,
    ) -> X3mlResult<bool> {
        match self {
            Condition::Exists { expression } => Ok(!source.has_value(node, expression)?),
            Condition::Equals { expression, value } => Ok(source.scalar(node, expression)? != *value),
            Condition::Broader { expression, value } => {
                let terminology = require(terminology, self)?;
                let found = source.scalar(node, expression)?;
                Ok(found != *value && !terminology.broader_terms_of(value)?.contains(&found))
            }
            Condition::Narrower { expression, value } => {
                let terminology = require(terminology, self)?;
                let found = source.scalar(node, expression)?;
                Ok(found != *value && !terminology.narrower_terms_of(value)?.contains(&found))
            }
            Condition::ExactMatch { expression, value } => {
                let terminology = require(terminology, self)?;
                let found = source.scalar(node, expression)?;
                Ok(found != *value && !terminology.exact_match_terms_of(value)?.contains(&found))
            }
            Condition::And(children) => {
                for child in children {
                    if child.fails(source, node, terminology)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Or(children) => {
                for child in children {
                    if !child.fails(source, node, terminology)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Not(child) => Ok(!child.fails(source, node, terminology)?),
        }
    }
}

/// [`Condition::fails`] for an optional condition; no condition never fails.
pub fn condition_fails<'a, 'i>(
    condition: Option<&Condition>,
    source: &mut SourceAdapter<'a, 'i>,
    node: XNode<'a, 'i>,
    terminology: Option<&dyn Terminology>,
) -> X3mlResult<bool> {
    match condition {
        Some(condition) => condition.fails(source, node, terminology),
        None => Ok(false),
    }
}

fn require<'t>(
    terminology: Option<&'t dyn Terminology>,
    condition: &Condition,
) -> Result<&'t dyn Terminology, TerminologyError> {
    terminology.ok_or_else(|| TerminologyError::Missing {
        condition: condition.to_string(),
    })
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Exists { expression } => write!(f, "exists({expression})"),
            Condition::Equals { expression, value } => write!(f, "equals({expression}, {value:?})"),
            Condition::Broader { expression, value } => write!(f, "broader({expression}, {value:?})"),
            Condition::Narrower { expression, value } => write!(f, "narrower({expression}, {value:?})"),
            Condition::ExactMatch { expression, value } => {
                write!(f, "exact_match({expression}, {value:?})")
            }
            Condition::And(children) => write_list(f, "and", children),
            Condition::Or(children) => write_list(f, "or", children),
            Condition::Not(child) => write!(f, "not({child})"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, op: &str, children: &[Condition]) -> fmt::Result {
    write!(f, "{op}(")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{child}")?;
    }
    write!(f, ")")
}
