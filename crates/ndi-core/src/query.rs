//! Search queries over documents.
//!
//! A [`Query`] is a tree of leaf [`Predicate`]s combined with AND/OR.
//! Evaluation is pure: a missing field or a value that cannot be coerced to
//! the operator's type is simply "no match", so heterogeneous documents can
//! be searched with one query.
//!
//! Storage backends may translate parts of a query into their own lookup
//! language, but [`Query::matches`] is the reference: every backend's search
//! must return exactly the documents for which it returns true.

use std::ops::{BitAnd, BitOr};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Document;
use crate::error::CoreError;
use crate::hierarchy::ClassHierarchy;
use crate::id::DocumentId;

/// Dependency name that matches any slot in a `depends_on` predicate.
pub const ANY_DEPENDENCY: &str = "*";

/// Leaf comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    ExactString,
    ContainsString,
    Regexp,
    ExactNumber,
    #[serde(alias = "lessthan")]
    LessThan,
    #[serde(alias = "lessthaneq")]
    LessThanOrEqual,
    #[serde(alias = "greaterthan")]
    GreaterThan,
    #[serde(alias = "greaterthaneq")]
    GreaterThanOrEqual,
    Isa,
    DependsOn,
    #[serde(rename = "hasfield")]
    HasField,
}

impl Operator {
    /// True for operators that read `field` from the document.
    pub fn uses_field(self) -> bool {
        !matches!(self, Operator::Isa | Operator::DependsOn)
    }

    fn is_numeric(self) -> bool {
        matches!(
            self,
            Operator::ExactNumber
                | Operator::LessThan
                | Operator::LessThanOrEqual
                | Operator::GreaterThan
                | Operator::GreaterThanOrEqual
        )
    }
}

/// A single comparison.
///
/// `param1` is the operand for field operators, the class name for `isa`,
/// and the dependency name for `depends_on`. `param2` is only used by
/// `depends_on`, where it holds the expected dependency value (empty or null
/// means "slot exists").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    #[serde(default)]
    pub field: String,
    pub operation: Operator,
    #[serde(default)]
    pub param1: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub param2: Value,
}

/// A query tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "QueryRepr", into = "QueryRepr")]
pub enum Query {
    Leaf(Predicate),
    /// Matches if every child matches (vacuously true when empty).
    And(Vec<Query>),
    /// Matches if any child matches (false when empty).
    Or(Vec<Query>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum QueryRepr {
    And { and: Vec<Query> },
    Or { or: Vec<Query> },
    Leaf(Predicate),
}

impl From<QueryRepr> for Query {
    fn from(repr: QueryRepr) -> Self {
        match repr {
            QueryRepr::And { and } => Query::And(and),
            QueryRepr::Or { or } => Query::Or(or),
            QueryRepr::Leaf(p) => Query::Leaf(p),
        }
    }
}

impl From<Query> for QueryRepr {
    fn from(query: Query) -> Self {
        match query {
            Query::And(and) => QueryRepr::And { and },
            Query::Or(or) => QueryRepr::Or { or },
            Query::Leaf(p) => QueryRepr::Leaf(p),
        }
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

impl Query {
    pub fn leaf(field: &str, operation: Operator, param1: Value, param2: Value) -> Self {
        Query::Leaf(Predicate {
            field: field.to_string(),
            operation,
            param1,
            param2,
        })
    }

    fn field_op(field: &str, operation: Operator, operand: Value) -> Self {
        Query::leaf(field, operation, operand, Value::Null)
    }

    pub fn exact_string(field: &str, value: &str) -> Self {
        Query::field_op(field, Operator::ExactString, Value::from(value))
    }

    pub fn contains_string(field: &str, value: &str) -> Self {
        Query::field_op(field, Operator::ContainsString, Value::from(value))
    }

    pub fn regexp(field: &str, pattern: &str) -> Self {
        Query::field_op(field, Operator::Regexp, Value::from(pattern))
    }

    pub fn exact_number(field: &str, value: f64) -> Self {
        Query::field_op(field, Operator::ExactNumber, Value::from(value))
    }

    pub fn less_than(field: &str, value: f64) -> Self {
        Query::field_op(field, Operator::LessThan, Value::from(value))
    }

    pub fn less_than_or_equal(field: &str, value: f64) -> Self {
        Query::field_op(field, Operator::LessThanOrEqual, Value::from(value))
    }

    pub fn greater_than(field: &str, value: f64) -> Self {
        Query::field_op(field, Operator::GreaterThan, Value::from(value))
    }

    pub fn greater_than_or_equal(field: &str, value: f64) -> Self {
        Query::field_op(field, Operator::GreaterThanOrEqual, Value::from(value))
    }

    pub fn has_field(field: &str) -> Self {
        Query::field_op(field, Operator::HasField, Value::Null)
    }

    pub fn isa(class: &str) -> Self {
        Query::leaf("", Operator::Isa, Value::from(class), Value::Null)
    }

    /// Dependency `name` holds `value`. Use [`ANY_DEPENDENCY`] as the name to
    /// match any slot.
    pub fn depends_on(name: &str, value: &str) -> Self {
        Query::leaf("", Operator::DependsOn, Value::from(name), Value::from(value))
    }

    /// Dependency slot `name` exists, whatever its value.
    pub fn has_dependency(name: &str) -> Self {
        Query::leaf("", Operator::DependsOn, Value::from(name), Value::Null)
    }

    /// Shorthand for an exact match on `base.id`.
    pub fn id(id: &DocumentId) -> Self {
        Query::exact_string("base.id", &id.to_string())
    }

    pub fn and(children: impl IntoIterator<Item = Query>) -> Self {
        Query::And(children.into_iter().collect())
    }

    pub fn or(children: impl IntoIterator<Item = Query>) -> Self {
        Query::Or(children.into_iter().collect())
    }

    // -----------------------------------------------------------------------
    // Evaluation
    // -----------------------------------------------------------------------

    /// Evaluates the query against `doc` using the built-in class hierarchy.
    pub fn matches(&self, doc: &Document) -> bool {
        self.matches_with(doc, ClassHierarchy::builtin())
    }

    pub fn matches_with(&self, doc: &Document, hierarchy: &ClassHierarchy) -> bool {
        match self {
            Query::Leaf(p) => p.matches_with(doc, hierarchy),
            Query::And(children) => children.iter().all(|q| q.matches_with(doc, hierarchy)),
            Query::Or(children) => children.iter().any(|q| q.matches_with(doc, hierarchy)),
        }
    }

    /// Reports operands that can never match: malformed regular expressions,
    /// non-numeric operands of numeric operators, and missing field paths or
    /// names. Evaluation does not depend on this check.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            Query::Leaf(p) => p.validate(),
            Query::And(children) | Query::Or(children) => {
                children.iter().try_for_each(|q| q.validate())
            }
        }
    }
}

impl BitAnd for Query {
    type Output = Query;

    fn bitand(self, rhs: Query) -> Query {
        match self {
            Query::And(mut children) => {
                children.push(rhs);
                Query::And(children)
            }
            other => Query::And(vec![other, rhs]),
        }
    }
}

impl BitOr for Query {
    type Output = Query;

    fn bitor(self, rhs: Query) -> Query {
        match self {
            Query::Or(mut children) => {
                children.push(rhs);
                Query::Or(children)
            }
            other => Query::Or(vec![other, rhs]),
        }
    }
}

// ---------------------------------------------------------------------------
// Leaf evaluation
// ---------------------------------------------------------------------------

/// Numeric view of a value. Numeric strings coerce; booleans do not.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

impl Predicate {
    pub fn matches(&self, doc: &Document) -> bool {
        self.matches_with(doc, ClassHierarchy::builtin())
    }

    pub fn matches_with(&self, doc: &Document, hierarchy: &ClassHierarchy) -> bool {
        match self.operation {
            Operator::Isa => match self.param1.as_str() {
                Some(class) => doc.isa_in(hierarchy, class),
                None => false,
            },
            Operator::DependsOn => self.matches_dependency(doc),
            Operator::HasField => doc.field(&self.field).is_some(),
            op => match doc.field(&self.field) {
                Some(value) => self.compare(op, &value),
                None => false,
            },
        }
    }

    fn matches_dependency(&self, doc: &Document) -> bool {
        let Some(name) = self.param1.as_str() else {
            return false;
        };
        let expected = match &self.param2 {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.as_str()),
            _ => return false,
        };
        doc.dependencies().iter().any(|dep| {
            (name == ANY_DEPENDENCY || dep.name == name)
                && expected.map_or(true, |value| dep.value == value)
        })
    }

    fn compare(&self, op: Operator, value: &Value) -> bool {
        match op {
            Operator::ExactString => match (value.as_str(), self.param1.as_str()) {
                (Some(actual), Some(wanted)) => actual == wanted,
                _ => false,
            },
            Operator::ContainsString => match (value.as_str(), self.param1.as_str()) {
                (Some(actual), Some(wanted)) => actual.contains(wanted),
                _ => false,
            },
            Operator::Regexp => match (value.as_str(), self.param1.as_str()) {
                (Some(actual), Some(pattern)) => Regex::new(pattern)
                    .map(|re| re.is_match(actual))
                    .unwrap_or(false),
                _ => false,
            },
            numeric => {
                let (Some(actual), Some(wanted)) = (as_number(value), as_number(&self.param1))
                else {
                    return false;
                };
                match numeric {
                    Operator::ExactNumber => actual == wanted,
                    Operator::LessThan => actual < wanted,
                    Operator::LessThanOrEqual => actual <= wanted,
                    Operator::GreaterThan => actual > wanted,
                    Operator::GreaterThanOrEqual => actual >= wanted,
                    _ => false,
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.operation.uses_field() && self.field.is_empty() {
            return Err(CoreError::invalid(format!(
                "{:?} requires a field path",
                self.operation
            )));
        }
        match self.operation {
            Operator::Regexp => {
                let pattern = self
                    .param1
                    .as_str()
                    .ok_or_else(|| CoreError::invalid("regexp operand must be a string"))?;
                Regex::new(pattern)
                    .map(|_| ())
                    .map_err(|e| CoreError::invalid(format!("bad regular expression: {}", e)))
            }
            Operator::ExactString | Operator::ContainsString => {
                if self.param1.is_string() {
                    Ok(())
                } else {
                    Err(CoreError::invalid(format!(
                        "{:?} operand must be a string",
                        self.operation
                    )))
                }
            }
            op if op.is_numeric() => match as_number(&self.param1) {
                Some(_) => Ok(()),
                None => Err(CoreError::invalid(format!(
                    "{:?} operand '{}' is not numeric",
                    op, self.param1
                ))),
            },
            Operator::Isa | Operator::DependsOn => match self.param1.as_str() {
                Some(name) if !name.is_empty() => Ok(()),
                _ => Err(CoreError::invalid(format!(
                    "{:?} requires a name",
                    self.operation
                ))),
            },
            _ => Ok(()),
        }
    }
}
