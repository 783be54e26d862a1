//! Predicate algebra over events and catalogues.
//!
//! # Responsibility
//! - Define the predicate AST shared by both evaluation strategies.
//! - Provide the stable textual form used when comparing stored predicates.
//! - Provide the serde form used in storage and in the JSON wire format.
//!
//! # Invariants
//! - Predicates are plain values; they never hold entity handles, only
//!   catalogue UUIDs.

use crate::model::catalogue::Catalogue;
use crate::model::entity::Entity;
use crate::model::validation::{parse_uuid, InvalidHandleError, ValidationError};
use crate::model::value::{format_timestamp, normalize_timestamp, AttributeValue, Timestamp};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Left-hand side of a leaf predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Operand {
    /// Fixed schema field of the target entity kind.
    Field(String),
    /// Variable attribute by name.
    Attribute(String),
}

impl Operand {
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    pub fn attribute(name: impl Into<String>) -> Self {
        Self::Attribute(name.into())
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Field(name) => write!(f, "Field({})", quoted(name)),
            Self::Attribute(name) => write!(f, "Attribute({})", quoted(name)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl ComparisonOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// Whether `lhs op rhs` holds given `lhs.cmp(rhs)`.
    pub(crate) fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Literal {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(Timestamp),
}

impl Literal {
    /// Orders a stored value against this literal; `None` across types.
    pub(crate) fn compare_from(&self, value: &AttributeValue) -> Option<Ordering> {
        match (value, self) {
            (AttributeValue::String(lhs), Self::String(rhs)) => Some(lhs.as_str().cmp(rhs.as_str())),
            (AttributeValue::Integer(lhs), Self::Integer(rhs)) => Some(lhs.cmp(rhs)),
            (AttributeValue::Float(lhs), Self::Float(rhs)) => lhs.partial_cmp(rhs),
            (AttributeValue::Boolean(lhs), Self::Boolean(rhs)) => Some(lhs.cmp(rhs)),
            (AttributeValue::Timestamp(lhs), Self::Timestamp(rhs)) => Some(lhs.cmp(rhs)),
            _ => None,
        }
    }

    pub(crate) fn normalized(&self) -> Self {
        match self {
            Self::Timestamp(value) => Self::Timestamp(normalize_timestamp(*value)),
            other => other.clone(),
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(value) => f.write_str(&quoted(value)),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) if value.is_finite() && value.fract() == 0.0 => {
                write!(f, "{value:.1}")
            }
            Self::Float(value) => write!(f, "{value}"),
            Self::Boolean(true) => f.write_str("True"),
            Self::Boolean(false) => f.write_str("False"),
            Self::Timestamp(value) => write!(f, "Timestamp({})", quoted(&format_timestamp(value))),
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<Timestamp> for Literal {
    fn from(value: Timestamp) -> Self {
        Self::Timestamp(value)
    }
}

/// Boolean expression over one entity kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// `lhs op rhs`; false when the operand is absent or of another type.
    Comparison {
        op: ComparisonOp,
        lhs: Operand,
        rhs: Literal,
    },
    /// Regex search over a string operand.
    Match { lhs: Operand, pattern: String },
    /// The named variable attribute is present.
    Has { attribute: String },
    /// `value` is an element of a list-typed operand.
    In { value: String, lhs: Operand },
    Not(Box<Predicate>),
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    /// Membership in a catalogue; `None` means "in no catalogue".
    InCatalogue { catalogue: Option<Uuid> },
}

impl Predicate {
    pub fn comparison(op: ComparisonOp, lhs: Operand, rhs: impl Into<Literal>) -> Self {
        Self::Comparison {
            op,
            lhs,
            rhs: rhs.into(),
        }
    }

    pub fn matches(lhs: Operand, pattern: impl Into<String>) -> Self {
        Self::Match {
            lhs,
            pattern: pattern.into(),
        }
    }

    pub fn has(attribute: impl Into<String>) -> Self {
        Self::Has {
            attribute: attribute.into(),
        }
    }

    pub fn contains(lhs: Operand, value: impl Into<String>) -> Self {
        Self::In {
            value: value.into(),
            lhs,
        }
    }

    pub fn all(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Self::All(predicates.into_iter().collect())
    }

    pub fn any(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Self::Any(predicates.into_iter().collect())
    }

    pub fn in_catalogue(catalogue: &Catalogue) -> Result<Self, InvalidHandleError> {
        Ok(Self::InCatalogue {
            catalogue: Some(catalogue.uuid()?),
        })
    }

    pub fn in_catalogue_uuid(catalogue: Uuid) -> Self {
        Self::InCatalogue {
            catalogue: Some(catalogue),
        }
    }

    pub fn in_no_catalogue() -> Self {
        Self::InCatalogue { catalogue: None }
    }

    /// Shorthand for `Comparison('==', Field('uuid'), <normalized uuid>)`.
    pub fn uuid(value: &str) -> Result<Self, ValidationError> {
        let uuid = parse_uuid(value)?;
        Ok(Self::comparison(
            ComparisonOp::Eq,
            Operand::field("uuid"),
            uuid.to_string(),
        ))
    }
}

impl std::ops::Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Self::Output {
        Predicate::Not(Box::new(self))
    }
}

impl Display for Predicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Comparison { op, lhs, rhs } => {
                write!(f, "Comparison({}, {lhs}, {rhs})", quoted(op.as_str()))
            }
            Self::Match { lhs, pattern } => write!(f, "Match({lhs}, {})", quoted(pattern)),
            Self::Has { attribute } => {
                write!(f, "Has({})", Operand::Attribute(attribute.clone()))
            }
            Self::In { value, lhs } => write!(f, "In({}, {lhs})", quoted(value)),
            Self::Not(inner) => write!(f, "Not({inner})"),
            Self::All(predicates) => write_list(f, "All", predicates),
            Self::Any(predicates) => write_list(f, "Any", predicates),
            Self::InCatalogue {
                catalogue: Some(uuid),
            } => write!(f, "InCatalogue({uuid})"),
            Self::InCatalogue { catalogue: None } => write!(f, "InCatalogue(None)"),
        }
    }
}

fn write_list(f: &mut Formatter<'_>, name: &str, predicates: &[Predicate]) -> std::fmt::Result {
    write!(f, "{name}(")?;
    for (index, predicate) in predicates.iter().enumerate() {
        if index > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{predicate}")?;
    }
    write!(f, ")")
}

fn quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}
