//! Validation and handle errors raised by the entity model.
//!
//! # Responsibility
//! - Describe every field or attribute constraint a mutation can violate.
//! - Normalize externally supplied UUID text.
//!
//! # Invariants
//! - Validation happens before any storage write.

use crate::model::value::Timestamp;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub const RATING_MIN: i64 = 1;
pub const RATING_MAX: i64 = 10;

/// Constraint violation on an entity field or attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Text is not a hyphenated 36-character UUID.
    InvalidUuid(String),
    /// Event `start` is after `stop`.
    InvalidTimeRange { start: Timestamp, stop: Timestamp },
    /// Rating outside `1..=10`.
    RatingOutOfRange(i64),
    /// A `tags`/`products` entry contains a comma.
    CommaInList { field: &'static str, value: String },
    /// Catalogue name is empty after trimming.
    EmptyName,
    /// Attribute name does not match `[A-Za-z][A-Za-z0-9_]*`.
    InvalidAttributeName(String),
    /// Attribute name collides with a fixed field or reserved key.
    ReservedAttributeName(String),
    /// Float attribute is NaN or infinite.
    NonFiniteFloat,
    /// Value has no attribute representation.
    UnsupportedValue(String),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidUuid(value) => write!(f, "invalid uuid `{value}`"),
            Self::InvalidTimeRange { start, stop } => {
                write!(f, "start `{start}` must not be after stop `{stop}`")
            }
            Self::RatingOutOfRange(value) => write!(
                f,
                "rating {value} is outside {RATING_MIN}..={RATING_MAX}"
            ),
            Self::CommaInList { field, value } => {
                write!(f, "{field} entry `{value}` must not contain a comma")
            }
            Self::EmptyName => write!(f, "catalogue name must not be empty"),
            Self::InvalidAttributeName(name) => write!(
                f,
                "attribute name `{name}` must match [A-Za-z][A-Za-z0-9_]*"
            ),
            Self::ReservedAttributeName(name) => {
                write!(f, "attribute name `{name}` is reserved")
            }
            Self::NonFiniteFloat => write!(f, "float attribute values must be finite"),
            Self::UnsupportedValue(value) => {
                write!(f, "unsupported attribute value `{value}`")
            }
        }
    }
}

impl Error for ValidationError {}

/// Operation attempted on a handle whose entity was hard-deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidHandleError;

impl Display for InvalidHandleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "entity handle is no longer backed by storage")
    }
}

impl Error for InvalidHandleError {}

/// Parses UUID text in the hyphenated 36-character form.
///
/// Any UUID version is accepted; output is the lowercase canonical form.
pub fn parse_uuid(value: &str) -> Result<Uuid, ValidationError> {
    let trimmed = value.trim();
    if trimmed.len() != 36 {
        return Err(ValidationError::InvalidUuid(value.to_string()));
    }
    Uuid::try_parse(trimmed).map_err(|_| ValidationError::InvalidUuid(value.to_string()))
}

pub(crate) fn validate_rating(rating: Option<i64>) -> Result<(), ValidationError> {
    match rating {
        Some(value) if !(RATING_MIN..=RATING_MAX).contains(&value) => {
            Err(ValidationError::RatingOutOfRange(value))
        }
        _ => Ok(()),
    }
}

pub(crate) fn validate_list(field: &'static str, values: &[String]) -> Result<(), ValidationError> {
    match values.iter().find(|value| value.contains(',')) {
        Some(value) => Err(ValidationError::CommaInList {
            field,
            value: value.clone(),
        }),
        None => Ok(()),
    }
}
