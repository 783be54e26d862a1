//! Predicate filtering over events and catalogues.
//!
//! # Responsibility
//! - Define the predicate algebra ([`predicate`]).
//! - Lower predicates into a validated, catalogue-expanded plan ([`plan`]).
//! - Evaluate plans in memory ([`eval`]) or compile them to SQL ([`sql`]).
//!
//! # Invariants
//! - Both evaluation strategies consume the same plan and return the same
//!   result set for the same inputs.
//! - Unknown fields, invalid regexes and catalogue cycles are reported while
//!   planning, before any candidate is evaluated.

use crate::db::DbError;
use crate::model::entity::EntityKind;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod eval;
pub mod plan;
pub mod predicate;
pub(crate) mod sql;

pub type FilterResult<T> = Result<T, FilterError>;

#[derive(Debug)]
pub enum FilterError {
    /// `Field(name)` is not a filterable field of the target kind.
    UnknownField { kind: EntityKind, name: String },
    /// `Match` pattern does not compile.
    InvalidRegex { pattern: String, message: String },
    /// Dynamic catalogues reference each other in a cycle.
    Recursion(Uuid),
    /// `InCatalogue` used while filtering catalogues.
    CatalogueFilter,
    /// `InCatalogue` names a catalogue that does not exist.
    CatalogueNotFound(Uuid),
    /// A stored catalogue predicate cannot be decoded.
    InvalidStoredPredicate { catalogue: Uuid, message: String },
    Db(DbError),
}

impl Display for FilterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownField { kind, name } => {
                write!(f, "unknown {kind} field `{name}`")
            }
            Self::InvalidRegex { pattern, message } => {
                write!(f, "invalid regex `{pattern}`: {message}")
            }
            Self::Recursion(uuid) => {
                write!(f, "catalogue {uuid} references itself through its predicate")
            }
            Self::CatalogueFilter => {
                write!(f, "InCatalogue cannot be used to filter catalogues")
            }
            Self::CatalogueNotFound(uuid) => write!(f, "catalogue not found: {uuid}"),
            Self::InvalidStoredPredicate { catalogue, message } => {
                write!(f, "stored predicate of catalogue {catalogue} is invalid: {message}")
            }
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for FilterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for FilterError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for FilterError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
