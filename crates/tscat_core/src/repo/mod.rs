//! Storage backend contract and SQLite implementation.
//!
//! # Responsibility
//! - Define the storage operations the catalogue service relies on.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Callers validate entities before any write reaches a backend.
//! - Backend APIs return semantic errors (`NotFound`, `AlreadyAssigned`, ...)
//!   in addition to transport errors.
//! - Writes join the open transaction, or open one exclusively.

use crate::db::DbError;
use crate::filter::FilterError;
use crate::model::entity::{EntityId, EntityKind};
use crate::repo::backend::UnitId;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod backend;
pub mod sqlite_backend;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    Filter(FilterError),
    /// Target row does not exist.
    NotFound { kind: EntityKind, id: EntityId },
    /// Another row already uses this UUID.
    DuplicateUuid { kind: EntityKind, uuid: Uuid },
    /// Event is already an explicit member of the catalogue.
    AlreadyAssigned { catalogue: EntityId, event: EntityId },
    /// Event is not an explicit member of the catalogue.
    NotAssigned { catalogue: EntityId, event: EntityId },
    /// Unit of work is not open, or was closed with an enclosing unit.
    NoOpenUnit(UnitId),
    /// Unit of work still encloses units opened after it.
    UnitNotInnermost(UnitId),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted to a valid entity.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Filter(err) => write!(f, "{err}"),
            Self::NotFound { kind, id } => write!(f, "{kind} not found: #{id}"),
            Self::DuplicateUuid { kind, uuid } => {
                write!(f, "{kind} with uuid {uuid} already exists")
            }
            Self::AlreadyAssigned { catalogue, event } => write!(
                f,
                "event #{event} is already assigned to catalogue #{catalogue}"
            ),
            Self::NotAssigned { catalogue, event } => write!(
                f,
                "event #{event} is not assigned to catalogue #{catalogue}"
            ),
            Self::NoOpenUnit(unit) => write!(f, "unit of work #{unit} is not open"),
            Self::UnitNotInnermost(unit) => {
                write!(f, "unit of work #{unit} still encloses open units")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "catalogue storage requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "catalogue storage requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Filter(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<FilterError> for RepoError {
    fn from(value: FilterError) -> Self {
        Self::Filter(value)
    }
}
