//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate backend calls into catalogue use cases.
//! - Translate storage and filter failures into one caller-facing error.
//!
//! # Invariants
//! - Services never bypass model validation on their way to the backend.
//! - Service layer remains storage-agnostic.

use crate::filter::FilterError;
use crate::model::entity::EntityKind;
use crate::model::validation::{InvalidHandleError, ValidationError};
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod catalogue_service;
pub mod membership;
pub mod session;
pub mod tabular;
pub mod transfer;

pub type CoreResult<T> = Result<T, CoreError>;

/// Caller-facing error of every service operation.
#[derive(Debug)]
pub enum CoreError {
    Validation(ValidationError),
    /// Attempt to delete a schema-defined field.
    FixedKey(String),
    /// Operation on a handle whose entity was hard-deleted.
    InvalidHandle,
    /// Dynamic catalogues reference each other in a cycle.
    Recursion(Uuid),
    /// `InCatalogue` used while filtering catalogues.
    CatalogueFilter,
    /// Import record differs from the stored entity with the same UUID.
    Conflict { kind: EntityKind, uuid: Uuid },
    NotFound(String),
    AlreadyAssigned { catalogue: Uuid, event: Uuid },
    NotAssigned { catalogue: Uuid, event: Uuid },
    /// `save`/`discard` called while a session is open, or a session
    /// finished while a session opened after it is still open.
    SessionActive,
    /// Session was already rolled back together with an enclosing session.
    SessionClosed,
    /// Malformed import bundle or table.
    Format(String),
    Filter(FilterError),
    Repo(RepoError),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::FixedKey(name) => write!(f, "fixed field `{name}` cannot be deleted"),
            Self::InvalidHandle => write!(f, "{}", InvalidHandleError),
            Self::Recursion(uuid) => {
                write!(f, "catalogue {uuid} references itself through its predicate")
            }
            Self::CatalogueFilter => {
                write!(f, "InCatalogue cannot be used to filter catalogues")
            }
            Self::Conflict { kind, uuid } => write!(
                f,
                "imported {kind} {uuid} differs from the stored {kind} with the same uuid"
            ),
            Self::NotFound(what) => write!(f, "{what} not found"),
            Self::AlreadyAssigned { catalogue, event } => write!(
                f,
                "event {event} is already assigned to catalogue {catalogue}"
            ),
            Self::NotAssigned { catalogue, event } => {
                write!(f, "event {event} is not assigned to catalogue {catalogue}")
            }
            Self::SessionActive => write!(f, "operation refused while a session is open"),
            Self::SessionClosed => {
                write!(f, "session was rolled back with an enclosing session")
            }
            Self::Format(message) => write!(f, "invalid format: {message}"),
            Self::Filter(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Filter(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for CoreError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<InvalidHandleError> for CoreError {
    fn from(_: InvalidHandleError) -> Self {
        Self::InvalidHandle
    }
}

impl From<FilterError> for CoreError {
    fn from(value: FilterError) -> Self {
        match value {
            FilterError::Recursion(uuid) => Self::Recursion(uuid),
            FilterError::CatalogueFilter => Self::CatalogueFilter,
            FilterError::CatalogueNotFound(uuid) => Self::NotFound(format!("catalogue {uuid}")),
            other => Self::Filter(other),
        }
    }
}

impl From<RepoError> for CoreError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Filter(err) => err.into(),
            RepoError::NotFound { kind, id } => Self::NotFound(format!("{kind} #{id}")),
            RepoError::DuplicateUuid { kind, uuid } => Self::Conflict { kind, uuid },
            other => Self::Repo(other),
        }
    }
}
