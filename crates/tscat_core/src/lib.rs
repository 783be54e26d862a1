//! Core domain logic for tscat, an embedded catalogue of time intervals.
//! This crate is the single source of truth for catalogue invariants.

pub mod db;
pub mod filter;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use db::{open_db, open_db_in_memory, DbError};
pub use filter::plan::{CatalogueLookup, PredicatePlan};
pub use filter::predicate::{ComparisonOp, Literal, Operand, Predicate};
pub use filter::FilterError;
pub use logging::{default_log_level, init_logging, logging_status, LoggingError, LoggingStatus};
pub use model::attributes::Attributes;
pub use model::catalogue::{Catalogue, CatalogueDraft, CatalogueField, CatalogueFields};
pub use model::entity::{Dump, Entity, EntityKind, RemoveMode};
pub use model::event::{Event, EventDraft, EventField, EventFields};
pub use model::validation::{InvalidHandleError, ValidationError};
pub use model::value::{AttributeValue, Timestamp, ValueKind};
pub use repo::backend::{Backend, CatalogueQuery, EventQuery, UnitId};
pub use repo::sqlite_backend::SqliteBackend;
pub use repo::{RepoError, RepoResult};
pub use service::catalogue_service::CatalogueService;
pub use service::membership::{CatalogueScope, EventScope, Membership, QueryOptions};
pub use service::session::Session;
pub use service::tabular::{export_tabular, import_tabular, Column, Table, TabularDocument};
pub use service::transfer::{
    canonicalize, commit_canonical, export_bundle, export_json, import_bundle, import_json,
    Bundle, CanonicalBundle, CatalogueRecord, EventRecord,
};
pub use service::{CoreError, CoreResult};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
