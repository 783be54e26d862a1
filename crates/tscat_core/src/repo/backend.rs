//! Backend trait and query models.

use crate::filter::plan::CatalogueLookup;
use crate::filter::predicate::Predicate;
use crate::model::attributes::Attributes;
use crate::model::catalogue::{Catalogue, CatalogueFields};
use crate::model::entity::{EntityId, EntityKind, RemoveMode};
use crate::model::event::{Event, EventFields};
use crate::model::value::AttributeValue;
use crate::repo::RepoResult;
use std::collections::HashMap;
use uuid::Uuid;

/// Identifier of one open unit of work, unique per backend.
pub type UnitId = u64;

/// Query for events.
///
/// With neither `predicate` nor `catalogue` set, every event in the
/// selected trash state matches; with both, the union matches.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub predicate: Option<Predicate>,
    /// Include the explicit members of this catalogue.
    pub catalogue: Option<EntityId>,
    /// Set `Event::assigned` from explicit membership in this catalogue.
    pub flag_assigned_in: Option<EntityId>,
    /// `true` selects only removed events, `false` only live ones.
    pub removed: bool,
}

/// Query for catalogues.
#[derive(Debug, Clone, Default)]
pub struct CatalogueQuery {
    pub predicate: Option<Predicate>,
    /// Restrict to catalogues explicitly containing this event.
    pub event: Option<EntityId>,
    pub removed: bool,
}

/// Storage operations behind the catalogue service.
///
/// Results are ordered by insertion.
pub trait Backend: CatalogueLookup {
    /// Whether the row behind `id` is still stored, in or out of the trash.
    fn exists(&self, kind: EntityKind, id: EntityId) -> RepoResult<bool>;

    fn add_event(&self, fields: &EventFields, attributes: &Attributes) -> RepoResult<EntityId>;
    fn add_catalogue(
        &self,
        fields: &CatalogueFields,
        attributes: &Attributes,
    ) -> RepoResult<EntityId>;

    /// Rewrites every fixed field of one event.
    fn update_event_field(&self, id: EntityId, fields: &EventFields) -> RepoResult<()>;
    /// Rewrites every fixed field of one catalogue.
    fn update_catalogue_field(&self, id: EntityId, fields: &CatalogueFields) -> RepoResult<()>;
    /// Inserts or replaces one variable attribute.
    fn update_attribute(
        &self,
        kind: EntityKind,
        id: EntityId,
        name: &str,
        value: &AttributeValue,
    ) -> RepoResult<()>;
    fn delete_attribute(&self, kind: EntityKind, id: EntityId, name: &str) -> RepoResult<()>;

    fn remove(&self, kind: EntityKind, id: EntityId, mode: RemoveMode) -> RepoResult<()>;
    fn restore(&self, kind: EntityKind, id: EntityId) -> RepoResult<()>;

    fn add_events_to_catalogue(&self, catalogue: EntityId, events: &[EntityId]) -> RepoResult<()>;
    fn remove_events_from_catalogue(
        &self,
        catalogue: EntityId,
        events: &[EntityId],
    ) -> RepoResult<()>;

    fn get_events(&self, query: &EventQuery) -> RepoResult<Vec<Event>>;
    fn get_catalogues(&self, query: &CatalogueQuery) -> RepoResult<Vec<Catalogue>>;
    /// Looks events up by identity regardless of trash state.
    fn get_events_by_uuid_list(&self, uuids: &[Uuid]) -> RepoResult<HashMap<Uuid, Event>>;
    /// Looks a catalogue up by identity regardless of trash state.
    fn get_catalogue_by_uuid(&self, uuid: Uuid) -> RepoResult<Option<Catalogue>>;

    fn commit(&self) -> RepoResult<()>;
    fn rollback(&self) -> RepoResult<()>;
    fn has_unsaved_changes(&self) -> bool;

    /// Opens a unit of work nested in every unit still open.
    fn begin_unit(&self) -> RepoResult<UnitId>;
    /// Keeps the writes of `unit`, which must be the innermost open unit.
    fn release_unit(&self, unit: UnitId) -> RepoResult<()>;
    /// Undoes the writes of `unit` and closes it together with every unit
    /// opened after it.
    fn rollback_unit(&self, unit: UnitId) -> RepoResult<()>;
}
