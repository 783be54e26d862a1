//! Event and catalogue queries with catalogue membership resolution.
//!
//! # Responsibility
//! - Resolve the event set of a catalogue from explicit members and its
//!   predicate.
//! - Route predicate queries to the backend and to in-memory candidates.
//!
//! # Invariants
//! - Resolved membership of a dynamic catalogue is the de-duplicated union of
//!   explicit members and predicate matches.
//! - Only catalogue-scoped results carry an `assigned` flag.

use crate::filter::eval::{filter_catalogues, filter_events};
use crate::filter::predicate::Predicate;
use crate::model::catalogue::Catalogue;
use crate::model::entity::{Entity, EntityId, EntityKind};
use crate::model::event::Event;
use crate::repo::backend::{Backend, CatalogueQuery, EventQuery};
use crate::service::catalogue_service::CatalogueService;
use crate::service::{CoreError, CoreResult};

/// Which events an event query starts from.
#[derive(Debug, Clone)]
pub enum EventScope<'a> {
    All,
    Predicate(Predicate),
    /// Membership of one catalogue, narrowed by [`QueryOptions::membership`].
    Catalogue(&'a Catalogue),
}

/// Narrowing of a catalogue-scoped event query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Membership {
    /// Explicit members plus predicate matches.
    #[default]
    Resolved,
    /// Explicit members only, even for a dynamic catalogue.
    AssignedOnly,
    /// Predicate matches only; empty for a static catalogue.
    FilteredOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryOptions {
    /// `true` returns only trashed entities.
    pub removed_items: bool,
    /// Ignored unless the scope is a catalogue.
    pub membership: Membership,
}

impl QueryOptions {
    pub fn removed() -> Self {
        Self {
            removed_items: true,
            ..Self::default()
        }
    }

    pub fn membership(membership: Membership) -> Self {
        Self {
            membership,
            ..Self::default()
        }
    }
}

/// Which catalogues a catalogue query starts from.
#[derive(Debug, Clone)]
pub enum CatalogueScope<'a> {
    All,
    Predicate(Predicate),
    /// Catalogues holding this event as an explicit member.
    Event(&'a Event),
}

impl<B: Backend> CatalogueService<B> {
    /// Lists events in insertion order.
    ///
    /// # Errors
    /// - `InvalidHandle` for a hard-deleted scope catalogue.
    /// - `Recursion` when dynamic catalogues reference each other in a cycle.
    pub fn get_events(
        &self,
        scope: EventScope<'_>,
        options: QueryOptions,
    ) -> CoreResult<Vec<Event>> {
        let query = match scope {
            EventScope::All => EventQuery {
                removed: options.removed_items,
                ..EventQuery::default()
            },
            EventScope::Predicate(predicate) => EventQuery {
                predicate: Some(predicate),
                removed: options.removed_items,
                ..EventQuery::default()
            },
            EventScope::Catalogue(catalogue) => {
                let id = self.stored_id(catalogue.state().id()?, EntityKind::Catalogue)?;
                let predicate = catalogue.fields().predicate.clone();
                let (predicate, members) = match options.membership {
                    Membership::Resolved => (predicate, Some(id)),
                    Membership::AssignedOnly => (None, Some(id)),
                    Membership::FilteredOnly => match predicate {
                        Some(predicate) => (Some(predicate), None),
                        None => return Ok(Vec::new()),
                    },
                };
                EventQuery {
                    predicate,
                    catalogue: members,
                    flag_assigned_in: Some(id),
                    removed: options.removed_items,
                }
            }
        };
        Ok(self.backend().get_events(&query)?)
    }

    /// Lists catalogues in insertion order.
    ///
    /// # Errors
    /// - `CatalogueFilter` when the predicate uses `InCatalogue`.
    /// - `InvalidHandle` for a hard-deleted scope event.
    pub fn get_catalogues(
        &self,
        scope: CatalogueScope<'_>,
        removed_items: bool,
    ) -> CoreResult<Vec<Catalogue>> {
        let query = match scope {
            CatalogueScope::All => CatalogueQuery {
                removed: removed_items,
                ..CatalogueQuery::default()
            },
            CatalogueScope::Predicate(predicate) => CatalogueQuery {
                predicate: Some(predicate),
                removed: removed_items,
                ..CatalogueQuery::default()
            },
            CatalogueScope::Event(event) => CatalogueQuery {
                event: Some(self.stored_id(event.state().id()?, EntityKind::Event)?),
                removed: removed_items,
                ..CatalogueQuery::default()
            },
        };
        Ok(self.backend().get_catalogues(&query)?)
    }

    /// Applies `predicate` to already-loaded events.
    ///
    /// `InCatalogue` leaves still consult the backend for membership.
    pub fn filter_events(&self, predicate: &Predicate, events: &[Event]) -> CoreResult<Vec<Event>> {
        ensure_valid(events)?;
        Ok(filter_events(predicate, events, self.backend())?)
    }

    /// Applies `predicate` to already-loaded catalogues.
    pub fn filter_catalogues(
        &self,
        predicate: &Predicate,
        catalogues: &[Catalogue],
    ) -> CoreResult<Vec<Catalogue>> {
        ensure_valid(catalogues)?;
        Ok(filter_catalogues(predicate, catalogues, self.backend())?)
    }

    /// Rejects ids whose row was hard-deleted, possibly through another
    /// handle of the same entity.
    fn stored_id(&self, id: EntityId, kind: EntityKind) -> CoreResult<EntityId> {
        if !self.backend().exists(kind, id)? {
            return Err(CoreError::InvalidHandle);
        }
        Ok(id)
    }
}

fn ensure_valid<E: Entity>(entities: &[E]) -> CoreResult<()> {
    if entities.iter().any(|entity| !entity.is_valid()) {
        return Err(CoreError::InvalidHandle);
    }
    Ok(())
}
