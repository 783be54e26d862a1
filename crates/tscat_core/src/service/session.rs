//! Unit-of-work scope for batched writes.
//!
//! # Responsibility
//! - Group entity creation and membership changes into one savepoint.
//! - Flush on [`Session::finish`], roll back on every other exit path.
//!
//! # Invariants
//! - A session borrows its service; `save`/`discard` are refused while any
//!   session is open.
//! - Dropping an unfinished session undoes exactly the writes made since it
//!   began; earlier unsaved writes survive.
//! - Sessions close in reverse order of opening. Closing a session rolls back
//!   every session opened after it that is still open.

use crate::model::attributes::Attributes;
use crate::model::catalogue::{Catalogue, CatalogueDraft, CatalogueFields};
use crate::model::entity::{Entity, EntityId, EntityState};
use crate::model::event::{Event, EventDraft, EventFields};
use crate::repo::backend::{Backend, UnitId};
use crate::repo::RepoError;
use crate::service::catalogue_service::CatalogueService;
use crate::service::{CoreError, CoreResult};
use log::{debug, error, warn};
use uuid::Uuid;

/// Open unit of work on a [`CatalogueService`].
///
/// Obtained from [`CatalogueService::session`]. Writes become visible to
/// the service at once; they become durable only after `finish` and a
/// later `save`.
pub struct Session<'s, B: Backend> {
    service: &'s CatalogueService<B>,
    unit: UnitId,
    created: usize,
    finished: bool,
}

impl<'s, B: Backend> Session<'s, B> {
    pub(crate) fn begin(service: &'s CatalogueService<B>) -> CoreResult<Self> {
        let unit = service.backend().begin_unit()?;
        service.session_opened();
        Ok(Self {
            service,
            unit,
            created: 0,
            finished: false,
        })
    }

    /// Number of entities created through this session so far.
    pub fn created(&self) -> usize {
        self.created
    }

    pub fn create_event(&mut self, draft: EventDraft) -> CoreResult<Event> {
        let (fields, attributes) = draft.validate()?;
        self.insert_event(fields, attributes)
    }

    pub fn create_catalogue(&mut self, draft: CatalogueDraft) -> CoreResult<Catalogue> {
        let (fields, attributes) = draft.validate()?;
        self.insert_catalogue(fields, attributes)
    }

    pub(crate) fn insert_event(
        &mut self,
        fields: EventFields,
        attributes: Attributes,
    ) -> CoreResult<Event> {
        let id = self.service.backend().add_event(&fields, &attributes)?;
        self.created += 1;
        Ok(Event::from_parts(
            fields,
            attributes,
            EntityState::stored(id, false),
            None,
        ))
    }

    pub(crate) fn insert_catalogue(
        &mut self,
        fields: CatalogueFields,
        attributes: Attributes,
    ) -> CoreResult<Catalogue> {
        let id = self.service.backend().add_catalogue(&fields, &attributes)?;
        self.created += 1;
        Ok(Catalogue::from_parts(
            fields,
            attributes,
            EntityState::stored(id, false),
        ))
    }

    /// Adds events to the explicit member set of `catalogue`.
    ///
    /// # Errors
    /// - `InvalidHandle` when any handle was hard-deleted.
    /// - `AlreadyAssigned` when an event is already an explicit member.
    pub fn add_events_to_catalogue(
        &mut self,
        catalogue: &Catalogue,
        events: &[&Event],
    ) -> CoreResult<()> {
        let catalogue_id = catalogue.state().id()?;
        let event_ids = handle_ids(events)?;
        self.service
            .backend()
            .add_events_to_catalogue(catalogue_id, &event_ids)
            .map_err(|err| membership_error(err, catalogue, events))
    }

    /// Removes events from the explicit member set of `catalogue`.
    ///
    /// # Errors
    /// - `InvalidHandle` when any handle was hard-deleted.
    /// - `NotAssigned` when an event is not an explicit member.
    pub fn remove_events_from_catalogue(
        &mut self,
        catalogue: &Catalogue,
        events: &[&Event],
    ) -> CoreResult<()> {
        let catalogue_id = catalogue.state().id()?;
        let event_ids = handle_ids(events)?;
        self.service
            .backend()
            .remove_events_from_catalogue(catalogue_id, &event_ids)
            .map_err(|err| membership_error(err, catalogue, events))
    }

    /// Keeps every write of this session in the enclosing transaction.
    ///
    /// # Errors
    /// - `SessionActive` when a session opened after this one is still open.
    ///   This session and the later ones are rolled back.
    /// - `SessionClosed` when an enclosing session was rolled back first,
    ///   taking this session's writes with it.
    pub fn finish(mut self) -> CoreResult<()> {
        self.service
            .backend()
            .release_unit(self.unit)
            .map_err(|err| match err {
                RepoError::UnitNotInnermost(_) => CoreError::SessionActive,
                RepoError::NoOpenUnit(_) => CoreError::SessionClosed,
                other => other.into(),
            })?;
        self.finished = true;
        debug!(
            "event=session_finish module=service status=ok created={}",
            self.created
        );
        Ok(())
    }
}

impl<B: Backend> Drop for Session<'_, B> {
    fn drop(&mut self) {
        if !self.finished {
            match self.service.backend().rollback_unit(self.unit) {
                Ok(()) => warn!(
                    "event=session_rollback module=service status=ok created={}",
                    self.created
                ),
                Err(RepoError::NoOpenUnit(unit)) => debug!(
                    "event=session_rollback module=service status=skipped unit={unit}"
                ),
                Err(err) => error!(
                    "event=session_rollback module=service status=error error={}",
                    err
                ),
            }
        }
        self.service.session_closed();
    }
}

fn handle_ids(events: &[&Event]) -> CoreResult<Vec<EntityId>> {
    events
        .iter()
        .map(|event| event.state().id().map_err(CoreError::from))
        .collect()
}

fn event_uuid(events: &[&Event], id: EntityId) -> Uuid {
    events
        .iter()
        .find(|event| event.state().id() == Ok(id))
        .map(|event| event.fields().uuid)
        .unwrap_or_default()
}

fn membership_error(err: RepoError, catalogue: &Catalogue, events: &[&Event]) -> CoreError {
    match err {
        RepoError::AlreadyAssigned { event, .. } => CoreError::AlreadyAssigned {
            catalogue: catalogue.fields().uuid,
            event: event_uuid(events, event),
        },
        RepoError::NotAssigned { event, .. } => CoreError::NotAssigned {
            catalogue: catalogue.fields().uuid,
            event: event_uuid(events, event),
        },
        // stale handle whose row was hard-deleted through another handle
        RepoError::NotFound { .. } => CoreError::InvalidHandle,
        other => other.into(),
    }
}
