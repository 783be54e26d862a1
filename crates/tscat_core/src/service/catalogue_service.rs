//! Catalogue use-case service.
//!
//! # Responsibility
//! - Provide the write-through mutation and trash entry points.
//! - Own the backend and the save/discard transaction boundary.
//!
//! # Invariants
//! - A handle is updated only after the backend accepted the change, so a
//!   rejected mutation leaves both sides at their prior value.
//! - `save`/`discard` never run while a [`Session`] is open.

use crate::model::attributes::validate_attribute_name;
use crate::model::catalogue::{Catalogue, CatalogueDraft, CatalogueField};
use crate::model::entity::sealed::EntityInternals;
use crate::model::entity::{Entity, RemoveMode};
use crate::model::event::{Event, EventDraft, EventField};
use crate::model::value::AttributeValue;
use crate::repo::backend::Backend;
use crate::service::session::Session;
use crate::service::{CoreError, CoreResult};
use log::{debug, info};
use std::cell::Cell;

/// Entry point for catalogue operations over one backend.
pub struct CatalogueService<B: Backend> {
    backend: B,
    open_sessions: Cell<u32>,
}

impl<B: Backend> CatalogueService<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            open_sessions: Cell::new(0),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Opens a unit of work. Nested sessions roll back independently.
    pub fn session(&self) -> CoreResult<Session<'_, B>> {
        Session::begin(self)
    }

    pub(crate) fn session_opened(&self) {
        self.open_sessions.set(self.open_sessions.get() + 1);
    }

    pub(crate) fn session_closed(&self) {
        self.open_sessions.set(self.open_sessions.get().saturating_sub(1));
    }

    /// Creates one event in its own session.
    pub fn create_event(&self, draft: EventDraft) -> CoreResult<Event> {
        let mut session = self.session()?;
        let event = session.create_event(draft)?;
        session.finish()?;
        Ok(event)
    }

    /// Creates one catalogue with `events` as explicit members, in its own
    /// session.
    pub fn create_catalogue(
        &self,
        draft: CatalogueDraft,
        events: &[&Event],
    ) -> CoreResult<Catalogue> {
        let mut session = self.session()?;
        let catalogue = session.create_catalogue(draft)?;
        if !events.is_empty() {
            session.add_events_to_catalogue(&catalogue, events)?;
        }
        session.finish()?;
        Ok(catalogue)
    }

    pub fn add_events_to_catalogue(
        &self,
        catalogue: &Catalogue,
        events: &[&Event],
    ) -> CoreResult<()> {
        let mut session = self.session()?;
        session.add_events_to_catalogue(catalogue, events)?;
        session.finish()
    }

    pub fn remove_events_from_catalogue(
        &self,
        catalogue: &Catalogue,
        events: &[&Event],
    ) -> CoreResult<()> {
        let mut session = self.session()?;
        session.remove_events_from_catalogue(catalogue, events)?;
        session.finish()
    }

    /// Assigns one fixed event field.
    ///
    /// # Errors
    /// - `Validation` when the new value breaks an event invariant.
    /// - `Conflict` when a reassigned uuid is already taken.
    pub fn set_event_field(&self, event: &mut Event, field: EventField) -> CoreResult<()> {
        let id = event.state().id()?;
        let name = field.name();
        let updated = event.fields().with_field(field)?;
        self.backend.update_event_field(id, &updated)?;
        event.replace_fields(updated);
        debug!("event=field_update module=service status=ok kind=event id={id} field={name}");
        Ok(())
    }

    /// Assigns one fixed catalogue field.
    pub fn set_catalogue_field(
        &self,
        catalogue: &mut Catalogue,
        field: CatalogueField,
    ) -> CoreResult<()> {
        let id = catalogue.state().id()?;
        let name = field.name();
        let updated = catalogue.fields().with_field(field)?;
        self.backend.update_catalogue_field(id, &updated)?;
        catalogue.replace_fields(updated);
        debug!("event=field_update module=service status=ok kind=catalogue id={id} field={name}");
        Ok(())
    }

    /// Inserts or replaces one variable attribute.
    ///
    /// Fixed field names are rejected; use `set_event_field` or
    /// `set_catalogue_field` for those.
    pub fn set_attribute<E: Entity>(
        &self,
        entity: &mut E,
        name: &str,
        value: impl Into<AttributeValue>,
    ) -> CoreResult<()> {
        let id = entity.state().id()?;
        validate_attribute_name(name, E::RESERVED_KEYS)?;
        let value = value.into().normalized()?;
        self.backend.update_attribute(E::KIND, id, name, &value)?;
        entity.attributes_mut().insert_stored(name.to_string(), value);
        Ok(())
    }

    /// Deletes one variable attribute.
    ///
    /// # Errors
    /// - `FixedKey` for a schema-defined field name.
    /// - `NotFound` when the attribute is not set.
    pub fn delete_attribute<E: Entity>(&self, entity: &mut E, name: &str) -> CoreResult<()> {
        let id = entity.state().id()?;
        if E::is_fixed_key(name) {
            return Err(CoreError::FixedKey(name.to_string()));
        }
        if !entity.variable_attributes()?.contains(name) {
            return Err(CoreError::NotFound(format!("attribute `{name}`")));
        }
        self.backend.delete_attribute(E::KIND, id, name)?;
        entity.attributes_mut().remove(name);
        Ok(())
    }

    /// Moves `entity` to the trash, or deletes it for good.
    ///
    /// A permanent removal invalidates the handle.
    pub fn remove<E: Entity>(&self, entity: &mut E, mode: RemoveMode) -> CoreResult<()> {
        let id = entity.state().id()?;
        self.backend.remove(E::KIND, id, mode)?;
        match mode {
            RemoveMode::Soft => entity.state_mut().set_removed(true),
            RemoveMode::Permanent => entity.state_mut().invalidate(),
        }
        info!(
            "event=entity_remove module=service status=ok kind={} id={} mode={}",
            E::KIND,
            id,
            mode.as_str()
        );
        Ok(())
    }

    /// Takes `entity` back out of the trash.
    pub fn restore<E: Entity>(&self, entity: &mut E) -> CoreResult<()> {
        let id = entity.state().id()?;
        self.backend.restore(E::KIND, id)?;
        entity.state_mut().set_removed(false);
        Ok(())
    }

    /// Commits every write since the last `save`/`discard`.
    pub fn save(&self) -> CoreResult<()> {
        self.ensure_no_session()?;
        self.backend.commit()?;
        info!("event=save module=service status=ok");
        Ok(())
    }

    /// Rolls back every write since the last `save`/`discard`.
    ///
    /// Handles obtained after the last commit refer to rows that no longer
    /// exist; re-query instead of reusing them.
    pub fn discard(&self) -> CoreResult<()> {
        self.ensure_no_session()?;
        self.backend.rollback()?;
        info!("event=discard module=service status=ok");
        Ok(())
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.backend.has_unsaved_changes()
    }

    fn ensure_no_session(&self) -> CoreResult<()> {
        if self.open_sessions.get() > 0 {
            return Err(CoreError::SessionActive);
        }
        Ok(())
    }
}
