//! Shared handle state and the `Entity` abstraction over events and catalogues.
//!
//! # Responsibility
//! - Track the storage identity and trash flag behind an entity handle.
//! - Expose the read surface common to both entity kinds.
//!
//! # Invariants
//! - A handle without a storage id is invalid; every read through the
//!   [`Entity`] surface fails with [`InvalidHandleError`].
//! - Only crate code can change handle state or attribute maps.

use crate::model::attributes::Attributes;
use crate::model::validation::InvalidHandleError;
use crate::model::value::AttributeValue;
use serde_json::{Map, Value as JsonValue};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Storage row id of an event or catalogue.
pub type EntityId = i64;

/// Flat `name -> value` map produced by `dump()`.
pub type Dump = Map<String, JsonValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Event,
    Catalogue,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Catalogue => "catalogue",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How `remove` treats an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemoveMode {
    /// Move to the trash; `restore` brings it back.
    #[default]
    Soft,
    /// Delete the record and invalidate the handle.
    Permanent,
}

impl RemoveMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Soft => "soft",
            Self::Permanent => "permanent",
        }
    }
}

/// Storage identity and lifecycle flags of one handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityState {
    id: Option<EntityId>,
    removed: bool,
}

impl EntityState {
    pub(crate) fn stored(id: EntityId, removed: bool) -> Self {
        Self {
            id: Some(id),
            removed,
        }
    }

    pub fn id(&self) -> Result<EntityId, InvalidHandleError> {
        self.id.ok_or(InvalidHandleError)
    }

    pub fn is_valid(&self) -> bool {
        self.id.is_some()
    }

    pub fn is_removed(&self) -> Result<bool, InvalidHandleError> {
        self.id()?;
        Ok(self.removed)
    }

    pub(crate) fn set_removed(&mut self, removed: bool) {
        self.removed = removed;
    }

    pub(crate) fn invalidate(&mut self) {
        self.id = None;
    }
}

pub(crate) mod sealed {
    use super::EntityState;
    use crate::model::attributes::Attributes;

    pub trait EntityInternals {
        fn state_mut(&mut self) -> &mut EntityState;
        fn attributes_mut(&mut self) -> &mut Attributes;
    }
}

/// Read surface shared by [`Event`](crate::Event) and
/// [`Catalogue`](crate::Catalogue).
///
/// Implemented only inside this crate.
pub trait Entity: sealed::EntityInternals {
    const KIND: EntityKind;
    /// Names of the schema-defined fields.
    const FIXED_KEYS: &'static [&'static str];
    /// Names an attribute may not take.
    const RESERVED_KEYS: &'static [&'static str];

    fn state(&self) -> &EntityState;

    fn uuid(&self) -> Result<Uuid, InvalidHandleError>;

    fn variable_attributes(&self) -> Result<&Attributes, InvalidHandleError>;

    /// Flat JSON-ready map of fixed fields and variable attributes.
    fn dump(&self) -> Result<Dump, InvalidHandleError>;

    fn attribute(&self, name: &str) -> Result<Option<&AttributeValue>, InvalidHandleError> {
        Ok(self.variable_attributes()?.get(name))
    }

    fn is_removed(&self) -> Result<bool, InvalidHandleError> {
        self.state().is_removed()
    }

    fn is_valid(&self) -> bool {
        self.state().is_valid()
    }

    fn is_fixed_key(name: &str) -> bool {
        Self::FIXED_KEYS.contains(&name)
    }
}

pub(crate) fn dump_attributes(dump: &mut Dump, attributes: &Attributes) {
    for (name, value) in attributes.iter() {
        dump.insert(name.to_string(), value.to_json());
    }
}

pub(crate) fn json_string_list(values: &[String]) -> JsonValue {
    JsonValue::Array(values.iter().cloned().map(JsonValue::String).collect())
}
