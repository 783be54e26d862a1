//! Catalogue entity: a named collection of events.
//!
//! # Responsibility
//! - Define the fixed schema fields of a catalogue.
//! - Build validated catalogues from drafts.
//! - Expose read views over a stored catalogue handle.
//!
//! # Invariants
//! - `name` is non-empty.
//! - `tags` entries contain no comma.
//! - A catalogue with a predicate is dynamic; membership then also includes
//!   every event matching it.
//! - `events` is reserved as an attribute name; the export format uses it.

use crate::filter::predicate::Predicate;
use crate::model::attributes::Attributes;
use crate::model::entity::{
    dump_attributes, json_string_list, sealed, Dump, Entity, EntityKind, EntityState,
};
use crate::model::validation::{parse_uuid, validate_list, InvalidHandleError, ValidationError};
use crate::model::value::AttributeValue;
use serde_json::Value as JsonValue;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Fixed field names of a catalogue, in dump order.
pub const CATALOGUE_FIXED_KEYS: &[&str] = &["uuid", "name", "author", "tags", "predicate"];

const CATALOGUE_RESERVED_KEYS: &[&str] = &["uuid", "name", "author", "tags", "predicate", "events"];

/// Schema-defined fields of one catalogue.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogueFields {
    pub uuid: Uuid,
    pub name: String,
    pub author: String,
    pub tags: Vec<String>,
    pub predicate: Option<Predicate>,
}

impl CatalogueFields {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        validate_list("tags", &self.tags)
    }

    pub fn is_dynamic(&self) -> bool {
        self.predicate.is_some()
    }

    pub(crate) fn with_field(&self, field: CatalogueField) -> Result<Self, ValidationError> {
        let mut updated = self.clone();
        match field {
            CatalogueField::Uuid(value) => updated.uuid = parse_uuid(&value)?,
            CatalogueField::Name(value) => updated.name = value,
            CatalogueField::Author(value) => updated.author = value,
            CatalogueField::Tags(values) => updated.tags = values,
            CatalogueField::Predicate(value) => updated.predicate = value,
        }
        updated.validate()?;
        Ok(updated)
    }

    /// Dumps every fixed field except `predicate`.
    pub(crate) fn dump_plain_into(&self, dump: &mut Dump) {
        dump.insert("uuid".to_string(), JsonValue::String(self.uuid.to_string()));
        dump.insert("name".to_string(), JsonValue::String(self.name.clone()));
        dump.insert("author".to_string(), JsonValue::String(self.author.clone()));
        dump.insert("tags".to_string(), json_string_list(&self.tags));
    }

    pub(crate) fn predicate_json(&self) -> JsonValue {
        self.predicate
            .as_ref()
            .and_then(|predicate| serde_json::to_value(predicate).ok())
            .unwrap_or(JsonValue::Null)
    }
}

/// One fixed-field assignment for `set_catalogue_field`.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogueField {
    Uuid(String),
    Name(String),
    Author(String),
    Tags(Vec<String>),
    Predicate(Option<Predicate>),
}

impl CatalogueField {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uuid(_) => "uuid",
            Self::Name(_) => "name",
            Self::Author(_) => "author",
            Self::Tags(_) => "tags",
            Self::Predicate(_) => "predicate",
        }
    }
}

/// Builder for a new catalogue.
#[derive(Debug, Clone)]
pub struct CatalogueDraft {
    uuid: Option<String>,
    name: String,
    author: String,
    tags: Vec<String>,
    predicate: Option<Predicate>,
    attributes: Vec<(String, AttributeValue)>,
}

impl CatalogueDraft {
    pub fn new(name: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            uuid: None,
            name: name.into(),
            author: author.into(),
            tags: Vec::new(),
            predicate: None,
            attributes: Vec::new(),
        }
    }

    pub fn uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub(crate) fn maybe_predicate(mut self, predicate: Option<Predicate>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn validate(self) -> Result<(CatalogueFields, Attributes), ValidationError> {
        let uuid = match self.uuid {
            Some(text) => parse_uuid(&text)?,
            None => Uuid::new_v4(),
        };
        let fields = CatalogueFields {
            uuid,
            name: self.name,
            author: self.author,
            tags: self.tags,
            predicate: self.predicate,
        };
        fields.validate()?;
        let attributes = Attributes::from_pairs(self.attributes, Catalogue::RESERVED_KEYS)?;
        Ok((fields, attributes))
    }
}

/// Handle to one stored catalogue.
#[derive(Debug, Clone)]
pub struct Catalogue {
    fields: CatalogueFields,
    attributes: Attributes,
    state: EntityState,
}

impl Catalogue {
    pub(crate) fn from_parts(
        fields: CatalogueFields,
        attributes: Attributes,
        state: EntityState,
    ) -> Self {
        Self {
            fields,
            attributes,
            state,
        }
    }

    pub fn fixed_attributes(&self) -> Result<&CatalogueFields, InvalidHandleError> {
        self.state.id()?;
        Ok(&self.fields)
    }

    pub fn name(&self) -> Result<&str, InvalidHandleError> {
        Ok(self.fixed_attributes()?.name.as_str())
    }

    pub fn author(&self) -> Result<&str, InvalidHandleError> {
        Ok(self.fixed_attributes()?.author.as_str())
    }

    pub fn tags(&self) -> Result<&[String], InvalidHandleError> {
        Ok(self.fixed_attributes()?.tags.as_slice())
    }

    pub fn predicate(&self) -> Result<Option<&Predicate>, InvalidHandleError> {
        Ok(self.fixed_attributes()?.predicate.as_ref())
    }

    pub fn is_dynamic(&self) -> Result<bool, InvalidHandleError> {
        Ok(self.fixed_attributes()?.is_dynamic())
    }

    pub(crate) fn fields(&self) -> &CatalogueFields {
        &self.fields
    }

    pub(crate) fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub(crate) fn replace_fields(&mut self, fields: CatalogueFields) {
        self.fields = fields;
    }
}

impl Entity for Catalogue {
    const KIND: EntityKind = EntityKind::Catalogue;
    const FIXED_KEYS: &'static [&'static str] = CATALOGUE_FIXED_KEYS;
    const RESERVED_KEYS: &'static [&'static str] = CATALOGUE_RESERVED_KEYS;

    fn state(&self) -> &EntityState {
        &self.state
    }

    fn uuid(&self) -> Result<Uuid, InvalidHandleError> {
        Ok(self.fixed_attributes()?.uuid)
    }

    fn variable_attributes(&self) -> Result<&Attributes, InvalidHandleError> {
        self.state.id()?;
        Ok(&self.attributes)
    }

    fn dump(&self) -> Result<Dump, InvalidHandleError> {
        self.state.id()?;
        Ok(dump_catalogue_parts(&self.fields, &self.attributes))
    }
}

impl sealed::EntityInternals for Catalogue {
    fn state_mut(&mut self) -> &mut EntityState {
        &mut self.state
    }

    fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }
}

impl PartialEq for Catalogue {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields && self.attributes == other.attributes
    }
}

impl Display for Catalogue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let fields = &self.fields;
        write!(
            f,
            "Catalogue(name={}, author={}, uuid={}, tags={:?}, predicate={})",
            fields.name,
            fields.author,
            fields.uuid,
            fields.tags,
            fields
                .predicate
                .as_ref()
                .map_or_else(|| "None".to_string(), ToString::to_string)
        )?;
        write!(f, " attributes(")?;
        for (index, (name, value)) in self.attributes.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        write!(f, ")")
    }
}

pub(crate) fn dump_catalogue_parts(fields: &CatalogueFields, attributes: &Attributes) -> Dump {
    let mut dump = Dump::new();
    fields.dump_plain_into(&mut dump);
    dump.insert("predicate".to_string(), fields.predicate_json());
    dump_attributes(&mut dump, attributes);
    dump
}
