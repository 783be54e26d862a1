//! Event entity: a time interval with provenance and open attributes.
//!
//! # Responsibility
//! - Define the fixed schema fields of an event and their constraints.
//! - Build validated events from drafts.
//! - Expose read views over a stored event handle.
//!
//! # Invariants
//! - `start <= stop`.
//! - `tags` and `products` entries contain no comma.
//! - `rating`, when set, lies in `1..=10`.
//! - Variable attribute names never collide with fixed field names.

use crate::model::attributes::Attributes;
use crate::model::entity::{
    dump_attributes, json_string_list, sealed, Dump, Entity, EntityKind, EntityState,
};
use crate::model::validation::{
    parse_uuid, validate_list, validate_rating, InvalidHandleError, ValidationError,
};
use crate::model::value::{format_timestamp, normalize_timestamp, AttributeValue, Timestamp};
use serde_json::Value as JsonValue;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Fixed field names of an event, in dump order.
pub const EVENT_FIXED_KEYS: &[&str] = &["uuid", "start", "stop", "author", "tags", "products", "rating"];

/// Schema-defined fields of one event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFields {
    pub uuid: Uuid,
    pub start: Timestamp,
    pub stop: Timestamp,
    pub author: String,
    pub tags: Vec<String>,
    pub products: Vec<String>,
    pub rating: Option<i64>,
}

impl EventFields {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.start > self.stop {
            return Err(ValidationError::InvalidTimeRange {
                start: self.start,
                stop: self.stop,
            });
        }
        validate_list("tags", &self.tags)?;
        validate_list("products", &self.products)?;
        validate_rating(self.rating)
    }

    /// Returns a copy with `field` applied, normalized and validated.
    pub(crate) fn with_field(&self, field: EventField) -> Result<Self, ValidationError> {
        let mut updated = self.clone();
        match field {
            EventField::Uuid(value) => updated.uuid = parse_uuid(&value)?,
            EventField::Start(value) => updated.start = normalize_timestamp(value),
            EventField::Stop(value) => updated.stop = normalize_timestamp(value),
            EventField::Author(value) => updated.author = value,
            EventField::Tags(values) => updated.tags = values,
            EventField::Products(values) => updated.products = values,
            EventField::Rating(value) => updated.rating = value,
        }
        updated.validate()?;
        Ok(updated)
    }

    pub(crate) fn dump_into(&self, dump: &mut Dump) {
        dump.insert("uuid".to_string(), JsonValue::String(self.uuid.to_string()));
        dump.insert("start".to_string(), JsonValue::String(format_timestamp(&self.start)));
        dump.insert("stop".to_string(), JsonValue::String(format_timestamp(&self.stop)));
        dump.insert("author".to_string(), JsonValue::String(self.author.clone()));
        dump.insert("tags".to_string(), json_string_list(&self.tags));
        dump.insert("products".to_string(), json_string_list(&self.products));
        dump.insert(
            "rating".to_string(),
            self.rating.map_or(JsonValue::Null, JsonValue::from),
        );
    }
}

/// One fixed-field assignment for `set_event_field`.
#[derive(Debug, Clone, PartialEq)]
pub enum EventField {
    /// Replacement identity; must be a hyphenated UUID.
    Uuid(String),
    Start(Timestamp),
    Stop(Timestamp),
    Author(String),
    Tags(Vec<String>),
    Products(Vec<String>),
    Rating(Option<i64>),
}

impl EventField {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uuid(_) => "uuid",
            Self::Start(_) => "start",
            Self::Stop(_) => "stop",
            Self::Author(_) => "author",
            Self::Tags(_) => "tags",
            Self::Products(_) => "products",
            Self::Rating(_) => "rating",
        }
    }
}

/// Builder for a new event.
#[derive(Debug, Clone)]
pub struct EventDraft {
    uuid: Option<String>,
    start: Timestamp,
    stop: Timestamp,
    author: String,
    tags: Vec<String>,
    products: Vec<String>,
    rating: Option<i64>,
    attributes: Vec<(String, AttributeValue)>,
}

impl EventDraft {
    pub fn new(start: Timestamp, stop: Timestamp, author: impl Into<String>) -> Self {
        Self {
            uuid: None,
            start,
            stop,
            author: author.into(),
            tags: Vec::new(),
            products: Vec::new(),
            rating: None,
            attributes: Vec::new(),
        }
    }

    /// Uses a caller-provided identity instead of a generated v4 UUID.
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

    pub fn products<I, S>(mut self, products: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.products = products.into_iter().map(Into::into).collect();
        self
    }

    pub fn rating(mut self, rating: i64) -> Self {
        self.rating = Some(rating);
        self
    }

    pub(crate) fn maybe_rating(mut self, rating: Option<i64>) -> Self {
        self.rating = rating;
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Validates the draft into storable fields and attributes.
    pub fn validate(self) -> Result<(EventFields, Attributes), ValidationError> {
        let uuid = match self.uuid {
            Some(text) => parse_uuid(&text)?,
            None => Uuid::new_v4(),
        };
        let fields = EventFields {
            uuid,
            start: normalize_timestamp(self.start),
            stop: normalize_timestamp(self.stop),
            author: self.author,
            tags: self.tags,
            products: self.products,
            rating: self.rating,
        };
        fields.validate()?;
        let attributes = Attributes::from_pairs(self.attributes, Event::RESERVED_KEYS)?;
        Ok((fields, attributes))
    }
}

/// Handle to one stored event.
///
/// Equality compares fixed fields (identity included) and variable
/// attributes; handle state is ignored.
#[derive(Debug, Clone)]
pub struct Event {
    fields: EventFields,
    attributes: Attributes,
    state: EntityState,
    assigned: Option<bool>,
}

impl Event {
    pub(crate) fn from_parts(
        fields: EventFields,
        attributes: Attributes,
        state: EntityState,
        assigned: Option<bool>,
    ) -> Self {
        Self {
            fields,
            attributes,
            state,
            assigned,
        }
    }

    pub fn fixed_attributes(&self) -> Result<&EventFields, InvalidHandleError> {
        self.state.id()?;
        Ok(&self.fields)
    }

    pub fn start(&self) -> Result<Timestamp, InvalidHandleError> {
        Ok(self.fixed_attributes()?.start)
    }

    pub fn stop(&self) -> Result<Timestamp, InvalidHandleError> {
        Ok(self.fixed_attributes()?.stop)
    }

    pub fn author(&self) -> Result<&str, InvalidHandleError> {
        Ok(self.fixed_attributes()?.author.as_str())
    }

    pub fn tags(&self) -> Result<&[String], InvalidHandleError> {
        Ok(self.fixed_attributes()?.tags.as_slice())
    }

    pub fn products(&self) -> Result<&[String], InvalidHandleError> {
        Ok(self.fixed_attributes()?.products.as_slice())
    }

    pub fn rating(&self) -> Result<Option<i64>, InvalidHandleError> {
        Ok(self.fixed_attributes()?.rating)
    }

    /// Explicit membership flag set by catalogue-scoped queries.
    ///
    /// `None` for results of any other query.
    pub fn assigned(&self) -> Option<bool> {
        self.assigned
    }

    pub(crate) fn fields(&self) -> &EventFields {
        &self.fields
    }

    pub(crate) fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub(crate) fn replace_fields(&mut self, fields: EventFields) {
        self.fields = fields;
    }
}

impl Entity for Event {
    const KIND: EntityKind = EntityKind::Event;
    const FIXED_KEYS: &'static [&'static str] = EVENT_FIXED_KEYS;
    const RESERVED_KEYS: &'static [&'static str] = EVENT_FIXED_KEYS;

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
        Ok(dump_event_parts(&self.fields, &self.attributes))
    }
}

impl sealed::EntityInternals for Event {
    fn state_mut(&mut self) -> &mut EntityState {
        &mut self.state
    }

    fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields && self.attributes == other.attributes
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let fields = &self.fields;
        write!(
            f,
            "Event(start={}, stop={}, author={}, uuid={}, tags={:?}, products={:?}, rating={})",
            format_timestamp(&fields.start),
            format_timestamp(&fields.stop),
            fields.author,
            fields.uuid,
            fields.tags,
            fields.products,
            fields
                .rating
                .map_or_else(|| "None".to_string(), |rating| rating.to_string())
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

pub(crate) fn dump_event_parts(fields: &EventFields, attributes: &Attributes) -> Dump {
    let mut dump = Dump::new();
    fields.dump_into(&mut dump);
    dump_attributes(&mut dump, attributes);
    dump
}
