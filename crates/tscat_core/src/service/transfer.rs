//! Bundle export and conflict-checked import.
//!
//! # Responsibility
//! - Export catalogues with their resolved members as a flat JSON bundle.
//! - Reduce an incoming bundle to the records not yet stored, then write
//!   them in one session.
//!
//! # Invariants
//! - Every conflict is raised before the first write of an import.
//! - Re-importing a bundle whose records already exist identically writes
//!   nothing and returns no catalogues.
//! - Stored records are compared with variable attributes exactly as bundled,
//!   before any value type is inferred from them.
//! - A failing commit phase leaves no record of that import behind.

use crate::filter::predicate::Predicate;
use crate::model::attributes::Attributes;
use crate::model::catalogue::{
    dump_catalogue_parts, Catalogue, CatalogueDraft, CatalogueFields, CATALOGUE_FIXED_KEYS,
};
use crate::model::entity::{dump_attributes, Dump, Entity, EntityKind};
use crate::model::event::{dump_event_parts, Event, EventDraft, EventFields, EVENT_FIXED_KEYS};
use crate::model::value::{parse_timestamp, AttributeValue, Timestamp};
use crate::repo::backend::Backend;
use crate::service::catalogue_service::CatalogueService;
use crate::service::membership::{EventScope, QueryOptions};
use crate::service::{CoreError, CoreResult};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Key holding the member uuids of a bundled catalogue.
const MEMBERS_KEY: &str = "events";

/// Wire form of an export.
///
/// Each catalogue is a flat dump plus an `events` list of member uuids;
/// each event is a flat dump.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(default)]
    pub catalogues: Vec<Dump>,
    #[serde(default)]
    pub events: Vec<Dump>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub fields: EventFields,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogueRecord {
    pub fields: CatalogueFields,
    pub attributes: Attributes,
    /// Member event uuids, without duplicates.
    pub events: Vec<Uuid>,
}

/// Decoded bundle holding only records that still need to be written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalBundle {
    pub catalogues: Vec<CatalogueRecord>,
    pub events: Vec<EventRecord>,
}

impl CanonicalBundle {
    pub fn is_empty(&self) -> bool {
        self.catalogues.is_empty() && self.events.is_empty()
    }

    pub fn to_bundle(&self) -> Bundle {
        Bundle {
            catalogues: self
                .catalogues
                .iter()
                .map(|record| {
                    let mut dump = dump_catalogue_parts(&record.fields, &record.attributes);
                    dump.insert(
                        MEMBERS_KEY.to_string(),
                        JsonValue::Array(
                            record
                                .events
                                .iter()
                                .map(|uuid| JsonValue::String(uuid.to_string()))
                                .collect(),
                        ),
                    );
                    dump
                })
                .collect(),
            events: self
                .events
                .iter()
                .map(|record| dump_event_parts(&record.fields, &record.attributes))
                .collect(),
        }
    }
}

/// Builds the bundle for `catalogues` and their resolved members.
///
/// Events shared by several catalogues appear once.
pub fn export_bundle<B: Backend>(
    service: &CatalogueService<B>,
    catalogues: &[&Catalogue],
) -> CoreResult<Bundle> {
    let mut canonical = CanonicalBundle::default();
    let mut seen: HashSet<Uuid> = HashSet::new();

    for catalogue in catalogues {
        let members = service.get_events(EventScope::Catalogue(catalogue), QueryOptions::default())?;
        let mut member_uuids = Vec::with_capacity(members.len());
        for event in members {
            let uuid = event.uuid()?;
            member_uuids.push(uuid);
            if seen.insert(uuid) {
                canonical.events.push(EventRecord {
                    fields: event.fields().clone(),
                    attributes: event.attributes().clone(),
                });
            }
        }
        canonical.catalogues.push(CatalogueRecord {
            fields: catalogue.fields().clone(),
            attributes: catalogue.attributes().clone(),
            events: member_uuids,
        });
    }

    info!(
        "event=export module=service status=ok catalogues={} events={}",
        canonical.catalogues.len(),
        canonical.events.len()
    );
    Ok(canonical.to_bundle())
}

pub fn export_json<B: Backend>(
    service: &CatalogueService<B>,
    catalogues: &[&Catalogue],
) -> CoreResult<String> {
    let bundle = export_bundle(service, catalogues)?;
    serde_json::to_string(&bundle)
        .map_err(|err| CoreError::Format(format!("cannot encode bundle: {err}")))
}

/// Imports a JSON bundle and returns the newly created catalogues.
pub fn import_json<B: Backend>(
    service: &CatalogueService<B>,
    text: &str,
) -> CoreResult<Vec<Catalogue>> {
    let bundle: Bundle = serde_json::from_str(text)
        .map_err(|err| CoreError::Format(format!("invalid bundle json: {err}")))?;
    import_bundle(service, &bundle)
}

/// Canonicalizes `bundle` against storage, then writes what is left.
///
/// # Errors
/// - `Conflict` when a bundled record differs from the stored one with the
///   same uuid. Nothing is written.
/// - `NotFound` when a member uuid is neither bundled nor stored.
/// - `Format` for malformed records.
pub fn import_bundle<B: Backend>(
    service: &CatalogueService<B>,
    bundle: &Bundle,
) -> CoreResult<Vec<Catalogue>> {
    let canonical = canonicalize(service, bundle)?;
    commit_canonical(service, canonical)
}

/// Decodes `bundle` and drops every record already stored identically.
pub fn canonicalize<B: Backend>(
    service: &CatalogueService<B>,
    bundle: &Bundle,
) -> CoreResult<CanonicalBundle> {
    let events = decode_unique(&bundle.events, decode_event, |record: &EventRecord| {
        record.fields.uuid
    })?;
    let uuids: Vec<Uuid> = events.iter().map(|(record, _)| record.fields.uuid).collect();
    let stored_events = service.backend().get_events_by_uuid_list(&uuids)?;

    let mut canonical = CanonicalBundle::default();
    for (record, raw) in events {
        match stored_events.get(&record.fields.uuid) {
            Some(stored) => {
                let mut bundled = dump_event_parts(&record.fields, &Attributes::new());
                bundled.extend(bundled_variables(raw, EVENT_FIXED_KEYS));
                if stored.dump()? != bundled {
                    return Err(CoreError::Conflict {
                        kind: EntityKind::Event,
                        uuid: record.fields.uuid,
                    });
                }
            }
            None => canonical.events.push(record),
        }
    }

    let catalogues = decode_unique(&bundle.catalogues, decode_catalogue, |record: &CatalogueRecord| {
        record.fields.uuid
    })?;
    for (record, raw) in catalogues {
        match service.backend().get_catalogue_by_uuid(record.fields.uuid)? {
            Some(stored) => {
                let members: Vec<Uuid> = service
                    .get_events(EventScope::Catalogue(&stored), QueryOptions::default())?
                    .iter()
                    .map(|event| event.fields().uuid)
                    .collect();
                let mut stored_variables = Dump::new();
                dump_attributes(&mut stored_variables, stored.attributes());
                let mut bundled_extra = bundled_variables(raw, CATALOGUE_FIXED_KEYS);
                bundled_extra.remove(MEMBERS_KEY);
                let stored_form = comparable_catalogue(stored.fields(), stored_variables, members);
                let bundled_form =
                    comparable_catalogue(&record.fields, bundled_extra, record.events.clone());
                if stored_form != bundled_form {
                    return Err(CoreError::Conflict {
                        kind: EntityKind::Catalogue,
                        uuid: record.fields.uuid,
                    });
                }
            }
            None => canonical.catalogues.push(record),
        }
    }

    Ok(canonical)
}

/// Writes a canonical bundle in one session.
pub fn commit_canonical<B: Backend>(
    service: &CatalogueService<B>,
    canonical: CanonicalBundle,
) -> CoreResult<Vec<Catalogue>> {
    if canonical.is_empty() {
        info!("event=import module=service status=ok events=0 catalogues=0");
        return Ok(Vec::new());
    }

    let event_count = canonical.events.len();
    let mut session = service.session()?;
    let mut created: HashMap<Uuid, Event> = HashMap::new();
    for record in canonical.events {
        let uuid = record.fields.uuid;
        let event = session.insert_event(record.fields, record.attributes)?;
        created.insert(uuid, event);
    }

    let mut catalogues = Vec::with_capacity(canonical.catalogues.len());
    for record in canonical.catalogues {
        let missing: Vec<Uuid> = record
            .events
            .iter()
            .filter(|uuid| !created.contains_key(uuid))
            .copied()
            .collect();
        let stored = service.backend().get_events_by_uuid_list(&missing)?;
        let members = record
            .events
            .iter()
            .map(|uuid| {
                created
                    .get(uuid)
                    .or_else(|| stored.get(uuid))
                    .ok_or_else(|| CoreError::NotFound(format!("event {uuid}")))
            })
            .collect::<CoreResult<Vec<&Event>>>()?;

        let catalogue = session.insert_catalogue(record.fields, record.attributes)?;
        if !members.is_empty() {
            session.add_events_to_catalogue(&catalogue, &members)?;
        }
        catalogues.push(catalogue);
    }
    session.finish()?;

    info!(
        "event=import module=service status=ok events={} catalogues={}",
        event_count,
        catalogues.len()
    );
    Ok(catalogues)
}

/// Decodes every dump, skipping exact duplicates and rejecting diverging
/// ones that share a uuid. Each record keeps the dump it was decoded from.
fn decode_unique<'a, T, D, K>(
    dumps: &'a [Dump],
    decode: D,
    key: K,
) -> CoreResult<Vec<(T, &'a Dump)>>
where
    T: PartialEq,
    D: Fn(&Dump) -> CoreResult<T>,
    K: Fn(&T) -> Uuid,
{
    let mut records: Vec<(T, &'a Dump)> = Vec::with_capacity(dumps.len());
    let mut index_of: HashMap<Uuid, usize> = HashMap::new();
    for dump in dumps {
        let record = decode(dump)?;
        let uuid = key(&record);
        match index_of.get(&uuid) {
            Some(&index) if records[index].0 == record => {}
            Some(_) => {
                return Err(CoreError::Format(format!(
                    "bundle holds diverging records for uuid {uuid}"
                )))
            }
            None => {
                index_of.insert(uuid, records.len());
                records.push((record, dump));
            }
        }
    }
    Ok(records)
}

fn decode_event(dump: &Dump) -> CoreResult<EventRecord> {
    let mut draft = EventDraft::new(
        required_timestamp(dump, "start")?,
        required_timestamp(dump, "stop")?,
        required_string(dump, "author")?,
    )
    .tags(string_list(dump, "tags")?)
    .products(string_list(dump, "products")?)
    .maybe_rating(optional_integer(dump, "rating")?);
    if let Some(uuid) = optional_string(dump, "uuid")? {
        draft = draft.uuid(uuid);
    }
    for (name, value) in variable_entries(dump, EVENT_FIXED_KEYS) {
        draft = draft.attribute(name.as_str(), AttributeValue::from_json(value)?);
    }
    let (fields, attributes) = draft.validate()?;
    Ok(EventRecord { fields, attributes })
}

fn decode_catalogue(dump: &Dump) -> CoreResult<CatalogueRecord> {
    let predicate = match dump.get("predicate") {
        None | Some(JsonValue::Null) => None,
        Some(value) => Some(
            serde_json::from_value::<Predicate>(value.clone())
                .map_err(|err| CoreError::Format(format!("invalid catalogue predicate: {err}")))?,
        ),
    };
    let mut draft = CatalogueDraft::new(required_string(dump, "name")?, required_string(dump, "author")?)
        .tags(string_list(dump, "tags")?)
        .maybe_predicate(predicate);
    if let Some(uuid) = optional_string(dump, "uuid")? {
        draft = draft.uuid(uuid);
    }
    for (name, value) in variable_entries(dump, CATALOGUE_FIXED_KEYS) {
        if name == MEMBERS_KEY {
            continue;
        }
        draft = draft.attribute(name.as_str(), AttributeValue::from_json(value)?);
    }
    let (fields, attributes) = draft.validate()?;

    let mut events: Vec<Uuid> = Vec::new();
    for text in string_list(dump, MEMBERS_KEY)? {
        let uuid = Uuid::try_parse(&text)
            .map_err(|_| CoreError::Format(format!("invalid member uuid `{text}`")))?;
        if !events.contains(&uuid) {
            events.push(uuid);
        }
    }
    Ok(CatalogueRecord {
        fields,
        attributes,
        events,
    })
}

/// Comparable form of a catalogue: plain dump, predicate text and sorted
/// member uuids.
fn comparable_catalogue(
    fields: &CatalogueFields,
    variables: Dump,
    mut members: Vec<Uuid>,
) -> (Dump, Option<String>, Vec<Uuid>) {
    let mut dump = Dump::new();
    fields.dump_plain_into(&mut dump);
    dump.extend(variables);
    members.sort();
    members.dedup();
    (
        dump,
        fields.predicate.as_ref().map(ToString::to_string),
        members,
    )
}

/// Variable attributes of a bundled dump, as bundled.
fn bundled_variables(dump: &Dump, fixed_keys: &[&str]) -> Dump {
    variable_entries(dump, fixed_keys)
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Non-null entries outside `fixed_keys`.
fn variable_entries<'a>(
    dump: &'a Dump,
    fixed_keys: &'a [&'a str],
) -> impl Iterator<Item = (&'a String, &'a JsonValue)> {
    dump.iter()
        .filter(move |(name, value)| !fixed_keys.contains(&name.as_str()) && !value.is_null())
}

fn required_string(dump: &Dump, key: &str) -> CoreResult<String> {
    optional_string(dump, key)?.ok_or_else(|| CoreError::Format(format!("missing field `{key}`")))
}

fn optional_string(dump: &Dump, key: &str) -> CoreResult<Option<String>> {
    match dump.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(text)) => Ok(Some(text.clone())),
        Some(other) => Err(CoreError::Format(format!(
            "field `{key}` must be a string, got {other}"
        ))),
    }
}

fn required_timestamp(dump: &Dump, key: &str) -> CoreResult<Timestamp> {
    let text = required_string(dump, key)?;
    parse_timestamp(&text)
        .ok_or_else(|| CoreError::Format(format!("field `{key}` is not a timestamp: `{text}`")))
}

fn optional_integer(dump: &Dump, key: &str) -> CoreResult<Option<i64>> {
    match dump.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| CoreError::Format(format!("field `{key}` must be an integer"))),
    }
}

fn string_list(dump: &Dump, key: &str) -> CoreResult<Vec<String>> {
    let invalid = || CoreError::Format(format!("field `{key}` must be a list of strings"));
    match dump.get(key) {
        None | Some(JsonValue::Null) => Ok(Vec::new()),
        Some(JsonValue::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
            .collect(),
        Some(_) => Err(invalid()),
    }
}
