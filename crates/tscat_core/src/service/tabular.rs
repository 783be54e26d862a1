//! VOTable-style tabular export and import.
//!
//! # Responsibility
//! - Map events to typed table columns through a fixed signature list.
//! - Infer column meaning on import and feed rows through the bundle import.
//!
//! # Invariants
//! - Signatures are tried in order; the last one accepts any text column.
//! - Exported attribute columns hold a value on every row, all of one kind.

use crate::model::catalogue::Catalogue;
use crate::model::entity::{Dump, Entity};
use crate::model::value::{format_timestamp, parse_timestamp, AttributeValue, ValueKind};
use crate::repo::backend::Backend;
use crate::service::catalogue_service::CatalogueService;
use crate::service::membership::{EventScope, QueryOptions};
use crate::service::transfer::{import_bundle, Bundle};
use crate::service::{CoreError, CoreResult};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value as JsonValue};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

const DEFAULT_IMPORT_AUTHOR: &str = "VOTable Import";

/// Column metadata of one table.
///
/// Unset metadata matches an empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub id: Option<String>,
    pub ucd: Option<String>,
    pub datatype: Option<String>,
    pub xtype: Option<String>,
    pub utype: Option<String>,
    pub arraysize: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    /// One cell per column in every row.
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabularDocument {
    pub description: Option<String>,
    pub tables: Vec<Table>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellCodec {
    DateTime,
    Integer,
    Float,
    Boolean,
    JsonList,
    Text,
}

/// Known column shape and the event key it maps to.
struct ColumnSignature {
    name: Option<&'static str>,
    id: Option<&'static str>,
    ucd: Option<&'static str>,
    datatype: &'static str,
    xtype: Option<&'static str>,
    utype: Option<&'static str>,
    arraysize: Option<&'static str>,
    /// Fixed event key; `None` maps to the column name.
    key: Option<&'static str>,
    codec: CellCodec,
}

const fn date_time(
    name: Option<&'static str>,
    id: Option<&'static str>,
    ucd: Option<&'static str>,
    key: Option<&'static str>,
) -> ColumnSignature {
    ColumnSignature {
        name,
        id,
        ucd,
        datatype: "char",
        xtype: Some("dateTime"),
        utype: Some(""),
        arraysize: Some("*"),
        key,
        codec: CellCodec::DateTime,
    }
}

const fn scalar(datatype: &'static str, codec: CellCodec) -> ColumnSignature {
    ColumnSignature {
        name: None,
        id: None,
        ucd: None,
        datatype,
        xtype: None,
        utype: None,
        arraysize: None,
        key: None,
        codec,
    }
}

const fn text(
    name: Option<&'static str>,
    utype: Option<&'static str>,
    codec: CellCodec,
) -> ColumnSignature {
    ColumnSignature {
        name,
        id: None,
        ucd: None,
        datatype: "char",
        xtype: None,
        utype,
        arraysize: Some("*"),
        key: name,
        codec,
    }
}

const START: usize = 0;
const STOP: usize = 1;
const DATE_TIME: usize = 2;
const LONG: usize = 3;
const DOUBLE: usize = 4;
const BOOLEAN: usize = 5;
const JSON_LIST: usize = 6;
const PRODUCTS: usize = 7;
const TAGS: usize = 8;
const TEXT: usize = 9;

static SIGNATURES: [ColumnSignature; 10] = [
    date_time(
        Some("Start Time"),
        Some("TimeIntervalStart"),
        Some("time.start"),
        Some("start"),
    ),
    date_time(
        Some("Stop Time"),
        Some("TimeIntervalStop"),
        Some("time.end"),
        Some("stop"),
    ),
    date_time(None, None, None, None),
    scalar("long", CellCodec::Integer),
    scalar("double", CellCodec::Float),
    scalar("boolean", CellCodec::Boolean),
    text(None, Some("json"), CellCodec::JsonList),
    text(Some("products"), None, CellCodec::JsonList),
    text(Some("tags"), None, CellCodec::JsonList),
    text(None, None, CellCodec::Text),
];

impl ColumnSignature {
    fn matches(&self, column: &Column) -> bool {
        fn same(expected: Option<&str>, actual: &Option<String>) -> bool {
            expected.map_or(true, |expected| {
                actual.as_deref().unwrap_or("") == expected
            })
        }
        self.name.map_or(true, |name| column.name == name)
            && same(self.id, &column.id)
            && same(self.ucd, &column.ucd)
            && same(Some(self.datatype), &column.datatype)
            && same(self.xtype, &column.xtype)
            && same(self.utype, &column.utype)
            && same(self.arraysize, &column.arraysize)
    }

    fn column(&self, name: &str) -> Column {
        Column {
            name: self.name.unwrap_or(name).to_string(),
            id: self.id.map(str::to_string),
            ucd: self.ucd.map(str::to_string),
            datatype: Some(self.datatype.to_string()),
            xtype: self.xtype.map(str::to_string),
            utype: self.utype.map(str::to_string),
            arraysize: self.arraysize.map(str::to_string),
        }
    }

    fn key<'c>(&self, column: &'c Column) -> &'c str {
        match self.key {
            Some(key) => key,
            None => column.name.as_str(),
        }
    }
}

fn signature_for(column: &Column) -> Option<&'static ColumnSignature> {
    SIGNATURES.iter().find(|signature| signature.matches(column))
}

fn signature_for_kind(kind: ValueKind) -> &'static ColumnSignature {
    &SIGNATURES[match kind {
        ValueKind::String => TEXT,
        ValueKind::Integer => LONG,
        ValueKind::Float => DOUBLE,
        ValueKind::Boolean => BOOLEAN,
        ValueKind::Timestamp => DATE_TIME,
        ValueKind::StringList => JSON_LIST,
    }]
}

/// Writes one table per catalogue with its resolved members as rows.
///
/// # Errors
/// - `Format` when a variable attribute is missing on some event or holds
///   values of different kinds.
pub fn export_tabular<B: Backend>(
    service: &CatalogueService<B>,
    catalogues: &[&Catalogue],
) -> CoreResult<TabularDocument> {
    let description = match catalogues {
        [single] => Some(format!(
            "Contact:{};Name:{};",
            single.author()?,
            single.name()?
        )),
        _ => None,
    };

    let mut tables = Vec::with_capacity(catalogues.len());
    for catalogue in catalogues {
        let events = service.get_events(EventScope::Catalogue(catalogue), QueryOptions::default())?;

        let mut kinds: BTreeMap<&str, BTreeSet<ValueKind>> = BTreeMap::new();
        for event in &events {
            for (name, value) in event.variable_attributes()?.iter() {
                kinds.entry(name).or_default().insert(value.kind());
            }
        }
        for (name, value_kinds) in &kinds {
            let present = events
                .iter()
                .filter(|event| event.attributes().contains(name))
                .count();
            if present != events.len() {
                return Err(CoreError::Format(format!(
                    "attribute `{name}` is not present on every event of catalogue `{}`",
                    catalogue.fields().name
                )));
            }
            if value_kinds.len() != 1 {
                return Err(CoreError::Format(format!(
                    "attribute `{name}` holds values of different kinds"
                )));
            }
        }
        let with_rating = events.iter().any(|event| event.fields().rating.is_some());

        let mut columns = vec![
            SIGNATURES[START].column("start"),
            SIGNATURES[STOP].column("stop"),
            SIGNATURES[TEXT].column("author"),
            SIGNATURES[TEXT].column("uuid"),
            SIGNATURES[TAGS].column("tags"),
            SIGNATURES[PRODUCTS].column("products"),
        ];
        if with_rating {
            columns.push(SIGNATURES[LONG].column("rating"));
        }
        for (name, value_kinds) in &kinds {
            if let Some(kind) = value_kinds.iter().next() {
                columns.push(signature_for_kind(*kind).column(name));
            }
        }

        let mut rows = Vec::with_capacity(events.len());
        for event in &events {
            let fields = event.fields();
            let mut row = vec![
                format_timestamp(&fields.start),
                format_timestamp(&fields.stop),
                fields.author.clone(),
                fields.uuid.to_string(),
                encode_list(&fields.tags)?,
                encode_list(&fields.products)?,
            ];
            if with_rating {
                row.push(fields.rating.map(|rating| rating.to_string()).unwrap_or_default());
            }
            for name in kinds.keys() {
                let cell = match event.attributes().get(name) {
                    Some(value) => encode_cell(value)?,
                    None => String::new(),
                };
                row.push(cell);
            }
            rows.push(row);
        }

        tables.push(Table {
            name: catalogue.fields().name.replace(' ', "_"),
            columns,
            rows,
        });
    }

    info!(
        "event=export module=service status=ok format=tabular tables={}",
        tables.len()
    );
    Ok(TabularDocument {
        description,
        tables,
    })
}

/// Imports every table of `document` as a new catalogue.
///
/// `source_name` names the catalogues when the description carries no
/// `Name:` entry.
///
/// # Errors
/// - `Format` for an unrecognized column, a missing Start/Stop column, or a
///   cell that does not decode.
pub fn import_tabular<B: Backend>(
    service: &CatalogueService<B>,
    document: &TabularDocument,
    source_name: &str,
) -> CoreResult<Vec<Catalogue>> {
    let (author, name) = parse_description(document.description.as_deref(), source_name);
    let mut bundle = Bundle::default();

    for (index, table) in document.tables.iter().enumerate() {
        let table_name = if document.tables.len() == 1 {
            name.clone()
        } else {
            format!("{name}_{index}")
        };

        let mut mapped: Vec<(&str, CellCodec)> = Vec::with_capacity(table.columns.len());
        for column in &table.columns {
            let signature = signature_for(column).ok_or_else(|| {
                CoreError::Format(format!(
                    "cannot import column `{}` (id={}, datatype={}, xtype={})",
                    column.name,
                    column.id.as_deref().unwrap_or(""),
                    column.datatype.as_deref().unwrap_or(""),
                    column.xtype.as_deref().unwrap_or("")
                ))
            })?;
            mapped.push((signature.key(column), signature.codec));
        }
        let has_key = |key: &str| mapped.iter().any(|(mapped_key, _)| *mapped_key == key);
        if !has_key("start") || !has_key("stop") {
            return Err(CoreError::Format(format!(
                "table `{table_name}` lacks the Start Time or Stop Time column"
            )));
        }
        let has_author = has_key("author");
        let has_uuid = has_key("uuid");

        let mut members = Vec::with_capacity(table.rows.len());
        for (row_index, row) in table.rows.iter().enumerate() {
            if row.len() != mapped.len() {
                return Err(CoreError::Format(format!(
                    "row {row_index} of table `{table_name}` has {} cells, expected {}",
                    row.len(),
                    mapped.len()
                )));
            }
            let mut event = Dump::new();
            if !has_author {
                event.insert("author".to_string(), JsonValue::String(author.clone()));
            }
            if !has_uuid {
                event.insert(
                    "uuid".to_string(),
                    JsonValue::String(Uuid::new_v4().to_string()),
                );
            }
            for ((key, codec), cell) in mapped.iter().zip(row) {
                event.insert(key.to_string(), decode_cell(*codec, cell, key)?);
            }
            if let Some(uuid) = event.get("uuid").cloned() {
                members.push(uuid);
            }
            bundle.events.push(event);
        }

        let mut catalogue = Dump::new();
        catalogue.insert("name".to_string(), JsonValue::String(table_name));
        catalogue.insert("author".to_string(), JsonValue::String(author.clone()));
        catalogue.insert(
            "uuid".to_string(),
            JsonValue::String(Uuid::new_v4().to_string()),
        );
        catalogue.insert("events".to_string(), JsonValue::Array(members));
        bundle.catalogues.push(catalogue);
    }

    import_bundle(service, &bundle)
}

/// Reads `Contact:<author>;Name:<name>;` entries.
fn parse_description(description: Option<&str>, source_name: &str) -> (String, String) {
    let mut author = DEFAULT_IMPORT_AUTHOR.to_string();
    let mut name = source_name.to_string();
    for entry in description.unwrap_or("").split(';') {
        if let Some((property, value)) = entry.trim().split_once(':') {
            match property {
                "Contact" => author = value.trim().to_string(),
                "Name" => name = value.trim().to_string(),
                _ => {}
            }
        }
    }
    (author, name)
}

fn encode_list(values: &[String]) -> CoreResult<String> {
    serde_json::to_string(values)
        .map_err(|err| CoreError::Format(format!("cannot encode list cell: {err}")))
}

fn encode_cell(value: &AttributeValue) -> CoreResult<String> {
    Ok(match value {
        AttributeValue::String(text) => text.clone(),
        AttributeValue::Integer(number) => number.to_string(),
        AttributeValue::Float(number) => number.to_string(),
        AttributeValue::Boolean(flag) => flag.to_string(),
        AttributeValue::Timestamp(timestamp) => format_timestamp(timestamp),
        AttributeValue::StringList(values) => encode_list(values)?,
    })
}

fn decode_cell(codec: CellCodec, cell: &str, key: &str) -> CoreResult<JsonValue> {
    let invalid = || CoreError::Format(format!("invalid `{key}` cell: `{cell}`"));
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Ok(match codec {
            CellCodec::JsonList => JsonValue::Array(Vec::new()),
            CellCodec::Text => JsonValue::String(String::new()),
            _ => JsonValue::Null,
        });
    }
    Ok(match codec {
        CellCodec::DateTime => {
            JsonValue::String(format_timestamp(&parse_timestamp(trimmed).ok_or_else(invalid)?))
        }
        CellCodec::Integer => JsonValue::from(trimmed.parse::<i64>().map_err(|_| invalid())?),
        CellCodec::Float => {
            let number = trimmed.parse::<f64>().map_err(|_| invalid())?;
            JsonValue::Number(Number::from_f64(number).ok_or_else(invalid)?)
        }
        CellCodec::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => JsonValue::Bool(true),
            "false" | "f" | "0" => JsonValue::Bool(false),
            _ => return Err(invalid()),
        },
        CellCodec::JsonList => {
            JsonValue::from(serde_json::from_str::<Vec<String>>(trimmed).map_err(|_| invalid())?)
        }
        CellCodec::Text => JsonValue::String(cell.to_string()),
    })
}
