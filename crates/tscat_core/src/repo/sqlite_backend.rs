//! SQLite implementation of [`Backend`].
//!
//! # Responsibility
//! - Persist events, catalogues, attributes and explicit membership.
//! - Run compiled predicates against storage.
//! - Own the transaction and savepoint lifecycle of one connection.
//!
//! # Invariants
//! - The first write of a transaction issues `BEGIN EXCLUSIVE`; nothing is
//!   durable before `commit`.
//! - Units of work are `SAVEPOINT`s nested inside that transaction, each
//!   with its own name, so closing one never touches a unit opened before it.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::migrations::{current_user_version, latest_version};
use crate::filter::plan::{CatalogueLookup, PredicatePlan};
use crate::filter::predicate::Predicate;
use crate::filter::sql::{attribute_table, compile, entity_table, SqlFragment};
use crate::filter::{FilterError, FilterResult};
use crate::model::attributes::Attributes;
use crate::model::catalogue::{Catalogue, CatalogueFields};
use crate::model::entity::{EntityId, EntityKind, EntityState, RemoveMode};
use crate::model::event::{Event, EventFields};
use crate::model::value::{format_timestamp, parse_timestamp, AttributeValue, Timestamp, ValueKind};
use crate::repo::backend::{Backend, CatalogueQuery, EventQuery, UnitId};
use crate::repo::{RepoError, RepoResult};
use log::{debug, info};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use uuid::Uuid;

const UNIT_SAVEPOINT_PREFIX: &str = "tscat_unit";

const EVENT_SELECT_SQL: &str = "SELECT
    events.id,
    events.uuid,
    events.start,
    events.stop,
    events.author,
    events.tags,
    events.products,
    events.rating,
    events.removed";

const CATALOGUE_SELECT_SQL: &str = "SELECT
    catalogues.id,
    catalogues.uuid,
    catalogues.name,
    catalogues.author,
    catalogues.tags,
    catalogues.predicate,
    catalogues.removed
FROM catalogues";

const REQUIRED_TABLES: &[&str] = &[
    "events",
    "catalogues",
    "event_attributes",
    "catalogue_attributes",
    "event_in_catalogue",
];

/// SQLite-backed catalogue storage over a borrowed connection.
pub struct SqliteBackend<'conn> {
    conn: &'conn Connection,
    next_unit: Cell<UnitId>,
    /// Open units, outermost first.
    open_units: RefCell<Vec<UnitId>>,
}

impl<'conn> SqliteBackend<'conn> {
    /// Constructs a backend from a migrated connection.
    ///
    /// # Errors
    /// - `UninitializedConnection` when migrations were not applied.
    /// - `MissingRequiredTable` when the schema is incomplete.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self {
            conn,
            next_unit: Cell::new(1),
            open_units: RefCell::new(Vec::new()),
        })
    }

    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    fn ensure_transaction(&self) -> RepoResult<()> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN EXCLUSIVE;")?;
            debug!("event=tx_begin module=repo status=ok mode=exclusive");
        }
        Ok(())
    }

    fn unit_position(&self, unit: UnitId) -> RepoResult<usize> {
        self.open_units
            .borrow()
            .iter()
            .position(|&open| open == unit)
            .ok_or(RepoError::NoOpenUnit(unit))
    }

    fn ensure_exists(&self, kind: EntityKind, id: EntityId) -> RepoResult<()> {
        if !self.exists(kind, id)? {
            return Err(RepoError::NotFound { kind, id });
        }
        Ok(())
    }

    fn is_member(&self, catalogue: EntityId, event: EntityId) -> RepoResult<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM event_in_catalogue
                WHERE event_id = ?1 AND catalogue_id = ?2
            );",
            params![event, catalogue],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn plan_fragment(&self, predicate: &Predicate, kind: EntityKind) -> RepoResult<SqlFragment> {
        let plan = PredicatePlan::build(predicate, kind, self)?;
        Ok(compile(&plan))
    }

    fn load_attributes(&self, kind: EntityKind, id: EntityId) -> RepoResult<Attributes> {
        let table = attribute_table(kind);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT key, kind, value FROM {table} WHERE entity_id = ?1 ORDER BY key ASC;"
        ))?;
        let mut rows = stmt.query([id])?;
        let mut attributes = Attributes::new();
        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            let kind_text: String = row.get(1)?;
            let value = value_from_sql(&kind_text, row.get_ref(2)?, table)?;
            attributes.insert_stored(key, value);
        }
        Ok(attributes)
    }

    fn write_attributes(
        &self,
        kind: EntityKind,
        id: EntityId,
        attributes: &Attributes,
    ) -> RepoResult<()> {
        for (name, value) in attributes.iter() {
            self.upsert_attribute(kind, id, name, value)?;
        }
        Ok(())
    }

    fn upsert_attribute(
        &self,
        kind: EntityKind,
        id: EntityId,
        name: &str,
        value: &AttributeValue,
    ) -> RepoResult<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO {} (entity_id, key, kind, value)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(entity_id, key) DO UPDATE SET
                    kind = excluded.kind,
                    value = excluded.value;",
                attribute_table(kind)
            ),
            params![id, name, value.kind().as_str(), value_to_sql(value)?],
        )?;
        Ok(())
    }

    fn parse_event_row(&self, row: &Row<'_>) -> RepoResult<Event> {
        let id: EntityId = row.get(0)?;
        let fields = EventFields {
            uuid: parse_uuid_column(&row.get::<_, String>(1)?, "events.uuid")?,
            start: parse_timestamp_column(&row.get::<_, String>(2)?, "events.start")?,
            stop: parse_timestamp_column(&row.get::<_, String>(3)?, "events.stop")?,
            author: row.get(4)?,
            tags: decode_list(&row.get::<_, String>(5)?, "events.tags")?,
            products: decode_list(&row.get::<_, String>(6)?, "events.products")?,
            rating: row.get(7)?,
        };
        fields
            .validate()
            .map_err(|err| RepoError::InvalidData(format!("event #{id}: {err}")))?;
        let removed = parse_flag(row.get(8)?, "events.removed")?;
        let assigned: Option<bool> = row.get(9)?;
        let attributes = self.load_attributes(EntityKind::Event, id)?;
        Ok(Event::from_parts(
            fields,
            attributes,
            EntityState::stored(id, removed),
            assigned,
        ))
    }

    fn parse_catalogue_row(&self, row: &Row<'_>) -> RepoResult<Catalogue> {
        let id: EntityId = row.get(0)?;
        let predicate = match row.get::<_, Option<String>>(5)? {
            Some(text) => Some(serde_json::from_str::<Predicate>(&text).map_err(|err| {
                RepoError::InvalidData(format!("invalid predicate in catalogues.predicate: {err}"))
            })?),
            None => None,
        };
        let fields = CatalogueFields {
            uuid: parse_uuid_column(&row.get::<_, String>(1)?, "catalogues.uuid")?,
            name: row.get(2)?,
            author: row.get(3)?,
            tags: decode_list(&row.get::<_, String>(4)?, "catalogues.tags")?,
            predicate,
        };
        fields
            .validate()
            .map_err(|err| RepoError::InvalidData(format!("catalogue #{id}: {err}")))?;
        let removed = parse_flag(row.get(6)?, "catalogues.removed")?;
        let attributes = self.load_attributes(EntityKind::Catalogue, id)?;
        Ok(Catalogue::from_parts(
            fields,
            attributes,
            EntityState::stored(id, removed),
        ))
    }

    fn query_events(&self, sql: &str, binds: Vec<Value>) -> RepoResult<Vec<Event>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            events.push(self.parse_event_row(row)?);
        }
        Ok(events)
    }

    fn query_catalogues(&self, sql: &str, binds: Vec<Value>) -> RepoResult<Vec<Catalogue>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut catalogues = Vec::new();
        while let Some(row) = rows.next()? {
            catalogues.push(self.parse_catalogue_row(row)?);
        }
        Ok(catalogues)
    }
}

impl CatalogueLookup for SqliteBackend<'_> {
    fn catalogue_predicate(&self, catalogue: Uuid) -> FilterResult<Option<Predicate>> {
        let stored: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT predicate FROM catalogues WHERE uuid = ?1;",
                [catalogue.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match stored {
            None => Err(FilterError::CatalogueNotFound(catalogue)),
            Some(None) => Ok(None),
            Some(Some(text)) => serde_json::from_str(&text).map(Some).map_err(|err| {
                FilterError::InvalidStoredPredicate {
                    catalogue,
                    message: err.to_string(),
                }
            }),
        }
    }

    fn is_assigned(&self, event: Uuid, catalogue: Option<Uuid>) -> FilterResult<bool> {
        let assigned: bool = match catalogue {
            Some(catalogue) => self.conn.query_row(
                "SELECT EXISTS(
                    SELECT 1
                    FROM event_in_catalogue m
                    INNER JOIN events e ON e.id = m.event_id
                    INNER JOIN catalogues c ON c.id = m.catalogue_id
                    WHERE e.uuid = ?1 AND c.uuid = ?2
                );",
                params![event.to_string(), catalogue.to_string()],
                |row| row.get(0),
            )?,
            None => self.conn.query_row(
                "SELECT EXISTS(
                    SELECT 1
                    FROM event_in_catalogue m
                    INNER JOIN events e ON e.id = m.event_id
                    WHERE e.uuid = ?1
                );",
                [event.to_string()],
                |row| row.get(0),
            )?,
        };
        Ok(assigned)
    }
}

impl Backend for SqliteBackend<'_> {
    fn exists(&self, kind: EntityKind, id: EntityId) -> RepoResult<bool> {
        let exists: bool = self.conn.query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1);", entity_table(kind)),
            [id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn add_event(&self, fields: &EventFields, attributes: &Attributes) -> RepoResult<EntityId> {
        self.ensure_transaction()?;
        self.conn
            .execute(
                "INSERT INTO events (uuid, start, stop, author, tags, products, rating, removed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0);",
                params![
                    fields.uuid.to_string(),
                    format_timestamp(&fields.start),
                    format_timestamp(&fields.stop),
                    fields.author.as_str(),
                    encode_list(&fields.tags)?,
                    encode_list(&fields.products)?,
                    fields.rating,
                ],
            )
            .map_err(|err| map_unique_violation(err, EntityKind::Event, fields.uuid))?;
        let id = self.conn.last_insert_rowid();
        self.write_attributes(EntityKind::Event, id, attributes)?;
        Ok(id)
    }

    fn add_catalogue(
        &self,
        fields: &CatalogueFields,
        attributes: &Attributes,
    ) -> RepoResult<EntityId> {
        self.ensure_transaction()?;
        self.conn
            .execute(
                "INSERT INTO catalogues (uuid, name, author, tags, predicate, removed)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0);",
                params![
                    fields.uuid.to_string(),
                    fields.name.as_str(),
                    fields.author.as_str(),
                    encode_list(&fields.tags)?,
                    encode_predicate(fields.predicate.as_ref())?,
                ],
            )
            .map_err(|err| map_unique_violation(err, EntityKind::Catalogue, fields.uuid))?;
        let id = self.conn.last_insert_rowid();
        self.write_attributes(EntityKind::Catalogue, id, attributes)?;
        Ok(id)
    }

    fn update_event_field(&self, id: EntityId, fields: &EventFields) -> RepoResult<()> {
        self.ensure_transaction()?;
        let changed = self
            .conn
            .execute(
                "UPDATE events
                 SET
                    uuid = ?1,
                    start = ?2,
                    stop = ?3,
                    author = ?4,
                    tags = ?5,
                    products = ?6,
                    rating = ?7
                 WHERE id = ?8;",
                params![
                    fields.uuid.to_string(),
                    format_timestamp(&fields.start),
                    format_timestamp(&fields.stop),
                    fields.author.as_str(),
                    encode_list(&fields.tags)?,
                    encode_list(&fields.products)?,
                    fields.rating,
                    id,
                ],
            )
            .map_err(|err| map_unique_violation(err, EntityKind::Event, fields.uuid))?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                kind: EntityKind::Event,
                id,
            });
        }
        Ok(())
    }

    fn update_catalogue_field(&self, id: EntityId, fields: &CatalogueFields) -> RepoResult<()> {
        self.ensure_transaction()?;
        let changed = self
            .conn
            .execute(
                "UPDATE catalogues
                 SET
                    uuid = ?1,
                    name = ?2,
                    author = ?3,
                    tags = ?4,
                    predicate = ?5
                 WHERE id = ?6;",
                params![
                    fields.uuid.to_string(),
                    fields.name.as_str(),
                    fields.author.as_str(),
                    encode_list(&fields.tags)?,
                    encode_predicate(fields.predicate.as_ref())?,
                    id,
                ],
            )
            .map_err(|err| map_unique_violation(err, EntityKind::Catalogue, fields.uuid))?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                kind: EntityKind::Catalogue,
                id,
            });
        }
        Ok(())
    }

    fn update_attribute(
        &self,
        kind: EntityKind,
        id: EntityId,
        name: &str,
        value: &AttributeValue,
    ) -> RepoResult<()> {
        self.ensure_transaction()?;
        self.ensure_exists(kind, id)?;
        self.upsert_attribute(kind, id, name, value)
    }

    fn delete_attribute(&self, kind: EntityKind, id: EntityId, name: &str) -> RepoResult<()> {
        self.ensure_transaction()?;
        self.ensure_exists(kind, id)?;
        self.conn.execute(
            &format!(
                "DELETE FROM {} WHERE entity_id = ?1 AND key = ?2;",
                attribute_table(kind)
            ),
            params![id, name],
        )?;
        Ok(())
    }

    fn remove(&self, kind: EntityKind, id: EntityId, mode: RemoveMode) -> RepoResult<()> {
        self.ensure_transaction()?;
        let table = entity_table(kind);
        let sql = match mode {
            RemoveMode::Soft => format!("UPDATE {table} SET removed = 1 WHERE id = ?1;"),
            RemoveMode::Permanent => format!("DELETE FROM {table} WHERE id = ?1;"),
        };
        if self.conn.execute(&sql, [id])? == 0 {
            return Err(RepoError::NotFound { kind, id });
        }
        Ok(())
    }

    fn restore(&self, kind: EntityKind, id: EntityId) -> RepoResult<()> {
        self.ensure_transaction()?;
        let changed = self.conn.execute(
            &format!("UPDATE {} SET removed = 0 WHERE id = ?1;", entity_table(kind)),
            [id],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound { kind, id });
        }
        Ok(())
    }

    fn add_events_to_catalogue(&self, catalogue: EntityId, events: &[EntityId]) -> RepoResult<()> {
        self.ensure_transaction()?;
        self.ensure_exists(EntityKind::Catalogue, catalogue)?;
        for &event in events {
            self.ensure_exists(EntityKind::Event, event)?;
            if self.is_member(catalogue, event)? {
                return Err(RepoError::AlreadyAssigned { catalogue, event });
            }
            self.conn.execute(
                "INSERT INTO event_in_catalogue (event_id, catalogue_id) VALUES (?1, ?2);",
                params![event, catalogue],
            )?;
        }
        Ok(())
    }

    fn remove_events_from_catalogue(
        &self,
        catalogue: EntityId,
        events: &[EntityId],
    ) -> RepoResult<()> {
        self.ensure_transaction()?;
        self.ensure_exists(EntityKind::Catalogue, catalogue)?;
        for &event in events {
            let changed = self.conn.execute(
                "DELETE FROM event_in_catalogue WHERE event_id = ?1 AND catalogue_id = ?2;",
                params![event, catalogue],
            )?;
            if changed == 0 {
                return Err(RepoError::NotAssigned { catalogue, event });
            }
        }
        Ok(())
    }

    fn get_events(&self, query: &EventQuery) -> RepoResult<Vec<Event>> {
        let mut sql = String::from(EVENT_SELECT_SQL);
        let mut bind_values: Vec<Value> = Vec::new();

        match query.flag_assigned_in {
            Some(catalogue) => {
                sql.push_str(
                    ",
    EXISTS (
        SELECT 1
        FROM event_in_catalogue m
        WHERE m.event_id = events.id AND m.catalogue_id = ?
    ) AS assigned",
                );
                bind_values.push(Value::Integer(catalogue));
            }
            None => sql.push_str(",\n    NULL AS assigned"),
        }
        sql.push_str("\nFROM events\nWHERE events.removed = ?");
        bind_values.push(Value::Integer(i64::from(query.removed)));

        let mut scopes: Vec<SqlFragment> = Vec::new();
        if let Some(predicate) = query.predicate.as_ref() {
            scopes.push(self.plan_fragment(predicate, EntityKind::Event)?);
        }
        if let Some(catalogue) = query.catalogue {
            scopes.push(SqlFragment {
                sql: "EXISTS (
                    SELECT 1
                    FROM event_in_catalogue m
                    WHERE m.event_id = events.id AND m.catalogue_id = ?
                )"
                .to_string(),
                binds: vec![Value::Integer(catalogue)],
            });
        }
        push_union(&mut sql, &mut bind_values, scopes);

        sql.push_str(" ORDER BY events.id ASC;");
        self.query_events(&sql, bind_values)
    }

    fn get_catalogues(&self, query: &CatalogueQuery) -> RepoResult<Vec<Catalogue>> {
        let mut sql = format!("{CATALOGUE_SELECT_SQL} WHERE catalogues.removed = ?");
        let mut bind_values: Vec<Value> = vec![Value::Integer(i64::from(query.removed))];

        if let Some(event) = query.event {
            sql.push_str(
                " AND EXISTS (
                    SELECT 1
                    FROM event_in_catalogue m
                    WHERE m.catalogue_id = catalogues.id AND m.event_id = ?
                )",
            );
            bind_values.push(Value::Integer(event));
        }
        if let Some(predicate) = query.predicate.as_ref() {
            let fragment = self.plan_fragment(predicate, EntityKind::Catalogue)?;
            push_union(&mut sql, &mut bind_values, vec![fragment]);
        }

        sql.push_str(" ORDER BY catalogues.id ASC;");
        self.query_catalogues(&sql, bind_values)
    }

    fn get_events_by_uuid_list(&self, uuids: &[Uuid]) -> RepoResult<HashMap<Uuid, Event>> {
        if uuids.is_empty() {
            return Ok(HashMap::new());
        }
        let placeholders = vec!["?"; uuids.len()].join(", ");
        let sql = format!(
            "{EVENT_SELECT_SQL},
    NULL AS assigned
FROM events
WHERE events.uuid IN ({placeholders})
ORDER BY events.id ASC;"
        );
        let binds = uuids
            .iter()
            .map(|uuid| Value::Text(uuid.to_string()))
            .collect();
        let events = self.query_events(&sql, binds)?;
        Ok(events
            .into_iter()
            .map(|event| (event.fields().uuid, event))
            .collect())
    }

    fn get_catalogue_by_uuid(&self, uuid: Uuid) -> RepoResult<Option<Catalogue>> {
        let sql = format!("{CATALOGUE_SELECT_SQL} WHERE catalogues.uuid = ?;");
        let mut catalogues = self.query_catalogues(&sql, vec![Value::Text(uuid.to_string())])?;
        Ok(catalogues.pop())
    }

    fn commit(&self) -> RepoResult<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT;")?;
            info!("event=tx_commit module=repo status=ok");
        }
        self.open_units.borrow_mut().clear();
        Ok(())
    }

    fn rollback(&self) -> RepoResult<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK;")?;
            info!("event=tx_rollback module=repo status=ok");
        }
        self.open_units.borrow_mut().clear();
        Ok(())
    }

    fn has_unsaved_changes(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn begin_unit(&self) -> RepoResult<UnitId> {
        self.ensure_transaction()?;
        let unit = self.next_unit.get();
        self.conn
            .execute_batch(&format!("SAVEPOINT {};", savepoint_name(unit)))?;
        self.next_unit.set(unit + 1);
        self.open_units.borrow_mut().push(unit);
        Ok(unit)
    }

    fn release_unit(&self, unit: UnitId) -> RepoResult<()> {
        let position = self.unit_position(unit)?;
        if position + 1 != self.open_units.borrow().len() {
            return Err(RepoError::UnitNotInnermost(unit));
        }
        self.conn
            .execute_batch(&format!("RELEASE SAVEPOINT {};", savepoint_name(unit)))?;
        self.open_units.borrow_mut().truncate(position);
        Ok(())
    }

    fn rollback_unit(&self, unit: UnitId) -> RepoResult<()> {
        let position = self.unit_position(unit)?;
        let name = savepoint_name(unit);
        // ROLLBACK TO also discards every savepoint opened after this one
        self.conn
            .execute_batch(&format!("ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name};"))?;
        self.open_units.borrow_mut().truncate(position);
        Ok(())
    }
}

fn savepoint_name(unit: UnitId) -> String {
    format!("{UNIT_SAVEPOINT_PREFIX}_{unit}")
}

/// Appends `AND (s1 OR s2 ...)` for non-empty `scopes`.
fn push_union(sql: &mut String, bind_values: &mut Vec<Value>, scopes: Vec<SqlFragment>) {
    if scopes.is_empty() {
        return;
    }
    sql.push_str(" AND (");
    for (index, scope) in scopes.into_iter().enumerate() {
        if index > 0 {
            sql.push_str(" OR ");
        }
        sql.push_str(&scope.sql);
        bind_values.extend(scope.binds);
    }
    sql.push(')');
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for &table in REQUIRED_TABLES {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }

    Ok(())
}

fn map_unique_violation(err: rusqlite::Error, kind: EntityKind, uuid: Uuid) -> RepoError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation
                && failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            RepoError::DuplicateUuid { kind, uuid }
        }
        _ => err.into(),
    }
}

fn value_to_sql(value: &AttributeValue) -> RepoResult<Value> {
    Ok(match value {
        AttributeValue::String(text) => Value::Text(text.clone()),
        AttributeValue::Integer(number) => Value::Integer(*number),
        AttributeValue::Float(number) => Value::Real(*number),
        AttributeValue::Boolean(flag) => Value::Integer(i64::from(*flag)),
        AttributeValue::Timestamp(timestamp) => Value::Text(format_timestamp(timestamp)),
        AttributeValue::StringList(values) => Value::Text(encode_list(values)?),
    })
}

fn value_from_sql(kind: &str, raw: ValueRef<'_>, table: &str) -> RepoResult<AttributeValue> {
    let invalid = || {
        RepoError::InvalidData(format!(
            "attribute value does not match kind `{kind}` in {table}.value"
        ))
    };
    let kind = ValueKind::parse(kind)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid kind `{kind}` in {table}.kind")))?;
    let value = match (kind, raw) {
        (ValueKind::String, ValueRef::Text(bytes)) => {
            AttributeValue::String(text_from_bytes(bytes).ok_or_else(invalid)?.to_string())
        }
        (ValueKind::Integer, ValueRef::Integer(number)) => AttributeValue::Integer(number),
        (ValueKind::Float, ValueRef::Real(number)) => AttributeValue::Float(number),
        (ValueKind::Boolean, ValueRef::Integer(number)) => {
            AttributeValue::Boolean(parse_flag(number, "attribute boolean")?)
        }
        (ValueKind::Timestamp, ValueRef::Text(bytes)) => AttributeValue::Timestamp(
            parse_timestamp(text_from_bytes(bytes).ok_or_else(invalid)?).ok_or_else(invalid)?,
        ),
        (ValueKind::StringList, ValueRef::Text(bytes)) => AttributeValue::StringList(decode_list(
            text_from_bytes(bytes).ok_or_else(invalid)?,
            "attribute string_list",
        )?),
        _ => return Err(invalid()),
    };
    Ok(value)
}

fn text_from_bytes(bytes: &[u8]) -> Option<&str> {
    std::str::from_utf8(bytes).ok()
}

fn encode_list(values: &[String]) -> RepoResult<String> {
    serde_json::to_string(values)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode string list: {err}")))
}

fn decode_list(text: &str, column: &str) -> RepoResult<Vec<String>> {
    serde_json::from_str(text)
        .map_err(|err| RepoError::InvalidData(format!("invalid string list in {column}: {err}")))
}

fn encode_predicate(predicate: Option<&Predicate>) -> RepoResult<Option<String>> {
    predicate
        .map(|predicate| {
            serde_json::to_string(predicate)
                .map_err(|err| RepoError::InvalidData(format!("cannot encode predicate: {err}")))
        })
        .transpose()
}

fn parse_uuid_column(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn parse_timestamp_column(value: &str, column: &str) -> RepoResult<Timestamp> {
    parse_timestamp(value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid timestamp `{value}` in {column}")))
}

fn parse_flag(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid flag value `{other}` in {column}"
        ))),
    }
}
