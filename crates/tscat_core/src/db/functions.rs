//! Application-defined SQL functions.
//!
//! # Responsibility
//! - Provide `REGEXP` so compiled `Match` predicates run inside SQLite.
//!
//! # Invariants
//! - `x REGEXP y` calls `regexp(y, x)` and uses search semantics, matching
//!   the in-memory evaluator.
//! - Non-text subjects never match.

use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::error::Error;
use std::sync::Arc;

type BoxError = Box<dyn Error + Send + Sync + 'static>;

pub(crate) fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let pattern: Arc<Regex> =
                ctx.get_or_create_aux(0, |value| -> Result<Regex, BoxError> {
                    Ok(Regex::new(value.as_str()?)?)
                })?;
            let matched = match ctx.get_raw(1) {
                ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
                    Ok(subject) => pattern.is_match(subject),
                    Err(_) => false,
                },
                _ => false,
            };
            Ok(matched)
        },
    )
}
