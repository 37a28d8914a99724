//! Uniqueness-conflict resolution for derived rows.
//!
//! A derived row copies its canonical row's attributes, so every unique index
//! that does not include `iso` would collide. Before inserting, each such
//! index's value tuple is checked against the table; on a hit the index's
//! first text column walks a deterministic ladder:
//!
//! `value` → `value-{lang}` → `value-{lang}-1` → … → `value-{lang}-{n}`
//!
//! and, once the ladder is exhausted, `value-{lang}-{random}`.

use crate::db::quote_ident;
use crate::error::Result;
use crate::row::{AttributeMap, ROW_ID_COLUMN};
use crate::schema::TableSchema;
use rand::distr::{Alphanumeric, SampleString};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use tracing::debug;

/// Default number of ladder candidates tried before the random fallback.
pub const DEFAULT_SUFFIX_ATTEMPTS: u32 = 100;

const RANDOM_SUFFIX_LEN: usize = 5;

/// Candidate values for `base` in language `language`.
///
/// Yields at most `max_attempts` values; the first is `base` itself.
pub fn ladder<'a>(base: &'a str, language: &'a str, max_attempts: u32) -> impl Iterator<Item = String> + 'a {
    (0..max_attempts).map(move |step| match step {
        0 => base.to_string(),
        1 => format!("{}-{}", base, language),
        n => format!("{}-{}-{}", base, language, n - 1),
    })
}

/// Unambiguous last-resort value: `{base}-{language}-{random}`.
pub fn random_suffix(base: &str, language: &str) -> String {
    let random = Alphanumeric
        .sample_string(&mut rand::rng(), RANDOM_SUFFIX_LEN)
        .to_lowercase();
    format!("{}-{}-{}", base, language, random)
}

/// A value rewritten to satisfy a unique index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub index: String,
    pub column: String,
    pub from: String,
    pub to: String,
    /// The ladder was exhausted and a random suffix was used.
    pub random: bool,
}

/// Rewrite `candidate` so that no collision-prone unique index of `schema`
/// already holds its value tuple.
///
/// `row_id` is the group the candidate will join; it fills the `row_id`
/// slot of indexes that include it. Indexes with a NULL in the candidate
/// tuple are skipped (NULLs never collide). Indexes with no text column
/// cannot be rewritten and are left for the insert to reject.
pub(crate) fn resolve(
    conn: &Connection,
    schema: &TableSchema,
    candidate: &mut AttributeMap,
    row_id: Option<i64>,
    language: &str,
    max_attempts: u32,
) -> Result<Vec<Rewrite>> {
    let mut rewrites = Vec::new();

    for index in schema.collision_indexes() {
        let values: Vec<Value> = index
            .columns
            .iter()
            .map(|column| match column.as_str() {
                ROW_ID_COLUMN => row_id.map_or(Value::Null, Value::Integer),
                _ => candidate.get(column).cloned().unwrap_or(Value::Null),
            })
            .collect();
        if values.iter().any(|value| matches!(value, Value::Null)) {
            continue;
        }
        if !tuple_exists(conn, schema, &index.columns, &values)? {
            continue;
        }

        let Some(position) = values.iter().position(|value| matches!(value, Value::Text(_))) else {
            debug!(
                "Unique index {} on {} has no text column to rewrite",
                index.name, schema.table
            );
            continue;
        };
        let Value::Text(base) = values[position].clone() else {
            continue;
        };
        let column = index.columns[position].clone();

        let mut tuple = values;
        let mut resolved = None;
        for value in ladder(&base, language, max_attempts).skip(1) {
            tuple[position] = Value::Text(value.clone());
            if !tuple_exists(conn, schema, &index.columns, &tuple)? {
                resolved = Some(value);
                break;
            }
        }

        let (value, random) = match resolved {
            Some(value) => (value, false),
            None => (random_suffix(&base, language), true),
        };

        candidate.insert(column.clone(), Value::Text(value.clone()));
        rewrites.push(Rewrite {
            index: index.name.clone(),
            column,
            from: base,
            to: value,
            random,
        });
    }

    Ok(rewrites)
}

fn tuple_exists(
    conn: &Connection,
    schema: &TableSchema,
    columns: &[String],
    values: &[Value],
) -> Result<bool> {
    let predicate = columns
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{} = ?{}", quote_ident(column), i + 1))
        .collect::<Vec<_>>()
        .join(" AND ");
    let sql = format!(
        "SELECT 1 FROM {} WHERE {} LIMIT 1",
        schema.table.quoted(),
        predicate
    );

    let found = conn
        .query_row(&sql, params_from_iter(values.iter()), |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}
