//! Consistency queries over translation groups.
//!
//! Every query degrades to an empty or zero result on tables without the
//! tracking columns; a missing table or a malformed name is still an error.

use crate::config::TranslationConfig;
use crate::db::{quote_ident, Database};
use crate::error::{Error, Result};
use crate::i18n::validator::validate_column_name;
use crate::i18n::Locale;
use crate::replication::{existing_languages, find_in_group};
use crate::row::{
    find_row, select_rows, AttributeMap, GroupState, TranslatableRow, ISO_COLUMN, ROW_ID_COLUMN,
};
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use crate::schema::{ConstraintInspector, TableSchema};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Group and row counts behind a coverage ratio.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageReport {
    pub table: String,
    pub groups: i64,
    /// Rows with a `row_id`.
    pub rows: i64,
    pub languages: usize,
    pub coverage: f64,
}

impl CoverageReport {
    fn empty(table: &str, languages: usize) -> Self {
        Self {
            table: table.to_string(),
            groups: 0,
            rows: 0,
            languages,
            coverage: 0.0,
        }
    }
}

/// Translation statistics for one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationStats {
    pub table: String,
    pub total_rows: i64,
    pub groups: i64,
    /// Rows still waiting for a `row_id`.
    pub ungrouped: i64,
    pub incomplete_groups: usize,
    /// Row count per stored `iso` value.
    pub per_language: BTreeMap<String, i64>,
    pub coverage: f64,
}

#[derive(Clone)]
pub struct ConsistencyQueries {
    db: Database,
    inspector: ConstraintInspector,
    config: Arc<TranslationConfig>,
}

impl ConsistencyQueries {
    pub fn new(db: Database, config: Arc<TranslationConfig>) -> Self {
        Self {
            inspector: ConstraintInspector::new(db.clone()),
            db,
            config,
        }
    }

    /// Schema of a provisioned table, `None` when tracking columns are absent.
    fn tracked(&self, table: &str) -> Result<Option<TableSchema>> {
        let schema = self.inspector.describe(table)?;
        Ok(schema.has_tracking_columns().then_some(schema))
    }

    /// The row of group `row_id` in `iso`.
    pub fn find_in_language(
        &self,
        table: &str,
        row_id: i64,
        iso: &str,
    ) -> Result<Option<TranslatableRow>> {
        let language = Locale::parse(iso)?;
        let Some(schema) = self.tracked(table)? else {
            return Ok(None);
        };
        self.db
            .read(|conn| find_in_group(conn, &schema, row_id, &language))
    }

    /// Every row of group `row_id`, ordered by id.
    pub fn all_in_group(&self, table: &str, row_id: i64) -> Result<Vec<TranslatableRow>> {
        let Some(schema) = self.tracked(table)? else {
            return Ok(Vec::new());
        };
        let filter = format!("{} = ?1", quote_ident(ROW_ID_COLUMN));
        self.db
            .read(|conn| select_rows(conn, &schema, &filter, [row_id]))
    }

    /// Rows in `iso` matching every equality in `conditions`.
    ///
    /// A condition on the primary key matches the group (`row_id`), so a
    /// canonical id finds its sibling in `iso`. NULL matches `IS NULL`.
    pub fn where_in_language(
        &self,
        table: &str,
        conditions: &AttributeMap,
        iso: &str,
    ) -> Result<Vec<TranslatableRow>> {
        let language = Locale::parse(iso)?;
        let Some(schema) = self.tracked(table)? else {
            return Ok(Vec::new());
        };

        let mut clauses = vec![format!("{} = ?1", quote_ident(ISO_COLUMN))];
        let mut values = vec![Value::Text(language.code().to_string())];
        for (column, value) in conditions {
            validate_column_name(column)?;
            if !schema.has_column(column) {
                return Err(Error::UnknownColumn {
                    table: schema.table.to_string(),
                    column: column.clone(),
                });
            }
            let column = if *column == schema.primary_key {
                ROW_ID_COLUMN
            } else {
                column.as_str()
            };
            if matches!(value, Value::Null) {
                clauses.push(format!("{} IS NULL", quote_ident(column)));
            } else {
                values.push(value.clone());
                clauses.push(format!("{} = ?{}", quote_ident(column), values.len()));
            }
        }

        let filter = clauses.join(" AND ");
        self.db
            .read(|conn| select_rows(conn, &schema, &filter, params_from_iter(values.iter())))
    }

    /// Group id of a record (`None` if unassigned, missing or untracked).
    pub fn row_id_of(&self, table: &str, id: i64) -> Result<Option<i64>> {
        let Some(schema) = self.tracked(table)? else {
            return Ok(None);
        };
        let row = self.db.read(|conn| find_row(conn, &schema, id))?;
        Ok(row.and_then(|row| row.row_id))
    }

    /// Every row in the group a record belongs to.
    pub fn translations_of(&self, table: &str, id: i64) -> Result<Vec<TranslatableRow>> {
        match self.row_id_of(table, id)? {
            Some(row_id) => self.all_in_group(table, row_id),
            None => Ok(Vec::new()),
        }
    }

    /// `rows_with_row_id / (groups × configured languages)`, `0.0` without groups.
    pub fn coverage(&self, table: &str) -> Result<f64> {
        Ok(self.coverage_report(table)?.coverage)
    }

    pub fn coverage_report(&self, table: &str) -> Result<CoverageReport> {
        let languages = self.config.languages.len();
        let Some(schema) = self.tracked(table)? else {
            return Ok(CoverageReport::empty(table, languages));
        };

        let (groups, rows): (i64, i64) = self.db.read(|conn| {
            Ok(conn.query_row(
                &format!(
                    "SELECT COUNT(DISTINCT {row_id}), COUNT({row_id}) FROM {table}",
                    row_id = quote_ident(ROW_ID_COLUMN),
                    table = schema.table.quoted()
                ),
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?)
        })?;

        let coverage = if groups == 0 {
            0.0
        } else {
            rows as f64 / (groups as f64 * languages as f64)
        };

        Ok(CoverageReport {
            table: schema.table.to_string(),
            groups,
            rows,
            languages,
            coverage,
        })
    }

    /// Groups with fewer distinct languages than configured.
    pub fn incomplete_groups(&self, table: &str) -> Result<Vec<i64>> {
        let Some(schema) = self.tracked(table)? else {
            return Ok(Vec::new());
        };
        self.db.read(|conn| incomplete_groups(conn, &schema, self.config.languages.len()))
    }

    /// One row per incomplete group: the lowest id, which is the canonical
    /// row unless it was deleted.
    pub fn incomplete_rows(&self, table: &str) -> Result<Vec<TranslatableRow>> {
        let Some(schema) = self.tracked(table)? else {
            return Ok(Vec::new());
        };
        let filter = format!(
            "{pk} IN (
                SELECT MIN({pk}) FROM {table} WHERE {row_id} IS NOT NULL
                GROUP BY {row_id} HAVING COUNT(DISTINCT {iso}) < ?1
            )",
            row_id = quote_ident(ROW_ID_COLUMN),
            pk = quote_ident(&schema.primary_key),
            iso = quote_ident(ISO_COLUMN),
            table = schema.table.quoted(),
        );
        let expected = self.config.languages.len() as i64;
        self.db
            .read(|conn| select_rows(conn, &schema, &filter, [expected]))
    }

    /// Groups with every configured language present.
    pub fn complete_groups(&self, table: &str) -> Result<Vec<i64>> {
        let Some(schema) = self.tracked(table)? else {
            return Ok(Vec::new());
        };
        self.db
            .read(|conn| groups_where(conn, &schema, ">=", self.config.languages.len()))
    }

    /// Rows of complete groups, optionally limited to one language.
    pub fn complete_rows(&self, table: &str, iso: Option<&str>) -> Result<Vec<TranslatableRow>> {
        let language = iso.map(Locale::parse).transpose()?;
        let Some(schema) = self.tracked(table)? else {
            return Ok(Vec::new());
        };
        let mut filter = format!(
            "{row_id} IN (
                SELECT {row_id} FROM {table} WHERE {row_id} IS NOT NULL
                GROUP BY {row_id} HAVING COUNT(DISTINCT {iso}) >= ?1
            )",
            row_id = quote_ident(ROW_ID_COLUMN),
            iso = quote_ident(ISO_COLUMN),
            table = schema.table.quoted(),
        );
        let mut values = vec![Value::Integer(self.config.languages.len() as i64)];
        if let Some(language) = language {
            filter.push_str(&format!(" AND {} = ?2", quote_ident(ISO_COLUMN)));
            values.push(Value::Text(language.code().to_string()));
        }
        self.db
            .read(|conn| select_rows(conn, &schema, &filter, params_from_iter(values.iter())))
    }

    /// Lifecycle state of the group a record belongs to.
    pub fn group_state(&self, table: &str, id: i64) -> Result<Option<GroupState>> {
        let Some(schema) = self.tracked(table)? else {
            return Ok(None);
        };
        let languages = &self.config.languages;

        self.db.read(|conn| {
            let Some(row) = find_row(conn, &schema, id)? else {
                return Ok(None);
            };
            let present = match row.row_id {
                Some(row_id) => existing_languages(conn, &schema, row_id)?
                    .iter()
                    .filter(|code| languages.contains(code))
                    .count(),
                None => 0,
            };
            Ok(Some(GroupState::classify(row.row_id, present, languages.len())))
        })
    }

    /// Row, group and per-language counts; `None` for untracked tables.
    pub fn stats(&self, table: &str) -> Result<Option<TranslationStats>> {
        let Some(schema) = self.tracked(table)? else {
            return Ok(None);
        };
        let coverage = self.coverage_report(table)?;
        let expected = self.config.languages.len();

        self.db.read(|conn| {
            let (total_rows, ungrouped): (i64, i64) = conn.query_row(
                &format!(
                    "SELECT COUNT(*), COUNT(*) - COUNT({}) FROM {}",
                    quote_ident(ROW_ID_COLUMN),
                    schema.table.quoted()
                ),
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {iso}, COUNT(*) FROM {table} WHERE {iso} IS NOT NULL GROUP BY {iso} ORDER BY {iso}",
                iso = quote_ident(ISO_COLUMN),
                table = schema.table.quoted()
            ))?;
            let per_language = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;

            Ok(Some(TranslationStats {
                table: schema.table.to_string(),
                total_rows,
                groups: coverage.groups,
                ungrouped,
                incomplete_groups: incomplete_groups(conn, &schema, expected)?.len(),
                per_language,
                coverage: coverage.coverage,
            }))
        })
    }
}

fn incomplete_groups(conn: &rusqlite::Connection, schema: &TableSchema, expected: usize) -> Result<Vec<i64>> {
    groups_where(conn, schema, "<", expected)
}

/// Group ids whose distinct language count compares to `expected` by `op`.
fn groups_where(
    conn: &rusqlite::Connection,
    schema: &TableSchema,
    op: &str,
    expected: usize,
) -> Result<Vec<i64>> {
    let sql = format!(
        "SELECT {row_id} FROM {table} WHERE {row_id} IS NOT NULL
         GROUP BY {row_id} HAVING COUNT(DISTINCT {iso}) {op} ?1 ORDER BY {row_id}",
        row_id = quote_ident(ROW_ID_COLUMN),
        iso = quote_ident(ISO_COLUMN),
        table = schema.table.quoted(),
    );
    let mut stmt = conn.prepare(&sql)?;
    let groups = stmt
        .query_map([expected as i64], |row| row.get::<_, i64>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(groups)
}
