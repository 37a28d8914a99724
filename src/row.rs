//! Physical rows of a translatable table.

use crate::db::quote_ident;
use crate::error::Result;
use crate::schema::TableSchema;
use rusqlite::types::Value;
use rusqlite::{Connection, Params};
use std::collections::BTreeMap;

/// Column holding the translation group identifier.
pub const ROW_ID_COLUMN: &str = "row_id";

/// Column holding the language code.
pub const ISO_COLUMN: &str = "iso";

/// Business attributes of a row, keyed by column name.
pub type AttributeMap = BTreeMap<String, Value>;

/// One physical row of a translatable table.
///
/// `attributes` holds every column except the primary key and the two
/// tracking columns, which are lifted into typed fields.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatableRow {
    pub id: i64,
    pub row_id: Option<i64>,
    pub iso: Option<String>,
    pub attributes: AttributeMap,
}

impl TranslatableRow {
    /// Build a row from a result row whose column names are `columns`.
    pub(crate) fn from_sql(
        row: &rusqlite::Row<'_>,
        columns: &[String],
        primary_key: &str,
    ) -> rusqlite::Result<Self> {
        let mut id = None;
        let mut row_id = None;
        let mut iso = None;
        let mut attributes = AttributeMap::new();

        for (index, column) in columns.iter().enumerate() {
            if column == primary_key {
                id = Some(row.get::<_, i64>(index)?);
            } else if column == ROW_ID_COLUMN {
                row_id = row.get::<_, Option<i64>>(index)?;
            } else if column == ISO_COLUMN {
                iso = row.get::<_, Option<String>>(index)?;
            } else {
                attributes.insert(column.clone(), row.get::<_, Value>(index)?);
            }
        }

        let id = id.ok_or_else(|| rusqlite::Error::InvalidColumnName(primary_key.to_string()))?;
        Ok(Self {
            id,
            row_id,
            iso,
            attributes,
        })
    }

    /// Attribute value by column name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes.get(column)
    }

    /// Text attribute by column name (`None` for NULL or non-text values).
    pub fn text(&self, column: &str) -> Option<&str> {
        match self.attributes.get(column) {
            Some(Value::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Whether this row started its group (`row_id == id`).
    pub fn is_canonical(&self) -> bool {
        self.row_id == Some(self.id)
    }
}

/// Load rows matching `filter` (a SQL predicate over `params`), ordered by
/// primary key.
pub(crate) fn select_rows<P: Params>(
    conn: &Connection,
    schema: &TableSchema,
    filter: &str,
    params: P,
) -> Result<Vec<TranslatableRow>> {
    let sql = format!(
        "SELECT * FROM {} WHERE {} ORDER BY {}",
        schema.table.quoted(),
        filter,
        quote_ident(&schema.primary_key)
    );
    let mut stmt = conn.prepare(&sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let rows = stmt
        .query_map(params, |row| {
            TranslatableRow::from_sql(row, &columns, &schema.primary_key)
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Load one row by primary key.
pub(crate) fn find_row(
    conn: &Connection,
    schema: &TableSchema,
    id: i64,
) -> Result<Option<TranslatableRow>> {
    let filter = format!("{} = ?1", quote_ident(&schema.primary_key));
    Ok(select_rows(conn, schema, &filter, [id])?.into_iter().next())
}

/// Lifecycle of a translation group.
///
/// Transitions are monotonic under normal operation; only deleting rows can
/// move a group backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupState {
    /// The row has no `row_id` yet.
    Unassigned,
    /// Fewer languages present than configured.
    Partial,
    /// Every configured language present.
    Complete,
}

impl GroupState {
    /// Classify a group from its configured languages present.
    pub fn classify(row_id: Option<i64>, languages_present: usize, expected: usize) -> Self {
        match row_id {
            None => GroupState::Unassigned,
            Some(_) if languages_present >= expected => GroupState::Complete,
            Some(_) => GroupState::Partial,
        }
    }
}
