//! Constraint inspector: unique indexes and column layout of a table.
//!
//! The output contract is engine independent (`TableSchema`, `UniqueIndex`);
//! the introspection itself uses SQLite's `pragma_index_list` and
//! `pragma_index_info` table-valued functions.

use crate::db::{require_table, Database, TableName};
use crate::error::{Error, Result};
use crate::row::{ISO_COLUMN, ROW_ID_COLUMN};
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::warn;

/// A non-primary unique index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UniqueIndex {
    pub name: String,
    /// Indexed columns in index order.
    pub columns: Vec<String>,
}

impl UniqueIndex {
    pub fn includes(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Indexes that include `iso` never collide across languages.
    pub fn is_language_scoped(&self) -> bool {
        self.includes(ISO_COLUMN)
    }
}

/// Column metadata from `pragma_table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
}

/// Everything replication needs to know about a table, fetched once and
/// passed around as data.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub table: TableName,
    pub primary_key: String,
    pub columns: Vec<ColumnInfo>,
    pub unique_indexes: Vec<UniqueIndex>,
}

impl TableSchema {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column.name == name)
    }

    /// Both `row_id` and `iso` are present.
    pub fn has_tracking_columns(&self) -> bool {
        self.has_column(ROW_ID_COLUMN) && self.has_column(ISO_COLUMN)
    }

    /// Unique indexes that can collide between languages of one group.
    ///
    /// Skips indexes covering `iso` (already language scoped) and the primary
    /// key (never copied).
    pub fn collision_indexes(&self) -> impl Iterator<Item = &UniqueIndex> {
        self.unique_indexes
            .iter()
            .filter(move |index| !index.is_language_scoped() && !index.includes(&self.primary_key))
    }
}

/// Reads table structure from the live schema.
#[derive(Clone)]
pub struct ConstraintInspector {
    db: Database,
}

impl ConstraintInspector {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Unique column groups of a table, primary key excluded.
    ///
    /// Never fails: an introspection error is logged and yields an empty
    /// list, leaving replication to run without collision protection.
    pub fn list_unique_columns(&self, table: &str) -> Vec<UniqueIndex> {
        let result = TableName::parse(table)
            .and_then(|table| self.db.read(|conn| unique_indexes(conn, &table)));

        match result {
            Ok(indexes) => indexes,
            Err(e) => {
                warn!("Could not retrieve unique indexes for table {}: {}", table, e);
                Vec::new()
            }
        }
    }

    /// Describe a table.
    ///
    /// # Errors
    /// * `InvalidIdentifier` for a malformed table name
    /// * `TableNotFound` when the table does not exist
    /// * `UnsupportedTable` when there is no single integer primary key
    pub fn describe(&self, table: &str) -> Result<TableSchema> {
        let table = TableName::parse(table)?;
        self.db.read(|conn| describe(conn, &table))
    }
}

/// Describe a table using an already-held connection.
fn describe(conn: &Connection, table: &TableName) -> Result<TableSchema> {
    require_table(conn, table)?;

    let mut stmt = conn.prepare(
        "SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1, ?2) ORDER BY cid",
    )?;
    let rows = stmt.query_map(params![table.name(), table.schema()], |row| {
        Ok((
            ColumnInfo {
                name: row.get(0)?,
                declared_type: row.get(1)?,
                not_null: row.get::<_, i64>(2)? != 0,
            },
            row.get::<_, i64>(3)?,
        ))
    })?;

    let mut columns = Vec::new();
    let mut key_columns = Vec::new();
    for row in rows {
        let (column, pk) = row?;
        if pk > 0 {
            key_columns.push(column.clone());
        }
        columns.push(column);
    }

    let primary_key = match key_columns.as_slice() {
        [key] if key.declared_type.eq_ignore_ascii_case("INTEGER") => key.name.clone(),
        [key] => {
            return Err(Error::UnsupportedTable {
                table: table.to_string(),
                reason: format!(
                    "primary key '{}' is {}, expected INTEGER",
                    key.name, key.declared_type
                ),
            })
        }
        [] => {
            return Err(Error::UnsupportedTable {
                table: table.to_string(),
                reason: "no primary key column".to_string(),
            })
        }
        _ => {
            return Err(Error::UnsupportedTable {
                table: table.to_string(),
                reason: "composite primary key".to_string(),
            })
        }
    };

    let unique_indexes = match unique_indexes(conn, table) {
        Ok(indexes) => indexes,
        Err(e) => {
            warn!("Could not retrieve unique indexes for table {}: {}", table, e);
            Vec::new()
        }
    };

    Ok(TableSchema {
        table: table.clone(),
        primary_key,
        columns,
        unique_indexes,
    })
}

fn unique_indexes(conn: &Connection, table: &TableName) -> Result<Vec<UniqueIndex>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM pragma_index_list(?1, ?2)
         WHERE \"unique\" = 1 AND origin != 'pk'
         ORDER BY name",
    )?;
    let names = stmt
        .query_map(params![table.name(), table.schema()], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut info = conn.prepare(
        "SELECT name FROM pragma_index_info(?1, ?2) ORDER BY seqno",
    )?;

    let mut indexes = Vec::with_capacity(names.len());
    for name in names {
        let columns = info
            .query_map(params![name, table.schema()], |row| row.get::<_, Option<String>>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        // Expression indexes report NULL column names and cannot be rewritten
        let Some(columns) = columns.into_iter().collect::<Option<Vec<_>>>() else {
            continue;
        };
        if columns.is_empty() {
            continue;
        }
        indexes.push(UniqueIndex { name, columns });
    }

    Ok(indexes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;

    fn names(indexes: &[UniqueIndex]) -> Vec<Vec<&str>> {
        indexes
            .iter()
            .map(|index| index.columns.iter().map(String::as_str).collect())
            .collect()
    }

    // ==================== Unique Column Tests ====================

    #[test]
    fn test_single_column_unique_index() {
        let (db, _temp_dir) = create_products_db();
        let inspector = ConstraintInspector::new(db);

        let indexes = inspector.list_unique_columns("products");
        assert_eq!(names(&indexes), vec![vec!["slug"]]);
        assert_eq!(indexes[0].name, "products_slug_unique");
    }

    #[test]
    fn test_excludes_primary_key_and_plain_indexes() {
        let (db, _temp_dir) = create_test_db();
        db.execute_batch(
            "CREATE TABLE boxes (id INTEGER PRIMARY KEY, label TEXT, size INTEGER);
             CREATE INDEX boxes_size ON boxes(size);",
        )
        .unwrap();
        let inspector = ConstraintInspector::new(db);

        assert!(inspector.list_unique_columns("boxes").is_empty());
    }

    #[test]
    fn test_composite_index_grouped_in_order() {
        let (db, _temp_dir) = create_test_db();
        db.execute_batch(
            "CREATE TABLE items (
                id INTEGER PRIMARY KEY,
                sku TEXT,
                vendor TEXT,
                UNIQUE (vendor, sku)
             );",
        )
        .unwrap();
        let inspector = ConstraintInspector::new(db);

        let indexes = inspector.list_unique_columns("items");
        assert_eq!(names(&indexes), vec![vec!["vendor", "sku"]]);
    }

    #[test]
    fn test_expression_index_ignored() {
        let (db, _temp_dir) = create_test_db();
        db.execute_batch(
            "CREATE TABLE tags (id INTEGER PRIMARY KEY, label TEXT);
             CREATE UNIQUE INDEX tags_lower_label ON tags(lower(label));",
        )
        .unwrap();
        let inspector = ConstraintInspector::new(db);

        assert!(inspector.list_unique_columns("tags").is_empty());
    }

    #[test]
    fn test_introspection_failure_returns_empty() {
        let (db, _temp_dir) = create_test_db();
        let inspector = ConstraintInspector::new(db);

        assert!(inspector.list_unique_columns("missing_table").is_empty());
        assert!(inspector.list_unique_columns("bad name;").is_empty());
    }

    // ==================== Describe Tests ====================

    #[test]
    fn test_describe_products() {
        let (db, _temp_dir) = create_products_db();
        let inspector = ConstraintInspector::new(db);

        let schema = inspector.describe("products").unwrap();
        assert_eq!(schema.primary_key, "id");
        assert!(schema.has_column("slug"));
        assert!(schema.has_tracking_columns());
        assert_eq!(schema.unique_indexes.len(), 1);
        assert_eq!(schema.collision_indexes().count(), 1);

        let name = schema.columns.iter().find(|c| c.name == "name").unwrap();
        assert!(name.not_null);
    }

    #[test]
    fn test_describe_missing_table() {
        let (db, _temp_dir) = create_test_db();
        let inspector = ConstraintInspector::new(db);

        assert!(matches!(
            inspector.describe("missing"),
            Err(Error::TableNotFound(_))
        ));
    }

    #[test]
    fn test_describe_rejects_text_primary_key() {
        let (db, _temp_dir) = create_test_db();
        db.execute_batch("CREATE TABLE docs (id TEXT PRIMARY KEY, body TEXT)")
            .unwrap();
        let inspector = ConstraintInspector::new(db);

        assert!(matches!(
            inspector.describe("docs"),
            Err(Error::UnsupportedTable { .. })
        ));
    }

    #[test]
    fn test_language_scoped_index_not_a_collision() {
        let (db, _temp_dir) = create_test_db();
        db.execute_batch(
            "CREATE TABLE pages (
                id INTEGER PRIMARY KEY,
                path TEXT,
                row_id INTEGER,
                iso TEXT,
                UNIQUE (path, iso)
             );",
        )
        .unwrap();
        let inspector = ConstraintInspector::new(db);

        let schema = inspector.describe("pages").unwrap();
        assert_eq!(schema.unique_indexes.len(), 1);
        assert!(schema.unique_indexes[0].is_language_scoped());
        assert_eq!(schema.collision_indexes().count(), 0);
    }
}
