use crate::error::{Error, Result};
use crate::i18n::validator::validate_table_name;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// How long a writer waits on a locked database before reporting busy.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared SQLite handle.
///
/// Cloning shares the connection. Writes that must be atomic with their
/// preceding reads (existence check then insert) go through
/// [`Database::write`], which holds an IMMEDIATE transaction so another
/// process cannot interleave a write.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a database file.
    pub fn open(database_path: &str) -> Result<Self> {
        let conn = Connection::open(database_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("Opened database at {} (journal_mode={})", database_path, mode);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave SQLite itself in a
        // half-written state, so a poisoned guard is still usable.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run a read (or autocommit write) against the connection.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock();
        f(&conn)
    }

    /// Run `f` inside an IMMEDIATE transaction, committing on `Ok`.
    pub fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Execute raw SQL statements (schema setup, fixtures).
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.lock().execute_batch(sql)?;
        Ok(())
    }

    /// Check whether a table exists.
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let table = TableName::parse(table)?;
        self.read(|conn| table_exists(conn, &table))
    }

    /// Check whether a column exists on a table (false when the table is missing).
    pub fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        let table = TableName::parse(table)?;
        self.read(|conn| column_exists(conn, &table, column))
    }

    /// Check for both tracking columns (`row_id`, `iso`).
    pub fn has_tracking_columns(&self, table: &str) -> Result<bool> {
        let table = TableName::parse(table)?;
        self.read(|conn| {
            Ok(column_exists(conn, &table, crate::row::ROW_ID_COLUMN)?
                && column_exists(conn, &table, crate::row::ISO_COLUMN)?)
        })
    }
}

pub(crate) fn table_exists(conn: &Connection, table: &TableName) -> Result<bool> {
    let sql = format!(
        "SELECT 1 FROM {}.sqlite_master WHERE type = 'table' AND name = ?1",
        quote_ident(table.schema())
    );
    let found = conn
        .query_row(&sql, params![table.name()], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn column_exists(conn: &Connection, table: &TableName, column: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1, ?2) WHERE name = ?3",
        params![table.name(), table.schema(), column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Quote an identifier for interpolation into SQL.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// A validated `table` or `schema.table` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    schema: Option<String>,
    name: String,
}

impl TableName {
    /// Validate and split a table reference.
    pub fn parse(table: &str) -> Result<Self> {
        validate_table_name(table)?;
        match table.split_once('.') {
            Some((schema, name)) => Ok(Self {
                schema: Some(schema.to_string()),
                name: name.to_string(),
            }),
            None => Ok(Self {
                schema: None,
                name: table.to_string(),
            }),
        }
    }

    /// Unqualified table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schema name (`main` unless qualified).
    pub fn schema(&self) -> &str {
        self.schema.as_deref().unwrap_or("main")
    }

    /// Quoted, possibly schema-qualified reference for FROM/INTO clauses.
    pub fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => quote_ident(&self.name),
        }
    }

    /// Quoted name for an index belonging to this table (`{table}_{suffix}`).
    ///
    /// SQLite places an index in the schema of its table, so the index name
    /// carries the qualifier while the ON clause names the bare table.
    pub fn index(&self, suffix: &str) -> String {
        let index = quote_ident(&format!("{}_{}", self.name, suffix));
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), index),
            None => index,
        }
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl From<TableName> for String {
    fn from(table: TableName) -> Self {
        table.to_string()
    }
}

/// Map a missing table to [`Error::TableNotFound`].
pub(crate) fn require_table(conn: &Connection, table: &TableName) -> Result<()> {
    if table_exists(conn, table)? {
        Ok(())
    } else {
        Err(Error::TableNotFound(table.to_string()))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    // ==================== Database Initialization Tests ====================

    #[test]
    fn test_database_creation() {
        let (db, _temp_dir) = create_test_db();
        assert!(!db.table_exists("products").unwrap());
    }

    #[test]
    fn test_database_reopening() {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let path_str = db_path.to_str().unwrap();

        {
            let db = Database::open(path_str).expect("Failed to create database");
            db.execute_batch("CREATE TABLE boxes (id INTEGER PRIMARY KEY, label TEXT)")
                .unwrap();
        }

        {
            let db = Database::open(path_str).expect("Failed to reopen database");
            assert!(db.table_exists("boxes").unwrap(), "Table should persist");
        }
    }

    #[test]
    fn test_invalid_database_path() {
        let result = Database::open("/non/existent/path/db.db");
        assert!(result.is_err());
    }

    #[test]
    fn test_in_memory_database() {
        let db = Database::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY)").unwrap();
        assert!(db.table_exists("t").unwrap());
    }

    // ==================== Column Check Tests ====================

    #[test]
    fn test_column_exists() {
        let (db, _temp_dir) = create_products_db();
        assert!(db.column_exists("products", "slug").unwrap());
        assert!(!db.column_exists("products", "missing").unwrap());
        assert!(!db.column_exists("nope", "slug").unwrap());
    }

    #[test]
    fn test_has_tracking_columns() {
        let (db, _temp_dir) = create_products_db();
        db.execute_batch("CREATE TABLE plain (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        assert!(db.has_tracking_columns("products").unwrap());
        assert!(!db.has_tracking_columns("plain").unwrap());
    }

    #[test]
    fn test_qualified_table_lookup() {
        let (db, _temp_dir) = create_products_db();
        assert!(db.table_exists("main.products").unwrap());
        assert!(db.column_exists("main.products", "iso").unwrap());
    }

    #[test]
    fn test_invalid_table_name_rejected() {
        let (db, _temp_dir) = create_test_db();
        let result = db.table_exists("products; DROP TABLE x");
        assert!(matches!(result, Err(Error::InvalidIdentifier { .. })));
    }

    // ==================== Transaction Tests ====================

    #[test]
    fn test_write_commits_on_ok() {
        let (db, _temp_dir) = create_products_db();
        db.write(|tx| {
            tx.execute("INSERT INTO products (name) VALUES ('Shoe')", [])?;
            Ok(())
        })
        .unwrap();

        let count: i64 = db
            .read(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM products", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_write_rolls_back_on_err() {
        let (db, _temp_dir) = create_products_db();
        let result: Result<()> = db.write(|tx| {
            tx.execute("INSERT INTO products (name) VALUES ('Shoe')", [])?;
            Err(Error::Config("abort".into()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .read(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM products", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    // ==================== Identifier Tests ====================

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("slug"), "\"slug\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_table_name_parts() {
        let plain = TableName::parse("products").unwrap();
        assert_eq!(plain.schema(), "main");
        assert_eq!(plain.quoted(), "\"products\"");
        assert_eq!(plain.index("row_id_index"), "\"products_row_id_index\"");

        let qualified = TableName::parse("aux.products").unwrap();
        assert_eq!(qualified.schema(), "aux");
        assert_eq!(qualified.name(), "products");
        assert_eq!(qualified.quoted(), "\"aux\".\"products\"");
        assert_eq!(
            qualified.index("row_id_index"),
            "\"aux\".\"products_row_id_index\""
        );
        assert_eq!(qualified.to_string(), "aux.products");
    }
}
