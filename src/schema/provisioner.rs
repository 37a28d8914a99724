//! Schema provisioner: adds or removes the `row_id` / `iso` tracking columns.

use crate::db::{column_exists, quote_ident, require_table, Database, TableName};
use crate::error::Result;
use crate::row::{ISO_COLUMN, ROW_ID_COLUMN};
use serde::Serialize;
use tracing::info;

/// Suffix of the index created on `row_id` (`{table}_row_id_index`).
const ROW_ID_INDEX_SUFFIX: &str = "row_id_index";

/// What a provisioning call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub table: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl ProvisionReport {
    fn new(table: &TableName) -> Self {
        Self {
            table: table.to_string(),
            ..Self::default()
        }
    }

    /// True when the table already matched the requested layout.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Clone)]
pub struct SchemaProvisioner {
    db: Database,
}

impl SchemaProvisioner {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Add the tracking columns (idempotent).
    ///
    /// Each column (and the `row_id` index) is checked and added on its own,
    /// so a partially provisioned table is completed rather than rejected.
    pub fn add_columns(&self, table: &str) -> Result<ProvisionReport> {
        let table = TableName::parse(table)?;

        let report = self.db.write(|tx| {
            require_table(tx, &table)?;
            let mut report = ProvisionReport::new(&table);

            if !column_exists(tx, &table, ROW_ID_COLUMN)? {
                tx.execute_batch(&format!(
                    "ALTER TABLE {} ADD COLUMN {} INTEGER NULL",
                    table.quoted(),
                    quote_ident(ROW_ID_COLUMN)
                ))?;
                report.added.push(ROW_ID_COLUMN.to_string());
            }

            tx.execute_batch(&format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                table.index(ROW_ID_INDEX_SUFFIX),
                quote_ident(table.name()),
                quote_ident(ROW_ID_COLUMN)
            ))?;

            if !column_exists(tx, &table, ISO_COLUMN)? {
                tx.execute_batch(&format!(
                    "ALTER TABLE {} ADD COLUMN {} VARCHAR(16) NULL",
                    table.quoted(),
                    quote_ident(ISO_COLUMN)
                ))?;
                report.added.push(ISO_COLUMN.to_string());
            }

            Ok(report)
        })?;

        if report.is_noop() {
            info!("Table {} already has tracking columns", report.table);
        } else {
            info!("Added {:?} to {}", report.added, report.table);
        }
        Ok(report)
    }

    /// Drop the tracking columns that exist.
    ///
    /// Destructive and unconditional: group membership and language codes
    /// are lost. No backup is taken.
    pub fn remove_columns(&self, table: &str) -> Result<ProvisionReport> {
        let table = TableName::parse(table)?;

        let report = self.db.write(|tx| {
            require_table(tx, &table)?;
            let mut report = ProvisionReport::new(&table);

            // SQLite refuses to drop an indexed column
            tx.execute_batch(&format!(
                "DROP INDEX IF EXISTS {}",
                table.index(ROW_ID_INDEX_SUFFIX)
            ))?;

            for column in [ROW_ID_COLUMN, ISO_COLUMN] {
                if column_exists(tx, &table, column)? {
                    tx.execute_batch(&format!(
                        "ALTER TABLE {} DROP COLUMN {}",
                        table.quoted(),
                        quote_ident(column)
                    ))?;
                    report.removed.push(column.to_string());
                }
            }

            Ok(report)
        })?;

        info!("Removed {:?} from {}", report.removed, report.table);
        Ok(report)
    }
}
