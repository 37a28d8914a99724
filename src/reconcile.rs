//! Batch reconciler: sweep a table and fill every language gap.

use crate::db::quote_ident;
use crate::error::Result;
use crate::i18n::Locale;
use crate::replication::{ReplicationEngine, ReplicationOutcome, SkipReason};
use crate::row::{select_rows, TranslatableRow};
use crate::schema::TableSchema;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Rows fetched per page while scanning.
const PAGE_SIZE: i64 = 500;

/// A record whose group could not be completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub id: i64,
    pub row_id: Option<i64>,
    pub language: Option<String>,
    pub reason: String,
}

/// Summary of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub table: String,
    pub scanned: usize,
    /// Rows whose `row_id` was back-filled.
    pub assigned: usize,
    pub created: usize,
    pub failures: Vec<RecordFailure>,
    pub skipped: Option<SkipReason>,
}

impl ReconcileReport {
    fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn absorb(&mut self, row: &TranslatableRow, outcome: ReplicationOutcome) {
        if outcome.assigned {
            self.assigned += 1;
        }
        self.created += outcome.created.len();
        self.failures
            .extend(outcome.failures.into_iter().map(|failure| RecordFailure {
                id: row.id,
                row_id: outcome.row_id,
                language: Some(failure.language),
                reason: failure.reason,
            }));
    }
}

/// Idempotent sweep over a table (or one record): back-fill `row_id`, then
/// create each group's missing languages. Re-running creates only what is
/// still missing.
#[derive(Clone)]
pub struct BatchReconciler {
    engine: Arc<ReplicationEngine>,
}

impl BatchReconciler {
    pub fn new(engine: Arc<ReplicationEngine>) -> Self {
        Self { engine }
    }

    fn targets(&self, languages: Option<&[Locale]>) -> Vec<Locale> {
        match languages {
            Some(languages) => languages.to_vec(),
            None => self.engine.languages().list().to_vec(),
        }
    }

    /// Reconcile every row of `table` by ascending id.
    ///
    /// Each group is processed once per sweep, from the first of its rows the
    /// scan meets. Per-record failures are collected and the sweep continues.
    pub fn reconcile(&self, table: &str, languages: Option<&[Locale]>) -> Result<ReconcileReport> {
        let schema = self.engine.schema(table)?;
        let mut report = ReconcileReport::new(&schema.table.to_string());
        if !schema.has_tracking_columns() {
            warn!("Table {} has no tracking columns, run migrate first", schema.table);
            report.skipped = Some(SkipReason::NotProvisioned);
            return Ok(report);
        }

        let targets = self.targets(languages);
        let mut processed: HashSet<i64> = HashSet::new();
        let mut last_id = i64::MIN;
        // Rows created by this sweep are never scanned by it
        let Some(max_id) = self.max_id(&schema)? else {
            return Ok(report);
        };

        loop {
            let page = self.page(&schema, last_id, max_id)?;
            let Some(last) = page.last() else {
                break;
            };
            last_id = last.id;

            for row in page {
                report.scanned += 1;
                if row.row_id.is_some_and(|row_id| processed.contains(&row_id)) {
                    continue;
                }
                self.reconcile_row(&schema, &row, &targets, &mut processed, &mut report);
            }
        }

        info!(
            "Reconciled {}: scanned {}, assigned {}, created {}, failed {}",
            report.table,
            report.scanned,
            report.assigned,
            report.created,
            report.failures.len()
        );
        Ok(report)
    }

    /// Reconcile the group of one record.
    pub fn reconcile_record(
        &self,
        table: &str,
        id: i64,
        languages: Option<&[Locale]>,
    ) -> Result<ReconcileReport> {
        let schema = self.engine.schema(table)?;
        let mut report = ReconcileReport::new(&schema.table.to_string());
        if !schema.has_tracking_columns() {
            report.skipped = Some(SkipReason::NotProvisioned);
            return Ok(report);
        }

        let Some(row) = self.engine.load(&schema, id)? else {
            report.skipped = Some(SkipReason::RecordMissing);
            return Ok(report);
        };

        report.scanned = 1;
        let targets = self.targets(languages);
        self.reconcile_row(&schema, &row, &targets, &mut HashSet::new(), &mut report);
        Ok(report)
    }

    fn reconcile_row(
        &self,
        schema: &TableSchema,
        row: &TranslatableRow,
        targets: &[Locale],
        processed: &mut HashSet<i64>,
        report: &mut ReconcileReport,
    ) {
        // The source of a group's copies is its canonical row when it still
        // exists, so rewritten values of a derived row are not copied again
        let source = match row.row_id {
            Some(row_id) if row_id != row.id => match self.engine.load(schema, row_id) {
                Ok(Some(canonical)) => canonical,
                _ => row.clone(),
            },
            _ => row.clone(),
        };

        match self.engine.replicate(schema, &source, targets) {
            Ok(outcome) => {
                if let Some(row_id) = outcome.row_id {
                    processed.insert(row_id);
                }
                report.absorb(row, outcome);
            }
            Err(e) => {
                warn!("Failed to reconcile {} record {}: {}", schema.table, row.id, e);
                if let Some(row_id) = row.row_id {
                    processed.insert(row_id);
                }
                report.failures.push(RecordFailure {
                    id: row.id,
                    row_id: row.row_id,
                    language: None,
                    reason: e.to_string(),
                });
            }
        }
    }

    fn max_id(&self, schema: &TableSchema) -> Result<Option<i64>> {
        let sql = format!(
            "SELECT MAX({}) FROM {}",
            quote_ident(&schema.primary_key),
            schema.table.quoted()
        );
        self.engine
            .database()
            .read(|conn| Ok(conn.query_row(&sql, [], |row| row.get(0))?))
    }

    fn page(&self, schema: &TableSchema, after: i64, max_id: i64) -> Result<Vec<TranslatableRow>> {
        let filter = format!(
            "{pk} IN (SELECT {pk} FROM {table} WHERE {pk} > ?1 AND {pk} <= ?2 ORDER BY {pk} LIMIT ?3)",
            pk = quote_ident(&schema.primary_key),
            table = schema.table.quoted()
        );
        self.engine
            .database()
            .read(|conn| select_rows(conn, schema, &filter, [after, max_id, PAGE_SIZE]))
    }
}
