//! Replication engine: derive and persist the missing-language siblings of a
//! canonical row.
//!
//! Every derived row is written in its own IMMEDIATE transaction that first
//! re-checks `(row_id, iso)`, so two workers racing on one group produce one
//! row and one benign no-op. Languages are independent: a failure for one is
//! recorded and the rest continue.

use crate::config::TranslationConfig;
use crate::db::{quote_ident, Database};
use crate::error::{Error, Result};
use crate::i18n::{LanguageSet, Locale, ReplicationMetrics};
use crate::row::{find_row, AttributeMap, TranslatableRow, ISO_COLUMN, ROW_ID_COLUMN};
use crate::schema::{ConstraintInspector, TableSchema};
use crate::uniqueness::{self, random_suffix, Rewrite};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const CREATED_AT_COLUMN: &str = "created_at";
pub const UPDATED_AT_COLUMN: &str = "updated_at";

/// Why a replication did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The table lacks `row_id` / `iso`.
    NotProvisioned,
    /// Creation-time replication is switched off.
    AutoGenerateDisabled,
    /// Event raised from a batch context that is not observed.
    BatchContext,
    /// The record is a derived row of another group.
    AlreadyGrouped,
    /// The record no longer exists.
    RecordMissing,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::NotProvisioned => "table has no tracking columns",
            SkipReason::AutoGenerateDisabled => "auto-generate is disabled",
            SkipReason::BatchContext => "batch context is not observed",
            SkipReason::AlreadyGrouped => "record belongs to another group",
            SkipReason::RecordMissing => "record not found",
        };
        f.write_str(reason)
    }
}

/// A language that could not be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageFailure {
    pub language: String,
    pub reason: String,
    /// Retrying later could succeed.
    pub transient: bool,
}

/// Result of one `replicate` call.
#[derive(Debug, Clone, Default)]
pub struct ReplicationOutcome {
    pub row_id: Option<i64>,
    /// `row_id` was back-filled during this call.
    pub assigned: bool,
    pub created: Vec<TranslatableRow>,
    pub failures: Vec<LanguageFailure>,
    pub skipped: Option<SkipReason>,
}

impl ReplicationOutcome {
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn has_transient_failures(&self) -> bool {
        self.failures.iter().any(|failure| failure.transient)
    }
}

/// Serialisable unit of queued work: replicate one canonical row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationTask {
    pub table: String,
    pub record_id: i64,
    /// Target languages; empty means every configured language.
    pub languages: Vec<Locale>,
    pub enqueued_at: DateTime<Utc>,
}

impl ReplicationTask {
    pub fn new(table: impl Into<String>, record_id: i64, languages: Vec<Locale>) -> Self {
        Self {
            table: table.into(),
            record_id,
            languages,
            enqueued_at: Utc::now(),
        }
    }
}

/// Result of inserting one language.
#[derive(Debug, Clone)]
pub enum Insertion {
    Created(TranslatableRow),
    /// `(row_id, iso)` already existed; nothing was written.
    AlreadyPresent,
}

pub struct ReplicationEngine {
    db: Database,
    inspector: ConstraintInspector,
    config: Arc<TranslationConfig>,
    metrics: Arc<ReplicationMetrics>,
}

impl ReplicationEngine {
    pub fn new(db: Database, config: Arc<TranslationConfig>) -> Self {
        Self::with_metrics(db, config, Arc::new(ReplicationMetrics::new()))
    }

    pub fn with_metrics(
        db: Database,
        config: Arc<TranslationConfig>,
        metrics: Arc<ReplicationMetrics>,
    ) -> Self {
        Self {
            inspector: ConstraintInspector::new(db.clone()),
            db,
            config,
            metrics,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &TranslationConfig {
        &self.config
    }

    pub fn languages(&self) -> &LanguageSet {
        &self.config.languages
    }

    pub fn metrics(&self) -> &Arc<ReplicationMetrics> {
        &self.metrics
    }

    /// Describe a table (fetched fresh; schemas may evolve between calls).
    pub fn schema(&self, table: &str) -> Result<TableSchema> {
        self.inspector.describe(table)
    }

    pub fn load(&self, schema: &TableSchema, id: i64) -> Result<Option<TranslatableRow>> {
        self.db.read(|conn| find_row(conn, schema, id))
    }

    /// Back-fill `row_id = id` (and a missing `iso` with `default_iso`).
    ///
    /// Returns the reloaded row and whether anything was assigned. A row
    /// that already has a `row_id` is returned untouched.
    pub fn assign_row_id(
        &self,
        schema: &TableSchema,
        id: i64,
        default_iso: &Locale,
    ) -> Result<(TranslatableRow, bool)> {
        self.db.write(|tx| {
            let updated = tx.execute(
                &format!(
                    "UPDATE {table} SET {row_id} = {pk}, {iso} = COALESCE({iso}, ?1)
                     WHERE {pk} = ?2 AND {row_id} IS NULL",
                    table = schema.table.quoted(),
                    row_id = quote_ident(ROW_ID_COLUMN),
                    iso = quote_ident(ISO_COLUMN),
                    pk = quote_ident(&schema.primary_key),
                ),
                params![default_iso.code(), id],
            )?;

            let row = find_row(tx, schema, id)?.ok_or_else(|| Error::RecordNotFound {
                table: schema.table.to_string(),
                id,
            })?;
            Ok((row, updated > 0))
        })
    }

    /// Distinct languages present in a group, read fresh.
    pub fn existing_languages(&self, schema: &TableSchema, row_id: i64) -> Result<Vec<String>> {
        self.db.read(|conn| existing_languages(conn, schema, row_id))
    }

    /// Create every language in `targets` the group of `canonical` lacks.
    ///
    /// Storage errors while assigning the group or reading its languages are
    /// returned; per-language failures are collected in the outcome.
    pub fn replicate(
        &self,
        schema: &TableSchema,
        canonical: &TranslatableRow,
        targets: &[Locale],
    ) -> Result<ReplicationOutcome> {
        if !schema.has_tracking_columns() {
            debug!("Skipping replication for {}: not provisioned", schema.table);
            self.metrics.record_skipped();
            return Ok(ReplicationOutcome::skipped(SkipReason::NotProvisioned));
        }

        let (canonical, assigned) = match canonical.row_id {
            Some(_) => (canonical.clone(), false),
            None => self.assign_row_id(schema, canonical.id, self.languages().fallback())?,
        };
        let row_id = canonical.row_id.unwrap_or(canonical.id);

        let mut outcome = ReplicationOutcome {
            row_id: Some(row_id),
            assigned,
            ..ReplicationOutcome::default()
        };

        let existing = self.existing_languages(schema, row_id)?;
        let missing = LanguageSet::missing_from(targets, &existing);
        if missing.is_empty() {
            return Ok(outcome);
        }

        for language in missing {
            match self.insert_translation(schema, row_id, language, canonical.attributes.clone()) {
                Ok(Insertion::Created(row)) => outcome.created.push(row),
                Ok(Insertion::AlreadyPresent) => {}
                Err(e) => {
                    self.metrics.record_failure();
                    warn!(
                        "Failed to create {} translation of {} row_id {}: {}",
                        language, schema.table, row_id, e
                    );
                    outcome.failures.push(LanguageFailure {
                        language: language.to_string(),
                        reason: e.to_string(),
                        transient: e.is_transient(),
                    });
                }
            }
        }

        if !outcome.created.is_empty() {
            info!(
                "Created {} translation(s) for {} row_id {}",
                outcome.created.len(),
                schema.table,
                row_id
            );
        }
        Ok(outcome)
    }

    /// Insert one language of a group from `attributes`.
    ///
    /// Runs in one IMMEDIATE transaction: existence check, uniqueness
    /// rewrite, insert, bounded random-suffix retries on unique violations.
    pub fn insert_translation(
        &self,
        schema: &TableSchema,
        row_id: i64,
        language: &Locale,
        mut attributes: AttributeMap,
    ) -> Result<Insertion> {
        attributes.remove(&schema.primary_key);
        attributes.remove(ROW_ID_COLUMN);
        attributes.remove(ISO_COLUMN);
        touch_timestamps(schema, &mut attributes, true);

        let result = self.db.write(|tx| {
            if language_exists(tx, schema, row_id, language)? {
                return Ok((Insertion::AlreadyPresent, Vec::new(), 0));
            }

            let original = attributes.clone();
            let rewrites = uniqueness::resolve(
                tx,
                schema,
                &mut attributes,
                Some(row_id),
                language.code(),
                self.config.suffix_attempts,
            )?;

            let mut retries = 0;
            let id = loop {
                match insert_row(tx, schema, &attributes, Some(row_id), language) {
                    Ok(id) => break id,
                    Err(e) if e.is_unique_violation() => {
                        let columns = e.violated_columns();
                        if retries >= self.config.conflict_retries {
                            return Err(Error::UniqueConflict {
                                table: schema.table.to_string(),
                                columns,
                                reason: format!("still conflicting after {} retries", retries),
                            });
                        }
                        if !apply_random_suffix(&mut attributes, &original, &columns, language) {
                            return Err(Error::UniqueConflict {
                                table: schema.table.to_string(),
                                columns,
                                reason: "no text column to rewrite".to_string(),
                            });
                        }
                        retries += 1;
                        debug!(
                            "Unique violation inserting {} into {}, retry {}",
                            language, schema.table, retries
                        );
                    }
                    Err(e) => return Err(e),
                }
            };

            let row = find_row(tx, schema, id)?.ok_or_else(|| Error::RecordNotFound {
                table: schema.table.to_string(),
                id,
            })?;
            Ok((Insertion::Created(row), rewrites, retries))
        });

        let (insertion, rewrites, retries) = result?;
        match &insertion {
            Insertion::Created(_) => {
                self.metrics.record_row_created();
                for _ in 0..retries {
                    self.metrics.record_random_fallback();
                }
                self.record_rewrites(schema, &rewrites);
            }
            Insertion::AlreadyPresent => {
                debug!(
                    "{} row_id {} already has {}; nothing to do",
                    schema.table, row_id, language
                );
                self.metrics.record_duplicate_ignored();
            }
        }
        Ok(insertion)
    }

    fn record_rewrites(&self, schema: &TableSchema, rewrites: &[Rewrite]) {
        for rewrite in rewrites {
            self.metrics.record_conflict_resolved();
            if rewrite.random {
                self.metrics.record_random_fallback();
            }
            debug!(
                "Resolved {}.{} collision: '{}' -> '{}'",
                schema.table, rewrite.column, rewrite.from, rewrite.to
            );
        }
    }

    /// Insert a new canonical row in `language` and make it its own group.
    ///
    /// Unique collisions are not rewritten here: the caller supplied the
    /// values and a violation is returned as-is.
    pub fn insert_canonical(
        &self,
        schema: &TableSchema,
        language: &Locale,
        mut attributes: AttributeMap,
    ) -> Result<TranslatableRow> {
        attributes.remove(&schema.primary_key);
        attributes.remove(ROW_ID_COLUMN);
        attributes.remove(ISO_COLUMN);
        touch_timestamps(schema, &mut attributes, true);

        let row = self.db.write(|tx| {
            let id = insert_row(tx, schema, &attributes, None, language)?;
            tx.execute(
                &format!(
                    "UPDATE {} SET {} = ?1 WHERE {} = ?1",
                    schema.table.quoted(),
                    quote_ident(ROW_ID_COLUMN),
                    quote_ident(&schema.primary_key)
                ),
                [id],
            )?;
            find_row(tx, schema, id)?.ok_or_else(|| Error::RecordNotFound {
                table: schema.table.to_string(),
                id,
            })
        })?;

        self.metrics.record_row_created();
        Ok(row)
    }

    /// Copy `source` into `language`, joining (or starting) its group.
    ///
    /// When the group already has that language the existing row is returned.
    pub fn copy_row(
        &self,
        schema: &TableSchema,
        source: &TranslatableRow,
        language: &Locale,
        overrides: &AttributeMap,
    ) -> Result<TranslatableRow> {
        let source = match source.row_id {
            Some(_) => source.clone(),
            None => self.assign_row_id(schema, source.id, self.languages().fallback())?.0,
        };
        let row_id = source.row_id.unwrap_or(source.id);

        let mut attributes = source.attributes.clone();
        attributes.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

        match self.insert_translation(schema, row_id, language, attributes)? {
            Insertion::Created(row) => Ok(row),
            Insertion::AlreadyPresent => self
                .db
                .read(|conn| find_in_group(conn, schema, row_id, language))?
                .ok_or_else(|| Error::RecordNotFound {
                    table: schema.table.to_string(),
                    id: row_id,
                }),
        }
    }

    /// Execute a queued task.
    ///
    /// Transient per-language failures are surfaced as [`Error::Retryable`]
    /// so the queue retries the whole task; already-created languages are
    /// no-ops on the retry.
    pub fn run_task(&self, task: &ReplicationTask) -> Result<ReplicationOutcome> {
        let schema = self.schema(&task.table)?;
        if !schema.has_tracking_columns() {
            self.metrics.record_skipped();
            return Ok(ReplicationOutcome::skipped(SkipReason::NotProvisioned));
        }

        let Some(row) = self.load(&schema, task.record_id)? else {
            debug!("Record {} of {} is gone", task.record_id, task.table);
            self.metrics.record_skipped();
            return Ok(ReplicationOutcome::skipped(SkipReason::RecordMissing));
        };
        // A derived row stands in for its group only once the canonical row is gone
        if let Some(row_id) = row.row_id.filter(|row_id| *row_id != row.id) {
            if self.load(&schema, row_id)?.is_some() {
                self.metrics.record_skipped();
                return Ok(ReplicationOutcome::skipped(SkipReason::AlreadyGrouped));
            }
        }

        let targets = if task.languages.is_empty() {
            self.languages().list().to_vec()
        } else {
            task.languages.clone()
        };

        let outcome = self.replicate(&schema, &row, &targets)?;
        if outcome.has_transient_failures() {
            return Err(Error::Retryable(format!(
                "{} of {} languages failed transiently for {} record {}",
                outcome.failures.iter().filter(|f| f.transient).count(),
                targets.len(),
                task.table,
                task.record_id
            )));
        }
        Ok(outcome)
    }
}

/// Set `created_at` / `updated_at` when the table has them.
pub(crate) fn touch_timestamps(schema: &TableSchema, attributes: &mut AttributeMap, creating: bool) {
    let now = Value::Text(Utc::now().to_rfc3339());
    if creating && schema.has_column(CREATED_AT_COLUMN) {
        attributes.insert(CREATED_AT_COLUMN.to_string(), now.clone());
    }
    if schema.has_column(UPDATED_AT_COLUMN) {
        attributes.insert(UPDATED_AT_COLUMN.to_string(), now);
    }
}

pub(crate) fn existing_languages(
    conn: &Connection,
    schema: &TableSchema,
    row_id: i64,
) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT DISTINCT {iso} FROM {table} WHERE {row_id} = ?1 AND {iso} IS NOT NULL ORDER BY {iso}",
        table = schema.table.quoted(),
        row_id = quote_ident(ROW_ID_COLUMN),
        iso = quote_ident(ISO_COLUMN),
    );
    let mut stmt = conn.prepare(&sql)?;
    let languages = stmt
        .query_map([row_id], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(languages)
}

pub(crate) fn find_in_group(
    conn: &Connection,
    schema: &TableSchema,
    row_id: i64,
    language: &Locale,
) -> Result<Option<TranslatableRow>> {
    let filter = format!(
        "{} = ?1 AND {} = ?2",
        quote_ident(ROW_ID_COLUMN),
        quote_ident(ISO_COLUMN)
    );
    Ok(crate::row::select_rows(conn, schema, &filter, params![row_id, language.code()])?
        .into_iter()
        .next())
}

fn language_exists(
    conn: &Connection,
    schema: &TableSchema,
    row_id: i64,
    language: &Locale,
) -> Result<bool> {
    let sql = format!(
        "SELECT 1 FROM {} WHERE {} = ?1 AND {} = ?2 LIMIT 1",
        schema.table.quoted(),
        quote_ident(ROW_ID_COLUMN),
        quote_ident(ISO_COLUMN)
    );
    let found = conn
        .query_row(&sql, params![row_id, language.code()], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

fn insert_row(
    conn: &Connection,
    schema: &TableSchema,
    attributes: &AttributeMap,
    row_id: Option<i64>,
    language: &Locale,
) -> Result<i64> {
    let mut columns: Vec<&str> = Vec::with_capacity(attributes.len() + 2);
    let mut values: Vec<Value> = Vec::with_capacity(attributes.len() + 2);
    for (column, value) in attributes {
        columns.push(column);
        values.push(value.clone());
    }
    columns.push(ROW_ID_COLUMN);
    values.push(row_id.map_or(Value::Null, Value::Integer));
    columns.push(ISO_COLUMN);
    values.push(Value::Text(language.code().to_string()));

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        schema.table.quoted(),
        columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
        (1..=values.len()).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
    );
    conn.execute(&sql, params_from_iter(values.iter()))?;
    Ok(conn.last_insert_rowid())
}

/// Give the first violated text column a fresh random suffix based on its
/// original value, mirroring the ladder's single-column rewrite. Returns
/// false when none of the columns is text.
fn apply_random_suffix(
    attributes: &mut AttributeMap,
    original: &AttributeMap,
    columns: &[String],
    language: &Locale,
) -> bool {
    let first_text = columns.iter().find_map(|column| match original.get(column) {
        Some(Value::Text(base)) => Some((column, base)),
        _ => None,
    });
    let Some((column, base)) = first_text else {
        return false;
    };
    attributes.insert(
        column.clone(),
        Value::Text(random_suffix(base, language.code())),
    );
    true
}
