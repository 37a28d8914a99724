//! `Mlang`: programmatic facade bound to one model.
//!
//! ```
//! use polyrow::{Database, LanguageSet, Mlang, ModelRegistry, TranslationConfig};
//! use std::sync::Arc;
//!
//! let db = Database::open_in_memory().unwrap();
//! db.execute_batch("CREATE TABLE products (id INTEGER PRIMARY KEY, name TEXT)").unwrap();
//!
//! let config = TranslationConfig::new(LanguageSet::parse("en,fr", "en").unwrap());
//! let models = ModelRegistry::parse("Product:products").unwrap();
//! let mlang = Mlang::new(db, Arc::new(config), models);
//!
//! let products = mlang.for_model("Product").unwrap();
//! products.migrate().unwrap();
//! assert_eq!(products.get_coverage().unwrap(), 0.0);
//! ```

use crate::config::{ModelConfig, ModelRegistry, TranslationConfig};
use crate::db::{quote_ident, Database};
use crate::error::{Error, Result};
use crate::i18n::validator::{sanitize_value, validate_column_name};
use crate::i18n::{LanguageSet, Locale, MetricsReport};
use crate::queries::{ConsistencyQueries, TranslationStats};
use crate::reconcile::{BatchReconciler, ReconcileReport};
use crate::replication::{
    touch_timestamps, Insertion, LanguageFailure, ReplicationEngine, ReplicationOutcome, SkipReason,
};
use crate::row::{AttributeMap, TranslatableRow, ISO_COLUMN, ROW_ID_COLUMN};
use crate::schema::{ProvisionReport, SchemaProvisioner, TableSchema};
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Source of a `copy_to_language` call.
#[derive(Debug, Clone)]
pub enum CopySource {
    Id(i64),
    Row(TranslatableRow),
}

impl From<i64> for CopySource {
    fn from(id: i64) -> Self {
        CopySource::Id(id)
    }
}

impl From<TranslatableRow> for CopySource {
    fn from(row: TranslatableRow) -> Self {
        CopySource::Row(row)
    }
}

#[derive(Clone)]
pub struct Mlang {
    engine: Arc<ReplicationEngine>,
    queries: ConsistencyQueries,
    reconciler: BatchReconciler,
    provisioner: SchemaProvisioner,
    models: Arc<ModelRegistry>,
    model: Option<ModelConfig>,
}

impl Mlang {
    pub fn new(db: Database, config: Arc<TranslationConfig>, models: ModelRegistry) -> Self {
        let engine = Arc::new(ReplicationEngine::new(db, config));
        Self::from_engine(engine, Arc::new(models))
    }

    /// Share an engine (and its metrics) with other components.
    pub fn from_engine(engine: Arc<ReplicationEngine>, models: Arc<ModelRegistry>) -> Self {
        let db = engine.database().clone();
        Self {
            queries: ConsistencyQueries::new(db.clone(), Arc::new(engine.config().clone())),
            reconciler: BatchReconciler::new(engine.clone()),
            provisioner: SchemaProvisioner::new(db),
            engine,
            models,
            model: None,
        }
    }

    /// A copy of this facade bound to a model (by name or table).
    pub fn for_model(&self, name: &str) -> Result<Self> {
        let model = self.models.get(name)?.clone();
        Ok(Self {
            model: Some(model),
            ..self.clone()
        })
    }

    pub fn model(&self) -> Option<&ModelConfig> {
        self.model.as_ref()
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn languages(&self) -> &LanguageSet {
        self.engine.languages()
    }

    pub fn queries(&self) -> &ConsistencyQueries {
        &self.queries
    }

    pub fn metrics(&self) -> MetricsReport {
        self.engine.metrics().report()
    }

    fn table(&self) -> Result<&str> {
        self.model
            .as_ref()
            .map(|model| model.table.as_str())
            .ok_or(Error::NoModelSet)
    }

    fn schema(&self) -> Result<TableSchema> {
        self.engine.schema(self.table()?)
    }

    /// Sanitise values and reject unknown or reserved columns.
    fn prepare_attributes(&self, schema: &TableSchema, attributes: AttributeMap) -> Result<AttributeMap> {
        let mut prepared = AttributeMap::new();
        for (column, value) in attributes {
            validate_column_name(&column)?;
            if !schema.has_column(&column) {
                return Err(Error::UnknownColumn {
                    table: schema.table.to_string(),
                    column,
                });
            }
            if column == schema.primary_key || column == ROW_ID_COLUMN || column == ISO_COLUMN {
                continue;
            }
            prepared.insert(column, sanitize_value(value));
        }
        Ok(prepared)
    }

    fn configured(&self, languages: Option<&[Locale]>) -> Result<Vec<Locale>> {
        match languages {
            None => Ok(self.languages().list().to_vec()),
            Some(languages) => languages
                .iter()
                .map(|language| self.languages().get(language.code()).cloned())
                .collect(),
        }
    }

    /// Create one row per language sharing a new group.
    ///
    /// The first language becomes the canonical row and `created` lists it
    /// first. `overrides` replace attributes for individual languages. A
    /// failure of the canonical insert is returned as an error; later
    /// languages fail independently and are collected in `failures`. On a
    /// table without tracking columns nothing is written.
    pub fn create_multi_language(
        &self,
        attributes: AttributeMap,
        languages: Option<&[Locale]>,
        overrides: &BTreeMap<Locale, AttributeMap>,
    ) -> Result<ReplicationOutcome> {
        let schema = self.schema()?;
        if !schema.has_tracking_columns() {
            warn!("Table {} has no tracking columns, run migrate first", schema.table);
            self.engine.metrics().record_skipped();
            return Ok(ReplicationOutcome::skipped(SkipReason::NotProvisioned));
        }

        let languages = self.configured(languages)?;
        let Some((first, rest)) = languages.split_first() else {
            return Ok(ReplicationOutcome::default());
        };

        let attributes = self.prepare_attributes(&schema, attributes)?;
        let mut per_language = BTreeMap::new();
        for (language, values) in overrides {
            per_language.insert(language.clone(), self.prepare_attributes(&schema, values.clone())?);
        }
        let for_language = |language: &Locale| {
            let mut values = attributes.clone();
            if let Some(extra) = per_language.get(language) {
                values.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            values
        };

        let canonical = self
            .engine
            .insert_canonical(&schema, first, for_language(first))?;
        let row_id = canonical.id;
        let mut outcome = ReplicationOutcome {
            row_id: Some(row_id),
            assigned: true,
            created: vec![canonical],
            ..ReplicationOutcome::default()
        };

        for language in rest {
            match self
                .engine
                .insert_translation(&schema, row_id, language, for_language(language))
            {
                Ok(Insertion::Created(row)) => outcome.created.push(row),
                Ok(Insertion::AlreadyPresent) => {}
                Err(e) => {
                    self.engine.metrics().record_failure();
                    warn!(
                        "Failed to create {} row of {} group {}: {}",
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

        info!(
            "Created {} language row(s) for {} group {}",
            outcome.created.len(),
            schema.table,
            row_id
        );
        Ok(outcome)
    }

    /// Every row of the record's group (empty when it has none).
    pub fn get_all_translations(&self, id: i64) -> Result<Vec<TranslatableRow>> {
        self.queries.translations_of(self.table()?, id)
    }

    /// Apply `attributes` to every row of the record's group.
    ///
    /// Returns the number of rows updated. Tracking columns and the primary
    /// key are never updated.
    pub fn update_all_translations(&self, id: i64, attributes: AttributeMap) -> Result<usize> {
        let schema = self.schema()?;
        let row = self.require(&schema, id)?;

        let mut attributes = self.prepare_attributes(&schema, attributes)?;
        if attributes.is_empty() {
            return Ok(0);
        }
        touch_timestamps(&schema, &mut attributes, false);

        let (filter_column, filter_value) = self.group_filter(&schema, &row);
        let assignments = attributes
            .keys()
            .enumerate()
            .map(|(i, column)| format!("{} = ?{}", quote_ident(column), i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            schema.table.quoted(),
            assignments,
            quote_ident(filter_column),
            attributes.len() + 1
        );
        let mut values: Vec<Value> = attributes.into_values().collect();
        values.push(Value::Integer(filter_value));

        let updated = self
            .engine
            .database()
            .write(|tx| Ok(tx.execute(&sql, params_from_iter(values.iter()))?))?;
        info!("Updated {} row(s) of {} group of record {}", updated, schema.table, id);
        Ok(updated)
    }

    /// Delete every row of the record's group. Returns the number deleted.
    pub fn delete_all_translations(&self, id: i64) -> Result<usize> {
        let schema = self.schema()?;
        let row = self.require(&schema, id)?;
        let (filter_column, filter_value) = self.group_filter(&schema, &row);

        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            schema.table.quoted(),
            quote_ident(filter_column)
        );
        let deleted = self
            .engine
            .database()
            .write(|tx| Ok(tx.execute(&sql, [filter_value])?))?;
        info!("Deleted {} row(s) of {} group of record {}", deleted, schema.table, id);
        Ok(deleted)
    }

    /// Copy a row into another configured language of its group.
    ///
    /// Returns the existing row when the group already has `target`.
    pub fn copy_to_language(
        &self,
        source: impl Into<CopySource>,
        target: &str,
        overrides: &AttributeMap,
    ) -> Result<TranslatableRow> {
        let schema = self.schema()?;
        let target = self.languages().get(target)?.clone();
        if !schema.has_tracking_columns() {
            return Err(Error::UnsupportedTable {
                table: schema.table.to_string(),
                reason: "missing tracking columns, run migrate first".to_string(),
            });
        }

        let source = match source.into() {
            CopySource::Id(id) => self.require(&schema, id)?,
            CopySource::Row(row) => row,
        };
        let overrides = self.prepare_attributes(&schema, overrides.clone())?;
        self.engine.copy_row(&schema, &source, &target, &overrides)
    }

    /// One row per group missing a configured language (see
    /// [`ConsistencyQueries::incomplete_rows`]).
    pub fn get_incomplete_translations(&self) -> Result<Vec<TranslatableRow>> {
        self.queries.incomplete_rows(self.table()?)
    }

    /// Rows of groups with every configured language, optionally in one
    /// language only.
    pub fn get_complete_translations(&self, iso: Option<&str>) -> Result<Vec<TranslatableRow>> {
        self.queries.complete_rows(self.table()?, iso)
    }

    /// Rows in `iso` (the fallback language when `None`) matching every
    /// equality in `conditions`. A primary-key condition selects the group.
    pub fn where_in_language(
        &self,
        conditions: &AttributeMap,
        iso: Option<&str>,
    ) -> Result<Vec<TranslatableRow>> {
        let table = self.table()?;
        let iso = iso.unwrap_or_else(|| self.languages().fallback().code());
        self.queries.where_in_language(table, conditions, iso)
    }

    /// The record's group ordered for display: `current` first, then the
    /// configured language order.
    pub fn get_translations_by_priority(
        &self,
        id: i64,
        current: Option<&str>,
    ) -> Result<Vec<TranslatableRow>> {
        let mut rows = self.get_all_translations(id)?;
        let languages = self.languages();
        rows.sort_by_key(|row| languages.priority(row.iso.as_deref().unwrap_or_default(), current));
        Ok(rows)
    }

    pub fn get_coverage(&self) -> Result<f64> {
        self.queries.coverage(self.table()?)
    }

    pub fn get_stats(&self) -> Result<Option<TranslationStats>> {
        self.queries.stats(self.table()?)
    }

    /// The group's row in `iso` (the fallback language when `None`).
    pub fn find(&self, row_id: i64, iso: Option<&str>) -> Result<Option<TranslatableRow>> {
        let table = self.table()?;
        let iso = iso.unwrap_or_else(|| self.languages().fallback().code());
        self.queries.find_in_language(table, row_id, iso)
    }

    pub fn migrate(&self) -> Result<ProvisionReport> {
        self.provisioner.add_columns(self.table()?)
    }

    pub fn rollback(&self) -> Result<ProvisionReport> {
        self.provisioner.remove_columns(self.table()?)
    }

    /// Reconcile the bound model, optionally for one language only.
    pub fn generate(&self, locale: Option<&str>) -> Result<ReconcileReport> {
        let table = self.table()?;
        let languages = self.languages().select(locale)?;
        self.reconciler.reconcile(table, Some(&languages))
    }

    fn require(&self, schema: &TableSchema, id: i64) -> Result<TranslatableRow> {
        self.engine
            .load(schema, id)?
            .ok_or_else(|| Error::RecordNotFound {
                table: schema.table.to_string(),
                id,
            })
    }

    /// Column and value selecting a record's group, or the record alone
    /// when it has none.
    fn group_filter<'a>(&self, schema: &'a TableSchema, row: &TranslatableRow) -> (&'a str, i64) {
        match row.row_id {
            Some(row_id) if schema.has_tracking_columns() => (ROW_ID_COLUMN, row_id),
            _ => (schema.primary_key.as_str(), row.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;

    fn mlang(db: &Database) -> Mlang {
        let config = TranslationConfig::new(LanguageSet::parse("en,fr,nl", "en").unwrap());
        let models = ModelRegistry::parse("Product:products,Plain:plain").unwrap();
        Mlang::new(db.clone(), Arc::new(config), models)
            .for_model("Product")
            .unwrap()
    }

    fn text(value: &str) -> Value {
        Value::Text(value.to_string())
    }

    fn shoe() -> AttributeMap {
        AttributeMap::from([
            ("name".to_string(), text("Shoe")),
            ("slug".to_string(), text("shoe")),
        ])
    }

    // ==================== Binding Tests ====================

    #[test]
    fn test_unbound_facade_fails_fast() {
        let (db, _temp_dir) = create_products_db();
        let config = TranslationConfig::new(LanguageSet::parse("en", "en").unwrap());
        let unbound = Mlang::new(db, Arc::new(config), ModelRegistry::default());

        assert!(matches!(unbound.get_coverage(), Err(Error::NoModelSet)));
        assert!(matches!(unbound.get_all_translations(1), Err(Error::NoModelSet)));
        assert!(matches!(unbound.migrate(), Err(Error::NoModelSet)));
        assert!(matches!(unbound.for_model("Order"), Err(Error::UnknownModel(_))));
    }

    // ==================== Create Tests ====================

    #[test]
    fn test_create_multi_language() {
        let (db, _temp_dir) = create_products_db();
        let mlang = mlang(&db);

        let outcome = mlang
            .create_multi_language(shoe(), None, &BTreeMap::new())
            .unwrap();
        assert!(outcome.is_success());
        assert!(outcome.assigned);
        let rows = outcome.created;

        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_canonical());
        assert!(rows.iter().all(|row| row.row_id == Some(rows[0].id)));
        assert_eq!(
            rows.iter().map(|r| r.iso.clone().unwrap()).collect::<Vec<_>>(),
            vec!["en", "fr", "nl"]
        );
        assert_eq!(rows[1].text("slug"), Some("shoe-fr"));
    }

    #[test]
    fn test_create_multi_language_with_overrides() {
        let (db, _temp_dir) = create_products_db();
        let mlang = mlang(&db);
        let french = Locale::parse("fr").unwrap();
        let overrides = BTreeMap::from([(
            french.clone(),
            AttributeMap::from([("name".to_string(), text("Chaussure"))]),
        )]);

        let rows = mlang
            .create_multi_language(shoe(), Some(&[Locale::parse("en").unwrap(), french]), &overrides)
            .unwrap()
            .created;

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].text("name"), Some("Chaussure"));
    }

    #[test]
    fn test_create_multi_language_sanitizes() {
        let (db, _temp_dir) = create_products_db();
        let mlang = mlang(&db);
        let attributes = AttributeMap::from([("name".to_string(), text("  Shoe\u{0}  "))]);

        let rows = mlang
            .create_multi_language(attributes, Some(&[Locale::parse("en").unwrap()]), &BTreeMap::new())
            .unwrap()
            .created;
        assert_eq!(rows[0].text("name"), Some("Shoe"));
    }

    #[test]
    fn test_create_multi_language_rejects_unknown_column() {
        let (db, _temp_dir) = create_products_db();
        let mlang = mlang(&db);
        let attributes = AttributeMap::from([("colour".to_string(), text("red"))]);

        assert!(matches!(
            mlang.create_multi_language(attributes, None, &BTreeMap::new()),
            Err(Error::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_create_multi_language_rejects_unconfigured_language() {
        let (db, _temp_dir) = create_products_db();
        let mlang = mlang(&db);

        assert!(matches!(
            mlang.create_multi_language(shoe(), Some(&[Locale::parse("de").unwrap()]), &BTreeMap::new()),
            Err(Error::UnconfiguredLanguage(_))
        ));
    }

    #[test]
    fn test_create_multi_language_untracked_table() {
        let (db, _temp_dir) = create_products_db();
        db.execute_batch("CREATE TABLE plain (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        let plain = mlang(&db).for_model("Plain").unwrap();

        let attributes = AttributeMap::from([("name".to_string(), text("Shoe"))]);
        let outcome = plain
            .create_multi_language(attributes, None, &BTreeMap::new())
            .unwrap();
        assert!(outcome.created.is_empty());
        assert_eq!(outcome.skipped, Some(SkipReason::NotProvisioned));
        assert_eq!(plain.get_coverage().unwrap(), 0.0);
    }

    #[test]
    fn test_create_multi_language_reports_failed_language() {
        let (db, _temp_dir) = create_test_db();
        db.execute_batch(
            "CREATE TABLE products (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                slug TEXT UNIQUE,
                price INTEGER,
                row_id INTEGER,
                iso TEXT CHECK (iso IS NULL OR iso <> 'fr')
            );",
        )
        .unwrap();
        let mlang = mlang(&db);

        let outcome = mlang
            .create_multi_language(shoe(), None, &BTreeMap::new())
            .unwrap();

        assert!(!outcome.is_success());
        assert_eq!(outcome.created.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].language, "fr");
        assert!(!outcome.failures[0].transient);
        assert_eq!(mlang.metrics().failures, 1);
        assert!(mlang.find(outcome.created[0].id, Some("nl")).unwrap().is_some());
    }

    // ==================== Group Operation Tests ====================

    #[test]
    fn test_update_all_translations() {
        let (db, _temp_dir) = create_products_db();
        let mlang = mlang(&db);
        let rows = mlang.create_multi_language(shoe(), None, &BTreeMap::new()).unwrap().created;

        let updated = mlang
            .update_all_translations(
                rows[1].id,
                AttributeMap::from([
                    ("price".to_string(), Value::Integer(120)),
                    ("iso".to_string(), text("xx")),
                ]),
            )
            .unwrap();
        assert_eq!(updated, 3);

        let all = mlang.get_all_translations(rows[0].id).unwrap();
        assert!(all.iter().all(|row| row.get("price") == Some(&Value::Integer(120))));
        assert!(mlang.find(rows[0].id, Some("fr")).unwrap().is_some());
    }

    #[test]
    fn test_delete_all_translations() {
        let (db, _temp_dir) = create_products_db();
        let mlang = mlang(&db);
        let rows = mlang.create_multi_language(shoe(), None, &BTreeMap::new()).unwrap().created;
        db.execute_batch("INSERT INTO products (name) VALUES ('Hat')").unwrap();

        assert_eq!(mlang.delete_all_translations(rows[2].id).unwrap(), 3);
        assert!(mlang.get_all_translations(rows[0].id).unwrap().is_empty());
        assert!(matches!(
            mlang.delete_all_translations(rows[0].id),
            Err(Error::RecordNotFound { .. })
        ));
        assert_eq!(mlang.get_stats().unwrap().unwrap().total_rows, 1);
    }

    #[test]
    fn test_copy_to_language() {
        let (db, _temp_dir) = create_products_db();
        let mlang = mlang(&db);
        let rows = mlang
            .create_multi_language(shoe(), Some(&[Locale::parse("en").unwrap()]), &BTreeMap::new())
            .unwrap()
            .created;

        let copy = mlang
            .copy_to_language(rows[0].id, "nl", &AttributeMap::from([("name".to_string(), text("Schoen"))]))
            .unwrap();
        assert_eq!(copy.iso.as_deref(), Some("nl"));
        assert_eq!(copy.row_id, Some(rows[0].id));
        assert_eq!(copy.text("name"), Some("Schoen"));

        let from_row = mlang
            .copy_to_language(rows[0].clone(), "nl", &AttributeMap::new())
            .unwrap();
        assert_eq!(from_row.id, copy.id);

        assert!(matches!(
            mlang.copy_to_language(rows[0].id, "de", &AttributeMap::new()),
            Err(Error::UnconfiguredLanguage(_))
        ));
    }

    #[test]
    fn test_incomplete_and_generate() {
        let (db, _temp_dir) = create_products_db();
        let mlang = mlang(&db);
        mlang
            .create_multi_language(shoe(), Some(&[Locale::parse("en").unwrap()]), &BTreeMap::new())
            .unwrap();
        assert_eq!(mlang.get_incomplete_translations().unwrap().len(), 1);

        let report = mlang.generate(Some("fr")).unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(mlang.get_incomplete_translations().unwrap().len(), 1);

        mlang.generate(None).unwrap();
        assert!(mlang.get_incomplete_translations().unwrap().is_empty());
        assert!((mlang.get_coverage().unwrap() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_find_defaults_to_fallback() {
        let (db, _temp_dir) = create_products_db();
        let mlang = mlang(&db);
        let rows = mlang.create_multi_language(shoe(), None, &BTreeMap::new()).unwrap().created;

        let found = mlang.find(rows[0].id, None).unwrap().unwrap();
        assert_eq!(found.iso.as_deref(), Some("en"));
    }

    // ==================== Query Tests ====================

    #[test]
    fn test_where_in_language() {
        let (db, _temp_dir) = create_products_db();
        let mlang = mlang(&db);
        let rows = mlang.create_multi_language(shoe(), None, &BTreeMap::new()).unwrap().created;

        let by_id = AttributeMap::from([("id".to_string(), Value::Integer(rows[0].id))]);
        let french = mlang.where_in_language(&by_id, Some("fr")).unwrap();
        assert_eq!(french.len(), 1);
        assert_eq!(french[0].id, rows[1].id);

        let by_slug = AttributeMap::from([("slug".to_string(), text("shoe-nl"))]);
        assert!(mlang.where_in_language(&by_slug, None).unwrap().is_empty());
        assert_eq!(mlang.where_in_language(&by_slug, Some("nl")).unwrap()[0].id, rows[2].id);
    }

    #[test]
    fn test_get_complete_translations() {
        let (db, _temp_dir) = create_products_db();
        let mlang = mlang(&db);
        let complete = mlang.create_multi_language(shoe(), None, &BTreeMap::new()).unwrap().created;
        let hat = AttributeMap::from([("name".to_string(), text("Hat"))]);
        mlang
            .create_multi_language(hat, Some(&[Locale::parse("en").unwrap()]), &BTreeMap::new())
            .unwrap();

        let rows = mlang.get_complete_translations(None).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|row| row.row_id == Some(complete[0].id)));

        let dutch = mlang.get_complete_translations(Some("nl")).unwrap();
        assert_eq!(dutch.len(), 1);
        assert_eq!(dutch[0].id, complete[2].id);
    }

    #[test]
    fn test_get_translations_by_priority() {
        let (db, _temp_dir) = create_products_db();
        let mlang = mlang(&db);
        let rows = mlang.create_multi_language(shoe(), None, &BTreeMap::new()).unwrap().created;

        let ordered = mlang.get_translations_by_priority(rows[0].id, Some("nl")).unwrap();
        assert_eq!(
            ordered.iter().filter_map(|row| row.iso.as_deref()).collect::<Vec<_>>(),
            vec!["nl", "en", "fr"]
        );

        let default = mlang.get_translations_by_priority(rows[0].id, None).unwrap();
        assert_eq!(default[0].iso.as_deref(), Some("en"));
    }

    #[test]
    fn test_migrate_and_rollback_bound_model() {
        let (db, _temp_dir) = create_products_db();
        db.execute_batch("CREATE TABLE plain (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        let plain = mlang(&db).for_model("plain").unwrap();

        assert_eq!(plain.migrate().unwrap().added, vec!["row_id", "iso"]);
        assert_eq!(plain.rollback().unwrap().removed, vec!["row_id", "iso"]);
    }
}
