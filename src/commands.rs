//! Schema and generation commands over one or every configured model.

use crate::api::Mlang;
use crate::config::ModelRegistry;
use crate::db::TableName;
use crate::error::{Error, Result};
use crate::queries::TranslationStats;
use crate::reconcile::ReconcileReport;
use crate::schema::{ProvisionReport, SchemaProvisioner};
use serde::Serialize;
use tracing::{error, info};

/// A table a command could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableFailure {
    pub table: String,
    pub reason: String,
}

/// Per-table results of `migrate` / `rollback`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaCommandReport {
    pub succeeded: Vec<ProvisionReport>,
    pub failed: Vec<TableFailure>,
}

impl SchemaCommandReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Results of `generate` across models.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerateReport {
    pub reports: Vec<ReconcileReport>,
    pub failed: Vec<TableFailure>,
}

impl GenerateReport {
    pub fn created(&self) -> usize {
        self.reports.iter().map(|report| report.created).sum()
    }

    /// No table failed and no record failed within a table.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.reports.iter().all(ReconcileReport::is_success)
    }
}

/// Stats of one model, `None` when the table is not provisioned.
#[derive(Debug, Clone, Serialize)]
pub struct ModelStats {
    pub model: String,
    pub stats: Option<TranslationStats>,
}

/// Tables named by `table` (a model name or a raw table) or every model.
fn target_tables(models: &ModelRegistry, table: Option<&str>) -> Result<Vec<String>> {
    match table {
        Some(table) => match models.get(table) {
            Ok(model) => Ok(vec![model.table.clone()]),
            Err(_) => {
                TableName::parse(table)?;
                Ok(vec![table.to_string()])
            }
        },
        None if models.is_empty() => Err(Error::Config(
            "no models configured (set MLANG_MODELS or pass a table)".to_string(),
        )),
        None => Ok(models.tables().map(str::to_string).collect()),
    }
}

fn run_schema_command(
    tables: Vec<String>,
    action: &str,
    apply: impl Fn(&str) -> Result<ProvisionReport>,
) -> SchemaCommandReport {
    let mut report = SchemaCommandReport::default();
    for table in tables {
        match apply(&table) {
            Ok(result) => {
                info!("✓ {} {}", action, table);
                report.succeeded.push(result);
            }
            Err(e) => {
                error!("✗ {} {} failed: {}", action, table, e);
                report.failed.push(TableFailure {
                    table,
                    reason: e.to_string(),
                });
            }
        }
    }
    report
}

/// Add tracking columns to one table or every configured model.
pub fn migrate(
    provisioner: &SchemaProvisioner,
    models: &ModelRegistry,
    table: Option<&str>,
) -> Result<SchemaCommandReport> {
    let tables = target_tables(models, table)?;
    Ok(run_schema_command(tables, "migrate", |table| {
        provisioner.add_columns(table)
    }))
}

/// Remove tracking columns from one table or every configured model.
pub fn rollback(
    provisioner: &SchemaProvisioner,
    models: &ModelRegistry,
    table: Option<&str>,
) -> Result<SchemaCommandReport> {
    let tables = target_tables(models, table)?;
    Ok(run_schema_command(tables, "rollback", |table| {
        provisioner.remove_columns(table)
    }))
}

/// Reconcile one model (or `all`), optionally for one language.
///
/// An unknown model or a malformed/unconfigured locale is rejected before
/// anything runs; per-table errors are collected.
pub fn generate(mlang: &Mlang, model: Option<&str>, locale: Option<&str>) -> Result<GenerateReport> {
    let models = mlang.models().resolve(model)?;
    mlang.languages().select(locale)?;

    let mut report = GenerateReport::default();
    for model in models {
        let result = mlang
            .for_model(&model.name)
            .and_then(|bound| bound.generate(locale));
        match result {
            Ok(result) => {
                info!(
                    "✓ {}: {} created, {} failed",
                    model.name,
                    result.created,
                    result.failures.len()
                );
                report.reports.push(result);
            }
            Err(e) => {
                error!("✗ {} failed: {}", model.name, e);
                report.failed.push(TableFailure {
                    table: model.table.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(report)
}

/// Stats for one model (or `all`).
pub fn stats(mlang: &Mlang, model: Option<&str>) -> Result<Vec<ModelStats>> {
    mlang
        .models()
        .resolve(model)?
        .into_iter()
        .map(|model| {
            Ok(ModelStats {
                model: model.name.clone(),
                stats: mlang.for_model(&model.name)?.get_stats()?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TranslationConfig;
    use crate::db::test_support::*;
    use crate::db::Database;
    use crate::i18n::LanguageSet;
    use std::sync::Arc;

    fn setup() -> (Database, tempfile::TempDir, Mlang) {
        let (db, dir) = create_test_db();
        db.execute_batch(
            "CREATE TABLE products (id INTEGER PRIMARY KEY, name TEXT, slug TEXT UNIQUE);
             CREATE TABLE categories (id INTEGER PRIMARY KEY, title TEXT);
             INSERT INTO products (name, slug) VALUES ('Shoe', 'shoe');
             INSERT INTO categories (title) VALUES ('Footwear');",
        )
        .unwrap();
        let config = TranslationConfig::new(LanguageSet::parse("en,fr,nl", "en").unwrap());
        let models = ModelRegistry::parse("Product:products,Category:categories").unwrap();
        let mlang = Mlang::new(db.clone(), Arc::new(config), models);
        (db, dir, mlang)
    }

    // ==================== Schema Command Tests ====================

    #[test]
    fn test_migrate_all_models() {
        let (db, _temp_dir, mlang) = setup();
        let provisioner = SchemaProvisioner::new(db.clone());

        let report = migrate(&provisioner, mlang.models(), None).unwrap();
        assert!(report.is_success());
        assert_eq!(report.succeeded.len(), 2);
        assert!(db.has_tracking_columns("categories").unwrap());
    }

    #[test]
    fn test_migrate_single_table_by_model_or_name() {
        let (db, _temp_dir, mlang) = setup();
        let provisioner = SchemaProvisioner::new(db.clone());

        let report = migrate(&provisioner, mlang.models(), Some("Product")).unwrap();
        assert_eq!(report.succeeded[0].table, "products");

        let report = migrate(&provisioner, mlang.models(), Some("categories")).unwrap();
        assert_eq!(report.succeeded.len(), 1);
    }

    #[test]
    fn test_migrate_reports_missing_table() {
        let (db, _temp_dir, mlang) = setup();
        let provisioner = SchemaProvisioner::new(db);

        let report = migrate(&provisioner, mlang.models(), Some("ghosts")).unwrap();
        assert!(!report.is_success());
        assert_eq!(report.failed[0].table, "ghosts");
    }

    #[test]
    fn test_migrate_rejects_bad_table_name() {
        let (db, _temp_dir, mlang) = setup();
        let provisioner = SchemaProvisioner::new(db);
        assert!(migrate(&provisioner, mlang.models(), Some("x; DROP TABLE y")).is_err());
    }

    #[test]
    fn test_migrate_without_models() {
        let (db, _temp_dir) = create_test_db();
        let provisioner = SchemaProvisioner::new(db);
        assert!(matches!(
            migrate(&provisioner, &ModelRegistry::default(), None),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_rollback_all_models() {
        let (db, _temp_dir, mlang) = setup();
        let provisioner = SchemaProvisioner::new(db.clone());
        migrate(&provisioner, mlang.models(), None).unwrap();

        let report = rollback(&provisioner, mlang.models(), None).unwrap();
        assert!(report.is_success());
        assert!(!db.has_tracking_columns("products").unwrap());
    }

    // ==================== Generate Tests ====================

    #[test]
    fn test_generate_all() {
        let (db, _temp_dir, mlang) = setup();
        migrate(&SchemaProvisioner::new(db), mlang.models(), None).unwrap();

        let report = generate(&mlang, Some("all"), None).unwrap();
        assert!(report.is_success());
        assert_eq!(report.created(), 4);
    }

    #[test]
    fn test_generate_one_model_one_locale() {
        let (db, _temp_dir, mlang) = setup();
        migrate(&SchemaProvisioner::new(db), mlang.models(), None).unwrap();

        let report = generate(&mlang, Some("Product"), Some("FR")).unwrap();
        assert_eq!(report.reports.len(), 1);
        assert_eq!(report.created(), 1);
    }

    #[test]
    fn test_generate_rejects_unknown_inputs() {
        let (_db, _temp_dir, mlang) = setup();
        assert!(matches!(
            generate(&mlang, Some("Order"), None),
            Err(Error::UnknownModel(_))
        ));
        assert!(matches!(
            generate(&mlang, None, Some("de")),
            Err(Error::UnconfiguredLanguage(_))
        ));
        assert!(matches!(
            generate(&mlang, None, Some("german")),
            Err(Error::InvalidLocale(_))
        ));
    }

    #[test]
    fn test_generate_unprovisioned_is_skipped() {
        let (_db, _temp_dir, mlang) = setup();
        let report = generate(&mlang, None, None).unwrap();
        assert_eq!(report.created(), 0);
        assert!(report.reports.iter().all(|r| r.skipped.is_some()));
    }

    #[test]
    fn test_stats_command() {
        let (db, _temp_dir, mlang) = setup();
        migrate(&SchemaProvisioner::new(db), mlang.models(), Some("products")).unwrap();

        let stats = stats(&mlang, None).unwrap();
        assert_eq!(stats.len(), 2);
        assert!(stats[0].stats.is_some());
        assert!(stats[1].stats.is_none());
    }
}
