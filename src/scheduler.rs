use crate::config::ModelRegistry;
use crate::reconcile::{BatchReconciler, ReconcileReport};
use anyhow::Result;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

/// Start a scheduler that reconciles every configured model on `cron_expr`.
///
/// `cron_expr` uses the six-field form with seconds
/// (`"0 */15 * * * *"` = every 15 minutes).
pub async fn start_scheduler(
    cron_expr: &str,
    reconciler: Arc<BatchReconciler>,
    models: Arc<ModelRegistry>,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    info!(
        "Scheduling reconcile sweep of {} model(s) (cron: {})",
        models.models().len(),
        cron_expr
    );

    let job = Job::new_async(cron_expr, move |_uuid, _l| {
        let reconciler = Arc::clone(&reconciler);
        let models = Arc::clone(&models);

        Box::pin(async move {
            info!("⏰ Scheduled reconcile triggered");
            match tokio::task::spawn_blocking(move || run_sweep(&reconciler, &models)).await {
                Ok(reports) => {
                    let created: usize = reports.iter().map(|r| r.created).sum();
                    info!("✓ Scheduled reconcile created {} row(s)", created);
                }
                Err(e) => error!("Scheduled reconcile panicked: {}", e),
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;
    info!("✓ Scheduler started");

    Ok(scheduler)
}

/// Reconcile every model, logging (not propagating) per-table errors.
pub fn run_sweep(reconciler: &BatchReconciler, models: &ModelRegistry) -> Vec<ReconcileReport> {
    let mut reports = Vec::new();
    for model in models.models() {
        match reconciler.reconcile(&model.table, None) {
            Ok(report) => {
                if !report.is_success() {
                    warn!(
                        "{}: {} record(s) could not be completed",
                        model.name,
                        report.failures.len()
                    );
                }
                reports.push(report);
            }
            Err(e) => error!("Reconcile of {} failed: {}", model.name, e),
        }
    }
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TranslationConfig;
    use crate::db::test_support::*;
    use crate::i18n::LanguageSet;
    use crate::replication::ReplicationEngine;

    fn reconciler(db: &crate::db::Database) -> Arc<BatchReconciler> {
        let languages = LanguageSet::parse("en,fr", "en").unwrap();
        let engine = ReplicationEngine::new(db.clone(), Arc::new(TranslationConfig::new(languages)));
        Arc::new(BatchReconciler::new(Arc::new(engine)))
    }

    #[test]
    fn test_run_sweep_covers_every_model() {
        let (db, _temp_dir) = create_products_db();
        db.execute_batch(
            "INSERT INTO products (name) VALUES ('Shoe');
             CREATE TABLE categories (id INTEGER PRIMARY KEY, title TEXT, row_id INTEGER, iso TEXT);
             INSERT INTO categories (title) VALUES ('Footwear');",
        )
        .unwrap();
        let models = ModelRegistry::parse("Product:products,Category:categories").unwrap();

        let reports = run_sweep(&reconciler(&db), &models);
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.created == 1));
    }

    #[test]
    fn test_run_sweep_continues_past_missing_table() {
        let (db, _temp_dir) = create_products_db();
        db.execute_batch("INSERT INTO products (name) VALUES ('Shoe')").unwrap();
        let models = ModelRegistry::parse("Ghost:ghosts,Product:products").unwrap();

        let reports = run_sweep(&reconciler(&db), &models);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].table, "products");
    }

    #[tokio::test]
    async fn test_scheduler_rejects_invalid_cron() {
        let (db, _temp_dir) = create_products_db();
        let result = start_scheduler(
            "not a cron",
            reconciler(&db),
            Arc::new(ModelRegistry::default()),
        )
        .await;
        assert!(result.is_err());
    }
}
