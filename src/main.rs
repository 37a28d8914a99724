use anyhow::{Context, Result};
use polyrow::commands::{self, GenerateReport, SchemaCommandReport};
use polyrow::hook::HookOutcome;
use polyrow::retry::RetryConfig;
use polyrow::scheduler;
use polyrow::{
    BatchReconciler, Config, CreationHook, Database, Locale, Mlang, RecordPersisted,
    ReplicationEngine, ReplicationTask, SchemaProvisioner, TaskDispatcher, WorkerPool,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

// ==================== Argument Parsing ====================

/// Positional arguments plus the flags every command understands.
struct Args {
    positional: Vec<String>,
    table: Option<String>,
    locale: Option<String>,
    rollback: bool,
    json: bool,
}

impl Args {
    fn parse(raw: &[String]) -> Result<Self> {
        let mut args = Args {
            positional: Vec::new(),
            table: None,
            locale: None,
            rollback: false,
            json: false,
        };
        let mut iter = raw.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--table" => args.table = Some(iter.next().context("--table needs a value")?.clone()),
                "--locale" => {
                    args.locale = Some(iter.next().context("--locale needs a value")?.clone())
                }
                "--rollback" => args.rollback = true,
                "--json" => args.json = true,
                flag if flag.starts_with("--") => anyhow::bail!("Unknown flag: {}", flag),
                _ => args.positional.push(arg.clone()),
            }
        }
        Ok(args)
    }

    fn arg(&self, index: usize) -> Option<&str> {
        self.positional.get(index).map(String::as_str)
    }
}

fn print_usage() {
    eprintln!(
        "Usage: polyrow <command> [options]

Commands:
  migrate [--table T] [--rollback]   Add (or remove) row_id/iso on a table or every model
  rollback [--table T]               Remove row_id/iso from a table or every model
  generate [model|all] [locale]      Create missing translations
  replicate <model> <id> [--locale L]
                                     Replicate one freshly created record
  stats [model|all]                  Per-model translation statistics
  coverage [model|all]               Coverage ratio per model
  incomplete <model>                 One row per incomplete group
  watch                              Run workers and the reconcile schedule until Ctrl-C

Options:
  --json                             Print results as JSON"
    );
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ==================== Main ====================

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored when variables come from the environment)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("polyrow=info".parse()?),
        )
        .init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = raw.split_first() else {
        print_usage();
        return Ok(());
    };
    let args = Args::parse(rest)?;

    let config = Config::from_env()?;
    if let Some(parent) = std::path::Path::new(&config.database_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let db = Database::open(&config.database_path)
        .with_context(|| format!("Failed to open database at {}", config.database_path))?;
    let languages: Vec<String> = config
        .translation
        .languages
        .list()
        .iter()
        .map(|locale| format!("{} ({})", locale, locale.name()))
        .collect();
    info!("Using {} (languages: {})", config.database_path, languages.join(", "));

    let engine = Arc::new(ReplicationEngine::new(
        db.clone(),
        Arc::new(config.translation.clone()),
    ));
    let models = Arc::new(config.models.clone());
    let mlang = Mlang::from_engine(engine.clone(), models.clone());
    let provisioner = SchemaProvisioner::new(db);

    let success = match command.as_str() {
        "migrate" if args.rollback => {
            schema_command(commands::rollback(&provisioner, &models, args.table.as_deref())?, &args)?
        }
        "migrate" => {
            schema_command(commands::migrate(&provisioner, &models, args.table.as_deref())?, &args)?
        }
        "rollback" => {
            schema_command(commands::rollback(&provisioner, &models, args.table.as_deref())?, &args)?
        }
        "generate" => generate_command(&mlang, &args)?,
        "replicate" => replicate_command(&engine, &mlang, &args)?,
        "stats" => {
            let stats = commands::stats(&mlang, args.arg(0))?;
            if args.json {
                print_json(&stats)?;
            } else {
                for entry in &stats {
                    match &entry.stats {
                        Some(stats) => println!(
                            "{}: {} rows, {} groups, {} ungrouped, {} incomplete, coverage {:.1}%",
                            entry.model,
                            stats.total_rows,
                            stats.groups,
                            stats.ungrouped,
                            stats.incomplete_groups,
                            stats.coverage * 100.0
                        ),
                        None => println!("{}: not provisioned", entry.model),
                    }
                }
            }
            true
        }
        "coverage" => {
            let mut reports = Vec::new();
            for model in models.resolve(args.arg(0))? {
                reports.push(mlang.queries().coverage_report(&model.table)?);
            }
            if args.json {
                print_json(&reports)?;
            } else {
                for report in &reports {
                    println!("{}: {:.1}%", report.table, report.coverage * 100.0);
                }
            }
            true
        }
        "incomplete" => {
            let model = args.arg(0).context("incomplete needs a model")?;
            let rows = mlang.for_model(model)?.get_incomplete_translations()?;
            if args.json {
                let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
                print_json(&ids)?;
            } else {
                for row in &rows {
                    println!("{} (row_id {:?}, iso {:?})", row.id, row.row_id, row.iso);
                }
            }
            true
        }
        "watch" => {
            watch(&config, engine, mlang).await?;
            true
        }
        _ => {
            error!("Unknown command: {}", command);
            print_usage();
            false
        }
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

// ==================== Commands ====================

fn schema_command(report: SchemaCommandReport, args: &Args) -> Result<bool> {
    if args.json {
        print_json(&report)?;
    } else {
        for table in &report.succeeded {
            println!("✓ {} (added: {:?}, removed: {:?})", table.table, table.added, table.removed);
        }
        for failure in &report.failed {
            println!("✗ {}: {}", failure.table, failure.reason);
        }
    }
    Ok(report.is_success())
}

fn generate_command(mlang: &Mlang, args: &Args) -> Result<bool> {
    let locale = args.arg(1).or(args.locale.as_deref());
    let report: GenerateReport = commands::generate(mlang, args.arg(0), locale)?;
    if args.json {
        print_json(&report)?;
    } else {
        for table in &report.reports {
            println!(
                "{}: scanned {}, assigned {}, created {}, failed {}",
                table.table,
                table.scanned,
                table.assigned,
                table.created,
                table.failures.len()
            );
            for failure in &table.failures {
                println!(
                    "  ✗ record {} ({}): {}",
                    failure.id,
                    failure.language.as_deref().unwrap_or("-"),
                    failure.reason
                );
            }
        }
        for failure in &report.failed {
            println!("✗ {}: {}", failure.table, failure.reason);
        }
        println!("Created {} translation(s)", report.created());
    }
    Ok(report.is_success())
}

fn replicate_command(engine: &Arc<ReplicationEngine>, mlang: &Mlang, args: &Args) -> Result<bool> {
    let model = args.arg(0).context("replicate needs a model")?;
    let id: i64 = args
        .arg(1)
        .context("replicate needs a record id")?
        .parse()
        .context("record id must be an integer")?;
    let table = mlang.models().get(model)?.table.clone();

    let mut event = RecordPersisted::interactive(table, id);
    if let Some(locale) = &args.locale {
        event = event.with_locale(Locale::parse(locale)?);
    }

    match CreationHook::inline(engine.clone()).on_created(&event)? {
        HookOutcome::Dispatched(_) => {
            let rows = mlang.for_model(model)?.get_all_translations(id)?;
            println!("✓ {}#{} now has {} language row(s)", model, id, rows.len());
        }
        HookOutcome::Skipped(reason) => println!("{}#{} skipped: {}", model, id, reason),
    }
    Ok(true)
}

/// Run the worker pool and the reconcile schedule until Ctrl-C.
///
/// Incomplete groups found at startup are queued for the workers.
async fn watch(config: &Config, engine: Arc<ReplicationEngine>, mlang: Mlang) -> Result<()> {
    let retry = RetryConfig::replication_task().with_max_attempts(config.task_attempts);
    let pool = WorkerPool::start(engine.clone(), config.workers, retry);
    let dispatcher = pool.dispatcher();

    for model in mlang.models().models() {
        match mlang.queries().incomplete_rows(&model.table) {
            Ok(rows) => {
                info!("{}: queueing {} incomplete group(s)", model.name, rows.len());
                for row in rows {
                    dispatcher.dispatch(ReplicationTask::new(&model.table, row.id, Vec::new()))?;
                }
            }
            Err(e) => warn!("{}: cannot list incomplete groups: {}", model.name, e),
        }
    }

    let scheduler = match &config.reconcile_schedule {
        Some(schedule) => Some(
            scheduler::start_scheduler(
                schedule,
                Arc::new(BatchReconciler::new(engine.clone())),
                Arc::new(mlang.models().clone()),
            )
            .await?,
        ),
        None => {
            info!("MLANG_RECONCILE_SCHEDULE not set, periodic reconcile disabled");
            None
        }
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    if let Some(mut scheduler) = scheduler {
        scheduler.shutdown().await?;
    }
    pool.shutdown().await;

    let metrics = engine.metrics().report();
    info!(
        "Created {} row(s), {} task(s) completed, {} abandoned",
        metrics.rows_created, metrics.tasks_completed, metrics.tasks_abandoned
    );
    Ok(())
}
