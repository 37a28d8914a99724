//! Creation hook: turns "a canonical record was persisted" into a
//! replication task.

use crate::error::Result;
use crate::i18n::Locale;
use crate::replication::{ReplicationEngine, ReplicationTask, SkipReason};
use crate::row::{AttributeMap, ISO_COLUMN};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a write originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionContext {
    /// A request or other user-facing call.
    Interactive,
    /// Imports, seeders, scripted batch jobs.
    Batch,
}

/// A record was inserted into a translatable table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPersisted {
    pub table: String,
    pub id: i64,
    /// Locale active when the record was written, if any.
    pub active_locale: Option<Locale>,
    pub context: ExecutionContext,
}

impl RecordPersisted {
    pub fn interactive(table: impl Into<String>, id: i64) -> Self {
        Self {
            table: table.into(),
            id,
            active_locale: None,
            context: ExecutionContext::Interactive,
        }
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.active_locale = Some(locale);
        self
    }

    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = context;
        self
    }
}

/// Hands replication tasks to whatever executes them.
pub trait TaskDispatcher: Send + Sync {
    fn dispatch(&self, task: ReplicationTask) -> Result<()>;
}

/// Runs each task on the calling thread.
pub struct InlineDispatcher {
    engine: Arc<ReplicationEngine>,
}

impl InlineDispatcher {
    pub fn new(engine: Arc<ReplicationEngine>) -> Self {
        Self { engine }
    }
}

impl TaskDispatcher for InlineDispatcher {
    fn dispatch(&self, task: ReplicationTask) -> Result<()> {
        let outcome = self.engine.run_task(&task)?;
        if !outcome.is_success() {
            warn!(
                "{} of {} record {} language(s) failed",
                outcome.failures.len(),
                task.table,
                task.record_id
            );
        }
        Ok(())
    }
}

/// What the hook did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    Dispatched(ReplicationTask),
    Skipped(SkipReason),
}

pub struct CreationHook {
    engine: Arc<ReplicationEngine>,
    dispatcher: Arc<dyn TaskDispatcher>,
}

impl CreationHook {
    pub fn new(engine: Arc<ReplicationEngine>, dispatcher: Arc<dyn TaskDispatcher>) -> Self {
        Self { engine, dispatcher }
    }

    /// Hook with an [`InlineDispatcher`] over the same engine.
    pub fn inline(engine: Arc<ReplicationEngine>) -> Self {
        let dispatcher = Arc::new(InlineDispatcher::new(engine.clone()));
        Self::new(engine, dispatcher)
    }

    /// Before insert: fill a missing `iso` from the active locale (when
    /// configured) or the fallback language.
    pub fn on_creating(&self, attributes: &mut AttributeMap, active_locale: Option<&Locale>) {
        let missing = matches!(attributes.get(ISO_COLUMN), None | Some(Value::Null));
        if missing {
            let language = self
                .engine
                .languages()
                .resolve(active_locale.map(Locale::code));
            attributes.insert(ISO_COLUMN.to_string(), Value::Text(language.code().to_string()));
        }
    }

    /// After insert: assign the group and dispatch replication.
    ///
    /// Gating (auto-generate, batch context) and untracked tables yield a
    /// skip, never an error.
    pub fn on_created(&self, event: &RecordPersisted) -> Result<HookOutcome> {
        let config = self.engine.config();
        if !config.auto_generate {
            return Ok(HookOutcome::Skipped(SkipReason::AutoGenerateDisabled));
        }
        if event.context == ExecutionContext::Batch && !config.observe_during_batch {
            debug!("Ignoring {} record {} created in batch context", event.table, event.id);
            return Ok(HookOutcome::Skipped(SkipReason::BatchContext));
        }

        let schema = self.engine.schema(&event.table)?;
        if !schema.has_tracking_columns() {
            return Ok(HookOutcome::Skipped(SkipReason::NotProvisioned));
        }

        let Some(row) = self.engine.load(&schema, event.id)? else {
            return Ok(HookOutcome::Skipped(SkipReason::RecordMissing));
        };
        match row.row_id {
            Some(row_id) if row_id != row.id => {
                return Ok(HookOutcome::Skipped(SkipReason::AlreadyGrouped));
            }
            Some(_) => {}
            None => {
                let default_iso = self
                    .engine
                    .languages()
                    .resolve(event.active_locale.as_ref().map(Locale::code));
                self.engine.assign_row_id(&schema, row.id, &default_iso)?;
            }
        }

        let task = ReplicationTask::new(schema.table.to_string(), row.id, Vec::new());
        self.dispatcher.dispatch(task.clone())?;
        info!("Dispatched replication for {} record {}", task.table, task.record_id);
        Ok(HookOutcome::Dispatched(task))
    }
}
