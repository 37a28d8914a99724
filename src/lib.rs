//! Multi-language shadow rows for relational tables.
//!
//! Every tracked table carries a `row_id` (translation group) and an `iso`
//! (language) column. A row created in one language is replicated into every
//! other configured language, with unique text values made distinct per
//! language.

pub mod api;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod hook;
pub mod i18n;
pub mod queries;
pub mod reconcile;
pub mod replication;
pub mod retry;
pub mod row;
pub mod scheduler;
pub mod schema;
pub mod uniqueness;
pub mod worker;

pub use api::{CopySource, Mlang};
pub use config::{Config, ModelConfig, ModelRegistry, TranslationConfig};
pub use db::{Database, TableName};
pub use error::{Error, Result};
pub use hook::{CreationHook, ExecutionContext, RecordPersisted, TaskDispatcher};
pub use i18n::{LanguageSet, Locale, MetricsReport, ReplicationMetrics};
pub use queries::{ConsistencyQueries, CoverageReport, TranslationStats};
pub use reconcile::{BatchReconciler, ReconcileReport};
pub use replication::{ReplicationEngine, ReplicationOutcome, ReplicationTask};
pub use row::{AttributeMap, GroupState, TranslatableRow};
pub use schema::{ConstraintInspector, SchemaProvisioner};
pub use worker::{QueueDispatcher, WorkerPool};
