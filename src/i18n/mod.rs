//! Language handling for translation groups.
//!
//! # Architecture
//!
//! - `language`: `Locale`, a validated language code as stored in `iso`
//! - `registry`: `LanguageSet`, the configured languages plus fallback
//! - `validator`: identifier, locale and attribute validation
//! - `metrics`: replication counters
//!
//! # Example
//!
//! ```
//! use polyrow::i18n::LanguageSet;
//!
//! let languages = LanguageSet::parse("en,fr,nl", "en").unwrap();
//! assert_eq!(languages.len(), 3);
//! assert!(languages.contains("nl"));
//! ```

mod language;
mod metrics;
mod registry;
pub mod validator;

pub use language::Locale;
pub use metrics::{MetricsReport, ReplicationMetrics};
pub use registry::{display_name, LanguageSet};
