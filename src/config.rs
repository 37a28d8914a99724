use crate::db::TableName;
use crate::error::{Error, Result as CoreResult};
use crate::i18n::LanguageSet;
use crate::uniqueness::DEFAULT_SUFFIX_ATTEMPTS;
use anyhow::{Context, Result};

/// Default number of random-suffix retries after an insert hits a unique
/// violation the pre-check did not see.
pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

/// Translation behavior shared by every component.
///
/// Built once and threaded through constructors (usually behind an `Arc`).
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    pub languages: LanguageSet,
    /// Dispatch replication when a canonical record is created.
    pub auto_generate: bool,
    /// Also dispatch from batch (non-interactive) contexts.
    pub observe_during_batch: bool,
    /// Ladder length before the random suffix fallback.
    pub suffix_attempts: u32,
    pub conflict_retries: u32,
}

impl TranslationConfig {
    pub fn new(languages: LanguageSet) -> Self {
        Self {
            languages,
            auto_generate: true,
            observe_during_batch: false,
            suffix_attempts: DEFAULT_SUFFIX_ATTEMPTS,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }

    pub fn with_auto_generate(mut self, enabled: bool) -> Self {
        self.auto_generate = enabled;
        self
    }

    pub fn with_observe_during_batch(mut self, enabled: bool) -> Self {
        self.observe_during_batch = enabled;
        self
    }

    pub fn with_suffix_attempts(mut self, attempts: u32) -> Self {
        self.suffix_attempts = attempts;
        self
    }

    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }
}

/// A named model backed by one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub name: String,
    pub table: String,
}

/// Model name → table map.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Vec<ModelConfig>,
}

impl ModelRegistry {
    pub fn new(models: Vec<ModelConfig>) -> CoreResult<Self> {
        for model in &models {
            TableName::parse(&model.table)?;
        }
        Ok(Self { models })
    }

    /// Parse `Name:table,Other:other_table`.
    ///
    /// A bare `table` entry uses the table name as model name.
    pub fn parse(entries: &str) -> CoreResult<Self> {
        let models = entries
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let (name, table) = entry.split_once(':').unwrap_or((entry, entry));
                let (name, table) = (name.trim(), table.trim());
                if name.is_empty() || table.is_empty() {
                    return Err(Error::Config(format!("invalid model entry '{}'", entry)));
                }
                Ok(ModelConfig {
                    name: name.to_string(),
                    table: table.to_string(),
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;
        Self::new(models)
    }

    pub fn models(&self) -> &[ModelConfig] {
        &self.models
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|model| model.table.as_str())
    }

    /// Find one model by name or table (case-insensitive).
    pub fn get(&self, name: &str) -> CoreResult<&ModelConfig> {
        self.models
            .iter()
            .find(|model| model.name.eq_ignore_ascii_case(name) || model.table.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::UnknownModel(name.to_string()))
    }

    /// Models selected by an optional argument; `None` and `all` select every model.
    pub fn resolve(&self, name: Option<&str>) -> CoreResult<Vec<&ModelConfig>> {
        match name {
            None => Ok(self.models.iter().collect()),
            Some(name) if name.eq_ignore_ascii_case("all") => Ok(self.models.iter().collect()),
            Some(name) => Ok(vec![self.get(name)?]),
        }
    }
}

/// Process configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub translation: TranslationConfig,
    pub models: ModelRegistry,

    // Task execution
    pub workers: usize,
    pub task_attempts: u32,

    /// Cron expression (with seconds) for periodic reconcile sweeps.
    pub reconcile_schedule: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let languages = std::env::var("MLANG_LANGUAGES").context("MLANG_LANGUAGES not set")?;
        let fallback =
            std::env::var("MLANG_FALLBACK_LANGUAGE").unwrap_or_else(|_| "en".to_string());
        let languages = LanguageSet::parse(&languages, &fallback)
            .context("MLANG_LANGUAGES / MLANG_FALLBACK_LANGUAGE are invalid")?;

        let translation = TranslationConfig::new(languages)
            .with_auto_generate(env_flag("MLANG_AUTO_GENERATE", true)?)
            .with_observe_during_batch(env_flag("MLANG_OBSERVE_DURING_BATCH", false)?)
            .with_suffix_attempts(env_number("MLANG_SUFFIX_ATTEMPTS", DEFAULT_SUFFIX_ATTEMPTS)?);

        let models = ModelRegistry::parse(&std::env::var("MLANG_MODELS").unwrap_or_default())
            .context("MLANG_MODELS is invalid")?;

        let workers = env_number("MLANG_WORKERS", 4usize)?;
        if workers == 0 {
            anyhow::bail!("MLANG_WORKERS must be at least 1");
        }
        let task_attempts = env_number("MLANG_TASK_ATTEMPTS", 3u32)?;
        if task_attempts == 0 {
            anyhow::bail!("MLANG_TASK_ATTEMPTS must be at least 1");
        }

        Ok(Self {
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "data/polyrow.db".to_string()),
            translation,
            models,
            workers,
            task_attempts,
            reconcile_schedule: std::env::var("MLANG_RECONCILE_SCHEDULE")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        })
    }
}

/// Boolean variable; unset or empty means `default`.
fn env_flag(name: &str, default: bool) -> Result<bool> {
    let Some(value) = env_value(name) else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{} must be a boolean (true/false), got '{}'", name, value),
    }
}

/// Numeric variable; unset or empty means `default`.
fn env_number<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    let Some(value) = env_value(name) else {
        return Ok(default);
    };
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer, got '{}'", name, value))
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
