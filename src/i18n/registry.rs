//! Language set: the configured languages every translation group must cover.
//!
//! Unlike a process-wide registry, a `LanguageSet` is plain data owned by the
//! translation configuration and threaded through the engine, reconciler and
//! queries explicitly.

use crate::error::{Error, Result};
use crate::i18n::Locale;

/// Ordered, de-duplicated set of configured languages plus a fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageSet {
    languages: Vec<Locale>,
    fallback: Locale,
}

impl LanguageSet {
    /// Build a language set.
    ///
    /// Duplicates are dropped keeping the first occurrence. The fallback must
    /// be one of the configured languages.
    pub fn new(languages: Vec<Locale>, fallback: Locale) -> Result<Self> {
        let mut unique: Vec<Locale> = Vec::with_capacity(languages.len());
        for language in languages {
            if !unique.contains(&language) {
                unique.push(language);
            }
        }

        if unique.is_empty() {
            return Err(Error::Config("no languages configured".to_string()));
        }
        if !unique.contains(&fallback) {
            return Err(Error::Config(format!(
                "fallback language '{}' is not one of the configured languages",
                fallback
            )));
        }

        Ok(Self {
            languages: unique,
            fallback,
        })
    }

    /// Parse a comma-separated list such as `"en, fr,nl"`.
    pub fn parse(codes: &str, fallback: &str) -> Result<Self> {
        let languages = codes
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(Locale::parse)
            .collect::<Result<Vec<_>>>()?;

        Self::new(languages, Locale::parse(fallback.trim())?)
    }

    /// Configured languages in configuration order.
    pub fn list(&self) -> &[Locale] {
        &self.languages
    }

    /// Number of configured languages (the size of a complete group).
    pub fn len(&self) -> usize {
        self.languages.len()
    }

    /// Always false: construction rejects an empty set.
    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }

    pub fn fallback(&self) -> &Locale {
        &self.fallback
    }

    /// Check whether a code is configured.
    pub fn contains(&self, code: &str) -> bool {
        self.languages.iter().any(|language| language.code() == code)
    }

    /// Look up a configured language by code.
    pub fn get(&self, code: &str) -> Result<&Locale> {
        Locale::parse(code)?;
        self.languages
            .iter()
            .find(|language| language.code() == code)
            .ok_or_else(|| Error::UnconfiguredLanguage(code.to_string()))
    }

    /// Narrow the set to one configured language, or keep all of them.
    pub fn select(&self, code: Option<&str>) -> Result<Vec<Locale>> {
        match code {
            Some(code) => {
                let language = self
                    .get(code)
                    .or_else(|_| self.get(&code.to_lowercase()))?;
                Ok(vec![language.clone()])
            }
            None => Ok(self.languages.clone()),
        }
    }

    /// Resolve a requested locale: configured codes are returned as-is,
    /// anything else (including malformed codes) falls back.
    pub fn resolve(&self, requested: Option<&str>) -> Locale {
        requested
            .and_then(|code| self.get(code).ok())
            .unwrap_or(&self.fallback)
            .clone()
    }

    /// Display rank of a language code: `current` first, then configured
    /// order, then everything unconfigured.
    pub fn priority(&self, code: &str, current: Option<&str>) -> usize {
        if current.is_some_and(|current| current.eq_ignore_ascii_case(code)) {
            return 0;
        }
        self.languages
            .iter()
            .position(|language| language.code().eq_ignore_ascii_case(code))
            .map_or(usize::MAX, |position| position + 1)
    }

    /// Order language codes by [`priority`](Self::priority). Unconfigured
    /// codes keep their original order.
    pub fn sort_by_priority<S: AsRef<str>>(&self, codes: &mut [S], current: Option<&str>) {
        codes.sort_by_key(|code| self.priority(code.as_ref(), current));
    }

    /// Languages from `targets` that are not in `existing`, in target order.
    pub fn missing_from<'a>(targets: &'a [Locale], existing: &[String]) -> Vec<&'a Locale> {
        let mut missing: Vec<&Locale> = Vec::new();
        for target in targets {
            if !existing.iter().any(|code| code == target.code()) && !missing.contains(&target) {
                missing.push(target);
            }
        }
        missing
    }
}

/// English display name for a language code.
///
/// Region suffixes are ignored; unknown codes are returned capitalised.
pub fn display_name(code: &str) -> String {
    let primary = code.split('-').next().unwrap_or(code);
    let name = match primary {
        "en" => "English",
        "fr" => "French",
        "de" => "German",
        "es" => "Spanish",
        "it" => "Italian",
        "pt" => "Portuguese",
        "nl" => "Dutch",
        "ru" => "Russian",
        "zh" => "Chinese",
        "ja" => "Japanese",
        "ko" => "Korean",
        "ar" => "Arabic",
        "hi" => "Hindi",
        "tr" => "Turkish",
        "pl" => "Polish",
        "sv" => "Swedish",
        "da" => "Danish",
        "no" => "Norwegian",
        "fi" => "Finnish",
        _ => {
            let mut chars = primary.chars();
            return match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            };
        }
    };
    name.to_string()
}
