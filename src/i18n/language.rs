//! Locale type: validated language code stored in the `iso` column.

use crate::error::{Error, Result};
use crate::i18n::registry::display_name;
use crate::i18n::validator::validate_locale;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A validated language code (ISO 639-1/2, optionally with a region suffix).
///
/// Construction always goes through [`Locale::parse`], so a `Locale` value is
/// safe to bind into queries and to compare against stored `iso` values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locale(String);

impl Locale {
    /// Parse a language code.
    ///
    /// # Returns
    /// * `Ok(Locale)` for codes like `en`, `fil`, `pt-BR`
    /// * `Err(Error::InvalidLocale)` otherwise
    ///
    /// # Example
    /// ```
    /// use polyrow::Locale;
    ///
    /// let french = Locale::parse("fr").unwrap();
    /// assert_eq!(french.code(), "fr");
    /// assert!(Locale::parse("french").is_err());
    /// ```
    pub fn parse(code: &str) -> Result<Self> {
        validate_locale(code)?;
        Ok(Self(code.to_string()))
    }

    /// The language code as stored in `iso`.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// English display name (e.g. "Dutch" for `nl`).
    pub fn name(&self) -> String {
        display_name(&self.0)
    }

    /// Primary language subtag (`pt` for `pt-BR`).
    pub fn primary(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

impl FromStr for Locale {
    type Err = Error;

    fn from_str(code: &str) -> Result<Self> {
        Locale::parse(code)
    }
}

impl TryFrom<String> for Locale {
    type Error = Error;

    fn try_from(code: String) -> Result<Self> {
        validate_locale(&code)?;
        Ok(Self(code))
    }
}

impl From<Locale> for String {
    fn from(locale: Locale) -> Self {
        locale.0
    }
}

impl AsRef<str> for Locale {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Locale {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_code() {
        let locale = Locale::parse("nl").expect("Should parse");
        assert_eq!(locale.code(), "nl");
        assert_eq!(locale.name(), "Dutch");
    }

    #[test]
    fn test_parse_region_code() {
        let locale = Locale::parse("pt-BR").expect("Should parse");
        assert_eq!(locale.code(), "pt-BR");
        assert_eq!(locale.primary(), "pt");
        assert_eq!(locale.name(), "Portuguese");
    }

    #[test]
    fn test_parse_invalid() {
        let result = Locale::parse("en_US");
        assert!(matches!(result, Err(Error::InvalidLocale(_))));
    }

    #[test]
    fn test_from_str() {
        let locale: Locale = "fr".parse().expect("Should parse");
        assert_eq!(locale, *"fr");
    }

    #[test]
    fn test_display() {
        let locale = Locale::parse("en-GB").unwrap();
        assert_eq!(format!("{}", locale), "en-GB");
    }

    #[test]
    fn test_serde_round_trip_validates() {
        let locale = Locale::parse("de").unwrap();
        let json = serde_json::to_string(&locale).unwrap();
        assert_eq!(json, "\"de\"");

        let parsed: Locale = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, locale);

        let invalid: std::result::Result<Locale, _> = serde_json::from_str("\"DE\"");
        assert!(invalid.is_err());
    }
}
