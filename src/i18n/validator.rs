//! Identifier and input validation.
//!
//! Table and column names are interpolated into SQL (quoted), so they are
//! validated against a strict pattern first. Locale codes follow ISO 639-1/2
//! with an optional region suffix.

use crate::error::{Error, Result};
use regex::Regex;
use rusqlite::types::Value;
use std::sync::OnceLock;

/// Maximum table name length accepted (most engines cap identifiers at 64).
pub const MAX_TABLE_NAME_LEN: usize = 64;

// Regex patterns (compiled once)
static TABLE_REGEX: OnceLock<Regex> = OnceLock::new();
static COLUMN_REGEX: OnceLock<Regex> = OnceLock::new();
static LOCALE_REGEX: OnceLock<Regex> = OnceLock::new();
static CONTROL_CHARS_REGEX: OnceLock<Regex> = OnceLock::new();

fn table_regex() -> &'static Regex {
    TABLE_REGEX.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.]+$").expect("Invalid table regex"))
}

fn column_regex() -> &'static Regex {
    COLUMN_REGEX
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid column regex"))
}

fn locale_regex() -> &'static Regex {
    LOCALE_REGEX
        .get_or_init(|| Regex::new(r"^[a-z]{2,3}(-[A-Z]{2})?$").expect("Invalid locale regex"))
}

fn control_chars_regex() -> &'static Regex {
    CONTROL_CHARS_REGEX.get_or_init(|| {
        Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("Invalid control chars regex")
    })
}

/// Validate a table name (`name` or `schema.name`).
pub fn validate_table_name(table: &str) -> Result<()> {
    if !table_regex().is_match(table) {
        return Err(Error::InvalidIdentifier {
            name: table.to_string(),
            reason: "only alphanumeric characters, underscores and dots are allowed",
        });
    }
    if table.len() > MAX_TABLE_NAME_LEN {
        return Err(Error::InvalidIdentifier {
            name: table.to_string(),
            reason: "table name is longer than 64 characters",
        });
    }
    if table.split('.').any(str::is_empty) || table.split('.').count() > 2 {
        return Err(Error::InvalidIdentifier {
            name: table.to_string(),
            reason: "expected 'table' or 'schema.table'",
        });
    }
    Ok(())
}

/// Validate a column name.
pub fn validate_column_name(column: &str) -> Result<()> {
    if column_regex().is_match(column) {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier {
            name: column.to_string(),
            reason: "column names must start with a letter or underscore",
        })
    }
}

/// Validate a locale code such as `en`, `fil` or `pt-BR`.
pub fn validate_locale(locale: &str) -> Result<()> {
    if locale_regex().is_match(locale) {
        Ok(())
    } else {
        Err(Error::InvalidLocale(locale.to_string()))
    }
}

/// Strip control characters and surrounding whitespace from text values.
pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::Text(text) => {
            let cleaned = control_chars_regex().replace_all(&text, "");
            Value::Text(cleaned.trim().to_string())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ==================== Locale Tests ====================

    #[test]
    fn test_valid_locales() {
        for locale in ["en", "fr", "fil", "en-US", "pt-BR"] {
            assert!(validate_locale(locale).is_ok(), "{} should be valid", locale);
        }
    }

    #[test]
    fn test_invalid_locales() {
        for locale in ["", "e", "EN", "en_US", "en-us", "english", "invalid_locale"] {
            let result = validate_locale(locale);
            assert!(
                matches!(result, Err(Error::InvalidLocale(_))),
                "{} should be invalid",
                locale
            );
        }
    }

    // ==================== Table Name Tests ====================

    #[test]
    fn test_valid_table_names() {
        assert!(validate_table_name("users").is_ok());
        assert!(validate_table_name("user_profiles").is_ok());
        assert!(validate_table_name("main.users").is_ok());
    }

    #[test]
    fn test_rejects_sql_injection_table_name() {
        assert!(validate_table_name("users; DROP TABLE users--").is_err());
    }

    #[test]
    fn test_rejects_long_table_name() {
        let name = "t".repeat(MAX_TABLE_NAME_LEN + 1);
        assert!(validate_table_name(&name).is_err());
    }

    #[test]
    fn test_rejects_malformed_dotted_table_name() {
        assert!(validate_table_name(".users").is_err());
        assert!(validate_table_name("a.b.c").is_err());
    }

    // ==================== Column Name Tests ====================

    #[test]
    fn test_valid_column_names() {
        assert!(validate_column_name("id").is_ok());
        assert!(validate_column_name("row_id").is_ok());
        assert!(validate_column_name("_internal").is_ok());
    }

    #[test]
    fn test_invalid_column_names() {
        assert!(validate_column_name("invalid-column").is_err());
        assert!(validate_column_name("1st").is_err());
        assert!(validate_column_name("").is_err());
    }

    // ==================== Sanitize Tests ====================

    #[test]
    fn test_sanitize_strips_control_chars_and_trims() {
        let value = sanitize_value(Value::Text("  Sh\u{0}oe\u{7}  ".to_string()));
        assert_eq!(value, Value::Text("Shoe".to_string()));
    }

    #[test]
    fn test_sanitize_keeps_newlines_and_non_text() {
        assert_eq!(
            sanitize_value(Value::Text("a\nb".to_string())),
            Value::Text("a\nb".to_string())
        );
        assert_eq!(sanitize_value(Value::Integer(7)), Value::Integer(7));
        assert_eq!(sanitize_value(Value::Null), Value::Null);
    }

    proptest! {
        #[test]
        fn prop_generated_locales_validate(lang in "[a-z]{2,3}", region in proptest::option::of("[A-Z]{2}")) {
            let code = match region {
                Some(region) => format!("{}-{}", lang, region),
                None => lang,
            };
            prop_assert!(validate_locale(&code).is_ok());
        }

        #[test]
        fn prop_sanitized_text_has_no_control_chars(text in ".*") {
            if let Value::Text(cleaned) = sanitize_value(Value::Text(text)) {
                prop_assert!(!cleaned.chars().any(|c| c.is_control() && c != '\n' && c != '\t' && c != '\r'
                    && (c as u32) < 0x80));
            }
        }
    }
}
