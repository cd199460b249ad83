//! Identifier and literal hygiene for generated SQL.
//!
//! Every identifier that reaches the store comes from [`sanitize_identifier`],
//! so generated statements only ever contain ASCII letters, digits and
//! underscores inside quoted identifiers. Literal values are quoted with
//! [`quote_literal`].

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, StatsError};

/// Maximum accepted length of a relation or column identifier.
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

static SPECIAL_RUNS: Lazy<Regex> = Lazy::new(|| {
    // This regex is compile-time constant and known to be valid
    #[allow(clippy::expect_used)]
    Regex::new(r"[^a-zA-Z0-9]+").expect("Hard-coded regex pattern should be valid")
});

static RELATION_NAME: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-zA-Z0-9_]+$").expect("Hard-coded regex pattern should be valid")
});

/// Collapses every run of non-alphanumeric characters into a single `_` and
/// strips separators from both ends.
///
/// # Examples
/// ```rust
/// use stats_analyzer::security::sanitize_identifier;
///
/// assert_eq!(sanitize_identifier("  Order #ID (new) "), "Order_ID_new");
/// assert_eq!(sanitize_identifier("__a--b__"), "a_b");
/// assert_eq!(sanitize_identifier("???"), "");
/// ```
pub fn sanitize_identifier(input: &str) -> String {
    SPECIAL_RUNS
        .replace_all(input, "_")
        .trim_matches('_')
        .to_string()
}

/// Wraps an identifier in double quotes, doubling embedded quotes.
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Wraps a value in single quotes, doubling embedded quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Checks that a relation name has the shape produced by relation naming.
///
/// Relation names coming back from a session repository are validated before
/// they are spliced into a `DROP TABLE` statement.
pub fn validate_relation_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StatsError::Configuration(
            "relation name cannot be empty".to_string(),
        ));
    }
    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(StatsError::Configuration(format!(
            "relation name too long (max {MAX_IDENTIFIER_LENGTH} characters)"
        )));
    }
    if !RELATION_NAME.is_match(name) {
        return Err(StatsError::Configuration(format!(
            "invalid relation name '{name}': only letters, digits and underscores are allowed"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_collapses_runs() {
        assert_eq!(sanitize_identifier("first name"), "first_name");
        assert_eq!(sanitize_identifier("a  -  b"), "a_b");
        assert_eq!(sanitize_identifier("price ($)"), "price");
        assert_eq!(sanitize_identifier("2024-01-01"), "2024_01_01");
    }

    #[test]
    fn test_sanitize_drops_non_ascii() {
        assert_eq!(sanitize_identifier("Имя"), "");
        assert_eq!(sanitize_identifier("café au lait"), "caf_au_lait");
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("age"), "\"age\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("Apple"), "'Apple'");
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn test_validate_relation_name() {
        assert!(validate_relation_name("id_name_age_1a2b3c").is_ok());
        assert!(validate_relation_name("").is_err());
        assert!(validate_relation_name("users; DROP TABLE x").is_err());
        assert!(validate_relation_name(&"a".repeat(129)).is_err());
    }
}
