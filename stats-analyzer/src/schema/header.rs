//! Header detection and column name sanitization.
//!
//! The first row of a file is a header when at least half of its fields look
//! like labels: non-empty, not a number, not a recognized date shape, and made
//! up of at least 30% letters. Otherwise synthetic `column_<n>` names are
//! generated and the row is kept as data.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::security::sanitize_identifier;

/// Share of header-like fields needed to treat a row as a header.
const HEADER_MAJORITY: f64 = 0.5;

/// Minimum share of letters among non-space characters of a label.
const LETTER_DENSITY: f64 = 0.3;

static DATE_SHAPES: Lazy<Vec<Regex>> = Lazy::new(|| {
    // These regexes are compile-time constant and known to be valid
    #[allow(clippy::expect_used)]
    let shapes = [
        r"^\d{4}-\d{2}-\d{2}$",
        r"^\d{2}/\d{2}/\d{4}$",
        r"^\d{2}\.\d{2}\.\d{4}$",
        r"^\d{4}-\d{2}-\d{2}\s\d{2}:\d{2}:\d{2}$",
        r"^\d{4}-\d{2}-\d{2}\s\d{2}:\d{2}:\d{2}\.\d+$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Hard-coded regex pattern should be valid"))
    .collect();
    shapes
});

/// Outcome of analysing the first row of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderAnalysis {
    /// Final, unique column names
    pub names: Vec<String>,
    /// Whether the analysed row must be loaded as data
    pub first_row_is_data: bool,
}

/// Whether a single field looks like a column label.
pub fn is_header_like(field: &str) -> bool {
    let text = field.trim();
    if text.is_empty() {
        return false;
    }
    if text.parse::<f64>().is_ok() {
        return false;
    }
    if DATE_SHAPES.iter().any(|re| re.is_match(text)) {
        return false;
    }

    let mut letters = 0usize;
    let mut others = 0usize;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            letters += 1;
        } else if !ch.is_whitespace() {
            others += 1;
        }
    }
    let total = letters + others;
    letters > 0 && letters as f64 / total as f64 >= LETTER_DENSITY
}

/// Decides whether `first_row` is a header and derives the column names.
pub fn analyze_header(first_row: &[String]) -> HeaderAnalysis {
    if first_row.is_empty() {
        return HeaderAnalysis {
            names: Vec::new(),
            first_row_is_data: false,
        };
    }

    let header_like = first_row.iter().filter(|f| is_header_like(f)).count();
    let is_header = header_like as f64 / first_row.len() as f64 >= HEADER_MAJORITY;

    let names: Vec<String> = if is_header {
        first_row
            .iter()
            .enumerate()
            .map(|(i, field)| clean_header_name(field, i))
            .collect()
    } else {
        (0..first_row.len()).map(synthetic_name).collect()
    };

    HeaderAnalysis {
        names: deduplicate(names),
        first_row_is_data: !is_header,
    }
}

/// Synthetic name of the column at zero-based `index`.
pub fn synthetic_name(index: usize) -> String {
    format!("column_{}", index + 1)
}

/// Sanitizes one label, falling back to a synthetic name when nothing usable
/// remains. Names are lowercased.
pub fn clean_header_name(field: &str, index: usize) -> String {
    let trimmed = field.trim();
    let cleaned = sanitize_identifier(trimmed);
    if cleaned.is_empty() || !is_header_like(trimmed) {
        return synthetic_name(index);
    }
    cleaned.to_lowercase()
}

/// Makes names unique by appending `_1`, `_2`, ... to repeats.
pub fn deduplicate(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(names.len());
    names
        .into_iter()
        .map(|name| {
            let mut candidate = name.clone();
            let mut counter = 1;
            while seen.contains(&candidate) {
                candidate = format!("{name}_{counter}");
                counter += 1;
            }
            seen.insert(candidate.clone());
            candidate
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_header_like_fields() {
        assert!(is_header_like("name"));
        assert!(is_header_like("Order Date"));
        assert!(is_header_like("col1"));
        assert!(!is_header_like(""));
        assert!(!is_header_like("1.99"));
        assert!(!is_header_like("2024-01-01"));
        assert!(!is_header_like("01.02.2024"));
        assert!(!is_header_like("2024-01-01 10:00:00.5"));
        assert!(!is_header_like("#1234567"));
    }

    #[test]
    fn test_detects_header_row() {
        let analysis = analyze_header(&row(&["id", "Name", "Age", "Date"]));
        assert!(!analysis.first_row_is_data);
        assert_eq!(analysis.names, vec!["id", "name", "age", "date"]);
    }

    #[test]
    fn test_headerless_row_gets_synthetic_names() {
        let analysis = analyze_header(&row(&["Apple", "1.99", "100", "2024-01-01"]));
        assert!(analysis.first_row_is_data);
        assert_eq!(
            analysis.names,
            vec!["column_1", "column_2", "column_3", "column_4"]
        );
    }

    #[test]
    fn test_half_header_like_is_header() {
        let analysis = analyze_header(&row(&["name", "42"]));
        assert!(!analysis.first_row_is_data);
        assert_eq!(analysis.names, vec!["name", "column_2"]);
    }

    #[test]
    fn test_cleaning_and_fallbacks() {
        assert_eq!(clean_header_name("  First Name ", 0), "first_name");
        assert_eq!(clean_header_name("", 2), "column_3");
        assert_eq!(clean_header_name("Имя", 1), "column_2");
        assert_eq!(clean_header_name("Total ($)", 0), "total");
    }

    #[test]
    fn test_deduplicate_names() {
        let names = deduplicate(row(&["a", "a", "b", "a", "a_1"]));
        assert_eq!(names, vec!["a", "a_1", "b", "a_2", "a_1_1"]);
    }

    #[test]
    fn test_empty_row() {
        let analysis = analyze_header(&[]);
        assert!(analysis.names.is_empty());
    }
}
