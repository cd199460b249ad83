//! Typed parsing of raw CSV fields.

use chrono::{NaiveDate, NaiveDateTime};

use super::TypeTag;

const DATETIME_FRACTION_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// A field value after the first successful typed parse.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedValue {
    Empty,
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Text(String),
}

impl ParsedValue {
    /// Lattice tag of the parsed value.
    pub fn type_tag(&self) -> TypeTag {
        match self {
            ParsedValue::Empty => TypeTag::Empty,
            ParsedValue::DateTime(_) => TypeTag::DateTime,
            ParsedValue::Date(_) => TypeTag::Date,
            ParsedValue::Unsigned(_) | ParsedValue::Signed(_) => TypeTag::Integer,
            ParsedValue::Float(_) => TypeTag::Float,
            ParsedValue::Text(_) => TypeTag::String,
        }
    }
}

/// Parses a field, trying the lattice types from most to least specific.
///
/// The order is fractional datetime, whole-second datetime, date, unsigned
/// integer, signed integer, float, and finally text. Surrounding whitespace is
/// ignored and a blank field is [`ParsedValue::Empty`]. Floats must be finite,
/// so words like `NaN` or `inf` stay text.
pub fn parse_value(raw: &str) -> ParsedValue {
    let value = raw.trim();
    if value.is_empty() {
        return ParsedValue::Empty;
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, DATETIME_FRACTION_FORMAT) {
        return ParsedValue::DateTime(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, DATETIME_FORMAT) {
        return ParsedValue::DateTime(dt);
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, DATE_FORMAT) {
        return ParsedValue::Date(date);
    }
    if let Ok(n) = value.parse::<u64>() {
        return ParsedValue::Unsigned(n);
    }
    if let Ok(n) = value.parse::<i64>() {
        return ParsedValue::Signed(n);
    }
    match value.parse::<f64>() {
        Ok(f) if f.is_finite() => ParsedValue::Float(f),
        _ => ParsedValue::Text(value.to_string()),
    }
}

/// Canonical text for a datetime, as loaded into `TIMESTAMP` columns.
pub fn format_datetime(value: &NaiveDateTime) -> String {
    value.format(DATETIME_FRACTION_FORMAT).to_string()
}

/// Canonical text for a date, as loaded into `DATE` columns.
pub fn format_date(value: &NaiveDate) -> String {
    value.format(DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_order() {
        assert_eq!(parse_value("").type_tag(), TypeTag::Empty);
        assert_eq!(parse_value("   ").type_tag(), TypeTag::Empty);
        assert_eq!(
            parse_value("2024-01-01 10:30:00.250").type_tag(),
            TypeTag::DateTime
        );
        assert_eq!(
            parse_value("2024-01-01 10:30:00").type_tag(),
            TypeTag::DateTime
        );
        assert_eq!(parse_value("2024-01-01").type_tag(), TypeTag::Date);
        assert_eq!(parse_value("42"), ParsedValue::Unsigned(42));
        assert_eq!(parse_value("-42"), ParsedValue::Signed(-42));
        assert_eq!(parse_value("1.99"), ParsedValue::Float(1.99));
        assert_eq!(parse_value(" Apple "), ParsedValue::Text("Apple".to_string()));
    }

    #[test]
    fn test_non_finite_floats_are_text() {
        assert_eq!(parse_value("NaN").type_tag(), TypeTag::String);
        assert_eq!(parse_value("inf").type_tag(), TypeTag::String);
        assert_eq!(parse_value("1e3").type_tag(), TypeTag::Float);
    }

    #[test]
    fn test_invalid_dates_fall_through() {
        assert_eq!(parse_value("2024-13-01").type_tag(), TypeTag::String);
        assert_eq!(parse_value("01/02/2024").type_tag(), TypeTag::String);
    }

    #[test]
    fn test_canonical_rendering() {
        let ParsedValue::DateTime(dt) = parse_value("2024-03-05 07:08:09") else {
            panic!("expected datetime");
        };
        assert_eq!(format_datetime(&dt), "2024-03-05 07:08:09");

        let ParsedValue::DateTime(frac) = parse_value("2024-03-05 07:08:09.5") else {
            panic!("expected datetime");
        };
        assert_eq!(format_datetime(&frac), "2024-03-05 07:08:09.500");

        let ParsedValue::Date(date) = parse_value("2024-03-05") else {
            panic!("expected date");
        };
        assert_eq!(format_date(&date), "2024-03-05");
    }
}
