//! Column manifests and the type lattice.
//!
//! A [`RelationManifest`] is produced once by the
//! [`SchemaInferenceEngine`](inference::SchemaInferenceEngine) and is read-only
//! afterwards; both the loader and the query compiler are driven by it.

pub mod header;
pub mod inference;
pub mod value;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use header::{analyze_header, HeaderAnalysis};
pub use inference::{SchemaInferenceEngine, SchemaInferenceEngineBuilder};
pub use value::{parse_value, ParsedValue};

/// Name of the key column, whether explicit in the file or synthesized.
pub const KEY_COLUMN: &str = "id";

/// Inferred column type, ordered by generality.
///
/// `Empty < DateTime < Date < Integer < Float < String`. The derived `Ord`
/// follows declaration order, which is the lattice order, so the join of two
/// tags is simply their maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    /// No non-empty value observed yet
    Empty,
    /// Date and time of day, optionally with fractional seconds
    DateTime,
    /// Calendar date
    Date,
    /// Signed 64-bit integer
    Integer,
    /// Double precision float
    Float,
    /// Opaque text
    String,
}

impl TypeTag {
    /// Least upper bound of two tags.
    pub fn join(self, other: TypeTag) -> TypeTag {
        self.max(other)
    }

    /// Position of the tag in the lattice, starting at 0 for `Empty`.
    pub fn rank(self) -> u8 {
        self as u8
    }

    /// Whether the tag resolves to a numeric SQL type.
    pub fn is_numeric(self) -> bool {
        matches!(self, TypeTag::Integer | TypeTag::Float)
    }

    /// Whether the tag resolves to a temporal SQL type.
    pub fn is_temporal(self) -> bool {
        matches!(self, TypeTag::DateTime | TypeTag::Date)
    }

    /// Whether loaded values of this type are quoted.
    pub fn is_quoted(self) -> bool {
        matches!(self, TypeTag::DateTime | TypeTag::Date | TypeTag::String)
    }

    /// SQL type used in generated DDL.
    ///
    /// `Empty` never survives inference; it maps to the string type.
    pub fn sql_type(self) -> &'static str {
        match self {
            TypeTag::DateTime => "TIMESTAMP",
            TypeTag::Date => "DATE",
            TypeTag::Integer => "BIGINT",
            TypeTag::Float => "DOUBLE",
            TypeTag::Empty | TypeTag::String => "VARCHAR",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeTag::Empty => "empty",
            TypeTag::DateTime => "datetime",
            TypeTag::Date => "date",
            TypeTag::Integer => "integer",
            TypeTag::Float => "float",
            TypeTag::String => "string",
        };
        f.write_str(name)
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Sanitized, deduplicated identifier
    pub name: String,
    /// Final lattice type
    pub type_tag: TypeTag,
    /// Whether an empty value was seen in the sample
    pub nullable: bool,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, type_tag: TypeTag, nullable: bool) -> Self {
        Self {
            name: name.into(),
            type_tag,
            nullable,
        }
    }
}

/// Ordered column list of one data set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationManifest {
    pub columns: Vec<ColumnInfo>,
    /// True when a column literally named `id` exists
    pub has_explicit_key: bool,
    /// True when the first file row was data and names were synthesized
    pub first_row_is_data: bool,
}

impl RelationManifest {
    /// Builds a manifest, deriving `has_explicit_key` from the column names.
    pub fn new(columns: Vec<ColumnInfo>, first_row_is_data: bool) -> Self {
        let has_explicit_key = columns.iter().any(|c| c.name == KEY_COLUMN);
        Self {
            columns,
            has_explicit_key,
            first_row_is_data,
        }
    }

    /// Column names in manifest order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Looks a column up by name.
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lattice_order() {
        let ordered = [
            TypeTag::Empty,
            TypeTag::DateTime,
            TypeTag::Date,
            TypeTag::Integer,
            TypeTag::Float,
            TypeTag::String,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0].join(pair[1]), pair[1]);
            assert_eq!(pair[1].join(pair[0]), pair[1]);
        }
        assert_eq!(TypeTag::Empty.rank(), 0);
        assert_eq!(TypeTag::String.rank(), 5);
    }

    #[test]
    fn test_sql_types() {
        assert_eq!(TypeTag::DateTime.sql_type(), "TIMESTAMP");
        assert_eq!(TypeTag::Integer.sql_type(), "BIGINT");
        assert_eq!(TypeTag::Empty.sql_type(), "VARCHAR");
        assert!(TypeTag::Date.is_quoted());
        assert!(!TypeTag::Float.is_quoted());
    }

    #[test]
    fn test_manifest_detects_explicit_key() {
        let manifest = RelationManifest::new(
            vec![
                ColumnInfo::new("id", TypeTag::Integer, false),
                ColumnInfo::new("name", TypeTag::String, false),
            ],
            false,
        );
        assert!(manifest.has_explicit_key);
        assert_eq!(manifest.column("name").map(|c| c.type_tag), Some(TypeTag::String));

        let keyless =
            RelationManifest::new(vec![ColumnInfo::new("ident", TypeTag::Integer, false)], true);
        assert!(!keyless.has_explicit_key);
    }
}
