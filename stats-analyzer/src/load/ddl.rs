//! DDL synthesis and relation naming.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::schema::{RelationManifest, KEY_COLUMN};
use crate::security::{quote_identifier, sanitize_identifier, MAX_IDENTIFIER_LENGTH};

/// Columns contributing to the readable part of a relation name.
const NAME_COLUMNS: usize = 3;

/// Hex characters of the fingerprint appended to a relation name.
pub const FINGERPRINT_LENGTH: usize = 6;

/// Fingerprint of a file's content together with its column names.
///
/// Hashes the raw bytes followed by each sanitized column name, so the same
/// upload always maps to the same relation while different data does not.
pub fn fingerprint(path: &Path, manifest: &RelationManifest) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut file = File::open(path)?;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    for name in manifest.column_names() {
        hasher.update(sanitize_identifier(name).as_bytes());
        hasher.update([0u8]);
    }
    let hash = hasher.finalize();
    Ok(hex::encode(hash)[..FINGERPRINT_LENGTH].to_string())
}

/// Derives the relation name from the first columns and a fingerprint.
///
/// ```rust
/// use stats_analyzer::load::ddl::relation_name;
/// use stats_analyzer::schema::{ColumnInfo, RelationManifest, TypeTag};
///
/// let manifest = RelationManifest::new(
///     ["id", "name", "age", "date"]
///         .iter()
///         .map(|n| ColumnInfo::new(*n, TypeTag::String, false))
///         .collect(),
///     false,
/// );
/// assert_eq!(relation_name(&manifest, "a1b2c3"), "id_name_age_a1b2c3");
/// ```
pub fn relation_name(manifest: &RelationManifest, fingerprint: &str) -> String {
    let prefix = manifest
        .column_names()
        .map(sanitize_identifier)
        .filter(|name| !name.is_empty())
        .take(NAME_COLUMNS)
        .collect::<Vec<_>>()
        .join("_");

    // leave room for "_" and the fingerprint; sanitized names are ASCII
    let budget = MAX_IDENTIFIER_LENGTH - FINGERPRINT_LENGTH - 1;
    let prefix = prefix[..prefix.len().min(budget)].trim_end_matches('_');
    if prefix.is_empty() {
        format!("data_{fingerprint}")
    } else {
        format!("{prefix}_{fingerprint}")
    }
}

/// Builds the `CREATE TABLE` statement for a manifest.
///
/// Without an explicit `id` column a surrogate `id BIGINT UNSIGNED NOT NULL`
/// is prepended and declared the primary key.
pub fn create_table_statement(relation: &str, manifest: &RelationManifest) -> String {
    let mut definitions = Vec::with_capacity(manifest.len() + 2);
    if !manifest.has_explicit_key {
        definitions.push(format!(
            "{} BIGINT UNSIGNED NOT NULL",
            quote_identifier(KEY_COLUMN)
        ));
    }
    for column in &manifest.columns {
        let mut definition = format!(
            "{} {}",
            quote_identifier(&column.name),
            column.type_tag.sql_type()
        );
        if column.nullable {
            definition.push_str(" NULL");
        }
        definitions.push(definition);
    }
    if !manifest.has_explicit_key {
        definitions.push(format!("PRIMARY KEY ({})", quote_identifier(KEY_COLUMN)));
    }

    format!(
        "CREATE TABLE {} ({})",
        quote_identifier(relation),
        definitions.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnInfo, TypeTag};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn manifest(columns: &[(&str, TypeTag, bool)], first_row_is_data: bool) -> RelationManifest {
        RelationManifest::new(
            columns
                .iter()
                .map(|(n, t, null)| ColumnInfo::new(*n, *t, *null))
                .collect(),
            first_row_is_data,
        )
    }

    #[test]
    fn test_ddl_with_explicit_key() {
        let m = manifest(
            &[
                ("id", TypeTag::Integer, false),
                ("name", TypeTag::String, true),
                ("date", TypeTag::Date, false),
            ],
            false,
        );
        assert_eq!(
            create_table_statement("t_abc123", &m),
            "CREATE TABLE \"t_abc123\" (\"id\" BIGINT, \"name\" VARCHAR NULL, \"date\" DATE)"
        );
    }

    #[test]
    fn test_ddl_with_surrogate_key() {
        let m = manifest(
            &[
                ("column_1", TypeTag::String, false),
                ("column_2", TypeTag::Float, false),
            ],
            true,
        );
        assert_eq!(
            create_table_statement("t", &m),
            "CREATE TABLE \"t\" (\"id\" BIGINT UNSIGNED NOT NULL, \"column_1\" VARCHAR, \
             \"column_2\" DOUBLE, PRIMARY KEY (\"id\"))"
        );
    }

    #[test]
    fn test_relation_name_is_bounded() {
        let long = "x".repeat(200);
        let m = manifest(&[(long.as_str(), TypeTag::String, false)], false);
        let name = relation_name(&m, "abcdef");
        assert!(name.len() <= MAX_IDENTIFIER_LENGTH);
        assert!(name.ends_with("_abcdef"));

        let unnamed = manifest(&[("???", TypeTag::String, false)], false);
        assert_eq!(relation_name(&unnamed, "abcdef"), "data_abcdef");
    }

    #[test]
    fn test_fingerprint_is_reproducible() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "a,b\n1,2").unwrap();
        let m = manifest(&[("a", TypeTag::Integer, false), ("b", TypeTag::Integer, false)], false);

        let first = fingerprint(file.path(), &m).unwrap();
        let second = fingerprint(file.path(), &m).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), FINGERPRINT_LENGTH);

        let renamed = manifest(&[("a", TypeTag::Integer, false), ("c", TypeTag::Integer, false)], false);
        assert_ne!(first, fingerprint(file.path(), &renamed).unwrap());

        let mut other = NamedTempFile::new().unwrap();
        writeln!(other, "a,b\n1,3").unwrap();
        assert_ne!(first, fingerprint(other.path(), &m).unwrap());
    }
}
