//! Batched bulk loading of a CSV file into a freshly created relation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::ddl::{create_table_statement, fingerprint, relation_name};
use crate::config::PipelineConfig;
use crate::error::{Result, StatsError};
use crate::log_data_op;
use crate::logging::LogConfig;
use crate::schema::value::{format_date, format_datetime};
use crate::schema::{parse_value, ParsedValue, RelationManifest, TypeTag};
use crate::security::{quote_identifier, quote_literal, sanitize_identifier};
use crate::sources::{normalize_row, CsvSource};
use crate::store::AnalyticalStore;

/// Summary of a completed load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub relation: String,
    pub rows_loaded: u64,
    pub batches: u64,
    /// Values that did not parse as their column type and were loaded as NULL
    pub rejected_values: u64,
    /// Rows that had more fields than the header
    pub truncated_rows: u64,
    pub has_explicit_key: bool,
}

/// Loads files into the store according to a manifest.
#[derive(Debug, Clone)]
pub struct BulkLoader {
    store: Arc<dyn AnalyticalStore>,
    batch_size: usize,
    sanitize_strings: bool,
    log: LogConfig,
}

impl BulkLoader {
    /// Rows per load statement unless configured otherwise.
    pub const DEFAULT_BATCH_SIZE: usize = 5_000;

    pub fn new(store: Arc<dyn AnalyticalStore>) -> Self {
        Self {
            store,
            batch_size: Self::DEFAULT_BATCH_SIZE,
            sanitize_strings: true,
            log: LogConfig::default(),
        }
    }

    pub fn from_config(store: Arc<dyn AnalyticalStore>, config: &PipelineConfig) -> Self {
        Self {
            store,
            batch_size: config.batch_size.max(1),
            sanitize_strings: config.sanitize_strings,
            log: config.log.clone(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_sanitize_strings(mut self, enable: bool) -> Self {
        self.sanitize_strings = enable;
        self
    }

    /// Creates the relation for `manifest` and streams every data row of
    /// `source` into it.
    ///
    /// The file is reopened from the start. An existing relation with the
    /// same derived name is dropped first. If a batch fails, the batches
    /// before it stay committed and [`StatsError::LoadInterrupted`] reports
    /// how many rows they hold.
    #[instrument(skip(self, source, manifest), fields(path = %source.path().display()))]
    pub async fn load(&self, source: &CsvSource, manifest: &RelationManifest) -> Result<LoadReport> {
        if manifest.is_empty() {
            return Err(StatsError::empty_input("manifest has no columns"));
        }

        let mut reader = source.reader()?;
        let mut records = reader.records();
        if !manifest.first_row_is_data {
            // header row
            records.next().transpose()?;
        }
        let Some(first) = records.next().transpose()? else {
            return Err(StatsError::empty_input("file has no data rows to load"));
        };

        let path = source.path().to_path_buf();
        let hash_manifest = manifest.clone();
        let digest = tokio::task::spawn_blocking(move || fingerprint(&path, &hash_manifest))
            .await
            .map_err(|e| StatsError::Internal(format!("Fingerprint task failed: {e}")))??;
        let relation = relation_name(manifest, &digest);

        self.store.drop_relation(&relation).await?;
        self.store
            .execute(&create_table_statement(&relation, manifest))
            .await?;
        info!(relation = %relation, columns = manifest.len(), "Created relation");

        let mut report = LoadReport {
            relation: relation.clone(),
            rows_loaded: 0,
            batches: 0,
            rejected_values: 0,
            truncated_rows: 0,
            has_explicit_key: manifest.has_explicit_key,
        };
        let mut batch: Vec<String> = Vec::with_capacity(self.batch_size);
        let mut counter = 0u64;

        for record in std::iter::once(Ok(first)).chain(records) {
            let record = record?;
            let mut fields: Vec<String> = record.iter().map(str::to_string).collect();
            if normalize_row(&mut fields, manifest.len()) > 0 {
                report.truncated_rows += 1;
            }

            counter += 1;
            let key = (!manifest.has_explicit_key).then_some(counter);
            let (row, rejected) = render_row(manifest, key, &fields, self.sanitize_strings);
            report.rejected_values += rejected;
            batch.push(row);

            if batch.len() >= self.batch_size {
                self.flush(&relation, &mut batch, &mut report).await?;
            }
        }
        if !batch.is_empty() {
            self.flush(&relation, &mut batch, &mut report).await?;
        }

        if report.truncated_rows > 0 {
            warn!(
                relation = %relation,
                rows = report.truncated_rows,
                "Rows wider than the header were truncated"
            );
        }
        if report.rejected_values > 0 {
            warn!(
                relation = %relation,
                values = report.rejected_values,
                "Values not matching their column type were loaded as NULL"
            );
        }
        info!(
            relation = %relation,
            rows = report.rows_loaded,
            batches = report.batches,
            "Completed bulk load"
        );
        Ok(report)
    }

    async fn flush(
        &self,
        relation: &str,
        batch: &mut Vec<String>,
        report: &mut LoadReport,
    ) -> Result<()> {
        let rows = batch.len() as u64;
        let statement = insert_statement(relation, batch);
        batch.clear();

        if let Err(source) = self.store.execute(&statement).await {
            return Err(StatsError::LoadInterrupted {
                relation: relation.to_string(),
                committed_rows: report.rows_loaded,
                source: Box::new(source),
            });
        }
        report.rows_loaded += rows;
        report.batches += 1;
        log_data_op!(
            self.log,
            relation = %relation,
            batch = report.batches,
            rows_loaded = report.rows_loaded,
            "Flushed load batch"
        );
        Ok(())
    }
}

/// `INSERT` statement for rendered rows.
pub fn insert_statement(relation: &str, rows: &[String]) -> String {
    let mut statement = format!("INSERT INTO {} VALUES ", quote_identifier(relation));
    for (idx, row) in rows.iter().enumerate() {
        if idx > 0 {
            statement.push_str(", ");
        }
        statement.push('(');
        statement.push_str(row);
        statement.push(')');
    }
    statement
}

/// Renders one record as comma-separated SQL literals.
///
/// `key` is the surrogate counter, prepended when present. Returns the
/// rendered row and the number of rejected values.
pub fn render_row(
    manifest: &RelationManifest,
    key: Option<u64>,
    fields: &[String],
    sanitize_strings: bool,
) -> (String, u64) {
    let mut parts = Vec::with_capacity(manifest.len() + 1);
    if let Some(key) = key {
        parts.push(key.to_string());
    }
    let mut rejected = 0;
    for (column, raw) in manifest.columns.iter().zip(fields) {
        match render_value(raw, column.type_tag, sanitize_strings) {
            Some(literal) => parts.push(literal),
            None => {
                rejected += 1;
                parts.push("NULL".to_string());
            }
        }
    }
    (parts.join(","), rejected)
}

/// Renders a raw field as a literal of the column type.
///
/// Blank fields are `NULL`. Returns `None` when the value cannot be
/// represented in the column type.
pub fn render_value(raw: &str, type_tag: TypeTag, sanitize_strings: bool) -> Option<String> {
    let parsed = parse_value(raw);
    if parsed == ParsedValue::Empty {
        return Some("NULL".to_string());
    }
    match type_tag {
        TypeTag::Empty | TypeTag::String => {
            let text = raw.trim();
            let text = if sanitize_strings {
                sanitize_identifier(text)
            } else {
                text.to_string()
            };
            Some(quote_literal(&text))
        }
        TypeTag::Integer => match parsed {
            ParsedValue::Unsigned(n) => i64::try_from(n).ok().map(|n| n.to_string()),
            ParsedValue::Signed(n) => Some(n.to_string()),
            _ => None,
        },
        TypeTag::Float => match parsed {
            ParsedValue::Unsigned(n) => Some(n.to_string()),
            ParsedValue::Signed(n) => Some(n.to_string()),
            ParsedValue::Float(f) => Some(format!("{f:?}")),
            _ => None,
        },
        TypeTag::Date => match parsed {
            ParsedValue::Date(d) => Some(quote_literal(&format_date(&d))),
            ParsedValue::DateTime(dt) => Some(quote_literal(&format_date(&dt.date()))),
            _ => None,
        },
        TypeTag::DateTime => match parsed {
            ParsedValue::DateTime(dt) => Some(quote_literal(&format_datetime(&dt))),
            ParsedValue::Date(d) => d
                .and_hms_opt(0, 0, 0)
                .map(|dt| quote_literal(&format_datetime(&dt))),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnInfo, SchemaInferenceEngine};
    use crate::store::{DataFusionStore, StoreRow, StoreValue};
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fields(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn headerless_manifest() -> RelationManifest {
        RelationManifest::new(
            vec![
                ColumnInfo::new("column_1", TypeTag::String, false),
                ColumnInfo::new("column_2", TypeTag::Float, false),
                ColumnInfo::new("column_3", TypeTag::Integer, false),
                ColumnInfo::new("column_4", TypeTag::Date, false),
            ],
            true,
        )
    }

    #[test]
    fn test_render_row_with_surrogate_key() {
        let (row, rejected) = render_row(
            &headerless_manifest(),
            Some(1),
            &fields(&["Apple", "1.99", "100", "2024-01-01"]),
            true,
        );
        assert_eq!(row, "1,'Apple',1.99,100,'2024-01-01'");
        assert_eq!(rejected, 0);
    }

    #[test]
    fn test_render_row_rejects_mismatches() {
        let (row, rejected) = render_row(
            &headerless_manifest(),
            None,
            &fields(&["", "cheap", "1.5", "yesterday"]),
            true,
        );
        assert_eq!(row, "NULL,NULL,NULL,NULL");
        assert_eq!(rejected, 3);
    }

    #[test]
    fn test_render_strings() {
        assert_eq!(
            render_value("O'Brien & Sons", TypeTag::String, true),
            Some("'O_Brien_Sons'".to_string())
        );
        assert_eq!(
            render_value("O'Brien", TypeTag::String, false),
            Some("'O''Brien'".to_string())
        );
    }

    #[test]
    fn test_render_numbers_and_dates() {
        assert_eq!(render_value("100", TypeTag::Float, true), Some("100".to_string()));
        assert_eq!(render_value("2.50", TypeTag::Float, true), Some("2.5".to_string()));
        assert_eq!(render_value("-3", TypeTag::Integer, true), Some("-3".to_string()));
        assert_eq!(render_value("18446744073709551615", TypeTag::Integer, true), None);
        assert_eq!(
            render_value("2024-01-01 10:00:00", TypeTag::Date, true),
            Some("'2024-01-01'".to_string())
        );
        assert_eq!(
            render_value("2024-01-01", TypeTag::DateTime, true),
            Some("'2024-01-01 00:00:00'".to_string())
        );
    }

    #[test]
    fn test_insert_statement() {
        let statement = insert_statement("rel", &fields(&["1,'a'", "2,'b'"]));
        assert_eq!(statement, "INSERT INTO \"rel\" VALUES (1,'a'), (2,'b')");
    }

    /// Store that accepts a fixed number of `INSERT`s and rejects the rest.
    #[derive(Debug)]
    struct InsertLimitStore {
        inner: DataFusionStore,
        inserts_left: AtomicUsize,
    }

    #[async_trait]
    impl AnalyticalStore for InsertLimitStore {
        async fn execute(&self, statement: &str) -> Result<()> {
            if statement.starts_with("INSERT") {
                let accepted = self
                    .inserts_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                if !accepted {
                    return Err(StatsError::store(statement, "insert limit reached"));
                }
            }
            self.inner.execute(statement).await
        }

        async fn query(&self, statement: &str) -> Result<Vec<StoreRow>> {
            self.inner.query(statement).await
        }

        async fn describe(&self, relation: &str) -> Result<Vec<ColumnInfo>> {
            self.inner.describe(relation).await
        }
    }

    #[tokio::test]
    async fn test_failed_batch_keeps_committed_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"name,qty\napple,3\npear,4\nplum,5\n").unwrap();
        file.flush().unwrap();

        let source = CsvSource::new(file.path()).unwrap();
        let manifest = SchemaInferenceEngine::new().infer_source(&source).unwrap();
        let store = Arc::new(InsertLimitStore {
            inner: DataFusionStore::new(),
            inserts_left: AtomicUsize::new(1),
        });

        let err = BulkLoader::new(store.clone())
            .with_batch_size(1)
            .load(&source, &manifest)
            .await
            .unwrap_err();
        let relation = match err {
            StatsError::LoadInterrupted {
                relation,
                committed_rows,
                source,
            } => {
                assert_eq!(committed_rows, 1);
                assert!(source.is_store_error());
                relation
            }
            other => panic!("expected an interrupted load, got {other:?}"),
        };

        let rows = store
            .query(&format!("SELECT COUNT(*) AS \"c\" FROM {}", quote_identifier(&relation)))
            .await
            .unwrap();
        assert_eq!(rows[0].get("c").and_then(StoreValue::as_u64), Some(1));
    }
}
