//! Compilation of aggregate queries from a relation manifest.
//!
//! Compilation runs in two phases. [`AggregateQueryCompiler::compile`] builds
//! the count, uniqueness, numeric and date queries, which only need the
//! manifest. [`AggregateQueryCompiler::compile_frequency`] needs the distinct
//! counts returned by the uniqueness query to pick categorical columns.
//!
//! Numeric projections are flattened: each aggregate is aliased
//! `<statistic>__<column>` (see [`StatField::key_for`]) so one result row
//! carries every column's statistics.

use std::collections::HashMap;

use tracing::{debug, instrument};

use super::{FrequencyOrder, Granularity, StatField};
use crate::config::PipelineConfig;
use crate::schema::{ColumnInfo, RelationManifest, TypeTag, KEY_COLUMN};
use crate::security::quote_identifier;

/// Columns never profiled.
pub const EXCLUDED_COLUMNS: [&str; 2] = [KEY_COLUMN, "slug"];

/// Output alias of the truncated timestamp in date queries.
pub const BUCKET_ALIAS: &str = "__bucket";
/// Output alias of group sizes in date and frequency queries.
pub const COUNT_ALIAS: &str = "__count";
/// Output alias of the grouped value in single-column frequency queries.
pub const VALUE_ALIAS: &str = "__value";
/// Output alias of the global row count.
pub const TOTAL_ALIAS: &str = "count";

/// What a compiled query computes, and therefore how its rows are read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Count,
    Uniq,
    Numeric,
    Dates {
        column: String,
        granularity: Granularity,
    },
    Frequency {
        columns: Vec<String>,
        order: FrequencyOrder,
    },
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryKind::Count => f.write_str("count"),
            QueryKind::Uniq => f.write_str("uniq"),
            QueryKind::Numeric => f.write_str("numeric"),
            QueryKind::Dates {
                column,
                granularity,
            } => write!(f, "dates({column}, {granularity})"),
            QueryKind::Frequency { columns, order } => {
                write!(f, "frequency({}, {})", columns.join("+"), order.as_str())
            }
        }
    }
}

/// A query string with its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub kind: QueryKind,
    pub statement: String,
}

impl CompiledQuery {
    fn new(kind: QueryKind, statement: String) -> Self {
        Self { kind, statement }
    }
}

/// Builds aggregate SQL for a loaded relation.
#[derive(Debug, Clone)]
pub struct AggregateQueryCompiler {
    frequency_limit: usize,
    cardinality_window: (u64, u64),
    extended_quantiles: bool,
}

impl Default for AggregateQueryCompiler {
    fn default() -> Self {
        Self {
            frequency_limit: 10,
            cardinality_window: (1, 1_000),
            extended_quantiles: false,
        }
    }
}

impl AggregateQueryCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            frequency_limit: config.frequency_limit,
            cardinality_window: config.cardinality_window,
            extended_quantiles: config.extended_quantiles,
        }
    }

    pub fn with_frequency_limit(mut self, limit: usize) -> Self {
        self.frequency_limit = limit.max(1);
        self
    }

    pub fn with_cardinality_window(mut self, low: u64, high: u64) -> Self {
        self.cardinality_window = (low, high);
        self
    }

    pub fn with_extended_quantiles(mut self, enable: bool) -> Self {
        self.extended_quantiles = enable;
        self
    }

    /// Columns that receive statistics, in manifest order.
    pub fn stat_columns<'a>(&self, manifest: &'a RelationManifest) -> Vec<&'a ColumnInfo> {
        manifest
            .columns
            .iter()
            .filter(|c| !EXCLUDED_COLUMNS.contains(&c.name.as_str()))
            .collect()
    }

    /// Statistics computed for every numeric column, in projection order.
    pub fn numeric_fields(&self) -> Vec<StatField> {
        let mut fields = vec![StatField::Quantile001, StatField::Quantile099];
        if self.extended_quantiles {
            fields.extend([StatField::Quantile01, StatField::Quantile09]);
        }
        fields.extend([
            StatField::Median,
            StatField::Avg,
            StatField::Max,
            StatField::Min,
        ]);
        fields
    }

    /// Count, uniqueness, numeric and date queries for a relation.
    #[instrument(skip(self, manifest), fields(columns = manifest.len()))]
    pub fn compile(&self, manifest: &RelationManifest, relation: &str) -> Vec<CompiledQuery> {
        let mut queries = vec![self.count_query(relation)];
        queries.extend(self.uniq_query(manifest, relation));
        queries.extend(self.numeric_query(manifest, relation));
        queries.extend(self.date_queries(manifest, relation));
        debug!(queries = queries.len(), "Compiled base queries");
        queries
    }

    /// Global row count.
    pub fn count_query(&self, relation: &str) -> CompiledQuery {
        CompiledQuery::new(
            QueryKind::Count,
            format!(
                "SELECT COUNT(*) AS {} FROM {}",
                quote_identifier(TOTAL_ALIAS),
                quote_identifier(relation)
            ),
        )
    }

    /// Distinct count of every profiled column.
    pub fn uniq_query(&self, manifest: &RelationManifest, relation: &str) -> Option<CompiledQuery> {
        let projections: Vec<String> = self
            .stat_columns(manifest)
            .iter()
            .map(|c| {
                format!(
                    "COUNT(DISTINCT {}) AS {}",
                    quote_identifier(&c.name),
                    quote_identifier(&StatField::Uniq.key_for(&c.name))
                )
            })
            .collect();
        if projections.is_empty() {
            return None;
        }
        Some(CompiledQuery::new(
            QueryKind::Uniq,
            format!(
                "SELECT {} FROM {}",
                projections.join(", "),
                quote_identifier(relation)
            ),
        ))
    }

    /// Flattened numeric aggregates of every numeric column.
    pub fn numeric_query(
        &self,
        manifest: &RelationManifest,
        relation: &str,
    ) -> Option<CompiledQuery> {
        let projections = self.numeric_projections(manifest);
        if projections.is_empty() {
            return None;
        }
        Some(CompiledQuery::new(
            QueryKind::Numeric,
            format!(
                "SELECT {} FROM {}",
                projections.join(", "),
                quote_identifier(relation)
            ),
        ))
    }

    /// One group-by query per temporal column and granularity.
    pub fn date_queries(&self, manifest: &RelationManifest, relation: &str) -> Vec<CompiledQuery> {
        let numeric = self.numeric_projections(manifest);
        let mut queries = Vec::new();
        for column in self.stat_columns(manifest) {
            if !column.type_tag.is_temporal() {
                continue;
            }
            let with_time = column.type_tag == TypeTag::DateTime;
            for &granularity in Granularity::for_datetime(with_time) {
                queries.push(self.date_query(relation, &column.name, granularity, &numeric));
            }
        }
        queries
    }

    fn date_query(
        &self,
        relation: &str,
        column: &str,
        granularity: Granularity,
        numeric: &[String],
    ) -> CompiledQuery {
        let quoted = quote_identifier(column);
        let bucket = format!(
            "CAST(date_trunc('{}', CAST({quoted} AS TIMESTAMP)) AS VARCHAR)",
            granularity.as_str()
        );
        let mut projections = vec![
            format!("{bucket} AS {}", quote_identifier(BUCKET_ALIAS)),
            format!("COUNT(*) AS {}", quote_identifier(COUNT_ALIAS)),
        ];
        projections.extend(numeric.iter().cloned());

        CompiledQuery::new(
            QueryKind::Dates {
                column: column.to_string(),
                granularity,
            },
            format!(
                "SELECT {} FROM {} WHERE {quoted} IS NOT NULL GROUP BY {bucket} ORDER BY {} DESC",
                projections.join(", "),
                quote_identifier(relation),
                quote_identifier(BUCKET_ALIAS)
            ),
        )
    }

    fn numeric_projections(&self, manifest: &RelationManifest) -> Vec<String> {
        let fields = self.numeric_fields();
        let mut projections = Vec::new();
        for column in self.stat_columns(manifest) {
            if !column.type_tag.is_numeric() {
                continue;
            }
            let quoted = quote_identifier(&column.name);
            for &field in &fields {
                projections.push(format!(
                    "{} AS {}",
                    aggregate_expression(field, &quoted),
                    quote_identifier(&field.key_for(&column.name))
                ));
            }
        }
        projections
    }

    /// String columns whose distinct count lies strictly inside the
    /// cardinality window.
    pub fn categorical_columns<'a>(
        &self,
        manifest: &'a RelationManifest,
        unique_counts: &HashMap<String, u64>,
    ) -> Vec<&'a ColumnInfo> {
        let (low, high) = self.cardinality_window;
        self.stat_columns(manifest)
            .into_iter()
            .filter(|c| c.type_tag == TypeTag::String)
            .filter(|c| {
                unique_counts
                    .get(&c.name)
                    .is_some_and(|&uniq| uniq > low && uniq < high)
            })
            .collect()
    }

    /// Frequency tables for categorical columns.
    ///
    /// Each categorical column gets a most-frequent and a least-frequent
    /// query. With two or more categorical columns, two more queries rank
    /// their value combinations.
    #[instrument(skip(self, manifest, unique_counts))]
    pub fn compile_frequency(
        &self,
        manifest: &RelationManifest,
        relation: &str,
        unique_counts: &HashMap<String, u64>,
    ) -> Vec<CompiledQuery> {
        let columns: Vec<String> = self
            .categorical_columns(manifest, unique_counts)
            .iter()
            .map(|c| c.name.clone())
            .collect();

        let mut queries = Vec::new();
        for column in &columns {
            for order in [FrequencyOrder::Top, FrequencyOrder::Rare] {
                queries.push(self.frequency_query(relation, std::slice::from_ref(column), order));
            }
        }
        if columns.len() >= 2 {
            for order in [FrequencyOrder::Top, FrequencyOrder::Rare] {
                queries.push(self.frequency_query(relation, &columns, order));
            }
        }
        debug!(
            categorical = columns.len(),
            queries = queries.len(),
            "Compiled frequency queries"
        );
        queries
    }

    fn frequency_query(
        &self,
        relation: &str,
        columns: &[String],
        order: FrequencyOrder,
    ) -> CompiledQuery {
        let quoted: Vec<String> = columns.iter().map(|c| quote_identifier(c)).collect();
        let count = quote_identifier(COUNT_ALIAS);
        let group_by = quoted.join(", ");

        let (select, tie_break) = if let [single] = quoted.as_slice() {
            let value = quote_identifier(VALUE_ALIAS);
            (format!("{single} AS {value}, COUNT(*) AS {count}"), value)
        } else {
            (format!("{group_by}, COUNT(*) AS {count}"), group_by.clone())
        };
        let (having, direction) = match order {
            FrequencyOrder::Top => ("", "DESC"),
            FrequencyOrder::Rare => (" HAVING COUNT(*) > 1", "ASC"),
        };

        CompiledQuery::new(
            QueryKind::Frequency {
                columns: columns.to_vec(),
                order,
            },
            format!(
                "SELECT {select} FROM {} GROUP BY {group_by}{having} \
                 ORDER BY {count} {direction}, {tie_break} LIMIT {}",
                quote_identifier(relation),
                self.frequency_limit
            ),
        )
    }
}

/// SQL aggregate computing `field` over an already quoted column.
///
/// Median and percentiles keep their input type, so they run over a
/// `DOUBLE` projection: an integer column must not truncate or wrap.
pub fn aggregate_expression(field: StatField, quoted_column: &str) -> String {
    let as_double = format!("CAST({quoted_column} AS DOUBLE)");
    let percentile =
        |q: &str| format!("APPROX_PERCENTILE_CONT({q}) WITHIN GROUP (ORDER BY {as_double})");
    match field {
        StatField::Quantile001 => percentile("0.01"),
        StatField::Quantile099 => percentile("0.99"),
        StatField::Quantile01 => percentile("0.1"),
        StatField::Quantile09 => percentile("0.9"),
        StatField::Median => format!("MEDIAN({as_double})"),
        StatField::Avg => format!("AVG({quoted_column})"),
        StatField::Max => format!("MAX({quoted_column})"),
        StatField::Min => format!("MIN({quoted_column})"),
        StatField::Count => format!("COUNT({quoted_column})"),
        StatField::Uniq => format!("COUNT(DISTINCT {quoted_column})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> RelationManifest {
        RelationManifest::new(
            vec![
                ColumnInfo::new("id", TypeTag::Integer, false),
                ColumnInfo::new("city", TypeTag::String, false),
                ColumnInfo::new("kind", TypeTag::String, false),
                ColumnInfo::new("price", TypeTag::Float, true),
                ColumnInfo::new("created", TypeTag::DateTime, false),
                ColumnInfo::new("day", TypeTag::Date, false),
                ColumnInfo::new("slug", TypeTag::String, false),
            ],
            false,
        )
    }

    #[test]
    fn test_excludes_identifier_columns() {
        let compiler = AggregateQueryCompiler::new();
        let m = manifest();
        let names: Vec<_> = compiler
            .stat_columns(&m)
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["city", "kind", "price", "created", "day"]);
    }

    #[test]
    fn test_count_and_uniq_queries() {
        let compiler = AggregateQueryCompiler::new();
        assert_eq!(
            compiler.count_query("rel").statement,
            "SELECT COUNT(*) AS \"count\" FROM \"rel\""
        );
        let uniq = compiler.uniq_query(&manifest(), "rel").unwrap();
        assert_eq!(uniq.kind, QueryKind::Uniq);
        assert!(uniq
            .statement
            .starts_with("SELECT COUNT(DISTINCT \"city\") AS \"uniq__city\""));
        assert!(!uniq.statement.contains("\"slug\""));
        assert!(!uniq.statement.contains("\"id\""));
    }

    #[test]
    fn test_numeric_query_has_six_aggregates_per_column() {
        let compiler = AggregateQueryCompiler::new();
        let numeric = compiler.numeric_query(&manifest(), "rel").unwrap();
        for alias in [
            "quantile001__price",
            "quantile099__price",
            "median__price",
            "avg__price",
            "max__price",
            "min__price",
        ] {
            assert!(numeric.statement.contains(&format!("\"{alias}\"")), "{alias}");
        }
        assert!(!numeric.statement.contains("quantile01__"));
        assert!(numeric.statement.contains(
            "APPROX_PERCENTILE_CONT(0.01) WITHIN GROUP (ORDER BY CAST(\"price\" AS DOUBLE)) \
             AS \"quantile001__price\""
        ));
        assert!(numeric
            .statement
            .contains("MEDIAN(CAST(\"price\" AS DOUBLE)) AS \"median__price\""));

        let extended = AggregateQueryCompiler::new()
            .with_extended_quantiles(true)
            .numeric_query(&manifest(), "rel")
            .unwrap();
        assert!(extended.statement.contains("\"quantile09__price\""));
    }

    #[test]
    fn test_no_numeric_columns_means_no_numeric_query() {
        let m = RelationManifest::new(vec![ColumnInfo::new("a", TypeTag::String, false)], false);
        assert!(AggregateQueryCompiler::new().numeric_query(&m, "rel").is_none());
    }

    #[test]
    fn test_date_queries_per_granularity() {
        let compiler = AggregateQueryCompiler::new();
        let queries = compiler.date_queries(&manifest(), "rel");
        let kinds: Vec<_> = queries.iter().map(|q| q.kind.to_string()).collect();
        assert_eq!(
            kinds,
            vec![
                "dates(created, year)",
                "dates(created, month)",
                "dates(created, day)",
                "dates(created, hour)",
                "dates(day, year)",
                "dates(day, month)",
                "dates(day, day)",
            ]
        );
        let month = &queries[1].statement;
        assert!(month.contains("date_trunc('month', CAST(\"created\" AS TIMESTAMP))"));
        assert!(month.contains("WHERE \"created\" IS NOT NULL"));
        assert!(month.contains("\"avg__price\""));
        assert!(month.ends_with("ORDER BY \"__bucket\" DESC"));
    }

    #[test]
    fn test_frequency_queries_respect_cardinality_window() {
        let compiler = AggregateQueryCompiler::new();
        let uniq = HashMap::from([
            ("city".to_string(), 15),
            ("kind".to_string(), 1_200),
            ("slug".to_string(), 20),
        ]);
        let queries = compiler.compile_frequency(&manifest(), "rel", &uniq);
        assert_eq!(queries.len(), 2);
        assert_eq!(
            queries[0].statement,
            "SELECT \"city\" AS \"__value\", COUNT(*) AS \"__count\" FROM \"rel\" \
             GROUP BY \"city\" ORDER BY \"__count\" DESC, \"__value\" LIMIT 10"
        );
        assert_eq!(
            queries[1].statement,
            "SELECT \"city\" AS \"__value\", COUNT(*) AS \"__count\" FROM \"rel\" \
             GROUP BY \"city\" HAVING COUNT(*) > 1 ORDER BY \"__count\" ASC, \"__value\" LIMIT 10"
        );
    }

    #[test]
    fn test_window_bounds_are_exclusive() {
        let compiler = AggregateQueryCompiler::new();
        let at_low = HashMap::from([("city".to_string(), 1), ("kind".to_string(), 1_000)]);
        assert!(compiler
            .compile_frequency(&manifest(), "rel", &at_low)
            .is_empty());
    }

    #[test]
    fn test_combined_frequency_queries() {
        let compiler = AggregateQueryCompiler::new().with_frequency_limit(5);
        let uniq = HashMap::from([("city".to_string(), 15), ("kind".to_string(), 3)]);
        let queries = compiler.compile_frequency(&manifest(), "rel", &uniq);
        assert_eq!(queries.len(), 6);

        let combined = &queries[4];
        assert_eq!(
            combined.kind,
            QueryKind::Frequency {
                columns: vec!["city".to_string(), "kind".to_string()],
                order: FrequencyOrder::Top
            }
        );
        assert_eq!(
            combined.statement,
            "SELECT \"city\", \"kind\", COUNT(*) AS \"__count\" FROM \"rel\" \
             GROUP BY \"city\", \"kind\" ORDER BY \"__count\" DESC, \"city\", \"kind\" LIMIT 5"
        );
        assert!(queries[5].statement.contains("HAVING COUNT(*) > 1"));
    }
}
