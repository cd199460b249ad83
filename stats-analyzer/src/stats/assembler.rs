//! Execution of compiled queries and assembly of their results.
//!
//! Scalar results (count, uniqueness, numeric aggregates) are demultiplexed
//! into one fragment per column and merged into the column's record. Date and
//! frequency results are multi-row breakdowns; they are stored under their
//! own composite keys instead of being merged.
//!
//! A failing aggregate query never aborts assembly. It is recorded as a
//! [`QueryFailure`] and the affected records stay partially populated.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::compiler::{BUCKET_ALIAS, COUNT_ALIAS, TOTAL_ALIAS, VALUE_ALIAS};
use super::time_series::attach_graphs;
use super::{
    AggregateQueryCompiler, AggregateStat, CompiledQuery, DateBucket, FrequencyGroup,
    FrequencyOrder, QueryKind, StatField, StatKey, StatsMap,
};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::schema::RelationManifest;
use crate::store::{AnalyticalStore, StoreRow};

/// An aggregate query that failed during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFailure {
    pub kind: String,
    pub statement: String,
    pub error: String,
}

/// Assembled statistics plus the queries that failed along the way.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssemblyReport {
    pub stats: StatsMap,
    pub failures: Vec<QueryFailure>,
}

impl AssemblyReport {
    /// True when every compiled query succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs aggregate queries against a store and assembles a [`StatsMap`].
#[derive(Debug, Clone)]
pub struct StatResultAssembler {
    store: Arc<dyn AnalyticalStore>,
    compiler: AggregateQueryCompiler,
    retries: u32,
    parallel: bool,
}

impl StatResultAssembler {
    pub fn new(store: Arc<dyn AnalyticalStore>) -> Self {
        Self {
            store,
            compiler: AggregateQueryCompiler::new(),
            retries: 1,
            parallel: false,
        }
    }

    pub fn from_config(store: Arc<dyn AnalyticalStore>, config: &PipelineConfig) -> Self {
        Self {
            store,
            compiler: AggregateQueryCompiler::from_config(config),
            retries: config.query_retries,
            parallel: config.parallel_queries,
        }
    }

    pub fn with_compiler(mut self, compiler: AggregateQueryCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    /// Extra attempts for queries failing with a retryable error.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Issue independent queries of a phase concurrently.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn compiler(&self) -> &AggregateQueryCompiler {
        &self.compiler
    }

    /// Computes every statistic of a loaded relation.
    #[instrument(skip(self, manifest), fields(columns = manifest.len()))]
    pub async fn assemble(&self, manifest: &RelationManifest, relation: &str) -> AssemblyReport {
        let mut report = AssemblyReport::default();
        for column in self.compiler.stat_columns(manifest) {
            report.stats.ensure(StatKey::column(&column.name));
        }

        let base = self.compiler.compile(manifest, relation);
        self.run_phase(base, &mut report).await;

        let unique_counts = unique_counts(&report.stats);
        let frequency = self
            .compiler
            .compile_frequency(manifest, relation, &unique_counts);
        self.run_phase(frequency, &mut report).await;

        let graphs = attach_graphs(&mut report.stats);

        info!(
            relation,
            entries = report.stats.len(),
            graphs = graphs.len(),
            failures = report.failures.len(),
            "Completed statistics assembly"
        );
        report
    }

    async fn run_phase(&self, queries: Vec<CompiledQuery>, report: &mut AssemblyReport) {
        let results = if self.parallel {
            join_all(queries.into_iter().map(|query| async move {
                let result = self.query_with_retry(&query.statement).await;
                (query, result)
            }))
            .await
        } else {
            let mut results = Vec::with_capacity(queries.len());
            for query in queries {
                let result = self.query_with_retry(&query.statement).await;
                results.push((query, result));
            }
            results
        };

        for (query, result) in results {
            match result {
                Ok(rows) => apply_rows(&mut report.stats, &query.kind, rows),
                Err(err) => {
                    warn!(kind = %query.kind, error = %err, "Aggregate query failed");
                    report.failures.push(QueryFailure {
                        kind: query.kind.to_string(),
                        statement: query.statement,
                        error: err.to_string(),
                    });
                }
            }
        }
    }

    async fn query_with_retry(&self, statement: &str) -> Result<Vec<StoreRow>> {
        let mut attempt = 0;
        loop {
            match self.store.query(statement).await {
                Ok(rows) => return Ok(rows),
                Err(err) if err.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    warn!(attempt, error = %err, "Retrying aggregate query");
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Distinct counts recorded so far, by column.
pub fn unique_counts(stats: &StatsMap) -> HashMap<String, u64> {
    stats
        .iter()
        .filter_map(|(key, stat)| match key {
            StatKey::Column(name) => stat.unique_count.map(|n| (name.clone(), n)),
            _ => None,
        })
        .collect()
}

/// Splits a flattened `<statistic>__<column>` row into per-column fragments.
///
/// Keys that do not follow the convention are skipped.
pub fn demultiplex(row: &StoreRow) -> BTreeMap<String, AggregateStat> {
    let mut fragments: BTreeMap<String, AggregateStat> = BTreeMap::new();
    for (key, value) in row.iter() {
        let Some((field, column)) = StatField::split_key(key) else {
            warn!(key, "Skipping result column without a statistic prefix");
            continue;
        };
        fragments
            .entry(column.to_string())
            .or_default()
            .set(field, value);
    }
    fragments
}

/// Folds the rows of one query into `stats`.
pub fn apply_rows(stats: &mut StatsMap, kind: &QueryKind, rows: Vec<StoreRow>) {
    match kind {
        QueryKind::Count => {
            let count = rows
                .first()
                .and_then(|row| row.get(TOTAL_ALIAS))
                .and_then(|value| value.as_u64());
            let fragment = AggregateStat {
                count,
                ..Default::default()
            };
            stats.merge(StatKey::All, &fragment);
        }
        QueryKind::Uniq | QueryKind::Numeric => {
            let Some(row) = rows.first() else {
                return;
            };
            for (column, fragment) in demultiplex(row) {
                stats.merge(StatKey::Column(column), &fragment);
            }
        }
        QueryKind::Dates {
            column,
            granularity,
        } => {
            let buckets = date_buckets(rows);
            debug!(column = %column, %granularity, buckets = buckets.len(), "Date buckets");
            stats.insert(
                StatKey::Dates {
                    column: column.clone(),
                    granularity: *granularity,
                },
                AggregateStat {
                    date_buckets: buckets,
                    title: Some(format!("{column} by {granularity}")),
                    ..Default::default()
                },
            );
        }
        QueryKind::Frequency { columns, order } => {
            let groups = frequency_groups(columns, rows, stats.total_rows());
            stats.insert(
                StatKey::Frequency {
                    columns: columns.clone(),
                    order: *order,
                },
                AggregateStat {
                    frequency_groups: groups,
                    title: Some(frequency_title(columns, *order)),
                    ..Default::default()
                },
            );
        }
    }
}

fn date_buckets(rows: Vec<StoreRow>) -> Vec<DateBucket> {
    rows.into_iter()
        .map(|row| {
            let mut bucket = DateBucket {
                truncated_timestamp: String::new(),
                count: 0,
                auxiliary: BTreeMap::new(),
            };
            for (name, value) in row {
                match name.as_str() {
                    BUCKET_ALIAS => bucket.truncated_timestamp = value.to_text(),
                    COUNT_ALIAS => bucket.count = value.as_u64().unwrap_or_default(),
                    _ => {
                        bucket.auxiliary.insert(name, value);
                    }
                }
            }
            bucket
        })
        .collect()
}

fn frequency_groups(
    columns: &[String],
    rows: Vec<StoreRow>,
    total: Option<u64>,
) -> Vec<FrequencyGroup> {
    rows.iter()
        .map(|row| {
            let value = if columns.len() == 1 {
                row.get(VALUE_ALIAS)
                    .map(|v| v.to_text())
                    .unwrap_or_default()
            } else {
                columns
                    .iter()
                    .map(|c| row.get(c).map(|v| v.to_text()).unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let count = row
                .get(COUNT_ALIAS)
                .and_then(|v| v.as_u64())
                .unwrap_or_default();
            let percent_of_total = total
                .filter(|&t| t > 0)
                .map(|t| (count as f64 * 10_000.0 / t as f64).round() / 100.0);
            FrequencyGroup {
                value,
                count,
                percent_of_total,
            }
        })
        .collect()
}

fn frequency_title(columns: &[String], order: FrequencyOrder) -> String {
    let subject = if columns.len() == 1 {
        "values"
    } else {
        "combinations"
    };
    match order {
        FrequencyOrder::Top => format!("Most frequent {subject} of {}", columns.join(", ")),
        FrequencyOrder::Rare => format!(
            "Least frequent {subject} of {} (count > 1)",
            columns.join(", ")
        ),
    }
}
