//! Selection of chartable time series from date bucket results.
//!
//! For each temporal column two granularities are picked: the coarsest one
//! with more than [`GRAPH_MIN_BUCKETS`] buckets and the finest one with at
//! most [`GRAPH_MAX_BUCKETS`]. Their buckets are re-attached in chronological
//! order under `graph_<column>__<granularity>` keys.

use std::collections::BTreeMap;

use tracing::debug;

use super::{AggregateStat, Granularity, StatKey, StatsMap};

/// A coarse series needs more buckets than this to be worth charting.
pub const GRAPH_MIN_BUCKETS: usize = 10;

/// A fine series with more buckets than this is too dense to chart.
pub const GRAPH_MAX_BUCKETS: usize = 10_000;

/// Picks the granularities to chart from bucket counts.
///
/// Granularities without buckets are ignored. The result is coarsest first
/// and holds at most two entries.
pub fn select_graph_granularities(counts: &BTreeMap<Granularity, usize>) -> Vec<Granularity> {
    let available: Vec<(Granularity, usize)> = counts
        .iter()
        .filter(|(_, &count)| count > 0)
        .map(|(&g, &count)| (g, count))
        .collect();

    let coarse = available
        .iter()
        .find(|(_, count)| *count > GRAPH_MIN_BUCKETS)
        .map(|(g, _)| *g);
    let fine = available
        .iter()
        .rev()
        .find(|(_, count)| *count <= GRAPH_MAX_BUCKETS)
        .map(|(g, _)| *g);

    let mut selected: Vec<Granularity> = coarse.into_iter().chain(fine).collect();
    selected.sort();
    selected.dedup();
    selected
}

/// Adds `graph_` entries for every temporal column with date buckets.
///
/// Returns the keys that were added.
pub fn attach_graphs(stats: &mut StatsMap) -> Vec<StatKey> {
    let mut per_column: BTreeMap<String, BTreeMap<Granularity, usize>> = BTreeMap::new();
    for (key, stat) in stats.iter() {
        if let StatKey::Dates {
            column,
            granularity,
        } = key
        {
            per_column
                .entry(column.clone())
                .or_default()
                .insert(*granularity, stat.date_buckets.len());
        }
    }

    let mut added = Vec::new();
    for (column, counts) in per_column {
        for granularity in select_graph_granularities(&counts) {
            let source = StatKey::Dates {
                column: column.clone(),
                granularity,
            };
            let Some(dates) = stats.get(&source) else {
                continue;
            };
            let mut buckets = dates.date_buckets.clone();
            buckets.sort_by(|a, b| a.truncated_timestamp.cmp(&b.truncated_timestamp));

            let key = StatKey::Graph {
                column: column.clone(),
                granularity,
            };
            debug!(%key, buckets = buckets.len(), "Selected time series");
            stats.insert(
                key.clone(),
                AggregateStat {
                    date_buckets: buckets,
                    title: Some(format!("{column} by {granularity}")),
                    ..Default::default()
                },
            );
            added.push(key);
        }
    }
    added
}
