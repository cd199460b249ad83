//! Per-column statistic records and their composite keys.
//!
//! An [`AggregateStat`] starts empty and is filled by merging fragments
//! produced from individual query results. Every scalar field is an `Option`,
//! so "never computed" and "computed as zero" are different states and a
//! merge only fills fields that are still unpopulated.

pub mod assembler;
pub mod compiler;
pub mod numbers;
pub mod time_series;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::StatsError;
use crate::store::StoreValue;

pub use assembler::{AssemblyReport, QueryFailure, StatResultAssembler};
pub use compiler::{AggregateQueryCompiler, CompiledQuery, QueryKind};
pub use numbers::{analyze_numbers, extract_numbers, NumberStats};

/// Separator between a statistic alias and a column name in flattened keys.
pub const KEY_SEPARATOR: &str = "__";

/// Time unit a timestamp is truncated to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Year,
    Month,
    Day,
    Hour,
}

impl Granularity {
    /// Granularities offered for a temporal column, coarsest first. Hour is
    /// only offered for datetimes.
    pub fn for_datetime(with_time: bool) -> &'static [Granularity] {
        if with_time {
            &[
                Granularity::Year,
                Granularity::Month,
                Granularity::Day,
                Granularity::Hour,
            ]
        } else {
            &[Granularity::Year, Granularity::Month, Granularity::Day]
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Year => "year",
            Granularity::Month => "month",
            Granularity::Day => "day",
            Granularity::Hour => "hour",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "year" => Ok(Granularity::Year),
            "month" => Ok(Granularity::Month),
            "day" => Ok(Granularity::Day),
            "hour" => Ok(Granularity::Hour),
            other => Err(StatsError::Parse(format!("unknown granularity '{other}'"))),
        }
    }
}

/// A statistic that can be carried in a flattened `<alias>__<column>` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatField {
    /// 1st percentile
    Quantile001,
    /// 99th percentile
    Quantile099,
    /// 10th percentile
    Quantile01,
    /// 90th percentile
    Quantile09,
    Median,
    Avg,
    Max,
    Min,
    Count,
    Uniq,
}

impl StatField {
    pub const ALL: [StatField; 10] = [
        StatField::Quantile001,
        StatField::Quantile099,
        StatField::Quantile01,
        StatField::Quantile09,
        StatField::Median,
        StatField::Avg,
        StatField::Max,
        StatField::Min,
        StatField::Count,
        StatField::Uniq,
    ];

    pub fn alias(self) -> &'static str {
        match self {
            StatField::Quantile001 => "quantile001",
            StatField::Quantile099 => "quantile099",
            StatField::Quantile01 => "quantile01",
            StatField::Quantile09 => "quantile09",
            StatField::Median => "median",
            StatField::Avg => "avg",
            StatField::Max => "max",
            StatField::Min => "min",
            StatField::Count => "count",
            StatField::Uniq => "uniq",
        }
    }

    pub fn from_alias(alias: &str) -> Option<StatField> {
        Self::ALL.into_iter().find(|field| field.alias() == alias)
    }

    /// Flattened key for this statistic of `column`.
    pub fn key_for(self, column: &str) -> String {
        format!("{}{KEY_SEPARATOR}{column}", self.alias())
    }

    /// Splits a flattened key into its statistic and column.
    pub fn split_key(key: &str) -> Option<(StatField, &str)> {
        let (alias, column) = key.split_once(KEY_SEPARATOR)?;
        if column.is_empty() {
            return None;
        }
        Some((Self::from_alias(alias)?, column))
    }
}

/// One value of a categorical breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyGroup {
    /// Group value; combined groups join their values with ", "
    pub value: String,
    pub count: u64,
    /// Share of all rows, in percent
    pub percent_of_total: Option<f64>,
}

/// One truncated time bucket of a temporal column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateBucket {
    pub truncated_timestamp: String,
    pub count: u64,
    /// Numeric aggregates of the bucket keyed by their flattened names
    pub auxiliary: BTreeMap<String, StoreValue>,
}

/// Statistics gathered for one column or composite key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStat {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,
    /// 1st percentile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantile_low: Option<f64>,
    /// 99th percentile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantile_high: Option<f64>,
    /// 10th percentile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantile_low2: Option<f64>,
    /// 90th percentile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantile_high2: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub date_buckets: Vec<DateBucket>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frequency_groups: Vec<FrequencyGroup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl AggregateStat {
    /// Stores `value` in the slot for `field`.
    ///
    /// Returns false, leaving the record unchanged, when the value is null or
    /// cannot be coerced to the field type.
    pub fn set(&mut self, field: StatField, value: &StoreValue) -> bool {
        match field {
            StatField::Count => assign(&mut self.count, value.as_u64()),
            StatField::Uniq => assign(&mut self.unique_count, value.as_u64()),
            StatField::Quantile001 => assign(&mut self.quantile_low, value.as_f64()),
            StatField::Quantile099 => assign(&mut self.quantile_high, value.as_f64()),
            StatField::Quantile01 => assign(&mut self.quantile_low2, value.as_f64()),
            StatField::Quantile09 => assign(&mut self.quantile_high2, value.as_f64()),
            StatField::Median => assign(&mut self.median, value.as_f64()),
            StatField::Avg => assign(&mut self.avg, value.as_f64()),
            StatField::Max => assign(&mut self.max, value.as_f64()),
            StatField::Min => assign(&mut self.min, value.as_f64()),
        }
    }

    /// Numeric view of a populated field.
    pub fn get(&self, field: StatField) -> Option<f64> {
        match field {
            StatField::Count => self.count.map(|v| v as f64),
            StatField::Uniq => self.unique_count.map(|v| v as f64),
            StatField::Quantile001 => self.quantile_low,
            StatField::Quantile099 => self.quantile_high,
            StatField::Quantile01 => self.quantile_low2,
            StatField::Quantile09 => self.quantile_high2,
            StatField::Median => self.median,
            StatField::Avg => self.avg,
            StatField::Max => self.max,
            StatField::Min => self.min,
        }
    }

    /// Fills every unpopulated field of `self` from `other`.
    pub fn merge(&mut self, other: &AggregateStat) {
        fill(&mut self.count, other.count);
        fill(&mut self.unique_count, other.unique_count);
        fill(&mut self.avg, other.avg);
        fill(&mut self.min, other.min);
        fill(&mut self.max, other.max);
        fill(&mut self.median, other.median);
        fill(&mut self.quantile_low, other.quantile_low);
        fill(&mut self.quantile_high, other.quantile_high);
        fill(&mut self.quantile_low2, other.quantile_low2);
        fill(&mut self.quantile_high2, other.quantile_high2);
        if self.date_buckets.is_empty() {
            self.date_buckets = other.date_buckets.clone();
        }
        if self.frequency_groups.is_empty() {
            self.frequency_groups = other.frequency_groups.clone();
        }
        if self.title.is_none() {
            self.title = other.title.clone();
        }
    }

    /// Fields that are populated, for reporting partial records.
    pub fn populated_fields(&self) -> Vec<StatField> {
        StatField::ALL
            .into_iter()
            .filter(|field| self.get(*field).is_some())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.populated_fields().is_empty()
            && self.date_buckets.is_empty()
            && self.frequency_groups.is_empty()
    }
}

fn assign<T>(slot: &mut Option<T>, value: Option<T>) -> bool {
    match value {
        Some(v) => {
            *slot = Some(v);
            true
        }
        None => false,
    }
}

fn fill<T: Copy>(slot: &mut Option<T>, incoming: Option<T>) {
    if slot.is_none() {
        *slot = incoming;
    }
}

/// Direction of a frequency table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FrequencyOrder {
    /// Most frequent first
    Top,
    /// Least frequent first, singletons excluded
    Rare,
}

impl FrequencyOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            FrequencyOrder::Top => "top",
            FrequencyOrder::Rare => "rare",
        }
    }
}

/// Key of an entry in a [`StatsMap`].
///
/// Renders to the flattened strings consumed by reporting: `all`, `<column>`,
/// `dates_<column>__<granularity>`, `graph_<column>__<granularity>` and
/// `<column>[+<column>...]__top` / `__rare`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatKey {
    /// Whole-relation statistics
    All,
    Column(String),
    Dates {
        column: String,
        granularity: Granularity,
    },
    Graph {
        column: String,
        granularity: Granularity,
    },
    Frequency {
        columns: Vec<String>,
        order: FrequencyOrder,
    },
}

impl StatKey {
    pub fn column(name: impl Into<String>) -> Self {
        StatKey::Column(name.into())
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatKey::All => f.write_str("all"),
            StatKey::Column(name) => f.write_str(name),
            StatKey::Dates {
                column,
                granularity,
            } => write!(f, "dates_{column}{KEY_SEPARATOR}{granularity}"),
            StatKey::Graph {
                column,
                granularity,
            } => write!(f, "graph_{column}{KEY_SEPARATOR}{granularity}"),
            StatKey::Frequency { columns, order } => {
                write!(f, "{}{KEY_SEPARATOR}{}", columns.join("+"), order.as_str())
            }
        }
    }
}

impl FromStr for StatKey {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(StatsError::Parse("empty statistics key".to_string()));
        }
        if s == "all" {
            return Ok(StatKey::All);
        }
        if let Some((head, tail)) = s.rsplit_once(KEY_SEPARATOR) {
            if let Ok(granularity) = tail.parse::<Granularity>() {
                if let Some(column) = head.strip_prefix("dates_") {
                    return Ok(StatKey::Dates {
                        column: column.to_string(),
                        granularity,
                    });
                }
                if let Some(column) = head.strip_prefix("graph_") {
                    return Ok(StatKey::Graph {
                        column: column.to_string(),
                        granularity,
                    });
                }
            }
            let order = match tail {
                "top" => Some(FrequencyOrder::Top),
                "rare" => Some(FrequencyOrder::Rare),
                _ => None,
            };
            if let Some(order) = order {
                return Ok(StatKey::Frequency {
                    columns: head.split('+').map(str::to_string).collect(),
                    order,
                });
            }
            return Err(StatsError::Parse(format!("unrecognized statistics key '{s}'")));
        }
        Ok(StatKey::Column(s.to_string()))
    }
}

impl Serialize for StatKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StatKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Ordered statistics of one relation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatsMap {
    entries: BTreeMap<StatKey, AggregateStat>,
}

impl StatsMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a fragment into the entry for `key`, creating it if needed.
    pub fn merge(&mut self, key: StatKey, fragment: &AggregateStat) {
        self.entries.entry(key).or_default().merge(fragment);
    }

    /// Ensures an entry exists for `key`.
    pub fn ensure(&mut self, key: StatKey) -> &mut AggregateStat {
        self.entries.entry(key).or_default()
    }

    /// Replaces the entry for `key`.
    pub fn insert(&mut self, key: StatKey, stat: AggregateStat) {
        self.entries.insert(key, stat);
    }

    pub fn get(&self, key: &StatKey) -> Option<&AggregateStat> {
        self.entries.get(key)
    }

    /// Looks an entry up by its flattened key.
    pub fn get_str(&self, key: &str) -> Option<&AggregateStat> {
        key.parse().ok().and_then(|key: StatKey| self.entries.get(&key))
    }

    /// Global row count, when known.
    pub fn total_rows(&self) -> Option<u64> {
        self.entries.get(&StatKey::All).and_then(|stat| stat.count)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StatKey, &AggregateStat)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &StatKey> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<StatKey, AggregateStat> {
        self.entries
    }
}
