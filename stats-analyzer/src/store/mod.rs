//! Analytical store abstraction.
//!
//! The pipeline never talks to a query engine directly; it goes through
//! [`AnalyticalStore`], which executes statements and returns rows as owned
//! [`StoreValue`]s. [`DataFusionStore`] is the provided implementation.

pub mod datafusion_store;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schema::ColumnInfo;
use crate::security::{quote_identifier, validate_relation_name};

pub use datafusion_store::DataFusionStore;

/// A single value returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl StoreValue {
    pub fn is_null(&self) -> bool {
        matches!(self, StoreValue::Null)
    }

    /// Numeric view of the value. Numeric strings are parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StoreValue::Int(v) => Some(*v as f64),
            StoreValue::UInt(v) => Some(*v as f64),
            StoreValue::Float(v) if v.is_finite() => Some(*v),
            StoreValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
    }

    /// Non-negative integer view of the value, used for counts.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            StoreValue::Int(v) => u64::try_from(*v).ok(),
            StoreValue::UInt(v) => Some(*v),
            StoreValue::Float(v) if v.is_finite() && *v >= 0.0 && v.fract() == 0.0 => {
                Some(*v as u64)
            }
            StoreValue::Text(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        }
    }

    /// Textual rendering; `NULL` for nulls.
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StoreValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreValue::Null => f.write_str("NULL"),
            StoreValue::Int(v) => write!(f, "{v}"),
            StoreValue::UInt(v) => write!(f, "{v}"),
            StoreValue::Float(v) => write!(f, "{v}"),
            StoreValue::Bool(v) => write!(f, "{v}"),
            StoreValue::Text(v) => f.write_str(v),
        }
    }
}

/// One result row: output column names with their values, in projection order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreRow {
    columns: Vec<(String, StoreValue)>,
}

impl StoreRow {
    pub fn new(columns: Vec<(String, StoreValue)>) -> Self {
        Self { columns }
    }

    /// Value of the named output column.
    pub fn get(&self, name: &str) -> Option<&StoreValue> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StoreValue)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl IntoIterator for StoreRow {
    type Item = (String, StoreValue);
    type IntoIter = std::vec::IntoIter<(String, StoreValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

/// A columnar analytical store the pipeline loads into and queries.
///
/// Implementations bound every round-trip with a timeout and report expiry as
/// [`StatsError::Timeout`](crate::error::StatsError::Timeout).
#[async_trait]
pub trait AnalyticalStore: fmt::Debug + Send + Sync {
    /// Executes a statement that returns no rows (DDL, loads).
    async fn execute(&self, statement: &str) -> Result<()>;

    /// Executes a query and collects every row.
    async fn query(&self, statement: &str) -> Result<Vec<StoreRow>>;

    /// Reports the columns of an existing relation.
    async fn describe(&self, relation: &str) -> Result<Vec<ColumnInfo>>;

    /// Drops a relation if it exists.
    async fn drop_relation(&self, relation: &str) -> Result<()> {
        validate_relation_name(relation)?;
        self.execute(&format!(
            "DROP TABLE IF EXISTS {}",
            quote_identifier(relation)
        ))
        .await
    }
}
