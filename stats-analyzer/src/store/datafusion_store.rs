//! [`AnalyticalStore`] backed by an in-process DataFusion [`SessionContext`].
//!
//! Relations created through this store are DataFusion memory tables, so they
//! live as long as the context does. Statements are plain DataFusion SQL.

use std::future::Future;
use std::time::Duration;

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{
    DataType, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type,
    UInt32Type, UInt64Type, UInt8Type,
};
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use async_trait::async_trait;
use datafusion::common::TableReference;
use datafusion::prelude::SessionContext;
use tracing::{debug, instrument};

use super::{AnalyticalStore, StoreRow, StoreValue};
use crate::error::{Result, StatsError};
use crate::log_statement;
use crate::logging::{truncate_field, LogConfig};
use crate::schema::{ColumnInfo, TypeTag};

/// Default budget for one store round-trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// DataFusion implementation of [`AnalyticalStore`].
///
/// # Example
///
/// ```rust
/// use stats_analyzer::store::{AnalyticalStore, DataFusionStore};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let store = DataFusionStore::new();
/// store.execute("CREATE TABLE t (v BIGINT)").await.unwrap();
/// store.execute("INSERT INTO t VALUES (1), (2)").await.unwrap();
///
/// let rows = store.query("SELECT COUNT(*) AS n FROM t").await.unwrap();
/// assert_eq!(rows[0].get("n").and_then(|v| v.as_u64()), Some(2));
/// # })
/// ```
#[derive(Clone)]
pub struct DataFusionStore {
    ctx: SessionContext,
    timeout: Duration,
    log: LogConfig,
}

impl std::fmt::Debug for DataFusionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFusionStore")
            .field("session_id", &self.ctx.session_id())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for DataFusionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DataFusionStore {
    /// Creates a store over a fresh session context.
    pub fn new() -> Self {
        Self::with_context(SessionContext::new())
    }

    /// Creates a store over an existing session context.
    pub fn with_context(ctx: SessionContext) -> Self {
        Self {
            ctx,
            timeout: DEFAULT_TIMEOUT,
            log: LogConfig::default(),
        }
    }

    /// Sets the per round-trip timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets statement logging behaviour.
    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    /// The underlying session context.
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T, F>(&self, statement: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StatsError::Timeout {
                statement: truncate_field(statement, self.log.max_field_length),
                after: self.timeout,
            }),
        }
    }

    async fn collect(&self, statement: &str) -> Result<Vec<RecordBatch>> {
        log_statement!(self.log, statement, "Sending statement to DataFusion");
        let run = async {
            let df = self
                .ctx
                .sql(statement)
                .await
                .map_err(|e| self.store_error(statement, e))?;
            df.collect().await.map_err(|e| self.store_error(statement, e))
        };
        self.bounded(statement, run).await
    }

    fn store_error(&self, statement: &str, err: datafusion::error::DataFusionError) -> StatsError {
        StatsError::store(truncate_field(statement, self.log.max_field_length), err)
    }
}

#[async_trait]
impl AnalyticalStore for DataFusionStore {
    async fn execute(&self, statement: &str) -> Result<()> {
        self.collect(statement).await?;
        Ok(())
    }

    async fn query(&self, statement: &str) -> Result<Vec<StoreRow>> {
        let batches = self.collect(statement).await?;
        let mut rows = Vec::new();
        for batch in &batches {
            rows.extend(batch_to_rows(batch)?);
        }
        debug!(rows = rows.len(), "Query returned");
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn describe(&self, relation: &str) -> Result<Vec<ColumnInfo>> {
        let lookup = async {
            let provider = self
                .ctx
                .table_provider(TableReference::bare(relation))
                .await?;
            Ok::<_, StatsError>(
                provider
                    .schema()
                    .fields()
                    .iter()
                    .map(|field| {
                        ColumnInfo::new(
                            field.name().clone(),
                            type_tag_for(field.data_type()),
                            field.is_nullable(),
                        )
                    })
                    .collect::<Vec<_>>(),
            )
        };
        self.bounded(relation, lookup).await
    }
}

/// Lattice tag of an Arrow type as stored by this crate's DDL.
pub fn type_tag_for(data_type: &DataType) -> TypeTag {
    match data_type {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => TypeTag::Integer,
        DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Decimal128(_, _)
        | DataType::Decimal256(_, _) => TypeTag::Float,
        DataType::Date32 | DataType::Date64 => TypeTag::Date,
        DataType::Timestamp(_, _) => TypeTag::DateTime,
        _ => TypeTag::String,
    }
}

/// Converts a record batch into owned rows.
pub fn batch_to_rows(batch: &RecordBatch) -> Result<Vec<StoreRow>> {
    let schema = batch.schema();
    let columns = batch
        .columns()
        .iter()
        .map(column_values)
        .collect::<Result<Vec<_>>>()?;

    let rows = (0..batch.num_rows())
        .map(|row| {
            StoreRow::new(
                schema
                    .fields()
                    .iter()
                    .zip(&columns)
                    .map(|(field, values)| (field.name().clone(), values[row].clone()))
                    .collect(),
            )
        })
        .collect();
    Ok(rows)
}

fn column_values(array: &ArrayRef) -> Result<Vec<StoreValue>> {
    let len = array.len();
    let values = match array.data_type() {
        DataType::Null => vec![StoreValue::Null; len],
        DataType::Boolean => {
            let arr = array.as_boolean();
            collect_values(array, |i| StoreValue::Bool(arr.value(i)))
        }
        DataType::Int8 => {
            let arr = array.as_primitive::<Int8Type>();
            collect_values(array, |i| StoreValue::Int(i64::from(arr.value(i))))
        }
        DataType::Int16 => {
            let arr = array.as_primitive::<Int16Type>();
            collect_values(array, |i| StoreValue::Int(i64::from(arr.value(i))))
        }
        DataType::Int32 => {
            let arr = array.as_primitive::<Int32Type>();
            collect_values(array, |i| StoreValue::Int(i64::from(arr.value(i))))
        }
        DataType::Int64 => {
            let arr = array.as_primitive::<Int64Type>();
            collect_values(array, |i| StoreValue::Int(arr.value(i)))
        }
        DataType::UInt8 => {
            let arr = array.as_primitive::<UInt8Type>();
            collect_values(array, |i| StoreValue::UInt(u64::from(arr.value(i))))
        }
        DataType::UInt16 => {
            let arr = array.as_primitive::<UInt16Type>();
            collect_values(array, |i| StoreValue::UInt(u64::from(arr.value(i))))
        }
        DataType::UInt32 => {
            let arr = array.as_primitive::<UInt32Type>();
            collect_values(array, |i| StoreValue::UInt(u64::from(arr.value(i))))
        }
        DataType::UInt64 => {
            let arr = array.as_primitive::<UInt64Type>();
            collect_values(array, |i| StoreValue::UInt(arr.value(i)))
        }
        DataType::Float32 => {
            let arr = array.as_primitive::<Float32Type>();
            collect_values(array, |i| StoreValue::Float(f64::from(arr.value(i))))
        }
        DataType::Float64 => {
            let arr = array.as_primitive::<Float64Type>();
            collect_values(array, |i| StoreValue::Float(arr.value(i)))
        }
        DataType::Utf8 => {
            let arr = array.as_string::<i32>();
            collect_values(array, |i| StoreValue::Text(arr.value(i).to_string()))
        }
        DataType::LargeUtf8 => {
            let arr = array.as_string::<i64>();
            collect_values(array, |i| StoreValue::Text(arr.value(i).to_string()))
        }
        DataType::Utf8View => {
            let arr = array.as_string_view();
            collect_values(array, |i| StoreValue::Text(arr.value(i).to_string()))
        }
        _ => {
            let formatter = ArrayFormatter::try_new(array.as_ref(), &FormatOptions::default())?;
            collect_values(array, |i| StoreValue::Text(formatter.value(i).to_string()))
        }
    };
    Ok(values)
}

fn collect_values(array: &ArrayRef, value: impl Fn(usize) -> StoreValue) -> Vec<StoreValue> {
    (0..array.len())
        .map(|i| {
            if array.is_null(i) {
                StoreValue::Null
            } else {
                value(i)
            }
        })
        .collect()
}
