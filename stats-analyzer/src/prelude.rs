//! Prelude for commonly used types and traits in stats-analyzer.

pub use crate::config::PipelineConfig;
pub use crate::error::{Result, StatsError};
pub use crate::load::{BulkLoader, LoadReport};
pub use crate::logging::LogConfig;
pub use crate::pipeline::{PipelineOutcome, StatsPipeline};
pub use crate::schema::{ColumnInfo, RelationManifest, SchemaInferenceEngine, TypeTag};
pub use crate::session::{InMemorySessionRepository, SessionRepository};
pub use crate::sources::CsvSource;
pub use crate::stats::{AggregateStat, StatKey, StatResultAssembler, StatsMap};
pub use crate::store::{AnalyticalStore, DataFusionStore, StoreRow, StoreValue};
