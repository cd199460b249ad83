//! Error types for the statistics pipeline.
//!
//! All fallible operations in this crate return [`StatsError`]. The variants
//! follow the pipeline stages: reading and sampling the file, talking to the
//! analytical store, and loading batches into a relation.

use std::time::Duration;

use thiserror::Error;

/// The main error type for the statistics pipeline.
#[derive(Error, Debug)]
pub enum StatsError {
    /// There were no rows to sample or load.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// A value or document could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A statement sent to the analytical store failed.
    #[error("Store error while executing `{statement}`: {source}")]
    Store {
        /// The statement (possibly truncated) that failed
        statement: String,
        /// The underlying store error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A store round-trip exceeded its time budget.
    #[error("Store round-trip timed out after {after:?}: `{statement}`")]
    Timeout {
        /// The statement (possibly truncated) that timed out
        statement: String,
        /// The budget that was exceeded
        after: Duration,
    },

    /// A load batch failed after earlier batches were committed.
    #[error("Load into '{relation}' interrupted after {committed_rows} committed rows: {source}")]
    LoadInterrupted {
        /// Relation that is now partially populated
        relation: String,
        /// Rows committed by the batches that succeeded
        committed_rows: u64,
        /// The failure of the offending batch
        #[source]
        source: Box<StatsError>,
    },

    /// The store failed while a file was being imported.
    #[error("Import failed: {source}")]
    Import {
        /// The store failure raised by the load
        #[source]
        source: Box<StatsError>,
    },

    /// Error from the CSV reader.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Error from I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from DataFusion operations.
    #[error("DataFusion error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    /// Error from Arrow operations.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Error related to configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Error from serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, StatsError>`.
pub type Result<T> = std::result::Result<T, StatsError>;

impl StatsError {
    /// Creates a store error for the given statement.
    pub fn store(
        statement: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Store {
            statement: statement.into(),
            source: source.into(),
        }
    }

    /// Creates an empty input error.
    pub fn empty_input(message: impl Into<String>) -> Self {
        Self::EmptyInput(message.into())
    }

    /// Tags a store failure raised while importing a file; other errors pass
    /// through unchanged.
    pub fn import_failed(self) -> Self {
        if self.is_store_error() && !matches!(self, Self::Import { .. }) {
            Self::Import {
                source: Box::new(self),
            }
        } else {
            self
        }
    }

    /// Whether repeating the failed operation may succeed.
    ///
    /// Only timeouts are retryable; a statement the store rejected will be
    /// rejected again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::LoadInterrupted { source, .. } | Self::Import { source } => source.is_retryable(),
            _ => false,
        }
    }

    /// Whether this error originated in the analytical store.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            Self::Store { .. }
                | Self::Timeout { .. }
                | Self::LoadInterrupted { .. }
                | Self::Import { .. }
                | Self::DataFusion(_)
        )
    }
}

impl From<serde_json::Error> for StatsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
