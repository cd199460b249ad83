//! Pipeline configuration.
//!
//! [`PipelineConfig`] can be built in code through [`PipelineConfig::builder`]
//! or deserialized from JSON; missing fields fall back to their defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StatsError};
use crate::logging::LogConfig;

/// Configuration shared by every stage of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum number of data rows sampled for schema inference
    pub sample_size: usize,
    /// Rows per bulk-load statement
    pub batch_size: usize,
    /// Field delimiter; sniffed from the file when `None`
    pub delimiter: Option<u8>,
    /// Rows returned by each frequency query
    pub frequency_limit: usize,
    /// Exclusive bounds on the distinct count of a string column for it to
    /// get frequency tables
    pub cardinality_window: (u64, u64),
    /// Also compute the 10th and 90th percentiles
    pub extended_quantiles: bool,
    /// Collapse special characters in loaded string values
    pub sanitize_strings: bool,
    /// Budget for a single store round-trip
    #[serde(with = "duration_secs")]
    pub query_timeout: Duration,
    /// Extra attempts for aggregate queries that fail with a retryable error
    pub query_retries: u32,
    /// Run independent aggregate queries concurrently
    pub parallel_queries: bool,
    /// How long a session keeps its relation before cleanup may drop it
    #[serde(with = "duration_secs")]
    pub session_ttl: Duration,
    /// Logging behaviour
    pub log: LogConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_size: 50_000,
            batch_size: 5_000,
            delimiter: None,
            frequency_limit: 10,
            cardinality_window: (1, 1_000),
            extended_quantiles: false,
            sanitize_strings: true,
            query_timeout: Duration::from_secs(30),
            query_retries: 1,
            parallel_queries: false,
            session_ttl: Duration::from_secs(60 * 60),
            log: LogConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a builder starting from the defaults.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Parses a configuration from JSON and validates it.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values no pipeline can run with.
    pub fn validate(&self) -> Result<()> {
        if self.sample_size == 0 {
            return Err(StatsError::Configuration(
                "sample_size must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(StatsError::Configuration(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.frequency_limit == 0 {
            return Err(StatsError::Configuration(
                "frequency_limit must be at least 1".to_string(),
            ));
        }
        let (low, high) = self.cardinality_window;
        if low >= high {
            return Err(StatsError::Configuration(format!(
                "cardinality_window ({low}, {high}) is empty"
            )));
        }
        if let Some(delimiter) = self.delimiter {
            if matches!(delimiter, b'"' | b'\'' | b'\n' | b'\r') {
                return Err(StatsError::Configuration(format!(
                    "unsupported delimiter {:?}",
                    delimiter as char
                )));
            }
        }
        if self.query_timeout.is_zero() {
            return Err(StatsError::Configuration(
                "query_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug, Clone)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Set the number of rows sampled for inference
    pub fn sample_size(mut self, size: usize) -> Self {
        self.config.sample_size = size;
        self
    }

    /// Set the rows per load batch
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Fix the field delimiter instead of sniffing it
    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.config.delimiter = Some(delimiter);
        self
    }

    /// Set the rows returned per frequency query
    pub fn frequency_limit(mut self, limit: usize) -> Self {
        self.config.frequency_limit = limit;
        self
    }

    /// Set the exclusive distinct-count window for frequency tables
    pub fn cardinality_window(mut self, low: u64, high: u64) -> Self {
        self.config.cardinality_window = (low, high);
        self
    }

    /// Enable or disable the 10th/90th percentiles
    pub fn extended_quantiles(mut self, enable: bool) -> Self {
        self.config.extended_quantiles = enable;
        self
    }

    /// Enable or disable string value sanitizing during load
    pub fn sanitize_strings(mut self, enable: bool) -> Self {
        self.config.sanitize_strings = enable;
        self
    }

    /// Set the per round-trip timeout
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.config.query_timeout = timeout;
        self
    }

    /// Set the number of retries for retryable query failures
    pub fn query_retries(mut self, retries: u32) -> Self {
        self.config.query_retries = retries;
        self
    }

    /// Enable or disable concurrent aggregate queries
    pub fn parallel_queries(mut self, enable: bool) -> Self {
        self.config.parallel_queries = enable;
        self
    }

    /// Set the session relation lifetime
    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.config.session_ttl = ttl;
        self
    }

    /// Set the logging behaviour
    pub fn log(mut self, log: LogConfig) -> Self {
        self.config.log = log;
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
