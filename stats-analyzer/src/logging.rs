//! Logging utilities and configuration for the statistics pipeline.
//!
//! Statement text handed to the store can be very large (a load batch carries
//! thousands of rows), so logging of statements is opt-in and every logged
//! statement is truncated to `max_field_length`.

use serde::{Deserialize, Serialize};

/// Logging configuration for pipeline components.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Whether to log every statement sent to the store
    pub log_statements: bool,
    /// Whether to log load progress per batch
    pub log_data_operations: bool,
    /// Maximum length for logged field values (to prevent huge logs)
    pub max_field_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_statements: false,
            log_data_operations: true,
            max_field_length: 256,
        }
    }
}

impl LogConfig {
    /// Creates a verbose configuration suitable for debugging.
    pub fn verbose() -> Self {
        Self {
            log_statements: true,
            log_data_operations: true,
            max_field_length: 1024,
        }
    }
}

/// Macro for conditional statement logging.
#[macro_export]
macro_rules! log_statement {
    ($config:expr, $statement:expr, $($arg:tt)*) => {
        if $config.log_statements {
            tracing::debug!(
                statement = %$crate::logging::truncate_field($statement, $config.max_field_length),
                $($arg)*
            );
        }
    };
}

/// Macro for conditional data operation logging.
#[macro_export]
macro_rules! log_data_op {
    ($config:expr, $($arg:tt)*) => {
        if $config.log_data_operations {
            tracing::info!($($arg)*);
        }
    };
}

/// Truncates a string to the maximum field length if needed.
pub fn truncate_field(value: &str, max_length: usize) -> String {
    if value.len() <= max_length {
        value.to_string()
    } else {
        let mut cut = max_length;
        while !value.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...(truncated)", &value[..cut])
    }
}

/// Subscriber installation for the command-line binary.
pub mod setup {
    use tracing::Level;

    /// What the installed subscriber emits.
    #[derive(Debug, Clone)]
    pub struct LoggingConfig {
        /// Level for events of this crate; dependencies log warnings only
        pub crate_level: Level,
        /// Whether to emit one JSON object per event
        pub json_format: bool,
    }

    impl Default for LoggingConfig {
        fn default() -> Self {
            Self {
                crate_level: Level::INFO,
                json_format: false,
            }
        }
    }

    impl LoggingConfig {
        pub fn with_crate_level(mut self, level: Level) -> Self {
            self.crate_level = level;
            self
        }

        pub fn with_json_format(mut self, enabled: bool) -> Self {
            self.json_format = enabled;
            self
        }

        /// Filter directive used when `RUST_LOG` is unset.
        pub fn env_filter(&self) -> String {
            format!(
                "warn,stats_analyzer={}",
                self.crate_level.as_str().to_lowercase()
            )
        }
    }

    /// Installs a stderr subscriber. `RUST_LOG` takes precedence over the
    /// configured filter.
    ///
    /// ```rust,no_run
    /// use stats_analyzer::logging::setup::{init_logging, LoggingConfig};
    ///
    /// init_logging(LoggingConfig::default().with_json_format(true)).unwrap();
    /// ```
    pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.env_filter()));

        let fmt_layer = if config.json_format {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .json()
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .boxed()
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;

        Ok(())
    }
}
