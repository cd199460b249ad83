//! # stats-analyzer - Descriptive statistics for arbitrary CSV files
//!
//! stats-analyzer takes a delimiter-separated file with no schema attached,
//! infers a typed schema from a sample of its rows, bulk-loads it into an
//! analytical store backed by Apache DataFusion, and computes per-column
//! statistics with a handful of aggregate SQL queries.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stats_analyzer::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let pipeline = StatsPipeline::builder()
//!     .config(PipelineConfig::builder().frequency_limit(5).build()?)
//!     .build()?;
//!
//! let outcome = pipeline.run("chat-1", "orders.csv").await?;
//! if let Some(price) = outcome.stats.get_str("price") {
//!     println!("median price: {:?}", price.median);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Stages
//!
//! 1. **Schema inference** ([`schema`]): header detection, then a per-column
//!    type lattice `Empty < DateTime < Date < Integer < Float < String`
//!    folded over up to `sample_size` rows.
//! 2. **Bulk load** ([`load`]): a content-addressed relation name, a
//!    `CREATE TABLE` derived from the manifest, and batched `INSERT`s. A
//!    surrogate `id` key is synthesized unless the file has its own.
//! 3. **Query compilation** ([`stats::compiler`]): one row count, one
//!    uniqueness query, one flattened numeric query, date bucket queries per
//!    granularity and, once distinct counts are known, frequency tables for
//!    low-cardinality string columns.
//! 4. **Assembly** ([`stats::assembler`]): results are demultiplexed into one
//!    [`AggregateStat`](stats::AggregateStat) per column and merged into a
//!    [`StatsMap`](stats::StatsMap).
//!
//! Every stage talks to the store through the
//! [`AnalyticalStore`](store::AnalyticalStore) trait, so any engine that
//! speaks the same SQL dialect can replace [`DataFusionStore`](store::DataFusionStore).
//!
//! ## Logging
//!
//! All stages emit `tracing` spans and events. Binaries install a subscriber
//! with [`logging::setup::init_logging`].

pub mod config;
pub mod error;
pub mod load;
pub mod logging;
pub mod pipeline;
pub mod prelude;
pub mod schema;
pub mod security;
pub mod session;
pub mod sources;
pub mod stats;
pub mod store;
