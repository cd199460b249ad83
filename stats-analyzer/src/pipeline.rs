//! End-to-end pipeline: infer, load, compile, execute, assemble.
//!
//! ```rust,no_run
//! use stats_analyzer::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let pipeline = StatsPipeline::builder().build()?;
//! let outcome = pipeline.run("chat-42", "sales.csv").await?;
//!
//! println!("{}", serde_json::to_string_pretty(&outcome.stats)?);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::PipelineConfig;
use crate::error::{Result, StatsError};
use crate::load::{BulkLoader, LoadReport};
use crate::schema::{RelationManifest, SchemaInferenceEngine};
use crate::session::{InMemorySessionRepository, SessionRepository};
use crate::sources::{CsvOptions, CsvSource};
use crate::stats::{AssemblyReport, QueryFailure, StatResultAssembler, StatsMap};
use crate::store::{AnalyticalStore, DataFusionStore};

/// Everything produced for one uploaded file.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub session: String,
    pub manifest: RelationManifest,
    pub load: LoadReport,
    pub stats: StatsMap,
    pub failures: Vec<QueryFailure>,
    /// Relation the session pointed at before this run, if different
    pub replaced_relation: Option<String>,
}

impl PipelineOutcome {
    pub fn relation(&self) -> &str {
        &self.load.relation
    }
}

/// Builder for [`StatsPipeline`].
#[derive(Debug, Default)]
pub struct StatsPipelineBuilder {
    store: Option<Arc<dyn AnalyticalStore>>,
    sessions: Option<Arc<dyn SessionRepository>>,
    config: Option<PipelineConfig>,
}

impl StatsPipelineBuilder {
    /// Store to load into and query. Defaults to a fresh [`DataFusionStore`].
    pub fn store(mut self, store: Arc<dyn AnalyticalStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Session mapping. Defaults to an [`InMemorySessionRepository`].
    pub fn sessions(mut self, sessions: Arc<dyn SessionRepository>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<StatsPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let store = self.store.unwrap_or_else(|| {
            Arc::new(
                DataFusionStore::new()
                    .with_timeout(config.query_timeout)
                    .with_log_config(config.log.clone()),
            )
        });
        let sessions = self
            .sessions
            .unwrap_or_else(|| Arc::new(InMemorySessionRepository::new()));

        Ok(StatsPipeline {
            store,
            sessions,
            config,
        })
    }
}

/// Runs the statistics pipeline for uploaded CSV files.
#[derive(Debug, Clone)]
pub struct StatsPipeline {
    store: Arc<dyn AnalyticalStore>,
    sessions: Arc<dyn SessionRepository>,
    config: PipelineConfig,
}

impl StatsPipeline {
    pub fn builder() -> StatsPipelineBuilder {
        StatsPipelineBuilder::default()
    }

    pub fn store(&self) -> &Arc<dyn AnalyticalStore> {
        &self.store
    }

    pub fn sessions(&self) -> &Arc<dyn SessionRepository> {
        &self.sessions
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Opens the file with the configured delimiter, or a sniffed one.
    pub fn open_source(&self, path: &Path) -> Result<CsvSource> {
        match self.config.delimiter {
            Some(delimiter) => CsvSource::with_options(
                path,
                CsvOptions {
                    delimiter,
                    ..CsvOptions::default()
                },
            ),
            None => {
                let (source, detection) = CsvSource::detect(path)?;
                if !detection.detected {
                    debug!("No dominant delimiter, falling back to ','");
                }
                Ok(source)
            }
        }
    }

    /// Infers the schema of a file and loads it into a fresh relation.
    ///
    /// Store failures during the load are reported as
    /// [`StatsError::Import`].
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn import(&self, path: impl AsRef<Path>) -> Result<(RelationManifest, LoadReport)> {
        let source = self.open_source(path.as_ref())?;

        let engine = SchemaInferenceEngine::builder()
            .sample_size(self.config.sample_size)
            .build();
        let sampled = source.clone();
        let manifest = tokio::task::spawn_blocking(move || engine.infer_source(&sampled))
            .await
            .map_err(|e| StatsError::Internal(format!("schema inference task failed: {e}")))??;

        let report = BulkLoader::from_config(self.store.clone(), &self.config)
            .load(&source, &manifest)
            .await
            .map_err(StatsError::import_failed)?;
        Ok((manifest, report))
    }

    /// Computes the statistics of a loaded relation.
    pub async fn analyze(&self, manifest: &RelationManifest, relation: &str) -> AssemblyReport {
        StatResultAssembler::from_config(self.store.clone(), &self.config)
            .assemble(manifest, relation)
            .await
    }

    /// Imports and analyzes a file on behalf of `session`.
    ///
    /// The session is pointed at the new relation once the load succeeds. A
    /// different relation it pointed at before is dropped unless another
    /// session still uses it.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn run(&self, session: &str, path: impl AsRef<Path>) -> Result<PipelineOutcome> {
        let (manifest, load) = self.import(path).await?;

        let previous = self.sessions.set_relation(session, &load.relation).await?;
        let replaced_relation = previous.filter(|p| *p != load.relation);
        if let Some(old) = &replaced_relation {
            if self.sessions.is_referenced(old).await? {
                debug!(relation = %old, "Replaced relation is still in use, keeping it");
            } else if let Err(err) = self.store.drop_relation(old).await {
                warn!(relation = %old, error = %err, "Failed to drop replaced relation");
            }
        }

        let report = self.analyze(&manifest, &load.relation).await;
        info!(
            relation = %load.relation,
            rows = load.rows_loaded,
            entries = report.stats.len(),
            failures = report.failures.len(),
            "Pipeline finished"
        );

        Ok(PipelineOutcome {
            session: session.to_string(),
            manifest,
            load,
            stats: report.stats,
            failures: report.failures,
            replaced_relation,
        })
    }

    /// Forgets sessions older than the configured session TTL and drops
    /// their relations.
    pub async fn cleanup_expired(&self) -> Result<Vec<String>> {
        self.cleanup_expired_after(self.config.session_ttl).await
    }

    /// Forgets sessions older than `ttl` and drops relations no session
    /// points at any more.
    ///
    /// A session that loaded a new relation since it was listed as expired
    /// is kept. Returns the relations that were dropped.
    #[instrument(skip(self))]
    pub async fn cleanup_expired_after(&self, ttl: Duration) -> Result<Vec<String>> {
        let mut dropped = Vec::new();
        for (session, relation) in self.sessions.expired(ttl).await? {
            if !self
                .sessions
                .remove_if_expired(&session, &relation, ttl)
                .await?
            {
                debug!(%session, "Session was refreshed, keeping it");
                continue;
            }
            if self.sessions.is_referenced(&relation).await? || dropped.contains(&relation) {
                continue;
            }
            self.store.drop_relation(&relation).await?;
            debug!(%session, %relation, "Dropped expired relation");
            dropped.push(relation);
        }
        Ok(dropped)
    }
}
