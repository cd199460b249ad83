//! Mapping from a chat or session identifier to its most recently loaded
//! relation.
//!
//! Pipelines for different sessions run independently; the repository is the
//! only state they share, so it is injected into [`StatsPipeline`] rather
//! than held globally.
//!
//! [`StatsPipeline`]: crate::pipeline::StatsPipeline

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::error::Result;

/// Keyed store of the relation each session last loaded.
#[async_trait]
pub trait SessionRepository: std::fmt::Debug + Send + Sync {
    /// Records `relation` as the latest relation of `session`, returning the
    /// relation it replaces.
    async fn set_relation(&self, session: &str, relation: &str) -> Result<Option<String>>;

    /// The latest relation of `session`.
    async fn relation(&self, session: &str) -> Result<Option<String>>;

    /// Forgets `session`, returning its relation.
    async fn remove(&self, session: &str) -> Result<Option<String>>;

    /// Forgets `session` only if it still points at `relation` and that
    /// mapping is older than `ttl`. Returns whether it was removed.
    async fn remove_if_expired(
        &self,
        session: &str,
        relation: &str,
        ttl: Duration,
    ) -> Result<bool>;

    /// Whether any session currently points at `relation`.
    async fn is_referenced(&self, relation: &str) -> Result<bool>;

    /// Sessions whose relation was recorded more than `ttl` ago, with their
    /// relations.
    async fn expired(&self, ttl: Duration) -> Result<Vec<(String, String)>>;
}

/// [`SessionRepository`] kept in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionRepository {
    sessions: Arc<RwLock<HashMap<String, (String, Instant)>>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked sessions.
    pub async fn size(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    #[instrument(skip(self))]
    async fn set_relation(&self, session: &str, relation: &str) -> Result<Option<String>> {
        let mut sessions = self.sessions.write().await;
        let previous = sessions
            .insert(
                session.to_string(),
                (relation.to_string(), Instant::now()),
            )
            .map(|(relation, _)| relation);
        debug!(replaced = previous.is_some(), "Recorded session relation");
        Ok(previous)
    }

    async fn relation(&self, session: &str) -> Result<Option<String>> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session)
            .map(|(relation, _)| relation.clone()))
    }

    async fn remove(&self, session: &str) -> Result<Option<String>> {
        Ok(self
            .sessions
            .write()
            .await
            .remove(session)
            .map(|(relation, _)| relation))
    }

    async fn remove_if_expired(
        &self,
        session: &str,
        relation: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        let stale = sessions
            .get(session)
            .is_some_and(|(current, loaded_at)| current == relation && loaded_at.elapsed() > ttl);
        if stale {
            sessions.remove(session);
        }
        Ok(stale)
    }

    async fn is_referenced(&self, relation: &str) -> Result<bool> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .any(|(current, _)| current == relation))
    }

    async fn expired(&self, ttl: Duration) -> Result<Vec<(String, String)>> {
        let sessions = self.sessions.read().await;
        let mut expired: Vec<(String, String)> = sessions
            .iter()
            .filter(|(_, (_, loaded_at))| loaded_at.elapsed() > ttl)
            .map(|(session, (relation, _))| (session.clone(), relation.clone()))
            .collect();
        expired.sort();
        Ok(expired)
    }
}
