//! Read-through/write-through caching of summaries and trending lists.
//!
//! Summaries are keyed by [`Subject::cache_key`], so locality does not
//! distinguish entries. Entries never expire and there is no invalidation.
//! Concurrent misses for one subject each aggregate and each write; the last
//! write wins.

use crate::agent::AgentError;
use crate::aggregate::Aggregator;
use crate::storage::{load, save, CacheStore};
use crate::subject::Subject;
use crate::summary::{Summary, Trending};
use crate::topic::TopicSource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Fixed key for the trending list.
pub const TRENDING_KEY: &str = "trending";

pub struct SummaryCache {
    store: Arc<dyn CacheStore>,
    aggregator: Aggregator,
}

impl SummaryCache {
    pub fn new(store: Arc<dyn CacheStore>, aggregator: Aggregator) -> Self {
        Self { store, aggregator }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Topic source behind the aggregator, for uncached single-topic queries.
    pub fn source(&self) -> &Arc<dyn TopicSource> {
        self.aggregator.source()
    }

    /// Cached summary for `subject`, aggregating and storing it on a miss.
    pub async fn get_or_compute(&self, subject: &Subject) -> Result<Summary, AgentError> {
        let key = subject.cache_key();
        if let Some(summary) = self.lookup::<Summary>(&key).await {
            return Ok(summary);
        }

        let summary = self.aggregator.aggregate(subject).await?;
        self.remember(&key, &summary).await;
        Ok(summary)
    }

    /// Summaries for two subjects, each resolved through the cache.
    ///
    /// Both sides run to completion, so a side that succeeds is cached even
    /// when the other fails. The first side's error wins.
    pub async fn compare(&self, first: &Subject, second: &Subject) -> Result<(Summary, Summary), AgentError> {
        let (a, b) = tokio::join!(self.get_or_compute(first), self.get_or_compute(second));
        Ok((a?, b?))
    }

    pub async fn trending(&self) -> Result<Trending, AgentError> {
        if let Some(trending) = self.lookup::<Trending>(TRENDING_KEY).await {
            return Ok(trending);
        }

        let trending = self.source().trending().await?;
        self.remember(TRENDING_KEY, &trending).await;
        Ok(trending)
    }

    /// A read failure or undecodable entry counts as a miss.
    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match load::<T>(self.store.as_ref(), key).await {
            Ok(Some(stored)) => {
                tracing::info!(key, cached_at = %stored.created_at, "cache hit");
                Some(stored.value)
            }
            Ok(None) => {
                tracing::info!(key, "cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed, computing live");
                None
            }
        }
    }

    async fn remember<T: Serialize + Sync>(&self, key: &str, value: &T) {
        if let Err(e) = save(self.store.as_ref(), key, value).await {
            tracing::warn!(key, error = %e, "cache write failed");
        }
    }
}
