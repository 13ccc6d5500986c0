//! Concurrent fetch-or-reuse per canonical identifier.
//!
//! Every identifier gets its own task. A task serves a fresh cache entry
//! when there is one; otherwise it calls the external source, enriches the
//! result with rankings and writes it back. Failures stay with the
//! identifier they belong to and never reach sibling tasks.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pubrank_common::{ExternalPublicationSource, Publication, SourceError};
use pubrank_ranker::RankingEngine;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::cache::PublicationCache;
use crate::resolver::ResolvedIdentifier;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Why one identifier produced no (or uncached) publications.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchFailure {
    #[error("source failed: {0}")]
    Source(SourceError),

    #[error("no response within {millis} ms")]
    Timeout { millis: u64 },

    /// Publications were fetched and are returned, but not persisted.
    #[error("fetched but not cached: {0}")]
    CacheWrite(String),

    #[error("cancelled by the aggregation deadline")]
    Cancelled,

    #[error("fetch task failed: {0}")]
    TaskFailed(String),
}

/// Result of one identifier's unit of work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchOutcome {
    pub publications: Vec<Publication>,
    pub error: Option<FetchFailure>,
    pub from_cache: bool,
}

impl FetchOutcome {
    fn fetched(publications: Vec<Publication>) -> Self {
        Self { publications, error: None, from_cache: false }
    }

    fn cached(publications: Vec<Publication>) -> Self {
        Self { publications, error: None, from_cache: true }
    }

    fn failed(error: FetchFailure) -> Self {
        Self { publications: Vec::new(), error: Some(error), from_cache: false }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Clone)]
pub struct FetchCoordinator {
    source: Arc<dyn ExternalPublicationSource>,
    ranking: Arc<RankingEngine>,
    cache: PublicationCache,
    request_timeout: Duration,
}

impl FetchCoordinator {
    pub fn new(
        source: Arc<dyn ExternalPublicationSource>,
        ranking: Arc<RankingEngine>,
        cache: PublicationCache,
    ) -> Self {
        Self { source, ranking, cache, request_timeout: DEFAULT_REQUEST_TIMEOUT }
    }

    /// Upper bound on a single call to the external source.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn ranking(&self) -> &RankingEngine {
        &self.ranking
    }

    pub fn cache(&self) -> &PublicationCache {
        &self.cache
    }

    /// Fetch every identifier concurrently and wait for all of them.
    pub async fn fetch_all<I, S>(&self, ids: I, max_age: Duration) -> BTreeMap<String, FetchOutcome>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fetch_resolved(direct_targets(ids), max_age, None).await
    }

    /// Like [`fetch_all`](Self::fetch_all), but gives up on units still
    /// running after `deadline`. Completed units keep their results; the
    /// rest are reported as [`FetchFailure::Cancelled`].
    pub async fn fetch_all_within<I, S>(
        &self,
        ids: I,
        max_age: Duration,
        deadline: Duration,
    ) -> BTreeMap<String, FetchOutcome>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fetch_resolved(direct_targets(ids), max_age, Some(deadline)).await
    }

    /// Fan out over resolved identifiers. Cache entries written here record
    /// the account each identifier was reached through.
    pub async fn fetch_resolved(
        &self,
        targets: Vec<ResolvedIdentifier>,
        max_age: Duration,
        deadline: Option<Duration>,
    ) -> BTreeMap<String, FetchOutcome> {
        let started = Instant::now();
        // a deadline past the clock's range never fires
        let deadline = deadline.and_then(|d| started.checked_add(d));
        let ids: Vec<String> = targets.iter().map(|t| t.id.clone()).collect();

        // dropping the set aborts whatever is still running
        let mut tasks = JoinSet::new();
        for target in targets {
            let this = self.clone();
            tasks.spawn(async move {
                let outcome = this
                    .fetch_one(&target.id, target.via_account.as_deref(), max_age)
                    .await;
                (target.id, outcome)
            });
        }

        let mut results = BTreeMap::new();
        let mut deadline_hit = false;
        loop {
            let next = match deadline {
                Some(at) => match tokio::time::timeout_at(at, tasks.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        deadline_hit = true;
                        break;
                    }
                },
                None => tasks.join_next().await,
            };
            match next {
                Some(Ok((id, outcome))) => {
                    results.insert(id, outcome);
                }
                Some(Err(e)) => warn!(error = %e, "Fetch task ended without a result"),
                None => break,
            }
        }

        if deadline_hit {
            tasks.abort_all();
            warn!(
                completed = results.len(),
                pending = ids.len() - results.len(),
                "Aggregation deadline passed; cancelling remaining fetches"
            );
        }

        for id in ids {
            results.entry(id).or_insert_with(|| {
                FetchOutcome::failed(if deadline_hit {
                    FetchFailure::Cancelled
                } else {
                    FetchFailure::TaskFailed("task panicked or was aborted".to_string())
                })
            });
        }

        let failed = results.values().filter(|o| !o.is_ok()).count();
        info!(
            identifiers = results.len(),
            failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fetch fan-in complete"
        );
        results
    }

    #[instrument(skip(self, max_age))]
    async fn fetch_one(&self, id: &str, via_account: Option<&str>, max_age: Duration) -> FetchOutcome {
        match self.cache.get(id).await {
            Ok(Some(entry)) if entry.is_fresh_at(max_age, Utc::now()) => {
                debug!(n = entry.publications.len(), "Serving cached publications");
                return FetchOutcome::cached(entry.publications);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Cache read failed; fetching from source"),
        }

        let raw = match tokio::time::timeout(self.request_timeout, self.source.fetch_by_canonical_id(id)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!(source = self.source.name(), error = %e, "Publication fetch failed");
                return FetchOutcome::failed(FetchFailure::Source(e));
            }
            Err(_) => {
                warn!(source = self.source.name(), "Publication fetch timed out");
                return FetchOutcome::failed(FetchFailure::Timeout {
                    millis: self.request_timeout.as_millis() as u64,
                });
            }
        };

        let publications: Vec<Publication> = raw
            .into_iter()
            .map(|r| {
                let mut publication = Publication::from(r);
                self.ranking.enrich(&mut publication);
                publication
            })
            .collect();
        debug!(
            n = publications.len(),
            ranked = publications.iter().filter(|p| p.is_ranked()).count(),
            "Publications fetched and enriched"
        );

        match self.cache.put(id, publications.clone(), via_account).await {
            Ok(_) => FetchOutcome::fetched(publications),
            Err(e) => {
                warn!(error = %e, "Cache write failed; returning uncached publications");
                FetchOutcome {
                    publications,
                    error: Some(FetchFailure::CacheWrite(e.to_string())),
                    from_cache: false,
                }
            }
        }
    }
}

fn direct_targets<I, S>(ids: I) -> Vec<ResolvedIdentifier>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ids.into_iter()
        .map(Into::into)
        .collect::<BTreeSet<String>>()
        .into_iter()
        .map(ResolvedIdentifier::direct)
        .collect()
}
