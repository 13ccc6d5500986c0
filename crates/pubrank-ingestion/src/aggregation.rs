//! Aggregation service: resolve tokens, fetch per identifier, summarise.
//!
//! Per-identifier failures travel with the data. Only two conditions fail
//! a request as a whole: nothing resolvable in the input, and a ranking
//! dataset that could not be loaded while rankings are required.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use pubrank_common::{Publication, Quartile};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::coordinator::{FetchCoordinator, FetchFailure};
use crate::resolver::IdentifierResolver;

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("no identifiers could be resolved from the request")]
    NoIdentifiers,

    #[error("ranking dataset unavailable: {0}")]
    RankingUnavailable(String),
}

#[derive(Debug, Clone)]
pub struct AggregationOptions {
    /// Cache entries older than this are refreshed from the source.
    pub max_age: Duration,
    /// Deadline for the whole fan-in; `None` waits for every identifier.
    pub overall_timeout: Option<Duration>,
    /// Refuse to aggregate when the ranking dataset is unavailable.
    pub require_rankings: bool,
}

impl Default for AggregationOptions {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(24 * 3600),
            overall_timeout: None,
            require_rankings: true,
        }
    }
}

/// Publications for one canonical identifier, with the failure (if any)
/// that left the list empty or uncached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentifierPublications {
    pub identifier: String,
    pub via_account: Option<String>,
    pub publications: Vec<Publication>,
    pub error: Option<FetchFailure>,
    pub from_cache: bool,
}

/// Publication count per best quartile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QuartileDistribution {
    pub by_quartile: BTreeMap<Quartile, usize>,
    pub unranked: usize,
}

impl QuartileDistribution {
    pub fn total(&self) -> usize {
        self.by_quartile.values().sum::<usize>() + self.unranked
    }
}

pub struct AggregationService {
    resolver: IdentifierResolver,
    coordinator: FetchCoordinator,
    options: AggregationOptions,
}

impl AggregationService {
    pub fn new(resolver: IdentifierResolver, coordinator: FetchCoordinator, options: AggregationOptions) -> Self {
        Self { resolver, coordinator, options }
    }

    pub fn options(&self) -> &AggregationOptions {
        &self.options
    }

    pub fn coordinator(&self) -> &FetchCoordinator {
        &self.coordinator
    }

    /// Publications for every identifier `tokens` resolve to, sorted by identifier.
    pub async fn publications_for<S: AsRef<str>>(
        &self,
        tokens: &[S],
    ) -> Result<Vec<IdentifierPublications>, AggregationError> {
        self.publications_for_with_max_age(tokens, self.options.max_age).await
    }

    #[instrument(skip(self, tokens), fields(tokens = tokens.len()))]
    pub async fn publications_for_with_max_age<S: AsRef<str>>(
        &self,
        tokens: &[S],
        max_age: Duration,
    ) -> Result<Vec<IdentifierPublications>, AggregationError> {
        self.ensure_rankings()?;

        let resolved = self.resolver.resolve_detailed(tokens).await;
        if resolved.is_empty() {
            return Err(AggregationError::NoIdentifiers);
        }
        let mut via: BTreeMap<String, Option<String>> = resolved
            .iter()
            .map(|r| (r.id.clone(), r.via_account.clone()))
            .collect();

        let outcomes = self
            .coordinator
            .fetch_resolved(resolved, max_age, self.options.overall_timeout)
            .await;

        let results: Vec<IdentifierPublications> = outcomes
            .into_iter()
            .map(|(identifier, outcome)| IdentifierPublications {
                via_account: via.remove(&identifier).flatten(),
                identifier,
                publications: outcome.publications,
                error: outcome.error,
                from_cache: outcome.from_cache,
            })
            .collect();

        info!(
            identifiers = results.len(),
            failed = results.iter().filter(|r| r.error.is_some()).count(),
            publications = results.iter().map(|r| r.publications.len()).sum::<usize>(),
            "Aggregation complete"
        );
        Ok(results)
    }

    /// Publications per year across all identifiers. A publication listed
    /// under several identifiers is counted once; undated ones are skipped.
    pub async fn publication_counts_by_year<S: AsRef<str>>(
        &self,
        tokens: &[S],
    ) -> Result<BTreeMap<i32, usize>, AggregationError> {
        let results = self.publications_for(tokens).await?;
        let mut counts = BTreeMap::new();
        for publication in unique_publications(&results) {
            if let Some(year) = publication.year {
                *counts.entry(year).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    /// Publications per best quartile, with unranked ones counted apart.
    pub async fn quartile_distribution<S: AsRef<str>>(
        &self,
        tokens: &[S],
    ) -> Result<QuartileDistribution, AggregationError> {
        let results = self.publications_for(tokens).await?;
        let mut distribution = QuartileDistribution::default();
        for publication in unique_publications(&results) {
            match publication.best_quartile() {
                Some(q) => *distribution.by_quartile.entry(q).or_insert(0) += 1,
                None => distribution.unranked += 1,
            }
        }
        Ok(distribution)
    }

    /// Drop the cache entries of every identifier `tokens` resolve to.
    /// Returns the number of entries removed.
    pub async fn invalidate<S: AsRef<str>>(&self, tokens: &[S]) -> Result<usize, AggregationError> {
        let ids = self.resolver.resolve(tokens).await;
        if ids.is_empty() {
            return Err(AggregationError::NoIdentifiers);
        }

        let mut removed = 0;
        for id in &ids {
            match self.coordinator.cache().invalidate(id).await {
                Ok(n) => removed += n,
                Err(e) => warn!(identifier = %id, error = %e, "Cache invalidation failed"),
            }
        }
        info!(identifiers = ids.len(), removed, "Cache invalidated");
        Ok(removed)
    }

    fn ensure_rankings(&self) -> Result<(), AggregationError> {
        if !self.options.require_rankings {
            return Ok(());
        }
        match self.coordinator.ranking().status() {
            pubrank_ranker::DatasetStatus::Unavailable { reason } => {
                Err(AggregationError::RankingUnavailable(reason.clone()))
            }
            pubrank_ranker::DatasetStatus::Loaded { .. } => Ok(()),
        }
    }
}

/// Flatten results, keeping the first occurrence of each publication ID.
pub fn unique_publications(results: &[IdentifierPublications]) -> Vec<&Publication> {
    let mut seen = HashSet::new();
    results
        .iter()
        .flat_map(|r| r.publications.iter())
        .filter(|p| seen.insert(p.id.as_str()))
        .collect()
}
