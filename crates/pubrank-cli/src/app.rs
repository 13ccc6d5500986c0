//! Explicit construction of every collaborator from configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use pubrank_common::{AccountDirectory, ExternalPublicationSource, StaticAccountDirectory};
use pubrank_config::{CacheBackend, Config};
use pubrank_ingestion::sources::{ScopusClient, ScopusSettings};
use pubrank_ingestion::{
    AggregationOptions, AggregationService, FetchCoordinator, IdentifierResolver, JsonFileCacheStore,
    PublicationCache,
};
use pubrank_ranker::{DatasetStatus, RankingEngine};
use tracing::{info, warn};

pub fn load_ranking(config: &Config) -> RankingEngine {
    let engine = RankingEngine::load_path(&config.ranking.dataset_path);
    if let DatasetStatus::Loaded { rows, latest_year } = engine.status() {
        info!(rows, latest_year = ?latest_year, files = engine.source_files().len(), "Ranking dataset loaded");
    }
    engine
}

pub fn build_source(config: &Config) -> Result<ScopusClient> {
    if config.scopus.api_key.trim().is_empty() {
        warn!(
            "No Scopus API key configured (set scopus.api_key or {}); every fetch will fail",
            pubrank_config::API_KEY_ENV
        );
    }
    let settings = ScopusSettings {
        base_url: config.scopus.base_url.clone(),
        api_key: config.scopus.api_key.clone(),
        inst_token: config.scopus.inst_token.clone(),
        page_size: config.scopus.page_size,
        view: config.scopus.view.clone(),
        request_timeout: std::time::Duration::from_secs(config.scopus.request_timeout_secs),
    };
    ScopusClient::new(settings).context("building Scopus client")
}

pub fn build_directory(config: &Config) -> Result<StaticAccountDirectory> {
    match &config.accounts.directory_path {
        Some(path) => {
            let directory = StaticAccountDirectory::load(path)
                .with_context(|| format!("loading account directory {}", path.display()))?;
            info!(accounts = directory.len(), "Account directory loaded");
            Ok(directory)
        }
        None => {
            info!("No account directory configured; account references resolve to themselves");
            Ok(StaticAccountDirectory::new())
        }
    }
}

pub async fn build_cache(config: &Config) -> Result<PublicationCache> {
    let cache = match config.cache.backend {
        CacheBackend::Memory => PublicationCache::in_memory(),
        CacheBackend::Json => {
            let store = JsonFileCacheStore::open(&config.cache.directory)
                .await
                .with_context(|| format!("opening cache directory {}", config.cache.directory.display()))?;
            PublicationCache::new(Arc::new(store))
        }
    };
    Ok(match config.cache.retention() {
        Some(retention) => cache.with_retention(retention),
        None => cache,
    })
}

/// Assemble the service from already-built collaborators.
pub fn assemble(
    config: &Config,
    source: Arc<dyn ExternalPublicationSource>,
    directory: Arc<dyn AccountDirectory>,
    ranking: Arc<RankingEngine>,
    cache: PublicationCache,
) -> AggregationService {
    let coordinator = FetchCoordinator::new(source, ranking, cache)
        .with_request_timeout(config.aggregation.request_timeout());
    let options = AggregationOptions {
        max_age: config.cache.max_age(),
        overall_timeout: config.aggregation.overall_timeout(),
        require_rankings: config.ranking.require_rankings,
    };
    AggregationService::new(IdentifierResolver::new(directory), coordinator, options)
}

pub async fn build_service(config: &Config) -> Result<AggregationService> {
    let ranking = Arc::new(load_ranking(config));
    let source = Arc::new(build_source(config)?);
    let directory = Arc::new(build_directory(config)?);
    let cache = build_cache(config).await?;
    Ok(assemble(config, source, directory, ranking, cache))
}
