//! Subcommand handlers. Each returns the JSON document printed on stdout.

use std::time::Duration;

use anyhow::Result;
use pubrank_ingestion::aggregation::unique_publications;
use pubrank_ingestion::AggregationService;
use pubrank_ranker::{RankingEngine, RankingLookup};
use serde_json::{json, Value};

pub async fn publications(
    service: &AggregationService,
    tokens: &[String],
    max_age_hours: Option<u64>,
) -> Result<Value> {
    let results = match max_age_hours {
        Some(hours) => {
            service
                .publications_for_with_max_age(tokens, max_age_from_hours(hours))
                .await?
        }
        None => service.publications_for(tokens).await?,
    };
    let failed = results.iter().filter(|r| r.error.is_some()).count();
    Ok(json!({
        "identifiers": results.len(),
        "failed": failed,
        "unique_publications": unique_publications(&results).len(),
        "results": results,
    }))
}

fn max_age_from_hours(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(3600))
}

pub async fn counts(service: &AggregationService, tokens: &[String]) -> Result<Value> {
    let counts = service.publication_counts_by_year(tokens).await?;
    Ok(json!({
        "total": counts.values().sum::<usize>(),
        "by_year": counts,
    }))
}

pub async fn quartiles(service: &AggregationService, tokens: &[String]) -> Result<Value> {
    let distribution = service.quartile_distribution(tokens).await?;
    Ok(json!({
        "total": distribution.total(),
        "by_quartile": distribution.by_quartile,
        "unranked": distribution.unranked,
    }))
}

pub async fn invalidate(service: &AggregationService, tokens: &[String]) -> Result<Value> {
    let removed = service.invalidate(tokens).await?;
    Ok(json!({ "removed": removed }))
}

pub fn lookup(engine: &RankingEngine, journal: &str, year: i32) -> Value {
    match engine.lookup(journal, year) {
        RankingLookup::Indexed { year: edition, ranks } => json!({
            "journal": journal,
            "requested_year": year,
            "edition": edition,
            "indexed": true,
            "categories": ranks,
        }),
        RankingLookup::NotIndexed => json!({
            "journal": journal,
            "requested_year": year,
            "indexed": false,
            "dataset": engine.status(),
        }),
    }
}
