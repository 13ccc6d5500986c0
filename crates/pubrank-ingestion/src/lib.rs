//! pubrank-ingestion — Publication aggregation pipeline.
//!
//! - Identifier resolution (external author IDs and internal account references)
//! - Concurrent per-author fetching with failure isolation
//! - Ranking enrichment of every fetched publication
//! - Cached results with age-based freshness and explicit invalidation
//! - Per-year and per-quartile statistics

pub mod aggregation;
pub mod cache;
pub mod coordinator;
pub mod resolver;
pub mod sources;

pub use aggregation::{AggregationError, AggregationOptions, AggregationService, IdentifierPublications, QuartileDistribution};
pub use cache::{CacheEntry, CacheStore, InMemoryCacheStore, JsonFileCacheStore, PublicationCache};
pub use coordinator::{FetchCoordinator, FetchFailure, FetchOutcome};
pub use resolver::{IdentifierResolver, ResolvedIdentifier};
