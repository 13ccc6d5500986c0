//! pubrank-ranker — Journal ranking index built from an SJR-style dataset.
//!
//! Loads the dataset once, ranks every journal within each
//! (subject category, edition year) group and answers point lookups,
//! serving publication years newer than the dataset from its latest edition.

pub mod dataset;
pub mod engine;
pub mod normalise;

pub use engine::{CategoryRank, DatasetStatus, RankingEngine, RankingLookup};
