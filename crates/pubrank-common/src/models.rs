//! Data models shared by the ranking and aggregation pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Returns true when `token` has the shape of an external author ID:
/// ASCII digits only, 10 or 11 characters long.
pub fn is_canonical_id(token: &str) -> bool {
    (10..=11).contains(&token.len()) && token.bytes().all(|b| b.is_ascii_digit())
}

/// Journal ranking tier within a subject category. Q1 is the best tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Quartile {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quartile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quartile::Q1 => "Q1",
            Quartile::Q2 => "Q2",
            Quartile::Q3 => "Q3",
            Quartile::Q4 => "Q4",
        }
    }

    /// Parse a quartile marker such as `Q2` or `q2`.
    /// Anything outside the four known tiers falls back to `Q4`.
    pub fn parse_or_lowest(marker: &str) -> Self {
        marker.parse().unwrap_or(Quartile::Q4)
    }
}

impl FromStr for Quartile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "Q1" => Ok(Quartile::Q1),
            "Q2" => Ok(Quartile::Q2),
            "Q3" => Ok(Quartile::Q3),
            "Q4" => Ok(Quartile::Q4),
            other => Err(format!("unknown quartile marker: {other}")),
        }
    }
}

impl fmt::Display for Quartile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subject-category ranking attached to one publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SjrMetric {
    pub category: String,
    pub quartile: Quartile,
    /// Rank within the category as a share of the category size, 0–100, one decimal.
    pub percentile: f64,
    /// Ranking edition actually used; may be older than the publication year.
    pub year: i32,
}

/// A publication record as returned by an external source, before enrichment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPublication {
    pub id: String,
    pub eid: Option<String>,
    pub doi: Option<String>,
    pub title: String,
    pub year: Option<i32>,
    pub source_title: Option<String>,
    pub document_type: Option<String>,
    pub affiliation: Option<String>,
    #[serde(default)]
    pub subject_areas: Vec<String>,
}

/// An enriched publication, as held by the cache and returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub id: String,
    pub eid: Option<String>,
    pub doi: Option<String>,
    pub title: String,
    pub year: Option<i32>,
    pub source_title: Option<String>,
    pub document_type: Option<String>,
    pub affiliation: Option<String>,
    #[serde(default)]
    pub subject_areas: Vec<String>,
    #[serde(default)]
    pub sjr_metrics: Vec<SjrMetric>,
}

impl Publication {
    /// Best (lowest-numbered) quartile across all ranked categories.
    pub fn best_quartile(&self) -> Option<Quartile> {
        self.sjr_metrics.iter().map(|m| m.quartile).min()
    }

    pub fn is_ranked(&self) -> bool {
        !self.sjr_metrics.is_empty()
    }
}

impl From<RawPublication> for Publication {
    fn from(raw: RawPublication) -> Self {
        Self {
            id: raw.id,
            eid: raw.eid,
            doi: raw.doi,
            title: raw.title,
            year: raw.year,
            source_title: raw.source_title,
            document_type: raw.document_type,
            affiliation: raw.affiliation,
            subject_areas: raw.subject_areas,
            sjr_metrics: Vec::new(),
        }
    }
}
