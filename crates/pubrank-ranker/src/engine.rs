//! In-memory journal ranking index.
//!
//! Structure:
//! - `index`: (normalised journal title, edition year) → category ranks
//! - `latest_year`: newest edition seen in the dataset, used for year-fallback
//!
//! Built once at load time and read-only afterwards, so a shared
//! `Arc<RankingEngine>` can be queried from any number of tasks.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use pubrank_common::{Publication, PubrankError, Quartile, SjrMetric};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dataset::{read_rows, year_from_file_name, DatasetRow};
use crate::normalise::{normalise_journal_name, rank_descending, rank_percentile};

/// Ranking of one journal within one subject category and edition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryRank {
    pub category: String,
    pub quartile: Quartile,
    pub percentile: f64,
    pub rank: usize,
    pub total: usize,
}

/// Outcome of a point lookup. `NotIndexed` is a normal answer, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum RankingLookup<'a> {
    Indexed {
        /// Edition actually consulted after year-fallback.
        year: i32,
        ranks: &'a [CategoryRank],
    },
    NotIndexed,
}

impl RankingLookup<'_> {
    pub fn is_indexed(&self) -> bool {
        matches!(self, RankingLookup::Indexed { .. })
    }
}

/// Whether the dataset could be read at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DatasetStatus {
    Loaded { rows: usize, latest_year: Option<i32> },
    Unavailable { reason: String },
}

#[derive(Debug, Clone)]
pub struct RankingEngine {
    index: HashMap<(String, i32), Vec<CategoryRank>>,
    latest_year: Option<i32>,
    status: DatasetStatus,
    source_files: Vec<PathBuf>,
}

impl RankingEngine {
    /// Engine that answers `NotIndexed` to everything.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            index: HashMap::new(),
            latest_year: None,
            status: DatasetStatus::Unavailable { reason: reason.into() },
            source_files: Vec::new(),
        }
    }

    /// Build the index from already-parsed rows, in input order.
    pub fn from_rows(rows: Vec<DatasetRow>) -> Self {
        let latest_year = rows.iter().map(|r| r.year).max();

        // (category, year) → members as (row, category slot, score)
        let mut groups: HashMap<(&str, i32), Vec<(usize, usize, f64)>> = HashMap::new();
        for (row_idx, row) in rows.iter().enumerate() {
            for (slot, cat) in row.categories.iter().enumerate() {
                groups
                    .entry((cat.name.as_str(), row.year))
                    .or_default()
                    .push((row_idx, slot, row.score));
            }
        }

        // rank/total per (row, slot); members are pushed in row order, so
        // rank_descending breaks ties by input order
        let mut placed: HashMap<(usize, usize), (usize, usize)> = HashMap::new();
        for members in groups.values() {
            let scores: Vec<f64> = members.iter().map(|m| m.2).collect();
            let total = members.len();
            for (member, rank) in members.iter().zip(rank_descending(&scores)) {
                placed.insert((member.0, member.1), (rank, total));
            }
        }

        let mut index: HashMap<(String, i32), Vec<CategoryRank>> = HashMap::new();
        for (row_idx, row) in rows.iter().enumerate() {
            if row.categories.is_empty() {
                continue;
            }
            let key = (normalise_journal_name(&row.title), row.year);
            let entry = index.entry(key).or_default();
            for (slot, cat) in row.categories.iter().enumerate() {
                let Some(&(rank, total)) = placed.get(&(row_idx, slot)) else {
                    continue;
                };
                entry.push(CategoryRank {
                    category: cat.name.clone(),
                    quartile: cat.quartile,
                    percentile: rank_percentile(rank, total),
                    rank,
                    total,
                });
            }
        }

        info!(
            rows = rows.len(),
            journals = index.len(),
            categories = groups.len(),
            latest_year = ?latest_year,
            "Ranking index built"
        );

        Self {
            index,
            latest_year,
            status: DatasetStatus::Loaded { rows: rows.len(), latest_year },
            source_files: Vec::new(),
        }
    }

    /// Build from a reader over one dataset file.
    pub fn from_reader<R: Read>(reader: R, default_year: Option<i32>) -> Result<Self, PubrankError> {
        Ok(Self::from_rows(read_rows(reader, default_year)?))
    }

    /// Load a dataset file, or every `*.csv` file of a directory.
    ///
    /// Directory files are read in file-name order; rows without a `year`
    /// column take the year found in their file name.
    pub fn try_load_path(path: &Path) -> Result<Self, PubrankError> {
        let files = if path.is_dir() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")))
                .collect();
            files.sort();
            files
        } else {
            vec![path.to_path_buf()]
        };

        if files.is_empty() {
            return Err(PubrankError::Dataset(format!("no dataset files under {}", path.display())));
        }

        let single = files.len() == 1;
        let mut rows = Vec::new();
        let mut loaded = Vec::new();
        for file in files {
            let parsed = File::open(&file)
                .map_err(PubrankError::from)
                .and_then(|f| read_rows(f, year_from_file_name(&file)));
            match parsed {
                Ok(file_rows) => {
                    debug!(file = %file.display(), rows = file_rows.len(), "Dataset file read");
                    rows.extend(file_rows);
                    loaded.push(file);
                }
                // one bad yearly file should not hide the others
                Err(e) if !single => {
                    warn!(file = %file.display(), error = %e, "Skipping unreadable dataset file");
                }
                Err(e) => return Err(e),
            }
        }

        if loaded.is_empty() {
            return Err(PubrankError::Dataset(format!("no readable dataset files under {}", path.display())));
        }

        let mut engine = Self::from_rows(rows);
        engine.source_files = loaded;
        Ok(engine)
    }

    /// Like [`try_load_path`](Self::try_load_path), but degrades to an
    /// always-`NotIndexed` engine when the dataset cannot be read.
    pub fn load_path(path: &Path) -> Self {
        match Self::try_load_path(path) {
            Ok(engine) => engine,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ranking dataset unavailable; publications will be unranked");
                Self::unavailable(e.to_string())
            }
        }
    }

    /// Ranks for `journal` in `year`, served from the latest edition when
    /// `year` is newer than the dataset.
    pub fn lookup(&self, journal: &str, year: i32) -> RankingLookup<'_> {
        let Some(latest) = self.latest_year else {
            return RankingLookup::NotIndexed;
        };
        let effective = year.min(latest);

        match self.index.get(&(normalise_journal_name(journal), effective)) {
            Some(ranks) if !ranks.is_empty() => RankingLookup::Indexed { year: effective, ranks },
            _ => RankingLookup::NotIndexed,
        }
    }

    /// Lookup flattened into publication metrics; empty when not indexed.
    pub fn metrics_for(&self, journal: &str, year: i32) -> Vec<SjrMetric> {
        match self.lookup(journal, year) {
            RankingLookup::Indexed { year, ranks } => ranks
                .iter()
                .map(|r| SjrMetric {
                    category: r.category.clone(),
                    quartile: r.quartile,
                    percentile: r.percentile,
                    year,
                })
                .collect(),
            RankingLookup::NotIndexed => Vec::new(),
        }
    }

    /// Replace the publication's metrics with the ones for its journal and year.
    /// Publications missing either stay unranked.
    pub fn enrich(&self, publication: &mut Publication) {
        publication.sjr_metrics = match (publication.source_title.as_deref(), publication.year) {
            (Some(journal), Some(year)) => self.metrics_for(journal, year),
            _ => Vec::new(),
        };
    }

    pub fn latest_year(&self) -> Option<i32> {
        self.latest_year
    }

    pub fn status(&self) -> &DatasetStatus {
        &self.status
    }

    pub fn is_available(&self) -> bool {
        matches!(self.status, DatasetStatus::Loaded { .. })
    }

    /// Number of (journal, edition) keys in the index.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn source_files(&self) -> &[PathBuf] {
        &self.source_files
    }

    /// Every indexed rank for one (category, edition), best rank first.
    pub fn category_ranks(&self, category: &str, year: i32) -> Vec<&CategoryRank> {
        let mut ranks: Vec<&CategoryRank> = self
            .index
            .iter()
            .filter(|((_, y), _)| *y == year)
            .flat_map(|(_, ranks)| ranks.iter())
            .filter(|r| r.category == category)
            .collect();
        ranks.sort_by_key(|r| r.rank);
        ranks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::CategoryMarker;
    use pretty_assertions::assert_eq;
    use pubrank_common::RawPublication;

    fn row(title: &str, score: f64, categories: &[(&str, Quartile)], year: i32) -> DatasetRow {
        DatasetRow {
            title: title.to_string(),
            score,
            categories: categories
                .iter()
                .map(|(name, quartile)| CategoryMarker { name: name.to_string(), quartile: *quartile })
                .collect(),
            year,
        }
    }

    fn scenario_engine() -> RankingEngine {
        RankingEngine::from_rows(vec![
            row("Journal A", 2.5, &[("Software", Quartile::Q1), ("AI", Quartile::Q2)], 2023),
            row("Journal B", 1.0, &[("Software", Quartile::Q2)], 2023),
            row("Journal C", 0.5, &[("Software", Quartile::Q3)], 2023),
            row("Journal D", 0.1, &[("Software", Quartile::Q4)], 2023),
        ])
    }

    #[test]
    fn test_top_journal_rank_and_percentile() {
        let engine = scenario_engine();
        let RankingLookup::Indexed { year, ranks } = engine.lookup("Journal A", 2023) else {
            panic!("Journal A should be indexed");
        };
        assert_eq!(year, 2023);
        let software = ranks.iter().find(|r| r.category == "Software").unwrap();
        assert_eq!(software.rank, 1);
        assert_eq!(software.total, 4);
        assert_eq!(software.percentile, 25.0);
        assert_eq!(software.quartile, Quartile::Q1);

        let ai = ranks.iter().find(|r| r.category == "AI").unwrap();
        assert_eq!((ai.rank, ai.total, ai.percentile), (1, 1, 100.0));
    }

    #[test]
    fn test_category_order_follows_dataset_cell() {
        let engine = scenario_engine();
        let metrics = engine.metrics_for("journal a", 2023);
        let names: Vec<&str> = metrics.iter().map(|m| m.category.as_str()).collect();
        assert_eq!(names, vec!["Software", "AI"]);
    }

    #[test]
    fn test_lookup_normalises_journal_name() {
        let engine = scenario_engine();
        assert!(engine.lookup("  JOURNAL   a ", 2023).is_indexed());
        assert!(!engine.lookup("Journal Z", 2023).is_indexed());
    }

    #[test]
    fn test_year_fallback_matches_latest_edition() {
        let engine = RankingEngine::from_rows(vec![
            row("Journal A", 2.0, &[("Law", Quartile::Q1)], 2021),
            row("Journal B", 3.0, &[("Law", Quartile::Q1)], 2021),
            row("Journal A", 4.0, &[("Law", Quartile::Q1)], 2022),
            row("Journal B", 1.0, &[("Law", Quartile::Q2)], 2022),
        ]);
        assert_eq!(engine.latest_year(), Some(2022));
        assert_eq!(engine.lookup("Journal A", 2030), engine.lookup("Journal A", 2022));
        let RankingLookup::Indexed { year, ranks } = engine.lookup("Journal A", 2030) else {
            panic!("fallback lookup should be indexed");
        };
        assert_eq!(year, 2022);
        assert_eq!(ranks[0].rank, 1);

        // Older editions are not clamped
        let RankingLookup::Indexed { ranks, .. } = engine.lookup("Journal A", 2021) else {
            panic!("2021 edition should be indexed");
        };
        assert_eq!(ranks[0].rank, 2);
        assert!(!engine.lookup("Journal A", 2019).is_indexed());
    }

    #[test]
    fn test_ties_keep_input_order() {
        let engine = RankingEngine::from_rows(vec![
            row("First", 1.0, &[("Law", Quartile::Q1)], 2020),
            row("Second", 1.0, &[("Law", Quartile::Q1)], 2020),
        ]);
        let first = engine.metrics_for("First", 2020);
        let second = engine.metrics_for("Second", 2020);
        assert_eq!(first[0].percentile, 50.0);
        assert_eq!(second[0].percentile, 100.0);
    }

    #[test]
    fn test_percentiles_monotonic_within_group() {
        let scores = [0.3, 5.1, 2.2, 2.2, 0.0, 9.9, 1.4];
        let rows = scores
            .iter()
            .enumerate()
            .map(|(i, s)| row(&format!("Journal {i}"), *s, &[("Physics", Quartile::Q2)], 2019))
            .collect();
        let engine = RankingEngine::from_rows(rows);

        let ranks = engine.category_ranks("Physics", 2019);
        assert_eq!(ranks.len(), scores.len());
        for pair in ranks.windows(2) {
            assert!(pair[0].rank < pair[1].rank);
            assert!(pair[0].percentile <= pair[1].percentile);
        }
        assert_eq!(ranks[0].percentile, rank_percentile(1, scores.len()));
    }

    #[test]
    fn test_rows_without_categories_still_count_for_latest_year() {
        let engine = RankingEngine::from_rows(vec![
            row("Journal A", 1.0, &[("Law", Quartile::Q1)], 2020),
            row("Journal B", 1.0, &[], 2024),
        ]);
        assert_eq!(engine.latest_year(), Some(2024));
        assert!(!engine.lookup("Journal B", 2024).is_indexed());
        // 2025 clamps to 2024, where Journal A has no entry
        assert!(engine.lookup("Journal A", 2020).is_indexed());
        assert!(!engine.lookup("Journal A", 2025).is_indexed());
    }

    #[test]
    fn test_unavailable_engine_is_never_indexed() {
        let engine = RankingEngine::unavailable("missing file");
        assert!(!engine.is_available());
        assert!(!engine.lookup("Journal A", 2023).is_indexed());
        assert!(engine.metrics_for("Journal A", 2023).is_empty());
    }

    #[test]
    fn test_enrich_sets_metrics_and_fallback_year() {
        let engine = scenario_engine();
        let mut publication = Publication::from(RawPublication {
            id: "85100000001".to_string(),
            title: "On Software".to_string(),
            year: Some(2025),
            source_title: Some("Journal A".to_string()),
            ..Default::default()
        });
        engine.enrich(&mut publication);
        assert_eq!(publication.sjr_metrics.len(), 2);
        assert!(publication.sjr_metrics.iter().all(|m| m.year == 2023));
        assert_eq!(publication.best_quartile(), Some(Quartile::Q1));

        publication.year = None;
        engine.enrich(&mut publication);
        assert!(publication.sjr_metrics.is_empty());
    }

    #[test]
    fn test_load_path_degrades_when_missing() {
        let engine = RankingEngine::load_path(Path::new("/nonexistent/sjr.csv"));
        assert!(matches!(engine.status(), DatasetStatus::Unavailable { .. }));
        assert!(engine.is_empty());
    }
}
