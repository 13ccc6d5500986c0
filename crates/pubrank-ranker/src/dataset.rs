//! SJR-style ranking dataset parsing.
//!
//! Expected format: semicolon-delimited, with a header row containing at
//! least `Title`, `Categories` and `SJR`. A `year` column is optional when
//! the caller supplies the edition year (e.g. from the file name).
//!
//! `Categories` cells look like `Software (Q1); Artificial Intelligence (Q2)`.

use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use pubrank_common::{PubrankError, Quartile};
use regex::Regex;
use tracing::{debug, warn};

use crate::normalise::parse_score;

/// One journal row of the dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRow {
    pub title: String,
    pub score: f64,
    pub categories: Vec<CategoryMarker>,
    pub year: i32,
}

/// A category name with the quartile recorded for it in the dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryMarker {
    pub name: String,
    pub quartile: Quartile,
}

/// Parse a `Categories` cell.
///
/// Tokens without a recognised `(Q1)`..`(Q4)` marker default to `Q4`.
/// Empty tokens are skipped; an empty cell yields no categories.
pub fn parse_categories(field: &str) -> Vec<CategoryMarker> {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    let marker = MARKER.get_or_init(|| {
        Regex::new(r"^(?P<name>.*?)\s*\((?P<q>[^()]*)\)\s*$").expect("category marker regex")
    });

    field
        .split(';')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter_map(|token| {
            let (name, quartile) = match marker.captures(token) {
                Some(caps) if looks_like_marker(&caps["q"]) => {
                    let q = &caps["q"];
                    if q.trim().parse::<Quartile>().is_err() {
                        debug!(token, "Unrecognised quartile marker, defaulting to Q4");
                    }
                    (caps["name"].trim().to_string(), Quartile::parse_or_lowest(q))
                }
                // Trailing parenthetical that is part of the name, e.g. "(miscellaneous)"
                _ => (token.to_string(), Quartile::Q4),
            };
            if name.is_empty() {
                None
            } else {
                Some(CategoryMarker { name, quartile })
            }
        })
        .collect()
}

/// `Q1`, `q3`, `Q5`, `Q` or `-`: something meant as a quartile slot.
fn looks_like_marker(q: &str) -> bool {
    let q = q.trim();
    q == "-" || (q.len() <= 2 && q.chars().next().is_some_and(|c| c.eq_ignore_ascii_case(&'q')))
}

/// First run of four digits in a file name, e.g. `scimagojr 2022.csv` → 2022.
pub fn year_from_file_name(path: &Path) -> Option<i32> {
    static YEAR: OnceLock<Regex> = OnceLock::new();
    let year = YEAR.get_or_init(|| Regex::new(r"(\d{4})").expect("year regex"));

    let stem = path.file_stem()?.to_str()?;
    year.captures(stem)?.get(1)?.as_str().parse().ok()
}

struct Columns {
    title: usize,
    categories: usize,
    score: usize,
    year: Option<usize>,
}

fn find_columns(headers: &csv::StringRecord) -> Result<Columns, PubrankError> {
    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().trim_start_matches('\u{feff}').eq_ignore_ascii_case(name))
    };
    let require = |name: &str| {
        position(name).ok_or_else(|| PubrankError::Dataset(format!("dataset missing {name} column")))
    };

    Ok(Columns {
        title: require("Title")?,
        categories: require("Categories")?,
        score: require("SJR")?,
        year: position("year"),
    })
}

/// Read every row from a semicolon-delimited dataset.
///
/// `default_year` is used for rows when the file has no `year` column.
/// Rows whose year cannot be determined are skipped with a warning.
pub fn read_rows<R: Read>(reader: R, default_year: Option<i32>) -> Result<Vec<DatasetRow>, PubrankError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| PubrankError::Dataset(format!("unreadable header: {e}")))?
        .clone();
    let cols = find_columns(&headers)?;
    if cols.year.is_none() && default_year.is_none() {
        return Err(PubrankError::Dataset(
            "dataset has no year column and no edition year was given".to_string(),
        ));
    }

    let mut rows = Vec::new();
    for (line, record) in csv_reader.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!(line = line + 2, error = %e, "Skipping malformed dataset row");
                continue;
            }
        };

        let title = record.get(cols.title).unwrap_or("").trim();
        if title.is_empty() {
            continue;
        }

        let year = match cols.year.and_then(|i| record.get(i)) {
            Some(raw) => raw.trim().parse::<i32>().ok(),
            None => default_year,
        };
        let Some(year) = year else {
            warn!(line = line + 2, title, "Skipping dataset row without a usable year");
            continue;
        };

        rows.push(DatasetRow {
            title: title.to_string(),
            score: parse_score(record.get(cols.score).unwrap_or("")),
            categories: parse_categories(record.get(cols.categories).unwrap_or("")),
            year,
        });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn marker(name: &str, quartile: Quartile) -> CategoryMarker {
        CategoryMarker { name: name.to_string(), quartile }
    }

    #[test]
    fn test_parse_categories_with_markers() {
        let parsed = parse_categories("Software (Q1); Artificial Intelligence (Q2)");
        assert_eq!(
            parsed,
            vec![marker("Software", Quartile::Q1), marker("Artificial Intelligence", Quartile::Q2)]
        );
    }

    #[test]
    fn test_parse_categories_defaults_to_q4() {
        let parsed = parse_categories("Software; Medicine (miscellaneous) (Q5);Law (-)");
        assert_eq!(
            parsed,
            vec![
                marker("Software", Quartile::Q4),
                marker("Medicine (miscellaneous)", Quartile::Q4),
                marker("Law", Quartile::Q4),
            ]
        );
    }

    #[test]
    fn test_parse_categories_keeps_inner_parentheses() {
        let parsed = parse_categories("Medicine (miscellaneous) (Q2); Biochemistry (medical)");
        assert_eq!(
            parsed,
            vec![
                marker("Medicine (miscellaneous)", Quartile::Q2),
                marker("Biochemistry (medical)", Quartile::Q4),
            ]
        );
    }

    #[test]
    fn test_parse_categories_empty() {
        assert!(parse_categories("").is_empty());
        assert!(parse_categories(" ; ;").is_empty());
    }

    #[test]
    fn test_year_from_file_name() {
        assert_eq!(year_from_file_name(Path::new("data/scimagojr 2022.csv")), Some(2022));
        assert_eq!(year_from_file_name(Path::new("sjr.csv")), None);
    }

    #[test]
    fn test_read_rows_with_year_column() {
        let quoted = "Rank;Title;SJR;Categories;year\n\
                      1;\"Journal A\";\"2,5\";\"Software (Q1); AI (Q2)\";2023\n";
        let rows = read_rows(quoted.as_bytes(), None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Journal A");
        assert_eq!(rows[0].score, 2.5);
        assert_eq!(rows[0].year, 2023);
        assert_eq!(rows[0].categories.len(), 2);
    }

    #[test]
    fn test_read_rows_uses_default_year() {
        let data = "Title;SJR;Categories\n\"Journal B\";1.0;\"Law (Q3)\"\n";
        let rows = read_rows(data.as_bytes(), Some(2021)).unwrap();
        assert_eq!(rows[0].year, 2021);
    }

    #[test]
    fn test_read_rows_requires_columns() {
        let data = "Title;Categories\nJournal;Law (Q1)\n";
        let err = read_rows(data.as_bytes(), Some(2020)).unwrap_err();
        assert!(matches!(err, PubrankError::Dataset(_)));
    }

    #[test]
    fn test_read_rows_requires_some_year() {
        let data = "Title;SJR;Categories\nJournal;1;Law (Q1)\n";
        assert!(read_rows(data.as_bytes(), None).is_err());
    }

    #[test]
    fn test_read_rows_skips_bad_year() {
        let data = "Title;SJR;Categories;year\nA;1;Law (Q1);20x3\nB;1;Law (Q1);2020\n";
        let rows = read_rows(data.as_bytes(), None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "B");
    }
}
