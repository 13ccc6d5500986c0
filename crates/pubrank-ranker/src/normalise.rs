//! Name and score normalisation.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalise a journal title into its lookup key.
///
/// Lowercases, strips diacritics, spells `&` as `and`, drops everything
/// that is not alphanumeric and collapses whitespace to single spaces.
pub fn normalise_journal_name(name: &str) -> String {
    let folded: String = name
        .to_lowercase()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect();
    let folded = folded.replace('&', " and ");

    let kept: String = folded
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a dataset score. Accepts decimal comma or point.
/// Missing or non-numeric scores become 0.0 so the journal keeps its categories.
pub fn parse_score(raw: &str) -> f64 {
    let cleaned = raw.trim().replace(',', ".");
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Percentile of a 1-based rank within a group: rank / total × 100, one decimal.
pub fn rank_percentile(rank: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_one_decimal(rank as f64 / total as f64 * 100.0)
}

pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// 1-based ranks for `scores`, best (highest) score first.
///
/// Equal scores are not averaged: the earlier input keeps the better rank.
/// Returns ranks in the same order as input.
pub fn rank_descending(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    // sort_by is stable, which is what makes input order the tie-break
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0usize; scores.len()];
    for (position, &idx) in order.iter().enumerate() {
        ranks[idx] = position + 1;
    }
    ranks
}
