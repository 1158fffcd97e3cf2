//! Concentration summaries over category and source histograms.

use serde::Serialize;

use crate::types::TagCounts;

/// A tag with its record count and share of the histogram in percent.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TagPercent {
    /// Tag name.
    pub tag: String,
    /// Records carrying the tag.
    pub count: u64,
    /// Share of the histogram total, in percent.
    pub percent: f64,
}

/// How much of a corpus a few tags account for.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Concentration {
    /// Records in the histogram.
    pub total: u64,
    /// Distinct tags.
    pub tags: usize,
    /// Largest tag; ties go to the lexically smaller tag.
    pub dominant: TagPercent,
    /// Tags summed into `top_percent` (at most the number of tags).
    pub top_n: usize,
    /// Percent of records held by the `top_n` largest tags.
    pub top_percent: f64,
    /// Inverse Simpson index, the number of equally sized tags with the same
    /// spread. Equals `tags` for a perfectly even histogram.
    pub effective_tags: f64,
    /// Tags below the rare threshold, smallest first. A distribution check
    /// never flags these.
    pub rare: Vec<TagPercent>,
}

/// Summarize `counts`; `None` for an empty histogram.
///
/// `rare_below` is normally the audit's `min_category_count`, so `rare` lists
/// exactly the tags a sample check will not hold to tolerance.
pub fn concentration(counts: &TagCounts, top_n: usize, rare_below: u64) -> Option<Concentration> {
    let total: u64 = counts.values().sum();
    let ranked = ranked(counts, total);
    let dominant = ranked.first()?.clone();
    let top_n = top_n.min(ranked.len());
    let top_count: u64 = ranked.iter().take(top_n).map(|entry| entry.count).sum();

    let sum_of_squares: f64 = counts
        .values()
        .map(|count| {
            let fraction = if total == 0 {
                0.0
            } else {
                *count as f64 / total as f64
            };
            fraction * fraction
        })
        .sum();
    let effective_tags = if sum_of_squares == 0.0 {
        0.0
    } else {
        1.0 / sum_of_squares
    };

    let mut rare: Vec<TagPercent> = ranked
        .iter()
        .filter(|entry| entry.count < rare_below)
        .cloned()
        .collect();
    rare.sort_by(|a, b| a.count.cmp(&b.count).then_with(|| a.tag.cmp(&b.tag)));

    Some(Concentration {
        total,
        tags: counts.len(),
        dominant,
        top_n,
        top_percent: percent(top_count, total),
        effective_tags,
        rare,
    })
}

fn ranked(counts: &TagCounts, total: u64) -> Vec<TagPercent> {
    let mut entries: Vec<TagPercent> = counts
        .iter()
        .map(|(tag, count)| TagPercent {
            tag: tag.clone(),
            count: *count,
            percent: percent(*count, total),
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    entries
}

/// Percentage (0..=100) of `count` within `total`; 0 when `total` is 0.
pub fn percent(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 * 100.0 / total as f64
    }
}
