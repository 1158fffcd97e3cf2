//! Seeded train/validation splitting and category-stratified sampling.

use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

use crate::audit::{DistributionReport, distribution_check};
use crate::config::{SplitConfig, StratifiedConfig};
use crate::constants::normalize::CATEGORY_FIELD;
use crate::data::record_tag;
use crate::errors::CorpusError;
use crate::hash::stable_hash_str;
use crate::rng::DeterministicRng;
use crate::source::RecordReader;
use crate::transport::fs::create_writer;
use crate::types::{CategoryId, TagCounts};

/// Split label assigned to a corpus record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitLabel {
    /// Training split.
    Train,
    /// Validation split.
    Validation,
}

/// Counters for one split run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SplitStats {
    /// Valid records read from the corpus.
    pub total: u64,
    /// Records written to the train file.
    pub train: u64,
    /// Records written to the validation file.
    pub validation: u64,
    /// Lines dropped because they did not decode.
    pub malformed: u64,
}

/// `floor(len * train_ratio)`, clamped to `len`.
pub fn split_index(len: usize, train_ratio: f64) -> usize {
    ((len as f64) * train_ratio).floor().clamp(0.0, len as f64) as usize
}

/// Seeded permutation of `0..len` paired with each position's label.
///
/// The first `split_index(len, ratio)` positions are train. The result
/// depends only on `len` and the config.
pub fn partition(len: usize, config: SplitConfig) -> Vec<(usize, SplitLabel)> {
    let mut order: Vec<usize> = (0..len).collect();
    let mut rng = DeterministicRng::new(config.seed);
    order.shuffle(&mut rng);
    let cut = split_index(len, config.train_ratio);
    order
        .into_iter()
        .enumerate()
        .map(|(position, index)| {
            let label = if position < cut {
                SplitLabel::Train
            } else {
                SplitLabel::Validation
            };
            (index, label)
        })
        .collect()
}

/// Shuffle `corpus` with a seeded permutation and write train and validation files.
///
/// Each valid record's original line is written unchanged; output order is
/// the shuffled order.
pub fn split_corpus(
    corpus: &Path,
    train_out: &Path,
    val_out: &Path,
    config: SplitConfig,
) -> Result<SplitStats, CorpusError> {
    let config = config.validated()?;
    let mut reader = RecordReader::open(corpus)?;
    let mut lines = Vec::new();
    while let Some(next) = reader.next_raw() {
        lines.push(next?.raw);
    }
    let mut stats = SplitStats {
        total: lines.len() as u64,
        malformed: reader.stats().malformed,
        ..SplitStats::default()
    };

    let mut train = create_writer(train_out)?;
    let mut val = create_writer(val_out)?;
    for (index, label) in partition(lines.len(), config) {
        let (writer, path) = match label {
            SplitLabel::Train => {
                stats.train += 1;
                (&mut train, train_out)
            }
            SplitLabel::Validation => {
                stats.validation += 1;
                (&mut val, val_out)
            }
        };
        write_line(writer, &lines[index]).map_err(|err| CorpusError::write(path, err))?;
    }
    train.flush().map_err(|err| CorpusError::write(train_out, err))?;
    val.flush().map_err(|err| CorpusError::write(val_out, err))?;

    info!(
        corpus = %corpus.display(),
        total = stats.total,
        train = stats.train,
        validation = stats.validation,
        seed = config.seed,
        "[corpus:split] split complete"
    );
    Ok(stats)
}

/// Outcome of a stratified sample.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StratifiedSample {
    /// Valid records in the full corpus.
    pub total: u64,
    /// Records written to the sample.
    pub sampled: u64,
    /// Per-category record counts in the full corpus.
    pub full_counts: TagCounts,
    /// Per-category records drawn.
    pub quotas: TagCounts,
    /// Drift of the sample against the full corpus.
    pub check: DistributionReport,
}

/// Per-category sample sizes summing to `min(sample_size, total)`.
///
/// Quotas are proportional with largest-remainder rounding (ties by tag).
/// A category with at least `min_category_count` records keeps one slot,
/// taken from the largest quota while some quota exceeds one. Larger
/// categories are served first; once no quota can give, the remaining ones
/// stay at zero.
pub fn category_quotas(
    counts: &TagCounts,
    sample_size: u64,
    min_category_count: u64,
) -> TagCounts {
    let total: u64 = counts.values().sum();
    if sample_size >= total {
        return counts.clone();
    }

    let mut quotas = TagCounts::new();
    let mut remainders: Vec<(&CategoryId, u128)> = Vec::with_capacity(counts.len());
    let mut assigned = 0u64;
    for (category, count) in counts {
        // Exact integer arithmetic: count * sample_size / total.
        let scaled = u128::from(*count) * u128::from(sample_size);
        let quota = (scaled / u128::from(total)) as u64;
        remainders.push((category, scaled % u128::from(total)));
        quotas.insert(category.clone(), quota);
        assigned += quota;
    }
    remainders.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    for (category, _) in remainders
        .into_iter()
        .take((sample_size - assigned) as usize)
    {
        if let Some(quota) = quotas.get_mut(category) {
            *quota += 1;
        }
    }

    let mut starved: Vec<(&CategoryId, u64)> = counts
        .iter()
        .filter(|(category, count)| **count >= min_category_count && quotas[*category] == 0)
        .map(|(category, count)| (category, *count))
        .collect();
    starved.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    for (category, _) in starved {
        let donor = quotas
            .iter()
            .filter(|(_, quota)| **quota > 1)
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(donor, _)| donor.clone());
        // Out of slots to move: the rest stay at zero and show up as missing.
        let Some(donor) = donor else {
            break;
        };
        if let Some(quota) = quotas.get_mut(&donor) {
            *quota -= 1;
        }
        quotas.insert(category.clone(), 1);
    }
    quotas
}

/// Draw a category-stratified sample of `corpus` into `output`.
///
/// Two streaming passes: the first counts categories, the second keeps one
/// seeded reservoir per category. Memory is bounded by the sample size.
/// Sampled lines keep their corpus order.
pub fn stratified_sample(
    corpus: &Path,
    output: &Path,
    config: StratifiedConfig,
) -> Result<StratifiedSample, CorpusError> {
    let mut full_counts = TagCounts::new();
    for record in RecordReader::open(corpus)? {
        let record = record?;
        *full_counts
            .entry(record_tag(&record, CATEGORY_FIELD).to_string())
            .or_default() += 1;
    }
    let total: u64 = full_counts.values().sum();
    let quotas = category_quotas(&full_counts, config.sample_size, config.min_category_count);

    let mut reservoirs: BTreeMap<CategoryId, Reservoir> = quotas
        .iter()
        .map(|(category, quota)| {
            let seed = stable_hash_str(config.seed, category);
            (category.clone(), Reservoir::new(*quota, seed))
        })
        .collect();
    let mut reader = RecordReader::open(corpus)?;
    let mut position = 0u64;
    while let Some(next) = reader.next_raw() {
        let next = next?;
        if let Some(reservoir) = reservoirs.get_mut(record_tag(&next.record, CATEGORY_FIELD)) {
            reservoir.offer(position, next.raw);
        }
        position += 1;
    }

    let mut picked: Vec<(u64, String)> = reservoirs
        .into_values()
        .flat_map(|reservoir| reservoir.items)
        .collect();
    picked.sort_by_key(|(position, _)| *position);

    let mut writer = create_writer(output)?;
    for (_, line) in &picked {
        write_line(&mut writer, line).map_err(|err| CorpusError::write(output, err))?;
    }
    writer.flush().map_err(|err| CorpusError::write(output, err))?;

    let check = distribution_check(
        &full_counts,
        &quotas,
        config.tolerance_pct,
        config.min_category_count,
    );
    for violation in &check.violations {
        warn!(
            category = %violation.category,
            kind = ?violation.kind,
            delta_pct = violation.delta_pct,
            "[corpus:sample] category outside tolerance"
        );
    }
    info!(
        corpus = %corpus.display(),
        total,
        sampled = picked.len(),
        categories = quotas.len(),
        violations = check.violations.len(),
        "[corpus:sample] stratified sample complete"
    );
    Ok(StratifiedSample {
        total,
        sampled: picked.len() as u64,
        full_counts,
        quotas,
        check,
    })
}

/// Fixed-capacity uniform reservoir (Algorithm R).
struct Reservoir {
    capacity: u64,
    seen: u64,
    rng: DeterministicRng,
    items: Vec<(u64, String)>,
}

impl Reservoir {
    fn new(capacity: u64, seed: u64) -> Self {
        Self {
            capacity,
            seen: 0,
            rng: DeterministicRng::new(seed),
            items: Vec::new(),
        }
    }

    fn offer(&mut self, position: u64, line: String) {
        let index = self.seen;
        self.seen += 1;
        if self.capacity == 0 {
            return;
        }
        if index < self.capacity {
            self.items.push((position, line));
            return;
        }
        let slot = self.rng.random_range(0..=index);
        if slot < self.capacity {
            self.items[slot as usize] = (position, line);
        }
    }
}

fn write_line<W: Write>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")
}
