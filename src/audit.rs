//! Corpus manifests and on-demand audit reports.
//!
//! Every report here is descriptive. Nothing in this module filters or
//! rewrites corpus data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::config::AuditConfig;
use crate::constants::audit::{DARK_GROUP, DARK_LIGHT_PCT, DARK_MODERATE_PCT, DARK_STRONG_PCT};
use crate::constants::normalize::{CATEGORY_FIELD, SOURCE_FIELD};
use crate::data::record_tag;
use crate::errors::CorpusError;
use crate::metrics::percent;
use crate::source::RecordReader;
use crate::transport::fs::{create_writer, open_reader};
use crate::types::{CategoryId, GroupName, SourceId, TagCounts};

/// Summary object written next to a corpus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Records in the corpus.
    pub total_examples: u64,
    /// Category histogram, largest first.
    #[serde(with = "ranked")]
    pub categories: Vec<(CategoryId, u64)>,
    /// The `top_n` largest sources, largest first.
    #[serde(with = "ranked")]
    pub top_sources: Vec<(SourceId, u64)>,
    /// Carried forward from a merge when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deduplication_rate: Option<f64>,
}

impl Manifest {
    /// Build a manifest from tallies.
    pub fn from_counts(
        total_examples: u64,
        categories: &TagCounts,
        sources: &TagCounts,
        top_n: usize,
        deduplication_rate: Option<f64>,
    ) -> Self {
        let mut top_sources = sorted_by_count(sources);
        top_sources.truncate(top_n);
        Self {
            total_examples,
            categories: sorted_by_count(categories),
            top_sources,
            deduplication_rate,
        }
    }

    /// Count recorded for `category`, if listed.
    pub fn category(&self, category: &str) -> Option<u64> {
        lookup(&self.categories, category)
    }

    /// Count recorded for `source`, if among the top sources.
    pub fn source(&self, source: &str) -> Option<u64> {
        lookup(&self.top_sources, source)
    }

    /// Read a manifest file.
    pub fn read(path: &Path) -> Result<Self, CorpusError> {
        Ok(serde_json::from_reader(open_reader(path)?)?)
    }

    /// Write as pretty-printed JSON.
    pub fn write(&self, path: &Path) -> Result<(), CorpusError> {
        let mut writer = create_writer(path)?;
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|err| CorpusError::write(path, err.into()))?;
        writer
            .write_all(b"\n")
            .and_then(|_| writer.flush())
            .map_err(|err| CorpusError::write(path, err))
    }
}

fn sorted_by_count(counts: &TagCounts) -> Vec<(String, u64)> {
    let mut sorted: Vec<(String, u64)> = counts
        .iter()
        .map(|(tag, count)| (tag.clone(), *count))
        .collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted
}

fn lookup(entries: &[(String, u64)], tag: &str) -> Option<u64> {
    entries
        .iter()
        .find(|(candidate, _)| candidate == tag)
        .map(|(_, count)| *count)
}

/// Serializes ranked `(tag, count)` pairs as a JSON object in list order.
mod ranked {
    use serde::de::{MapAccess, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    /// Write pairs in list order.
    pub fn serialize<S: Serializer>(
        entries: &[(String, u64)],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(entries.iter().map(|(tag, count)| (tag, count)))
    }

    /// Read pairs in document order.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<(String, u64)>, D::Error> {
        struct RankedVisitor;

        impl<'de> Visitor<'de> for RankedVisitor {
            type Value = Vec<(String, u64)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of tag to count")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, u64>()? {
                    entries.push(entry);
                }
                Ok(entries)
            }
        }

        deserializer.deserialize_map(RankedVisitor)
    }
}

/// Tag tallies from one pass over a corpus file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CorpusCounts {
    /// Valid records.
    pub total: u64,
    /// Undecodable lines.
    pub malformed: u64,
    /// Records per `_category` (missing tags count as `unknown`).
    pub categories: TagCounts,
    /// Records per `_source` (missing tags count as `unknown`).
    pub sources: TagCounts,
}

impl CorpusCounts {
    /// Manifest over these tallies.
    pub fn manifest(&self, top_n: usize, deduplication_rate: Option<f64>) -> Manifest {
        Manifest::from_counts(
            self.total,
            &self.categories,
            &self.sources,
            top_n,
            deduplication_rate,
        )
    }
}

/// Stream a corpus once and tally category and source tags.
pub fn count_corpus(path: &Path) -> Result<CorpusCounts, CorpusError> {
    let mut counts = CorpusCounts::default();
    let mut reader = RecordReader::open(path)?;
    for record in reader.by_ref() {
        let record = record?;
        counts.total += 1;
        *counts
            .categories
            .entry(record_tag(&record, CATEGORY_FIELD).to_string())
            .or_default() += 1;
        *counts
            .sources
            .entry(record_tag(&record, SOURCE_FIELD).to_string())
            .or_default() += 1;
    }
    counts.malformed = reader.stats().malformed;
    info!(
        corpus = %path.display(),
        total = counts.total,
        categories = counts.categories.len(),
        sources = counts.sources.len(),
        malformed = counts.malformed,
        "[corpus:audit] corpus counted"
    );
    Ok(counts)
}

/// Audit a corpus file into a manifest.
pub fn audit_corpus(
    path: &Path,
    config: &AuditConfig,
    deduplication_rate: Option<f64>,
) -> Result<Manifest, CorpusError> {
    Ok(count_corpus(path)?.manifest(config.top_sources, deduplication_rate))
}

/// Mapping of group name to member categories, read from a JSON object.
///
/// A category may belong to several groups.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupingSpec {
    /// Member categories per group name.
    pub groups: BTreeMap<GroupName, Vec<CategoryId>>,
}

impl GroupingSpec {
    /// Load a grouping spec file such as `{"dark": ["horror", "noir"]}`.
    pub fn from_path(path: &Path) -> Result<Self, CorpusError> {
        Ok(serde_json::from_reader(open_reader(path)?)?)
    }

    /// Group totals over a category histogram.
    pub fn report(&self, categories: &TagCounts) -> GroupReport {
        let total: u64 = categories.values().sum();
        let count_of = |members: &[CategoryId]| -> u64 {
            members
                .iter()
                .filter_map(|category| categories.get(category))
                .sum()
        };
        let groups: BTreeMap<GroupName, GroupShare> = self
            .groups
            .iter()
            .map(|(name, members)| (name.clone(), GroupShare::new(count_of(members), total)))
            .collect();
        let ungrouped_count: u64 = categories
            .iter()
            .filter(|(category, _)| !self.groups.values().any(|members| members.contains(*category)))
            .map(|(_, count)| *count)
            .sum();
        let dark = self
            .groups
            .get(DARK_GROUP)
            .map(|members| dark_ratio(categories, members));
        GroupReport {
            total,
            groups,
            ungrouped: GroupShare::new(ungrouped_count, total),
            dark,
        }
    }
}

/// Count and percentage of one group.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GroupShare {
    /// Records in the group's categories.
    pub count: u64,
    /// Share of the histogram total, in percent.
    pub percent: f64,
}

impl GroupShare {
    fn new(count: u64, total: u64) -> Self {
        Self {
            count,
            percent: percent(count, total),
        }
    }
}

/// Grouping report over a category histogram.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupReport {
    /// Records in the histogram.
    pub total: u64,
    /// Share per group, by group name.
    pub groups: BTreeMap<GroupName, GroupShare>,
    /// Categories that belong to no group.
    pub ungrouped: GroupShare,
    /// Present when the spec declares a `dark` group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dark: Option<DarkRatio>,
}

/// Qualitative band for a dark-content ratio. Reporting only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DarkBand {
    /// At or above 30%.
    Strong,
    /// At or above 20%.
    Moderate,
    /// At or above 15%.
    Light,
    /// Below 15%.
    Minimal,
}

impl DarkBand {
    /// Band for a percentage in `0..=100`.
    pub fn from_percent(pct: f64) -> Self {
        if pct >= DARK_STRONG_PCT {
            DarkBand::Strong
        } else if pct >= DARK_MODERATE_PCT {
            DarkBand::Moderate
        } else if pct >= DARK_LIGHT_PCT {
            DarkBand::Light
        } else {
            DarkBand::Minimal
        }
    }

    /// Lowercase label used in reports.
    pub fn as_str(self) -> &'static str {
        match self {
            DarkBand::Strong => "strong",
            DarkBand::Moderate => "moderate",
            DarkBand::Light => "light",
            DarkBand::Minimal => "minimal",
        }
    }
}

/// Share of records carrying a dark category tag.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DarkRatio {
    /// Records carrying a dark tag.
    pub count: u64,
    /// Share of all records, in percent.
    pub percent: f64,
    /// Band for `percent`.
    pub band: DarkBand,
}

/// Sum of `dark_tags` counts over the histogram total, with its band.
pub fn dark_ratio(categories: &TagCounts, dark_tags: &[CategoryId]) -> DarkRatio {
    let total: u64 = categories.values().sum();
    let count: u64 = categories
        .iter()
        .filter(|(category, _)| dark_tags.contains(*category))
        .map(|(_, count)| *count)
        .sum();
    let pct = percent(count, total);
    DarkRatio {
        count,
        percent: pct,
        band: DarkBand::from_percent(pct),
    }
}

/// Per-category comparison between a full corpus and a sample.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CategoryDrift {
    /// Category tag.
    pub category: CategoryId,
    /// Records in the full corpus.
    pub full_count: u64,
    /// Records in the sample.
    pub sample_count: u64,
    /// Share of the full corpus, in percent.
    pub full_pct: f64,
    /// Share of the sample, in percent.
    pub sample_pct: f64,
    /// `sample_pct - full_pct`, in percentage points.
    pub delta_pct: f64,
}

/// Why a checked category failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Category share moved by more than the tolerance.
    Drift,
    /// Category absent from the sample.
    Missing,
}

/// A checked category that failed the distribution check.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DistributionViolation {
    /// Category tag.
    pub category: CategoryId,
    /// Kind of failure.
    pub kind: ViolationKind,
    /// `sample_pct - full_pct`, in percentage points.
    pub delta_pct: f64,
}

/// Result of comparing a sample's category mix with its full corpus.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DistributionReport {
    /// Records in the full corpus.
    pub full_total: u64,
    /// Records in the sample.
    pub sample_total: u64,
    /// Allowed drift in percentage points.
    pub tolerance_pct: f64,
    /// Full-corpus size a category needs before it is held to tolerance.
    pub min_category_count: u64,
    /// One row per category seen in either corpus.
    pub rows: Vec<CategoryDrift>,
    /// Checked categories that failed, in row order.
    pub violations: Vec<DistributionViolation>,
}

impl DistributionReport {
    /// True when no checked category drifted or went missing.
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Absolute drift over the categories held to tolerance.
    pub fn spread(&self) -> DriftSpread {
        let checked: Vec<&CategoryDrift> = self
            .rows
            .iter()
            .filter(|row| row.full_count > 0 && row.full_count >= self.min_category_count)
            .collect();
        let worst = checked
            .iter()
            .max_by(|a, b| a.delta_pct.abs().total_cmp(&b.delta_pct.abs()));
        let mean_abs_delta_pct = if checked.is_empty() {
            0.0
        } else {
            checked.iter().map(|row| row.delta_pct.abs()).sum::<f64>() / checked.len() as f64
        };
        DriftSpread {
            checked: checked.len(),
            max_abs_delta_pct: worst.map(|row| row.delta_pct.abs()).unwrap_or(0.0),
            mean_abs_delta_pct,
            worst: worst.map(|row| row.category.clone()),
        }
    }
}

/// Sampling skew in percentage points, summarized across checked categories.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DriftSpread {
    /// Categories held to tolerance.
    pub checked: usize,
    /// Largest absolute drift.
    pub max_abs_delta_pct: f64,
    /// Mean absolute drift.
    pub mean_abs_delta_pct: f64,
    /// Category with the largest absolute drift.
    pub worst: Option<CategoryId>,
}

/// Compare category percentages of `sample` against `full`.
///
/// Only categories with at least `min_category_count` full-corpus records
/// can produce violations; every category still gets a row.
pub fn distribution_check(
    full: &TagCounts,
    sample: &TagCounts,
    tolerance_pct: f64,
    min_category_count: u64,
) -> DistributionReport {
    let full_total: u64 = full.values().sum();
    let sample_total: u64 = sample.values().sum();
    let mut rows = Vec::new();
    let mut violations = Vec::new();
    let extra = sample.keys().filter(|category| !full.contains_key(*category));
    for category in full.keys().chain(extra) {
        let full_count = full.get(category).copied().unwrap_or(0);
        let sample_count = sample.get(category).copied().unwrap_or(0);
        let full_pct = percent(full_count, full_total);
        let sample_pct = percent(sample_count, sample_total);
        let delta_pct = sample_pct - full_pct;
        if full_count >= min_category_count && full_count > 0 {
            let kind = if sample_count == 0 {
                Some(ViolationKind::Missing)
            } else if delta_pct.abs() > tolerance_pct {
                Some(ViolationKind::Drift)
            } else {
                None
            };
            if let Some(kind) = kind {
                violations.push(DistributionViolation {
                    category: category.clone(),
                    kind,
                    delta_pct,
                });
            }
        }
        rows.push(CategoryDrift {
            category: category.clone(),
            full_count,
            sample_count,
            full_pct,
            sample_pct,
            delta_pct,
        });
    }
    DistributionReport {
        full_total,
        sample_total,
        tolerance_pct,
        min_category_count,
        rows,
        violations,
    }
}

/// Count both corpora and run [`distribution_check`] with the audit config.
pub fn check_sample_files(
    full: &Path,
    sample: &Path,
    config: &AuditConfig,
) -> Result<DistributionReport, CorpusError> {
    let full_counts = count_corpus(full)?;
    let sample_counts = count_corpus(sample)?;
    Ok(distribution_check(
        &full_counts.categories,
        &sample_counts.categories,
        config.tolerance_pct,
        config.min_category_count,
    ))
}
