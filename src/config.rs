use crate::constants::audit::DEFAULT_TOP_SOURCES;
use crate::constants::normalize::{DEFAULT_MIN_LEN, STRICT_MIN_LEN};
use crate::constants::splits::{
    DEFAULT_MIN_CATEGORY_COUNT, DEFAULT_SEED, DEFAULT_TOLERANCE_PCT, DEFAULT_TRAIN_RATIO,
};
use crate::errors::CorpusError;

/// Controls which mapped records are accepted as canonical.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizerConfig {
    /// Minimum character length of `instruction + input + output + text`.
    pub min_len: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            min_len: DEFAULT_MIN_LEN,
        }
    }
}

impl NormalizerConfig {
    /// Stricter variant used by pipelines that want longer records.
    pub fn strict() -> Self {
        Self {
            min_len: STRICT_MIN_LEN,
        }
    }
}

/// Top-level merge configuration.
#[derive(Clone, Debug, Default)]
pub struct MergeConfig {
    /// Normalization settings applied to every source.
    pub normalizer: NormalizerConfig,
}

/// Train/validation split configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SplitConfig {
    /// Fraction of records assigned to train (`0.0..=1.0`).
    pub train_ratio: f64,
    /// Shuffle seed; the same seed and corpus always produce the same partition.
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_ratio: DEFAULT_TRAIN_RATIO,
            seed: DEFAULT_SEED,
        }
    }
}

impl SplitConfig {
    /// Validate that `train_ratio` lies within `[0, 1]`.
    pub fn validated(self) -> Result<Self, CorpusError> {
        if !(0.0..=1.0).contains(&self.train_ratio) {
            return Err(CorpusError::Configuration(format!(
                "train ratio must be within [0, 1], got {}",
                self.train_ratio
            )));
        }
        Ok(self)
    }
}

/// Stratified (category-preserving) sampling configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StratifiedConfig {
    /// Target number of records in the sample.
    pub sample_size: u64,
    /// Seed for per-category reservoir sampling.
    pub seed: u64,
    /// Categories with at least this many records are never dropped from the sample.
    pub min_category_count: u64,
    /// Allowed per-category drift in percentage points.
    pub tolerance_pct: f64,
}

impl StratifiedConfig {
    /// Config for a sample of `sample_size` records with default seed and tolerance.
    pub fn new(sample_size: u64) -> Self {
        Self {
            sample_size,
            seed: DEFAULT_SEED,
            min_category_count: DEFAULT_MIN_CATEGORY_COUNT,
            tolerance_pct: DEFAULT_TOLERANCE_PCT,
        }
    }
}

/// Auditor reporting configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AuditConfig {
    /// Number of sources kept in the manifest's `top_sources`.
    pub top_sources: usize,
    /// Allowed per-category drift in percentage points for distribution checks.
    pub tolerance_pct: f64,
    /// Only categories with at least this many full-corpus records are checked.
    pub min_category_count: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            top_sources: DEFAULT_TOP_SOURCES,
            tolerance_pct: DEFAULT_TOLERANCE_PCT,
            min_category_count: DEFAULT_MIN_CATEGORY_COUNT,
        }
    }
}
