/// Constants used by record normalization.
pub mod normalize {
    /// Minimum semantic length (in characters) for the default pipeline.
    pub const DEFAULT_MIN_LEN: usize = 50;
    /// Minimum semantic length used by the stricter pipeline variant.
    pub const STRICT_MIN_LEN: usize = 100;
    /// Length a loose string field must exceed to be collected by the fallback scan.
    pub const FALLBACK_FIELD_MIN_LEN: usize = 50;
    /// Prefix marking pipeline metadata keys (`_category`, `_source`).
    pub const META_FIELD_PREFIX: char = '_';
    /// Canonical key holding the category tag.
    pub const CATEGORY_FIELD: &str = "_category";
    /// Canonical key holding the source tag.
    pub const SOURCE_FIELD: &str = "_source";
    /// Tag used when a corpus record carries no category or source.
    pub const UNKNOWN_TAG: &str = "unknown";
}

/// Constants used by the merge engine.
pub mod merge {
    /// Upstream records between two progress log lines.
    pub const PROGRESS_EVERY_RECORDS: u64 = 100_000;
}

/// Constants used by train/validation splitting and stratified sampling.
pub mod splits {
    /// Default fraction of records assigned to train.
    pub const DEFAULT_TRAIN_RATIO: f64 = 0.95;
    /// Default shuffle seed.
    pub const DEFAULT_SEED: u64 = 42;
    /// Categories with at least this many records must appear in a stratified sample.
    pub const DEFAULT_MIN_CATEGORY_COUNT: u64 = 100;
    /// Allowed per-category drift, in percentage points, between full corpus and sample.
    pub const DEFAULT_TOLERANCE_PCT: f64 = 0.5;
}

/// Constants used by the auditor.
pub mod audit {
    /// Number of sources kept in a manifest's `top_sources`.
    pub const DEFAULT_TOP_SOURCES: usize = 100;
    /// Largest tags summed into a concentration summary's top share.
    pub const CONCENTRATION_TOP_N: usize = 5;
    /// Grouping-spec group whose categories count as dark content.
    pub const DARK_GROUP: &str = "dark";
    /// Dark ratio (percent) at or above which the band is `strong`.
    pub const DARK_STRONG_PCT: f64 = 30.0;
    /// Dark ratio (percent) at or above which the band is `moderate`.
    pub const DARK_MODERATE_PCT: f64 = 20.0;
    /// Dark ratio (percent) at or above which the band is `light`.
    pub const DARK_LIGHT_PCT: f64 = 15.0;
}

/// Constants used by file transports and the concatenated-object parser.
pub mod io {
    /// File extensions picked up when a source path is a directory of shards.
    pub const SHARD_EXTENSIONS: [&str; 2] = ["jsonl", "json"];
    /// Bytes requested per refill of the concatenated-object parser buffer.
    pub const CONCAT_READ_CHUNK: usize = 64 * 1024;
    /// Log message used when malformed lines are skipped.
    pub const SKIP_MALFORMED_MSG: &str = "skipping malformed line";
}
