//! Read-only corpus validation against an in-run set and an optional
//! external fingerprint cache.

use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;
use tracing::{info, warn};

use crate::config::NormalizerConfig;
use crate::constants::normalize::{CATEGORY_FIELD, SOURCE_FIELD};
use crate::data::record_tag;
use crate::dedupe::{DedupeSet, MembershipSet, Observation};
use crate::errors::CorpusError;
use crate::hash::{Fingerprint, fingerprint};
use crate::normalize::Normalizer;
use crate::source::RecordReader;
use crate::transport::fs::create_writer;

/// Counts for one validated corpus. `unique + intra_duplicates == total`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Records that normalized.
    pub total: u64,
    /// Distinct fingerprints among them.
    pub unique: u64,
    /// Records repeating an earlier fingerprint.
    pub intra_duplicates: u64,
    /// Records whose fingerprint is in the external cache.
    pub cache_overlap: u64,
    /// Decoded records the normalizer rejected.
    pub skipped: u64,
    /// Undecodable lines.
    pub malformed: u64,
    /// Fingerprints loaded from the cache.
    pub cache_size: u64,
}

/// Normalizes and fingerprints a corpus without writing anything.
#[derive(Clone, Debug, Default)]
pub struct Validator {
    normalizer: Normalizer,
}

impl Validator {
    /// Validator that normalizes with `config`.
    pub fn new(config: NormalizerConfig) -> Self {
        Self {
            normalizer: Normalizer::new(config),
        }
    }

    /// Validate `dataset`, optionally counting overlap with `cache`.
    ///
    /// A missing dataset is an error; a missing or malformed cache is not.
    pub fn validate(
        &self,
        dataset: &Path,
        cache: Option<&Path>,
    ) -> Result<ValidationReport, CorpusError> {
        let mut reader = RecordReader::open(dataset)?;
        let cache = cache.map(load_fingerprint_cache).unwrap_or_default();
        let report = self.validate_records(&mut reader, &cache)?;
        info!(
            dataset = %dataset.display(),
            total = report.total,
            unique = report.unique,
            intra_duplicates = report.intra_duplicates,
            cache_overlap = report.cache_overlap,
            skipped = report.skipped,
            malformed = report.malformed,
            "[corpus:validate] validation complete"
        );
        Ok(report)
    }

    /// Validate records from an open reader against a loaded cache.
    pub fn validate_records<R: BufRead>(
        &self,
        reader: &mut RecordReader<R>,
        cache: &DedupeSet,
    ) -> Result<ValidationReport, CorpusError> {
        let mut seen = DedupeSet::new();
        let mut report = ValidationReport {
            cache_size: cache.len() as u64,
            ..ValidationReport::default()
        };
        for record in reader.by_ref() {
            let record = record?;
            let canonical = match self.normalizer.normalize(
                &record,
                record_tag(&record, CATEGORY_FIELD),
                record_tag(&record, SOURCE_FIELD),
            ) {
                Ok(canonical) => canonical,
                Err(_) => {
                    report.skipped += 1;
                    continue;
                }
            };
            report.total += 1;
            let fp = fingerprint(&canonical);
            if cache.contains(&fp) {
                report.cache_overlap += 1;
            }
            match seen.observe(fp) {
                Observation::FirstSeen => report.unique += 1,
                Observation::Duplicate => report.intra_duplicates += 1,
            }
        }
        report.malformed = reader.stats().malformed;
        Ok(report)
    }
}

/// Load a JSON list of fingerprint strings.
///
/// A missing or undecodable file yields an empty cache with a warning;
/// individual entries that are not fingerprints are skipped.
pub fn load_fingerprint_cache(path: &Path) -> DedupeSet {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "[corpus:validate] fingerprint cache unreadable; using empty cache"
            );
            return DedupeSet::new();
        }
    };
    let entries = match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Array(entries)) => entries,
        Ok(_) => {
            warn!(
                path = %path.display(),
                "[corpus:validate] fingerprint cache is not a list; using empty cache"
            );
            return DedupeSet::new();
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "[corpus:validate] fingerprint cache malformed; using empty cache"
            );
            return DedupeSet::new();
        }
    };
    let total = entries.len();
    let cache: DedupeSet = entries
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|raw| raw.parse::<Fingerprint>().ok())
        .collect();
    let invalid = total.saturating_sub(cache.len());
    if invalid > 0 {
        warn!(
            path = %path.display(),
            ignored = invalid,
            "[corpus:validate] ignored invalid or repeated cache entries"
        );
    }
    cache
}

/// Write fingerprints as a cache file readable by [`load_fingerprint_cache`].
pub fn write_fingerprint_cache<'a>(
    path: &Path,
    fingerprints: impl IntoIterator<Item = &'a Fingerprint>,
) -> Result<(), CorpusError> {
    let list: Vec<&Fingerprint> = fingerprints.into_iter().collect();
    let mut writer = create_writer(path)?;
    serde_json::to_writer(&mut writer, &list).map_err(|err| CorpusError::write(path, err.into()))?;
    writer.flush().map_err(|err| CorpusError::write(path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn line(i: usize) -> String {
        format!(
            "{{\"instruction\":\"Question number {i}\",\"output\":\"An answer that is long enough to keep.\",\"_category\":\"qa\",\"_source\":\"test\"}}\n"
        )
    }

    #[test]
    fn counts_intra_duplicates_and_skips() {
        let body = format!(
            "{}{}{}{{\"instruction\":\"hi\",\"output\":\"ok\"}}\nnot json\n",
            line(1),
            line(2),
            line(1)
        );
        let mut reader = RecordReader::new(Cursor::new(body), "inline");
        let report = Validator::default()
            .validate_records(&mut reader, &DedupeSet::new())
            .unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.unique, 2);
        assert_eq!(report.intra_duplicates, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.malformed, 1);
        assert_eq!(report.unique + report.intra_duplicates, report.total);
    }

    #[test]
    fn missing_dataset_is_fatal() {
        let dir = tempdir().unwrap();
        let err = Validator::default()
            .validate(&dir.path().join("absent.jsonl"), None)
            .unwrap_err();
        assert!(matches!(err, CorpusError::InputMissing { .. }));
    }

    #[test]
    fn malformed_or_missing_cache_is_empty() {
        let dir = tempdir().unwrap();
        assert!(load_fingerprint_cache(&dir.path().join("absent.json")).is_empty());

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{not a list").unwrap();
        assert!(load_fingerprint_cache(&broken).is_empty());

        let object = dir.path().join("object.json");
        fs::write(&object, r#"{"a": 1}"#).unwrap();
        assert!(load_fingerprint_cache(&object).is_empty());
    }

    #[test]
    fn cache_skips_bad_entries_and_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let fps = [Fingerprint::from_u128(1), Fingerprint::from_u128(u128::MAX)];
        write_fingerprint_cache(&path, &fps).unwrap();
        let cache = load_fingerprint_cache(&path);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&fps[1]));

        let mixed = dir.path().join("mixed.json");
        fs::write(&mixed, r#"["00000000000000000000000000000001", 5, "zz", "+1", "1"]"#).unwrap();
        assert_eq!(load_fingerprint_cache(&mixed).len(), 1);
    }
}
