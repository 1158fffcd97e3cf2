//! Multi-source streaming merge: read, normalize, fingerprint, dedupe, append.
//!
//! Sources are processed in declaration order and each source in file order,
//! so whichever form of a fingerprint arrives first is the one retained.

use serde::Serialize;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::audit::Manifest;
use crate::config::MergeConfig;
use crate::constants::merge::PROGRESS_EVERY_RECORDS;
use crate::data::{SkipReason, UpstreamRecord};
use crate::dedupe::{DedupeSet, MembershipSet, Observation};
use crate::errors::CorpusError;
use crate::hash::fingerprint;
use crate::normalize::Normalizer;
use crate::sink::RecordSink;
use crate::source::{ReaderStats, RecordReader, SourceSpec};
use crate::transport::fs::resolve_source_files;
use crate::types::{SourceId, TagCounts};

/// Per-source counters for one merge.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    /// Files read for this source (shards count individually).
    pub files: u64,
    /// Decoded upstream records.
    pub read: u64,
    /// Lines that failed to decode.
    pub malformed: u64,
    /// Records rejected as unshaped.
    pub skipped_unshaped: u64,
    /// Records rejected as too short.
    pub skipped_short: u64,
    /// Records rejected for an empty category or source tag.
    pub skipped_untagged: u64,
    /// Records dropped as duplicates.
    pub duplicates: u64,
    /// Records appended to the output.
    pub retained: u64,
    /// Read failures that closed a file early.
    pub read_errors: u64,
    /// True if the declared path did not exist.
    pub missing: bool,
    /// True if `max_records` closed the source early.
    pub truncated: bool,
}

impl SourceStats {
    /// Records rejected by the normalizer for any reason.
    pub fn skipped(&self) -> u64 {
        self.skipped_unshaped + self.skipped_short + self.skipped_untagged
    }

    fn record_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Unshaped => self.skipped_unshaped += 1,
            SkipReason::Short => self.skipped_short += 1,
            SkipReason::Untagged => self.skipped_untagged += 1,
        }
    }
}

/// Result of a merge run. Counters are owned by the run, never global.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MergeStats {
    /// Records that passed normalization (retained + duplicates).
    pub total_loaded: u64,
    /// Records dropped because their fingerprint was already seen.
    pub duplicates: u64,
    /// Records appended to the output.
    pub unique: u64,
    /// Retained-record tally per `_category`.
    pub categories: TagCounts,
    /// Retained-record tally per `_source`.
    pub sources: TagCounts,
    /// Counters per source id; declarations sharing an id are summed.
    pub per_source: BTreeMap<SourceId, SourceStats>,
    /// True if the run stopped on its cancel flag.
    pub cancelled: bool,
}

impl MergeStats {
    /// `duplicates / total_loaded`, or 0 when nothing loaded.
    pub fn deduplication_rate(&self) -> f64 {
        if self.total_loaded == 0 {
            0.0
        } else {
            self.duplicates as f64 / self.total_loaded as f64
        }
    }

    /// Normalizer rejections recorded for `source_id`.
    pub fn skipped(&self, source_id: &str) -> u64 {
        self.per_source
            .get(source_id)
            .map(SourceStats::skipped)
            .unwrap_or(0)
    }

    /// Manifest for this run's output with `top_n` sources.
    pub fn manifest(&self, top_n: usize) -> Manifest {
        Manifest::from_counts(
            self.unique,
            &self.categories,
            &self.sources,
            top_n,
            Some(self.deduplication_rate()),
        )
    }
}

enum IngestOutcome {
    Exhausted,
    Capped,
    Cancelled,
}

struct MergeState<'a, S, M> {
    sink: &'a mut S,
    seen: M,
    stats: MergeStats,
    upstream_seen: u64,
    started: Instant,
}

/// Drives sources through normalize, fingerprint, and dedupe into a sink.
#[derive(Clone, Debug, Default)]
pub struct MergeEngine {
    normalizer: Normalizer,
    cancel: Option<Arc<AtomicBool>>,
}

impl MergeEngine {
    /// Engine with explicit configuration.
    pub fn new(config: MergeConfig) -> Self {
        Self {
            normalizer: Normalizer::new(config.normalizer),
            cancel: None,
        }
    }

    /// Stop at the next record boundary once `flag` is set.
    ///
    /// Output written before cancellation is a valid corpus.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Merge file-backed sources into `sink`.
    ///
    /// Missing sources are logged and skipped; only sink failures abort.
    pub fn merge<S: RecordSink>(
        &self,
        sources: &[SourceSpec],
        sink: &mut S,
    ) -> Result<MergeStats, CorpusError> {
        let mut state = self.start(sink);
        'sources: for spec in sources {
            let files = match resolve_source_files(&spec.path) {
                Ok(files) => files,
                Err(CorpusError::InputMissing { path }) => {
                    warn!(
                        source_id = %spec.source_id,
                        path = %path.display(),
                        "[corpus:merge] source path missing; skipping"
                    );
                    Self::source_entry(&mut state, spec).missing = true;
                    continue;
                }
                Err(err) => return Err(err),
            };
            Self::source_entry(&mut state, spec);
            // The cap belongs to this declaration and spans its shards.
            let mut retained = 0u64;
            for file in files {
                let reader = match RecordReader::open(&file) {
                    Ok(reader) => reader,
                    Err(err) => {
                        warn!(
                            source_id = %spec.source_id,
                            path = %file.display(),
                            error = %err,
                            "[corpus:merge] cannot open source file; skipping"
                        );
                        Self::source_entry(&mut state, spec).read_errors += 1;
                        continue;
                    }
                };
                match self.ingest(&mut state, spec, &file, reader, &mut retained)? {
                    IngestOutcome::Exhausted => {}
                    IngestOutcome::Capped => break,
                    IngestOutcome::Cancelled => break 'sources,
                }
            }
            self.log_source_summary(&state, spec);
        }
        self.finish(state)
    }

    /// Merge in-memory or pre-opened streams, one per declared source.
    ///
    /// `SourceSpec::path` is used only for logging.
    pub fn merge_readers<R, S, I>(&self, inputs: I, sink: &mut S) -> Result<MergeStats, CorpusError>
    where
        R: BufRead,
        S: RecordSink,
        I: IntoIterator<Item = (SourceSpec, R)>,
    {
        let mut state = self.start(sink);
        for (spec, reader) in inputs {
            Self::source_entry(&mut state, &spec);
            let label = spec.path.display().to_string();
            let mut retained = 0u64;
            let outcome = self.ingest(
                &mut state,
                &spec,
                &spec.path,
                RecordReader::new(reader, label),
                &mut retained,
            )?;
            self.log_source_summary(&state, &spec);
            if matches!(outcome, IngestOutcome::Cancelled) {
                break;
            }
        }
        self.finish(state)
    }

    fn start<'a, S>(&self, sink: &'a mut S) -> MergeState<'a, S, DedupeSet> {
        MergeState {
            sink,
            seen: DedupeSet::new(),
            stats: MergeStats::default(),
            upstream_seen: 0,
            started: Instant::now(),
        }
    }

    fn finish<S: RecordSink, M>(&self, state: MergeState<'_, S, M>) -> Result<MergeStats, CorpusError> {
        state.sink.flush()?;
        let stats = state.stats;
        info!(
            total_loaded = stats.total_loaded,
            unique = stats.unique,
            duplicates = stats.duplicates,
            dedup_rate = stats.deduplication_rate(),
            cancelled = stats.cancelled,
            elapsed_secs = state.started.elapsed().as_secs_f64(),
            "[corpus:merge] merge complete"
        );
        Ok(stats)
    }

    fn source_entry<'s, S, M>(
        state: &'s mut MergeState<'_, S, M>,
        spec: &SourceSpec,
    ) -> &'s mut SourceStats {
        state
            .stats
            .per_source
            .entry(spec.source_id.clone())
            .or_default()
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn ingest<R, S, M>(
        &self,
        state: &mut MergeState<'_, S, M>,
        spec: &SourceSpec,
        path: &Path,
        mut reader: RecordReader<R>,
        retained: &mut u64,
    ) -> Result<IngestOutcome, CorpusError>
    where
        R: BufRead,
        S: RecordSink,
        M: MembershipSet,
    {
        Self::source_entry(state, spec).files += 1;
        let outcome = loop {
            if self.is_cancelled() {
                state.stats.cancelled = true;
                break IngestOutcome::Cancelled;
            }
            if spec.max_records.is_some_and(|max| *retained >= max) {
                Self::source_entry(state, spec).truncated = true;
                break IngestOutcome::Capped;
            }
            let upstream = match reader.next() {
                None => break IngestOutcome::Exhausted,
                Some(Ok(upstream)) => upstream,
                Some(Err(err)) => {
                    warn!(
                        source_id = %spec.source_id,
                        path = %path.display(),
                        error = %err,
                        "[corpus:merge] read failed; closing source file"
                    );
                    Self::source_entry(state, spec).read_errors += 1;
                    break IngestOutcome::Exhausted;
                }
            };
            if self.observe(state, spec, &upstream)? {
                *retained += 1;
            }
        };
        let ReaderStats { malformed, .. } = reader.stats();
        Self::source_entry(state, spec).malformed += malformed;
        if malformed > 0 {
            warn!(
                source_id = %spec.source_id,
                path = %path.display(),
                malformed,
                "[corpus:merge] skipped malformed lines"
            );
        }
        Ok(outcome)
    }

    fn observe<S, M>(
        &self,
        state: &mut MergeState<'_, S, M>,
        spec: &SourceSpec,
        upstream: &UpstreamRecord,
    ) -> Result<bool, CorpusError>
    where
        S: RecordSink,
        M: MembershipSet,
    {
        state.upstream_seen += 1;
        if state.upstream_seen % PROGRESS_EVERY_RECORDS == 0 {
            info!(
                upstream = state.upstream_seen,
                unique = state.stats.unique,
                duplicates = state.stats.duplicates,
                elapsed_secs = state.started.elapsed().as_secs_f64(),
                "[corpus:merge] progress"
            );
        }
        Self::source_entry(state, spec).read += 1;

        let record = match self
            .normalizer
            .normalize(upstream, &spec.category, &spec.source_id)
        {
            Ok(record) => record,
            Err(reason) => {
                debug!(source_id = %spec.source_id, reason = %reason, "[corpus:merge] record rejected");
                Self::source_entry(state, spec).record_skip(reason);
                return Ok(false);
            }
        };
        state.stats.total_loaded += 1;

        match state.seen.observe(fingerprint(&record)) {
            Observation::Duplicate => {
                state.stats.duplicates += 1;
                Self::source_entry(state, spec).duplicates += 1;
                Ok(false)
            }
            Observation::FirstSeen => {
                state.sink.append(&record)?;
                state.stats.unique += 1;
                *state.stats.categories.entry(record.category).or_insert(0) += 1;
                *state.stats.sources.entry(record.source).or_insert(0) += 1;
                Self::source_entry(state, spec).retained += 1;
                Ok(true)
            }
        }
    }

    fn log_source_summary<S, M>(&self, state: &MergeState<'_, S, M>, spec: &SourceSpec) {
        let Some(stats) = state.stats.per_source.get(&spec.source_id) else {
            return;
        };
        info!(
            source_id = %spec.source_id,
            category = %spec.category,
            files = stats.files,
            read = stats.read,
            retained = stats.retained,
            duplicates = stats.duplicates,
            skipped = stats.skipped(),
            malformed = stats.malformed,
            truncated = stats.truncated,
            "[corpus:merge] source done"
        );
    }
}
